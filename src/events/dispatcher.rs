//! Notification Dispatcher
//!
//! Maps committed store changes to zero or more [`NotificationEvent`]s. Pure
//! and stateless: the relay resolves parent issues before calling in.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::NotificationEvent;
use crate::models::{Comment, Issue};
use crate::store::ChangeEvent;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Notify a reporter about comments they wrote on their own issue
    #[serde(default)]
    pub notify_self_comments: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NotificationDispatcher {
    config: DispatcherConfig,
}

impl NotificationDispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> DispatcherConfig {
        self.config
    }

    /// New issues are announced to everyone.
    pub fn on_issue_inserted(&self, issue: &Issue) -> Vec<NotificationEvent> {
        vec![NotificationEvent::new_issue(issue)]
    }

    /// Status changes notify the reporter. Priority-only updates and reverts
    /// to `open` produce nothing.
    pub fn on_issue_updated(&self, old: &Issue, new: &Issue) -> Vec<NotificationEvent> {
        if old.status == new.status {
            return Vec::new();
        }
        NotificationEvent::status_changed(new).into_iter().collect()
    }

    /// Comments notify the parent issue's reporter.
    pub fn on_comment_inserted(&self, comment: &Comment, parent: &Issue) -> Vec<NotificationEvent> {
        if comment.issue_id != parent.id {
            debug!(comment_id = %comment.id, issue_id = %parent.id, "Comment does not belong to issue");
            return Vec::new();
        }
        if comment.author_id == parent.reporter_id && !self.config.notify_self_comments {
            return Vec::new();
        }
        vec![NotificationEvent::new_comment(comment, parent)]
    }

    /// Dispatch any change. `parent` is the comment's issue and is only
    /// consulted for comment inserts; without it nothing is emitted.
    pub fn dispatch(&self, change: &ChangeEvent, parent: Option<&Issue>) -> Vec<NotificationEvent> {
        match change {
            ChangeEvent::IssueInserted { issue } => self.on_issue_inserted(issue),
            ChangeEvent::IssueUpdated { old, new } => self.on_issue_updated(old, new),
            ChangeEvent::CommentInserted { comment } => parent
                .map(|p| self.on_comment_inserted(comment, p))
                .unwrap_or_default(),
        }
    }
}
