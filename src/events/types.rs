//! Notification event types.
//!
//! Notifications are ephemeral: they are built from committed store changes,
//! pushed to whoever is listening and never persisted. Each variant carries
//! the reference and text the presentation layer shows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Comment, Issue, IssueId, IssueStatus, UserId};

/// Who a notification is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "user_id", rename_all = "snake_case")]
pub enum Audience {
    /// Every connected subscriber
    Broadcast,
    /// A single user
    User(UserId),
}

impl Audience {
    pub fn includes(&self, user_id: UserId) -> bool {
        match self {
            Audience::Broadcast => true,
            Audience::User(target) => *target == user_id,
        }
    }
}

/// User-facing notification, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// A citizen reported a new issue
    NewIssue {
        issue_id: IssueId,
        title: String,
        emitted_at: DateTime<Utc>,
    },

    /// An issue's status changed
    StatusChanged {
        issue_id: IssueId,
        title: String,
        status: IssueStatus,
        message: String,
        reporter_id: UserId,
        emitted_at: DateTime<Utc>,
    },

    /// Someone commented on an issue
    NewComment {
        issue_id: IssueId,
        comment_id: Uuid,
        title: String,
        message: String,
        reporter_id: UserId,
        emitted_at: DateTime<Utc>,
    },
}

impl NotificationEvent {
    pub fn new_issue(issue: &Issue) -> Self {
        NotificationEvent::NewIssue {
            issue_id: issue.id,
            title: issue.title.clone(),
            emitted_at: Utc::now(),
        }
    }

    /// `None` when the new status has no message (reverting to `open`).
    pub fn status_changed(issue: &Issue) -> Option<Self> {
        status_change_message(issue.status).map(|message| NotificationEvent::StatusChanged {
            issue_id: issue.id,
            title: issue.title.clone(),
            status: issue.status,
            message: message.to_string(),
            reporter_id: issue.reporter_id,
            emitted_at: Utc::now(),
        })
    }

    pub fn new_comment(comment: &Comment, parent: &Issue) -> Self {
        NotificationEvent::NewComment {
            issue_id: parent.id,
            comment_id: comment.id,
            title: parent.title.clone(),
            message: format!("Someone commented on \"{}\"", parent.title),
            reporter_id: parent.reporter_id,
            emitted_at: Utc::now(),
        }
    }

    pub fn audience(&self) -> Audience {
        match self {
            NotificationEvent::NewIssue { .. } => Audience::Broadcast,
            NotificationEvent::StatusChanged { reporter_id, .. }
            | NotificationEvent::NewComment { reporter_id, .. } => Audience::User(*reporter_id),
        }
    }

    pub fn issue_id(&self) -> IssueId {
        match self {
            NotificationEvent::NewIssue { issue_id, .. }
            | NotificationEvent::StatusChanged { issue_id, .. }
            | NotificationEvent::NewComment { issue_id, .. } => *issue_id,
        }
    }

    /// Heading shown on the toast.
    pub fn headline(&self) -> &str {
        match self {
            NotificationEvent::NewIssue { .. } => "New Issue Reported",
            NotificationEvent::StatusChanged { title, .. } => title,
            NotificationEvent::NewComment { .. } => "New Comment",
        }
    }

    /// Body text shown on the toast.
    pub fn message(&self) -> &str {
        match self {
            NotificationEvent::NewIssue { title, .. } => title,
            NotificationEvent::StatusChanged { message, .. }
            | NotificationEvent::NewComment { message, .. } => message,
        }
    }

    /// Event type as a string (SSE event name, logs)
    pub fn kind_str(&self) -> &'static str {
        match self {
            NotificationEvent::NewIssue { .. } => "new_issue",
            NotificationEvent::StatusChanged { .. } => "status_changed",
            NotificationEvent::NewComment { .. } => "new_comment",
        }
    }
}

/// Message shown to the reporter when their issue enters `status`.
pub fn status_change_message(status: IssueStatus) -> Option<&'static str> {
    match status {
        IssueStatus::InProgress => Some("Issue is now being worked on"),
        IssueStatus::Resolved => Some("Issue has been resolved"),
        IssueStatus::Closed => Some("Issue has been closed"),
        IssueStatus::Open => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, NewIssue, Priority};

    fn issue(status: IssueStatus) -> Issue {
        let mut issue = Issue::from_new(
            NewIssue {
                title: "Broken streetlight".to_string(),
                description: "Dark at night".to_string(),
                category: Category::Safety,
                priority: Priority::Medium,
                location_address: "Elm Rd".to_string(),
                location: None,
                image_url: None,
                reporter_id: Uuid::new_v4(),
            },
            Utc::now(),
        );
        issue.status = status;
        issue
    }

    #[test]
    fn test_status_messages() {
        assert_eq!(
            status_change_message(IssueStatus::InProgress),
            Some("Issue is now being worked on")
        );
        assert_eq!(
            status_change_message(IssueStatus::Resolved),
            Some("Issue has been resolved")
        );
        assert_eq!(
            status_change_message(IssueStatus::Closed),
            Some("Issue has been closed")
        );
        assert_eq!(status_change_message(IssueStatus::Open), None);
    }

    #[test]
    fn test_reopen_has_no_notification() {
        assert!(NotificationEvent::status_changed(&issue(IssueStatus::Open)).is_none());
    }

    #[test]
    fn test_status_change_targets_reporter() {
        let issue = issue(IssueStatus::Resolved);
        let event = NotificationEvent::status_changed(&issue).unwrap();
        assert_eq!(event.audience(), Audience::User(issue.reporter_id));
        assert_eq!(event.headline(), "Broken streetlight");
        assert_eq!(event.message(), "Issue has been resolved");
    }

    #[test]
    fn test_new_issue_is_broadcast() {
        let event = NotificationEvent::new_issue(&issue(IssueStatus::Open));
        assert_eq!(event.audience(), Audience::Broadcast);
        assert!(Audience::Broadcast.includes(Uuid::new_v4()));
    }

    #[test]
    fn test_serializes_with_kind_tag() {
        let event = NotificationEvent::new_issue(&issue(IssueStatus::Open));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "new_issue");
        assert_eq!(json["title"], "Broken streetlight");
    }
}
