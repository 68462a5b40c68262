//! Notification relay
//!
//! Connects the store's change feed to the [`NotificationHub`]: every
//! committed change runs through the dispatcher and whatever it yields is
//! published. Delivery is advisory, so lookup failures are logged and the
//! change is skipped.

use std::sync::Arc;
use tracing::{error, info, warn};

use super::dispatcher::NotificationDispatcher;
use super::hub::NotificationHub;
use crate::store::{ChangeEvent, ChangeFilter, IssueStore, SubscriptionHandle};

#[derive(Clone)]
pub struct NotificationRelay {
    store: Arc<dyn IssueStore>,
    dispatcher: NotificationDispatcher,
    hub: Arc<NotificationHub>,
}

impl NotificationRelay {
    pub fn new(
        store: Arc<dyn IssueStore>,
        dispatcher: NotificationDispatcher,
        hub: Arc<NotificationHub>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            hub,
        }
    }

    /// Start relaying. Runs until the returned handle is dropped.
    pub fn start(self) -> SubscriptionHandle {
        let feed = self.store.changes();
        info!("Notification relay started");
        feed.subscribe(ChangeFilter::all(), move |change| {
            let relay = self.clone();
            async move {
                relay.handle(change).await;
            }
        })
    }

    /// Dispatch one change and publish the result. Returns how many
    /// notifications were published.
    pub async fn handle(&self, change: ChangeEvent) -> usize {
        let parent = match &change {
            ChangeEvent::CommentInserted { comment } => {
                match self.store.get_issue(comment.issue_id).await {
                    Ok(Some(issue)) => Some(issue),
                    Ok(None) => {
                        warn!(issue_id = %comment.issue_id, comment_id = %comment.id, "Parent issue missing, dropping comment notification");
                        return 0;
                    }
                    Err(e) => {
                        error!(issue_id = %comment.issue_id, error = %e, "Parent issue lookup failed, dropping comment notification");
                        return 0;
                    }
                }
            }
            _ => None,
        };

        let events = self.dispatcher.dispatch(&change, parent.as_ref());
        let count = events.len();
        for event in events {
            self.hub.publish(event);
        }
        count
    }
}
