//! Notification hub
//!
//! Fan-out of [`NotificationEvent`]s to live sessions. `publish()` never
//! blocks and never fails: with no subscriber the event is counted as
//! dropped and lost. There is no replay for sessions that connect later.

use futures::Stream;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use super::types::NotificationEvent;
use crate::models::UserId;

/// Default number of buffered notifications per subscriber
pub const DEFAULT_HUB_CAPACITY: usize = 256;

pub struct NotificationHub {
    sender: broadcast::Sender<NotificationEvent>,

    published: AtomicU64,
    dropped: AtomicU64,
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(DEFAULT_HUB_CAPACITY)
    }
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Push an event to every live subscriber.
    pub fn publish(&self, event: NotificationEvent) {
        let kind = event.kind_str();
        match self.sender.send(event) {
            Ok(receivers) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                debug!(kind, receivers, "Notification published");
            }
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(kind, "Notification dropped, no subscribers");
            }
        }
    }

    /// Subscribe on behalf of `user_id`: broadcasts plus events targeted at them.
    pub fn subscribe(&self, user_id: UserId) -> NotificationSubscription {
        NotificationSubscription {
            receiver: self.sender.subscribe(),
            viewer: Some(user_id),
        }
    }

    /// Subscribe without an identity: broadcasts only.
    pub fn subscribe_anonymous(&self) -> NotificationSubscription {
        NotificationSubscription {
            receiver: self.sender.subscribe(),
            viewer: None,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            published: self.published.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

fn wanted(viewer: Option<UserId>, event: &NotificationEvent) -> bool {
    match viewer {
        Some(user_id) => event.audience().includes(user_id),
        None => matches!(event.audience(), super::types::Audience::Broadcast),
    }
}

/// A live session's view of the hub. Dropping it unsubscribes.
pub struct NotificationSubscription {
    receiver: broadcast::Receiver<NotificationEvent>,
    viewer: Option<UserId>,
}

impl NotificationSubscription {
    pub fn viewer(&self) -> Option<UserId> {
        self.viewer
    }

    /// Next event for this viewer. `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<NotificationEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if wanted(self.viewer, &event) => return Some(event),
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Notification subscriber lagged, skipping missed events");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Stream of events for this viewer, skipping over lag.
    pub fn into_stream(self) -> impl Stream<Item = NotificationEvent> + Send + 'static {
        let viewer = self.viewer;
        BroadcastStream::new(self.receiver).filter_map(move |item| match item {
            Ok(event) if wanted(viewer, &event) => Some(event),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Notification stream lagged");
                None
            }
        })
    }
}

/// Hub statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Events delivered to at least one subscriber
    pub published: u64,
    /// Events nobody was listening for
    pub dropped: u64,
}

impl HubStats {
    /// Fraction of events lost to an empty hub (0.0 to 1.0).
    pub fn drop_rate(&self) -> f64 {
        let total = self.published + self.dropped;
        if total == 0 {
            0.0
        } else {
            self.dropped as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, Issue, IssueStatus, NewIssue, Priority};
    use chrono::Utc;
    use uuid::Uuid;

    fn issue(reporter: Uuid) -> Issue {
        Issue::from_new(
            NewIssue {
                title: "Water main burst".to_string(),
                description: "Street flooding".to_string(),
                category: Category::Utilities,
                priority: Priority::Urgent,
                location_address: "Canal St".to_string(),
                location: None,
                image_url: None,
                reporter_id: reporter,
            },
            Utc::now(),
        )
    }

    fn status_event(reporter: Uuid) -> NotificationEvent {
        let mut issue = issue(reporter);
        issue.status = IssueStatus::Closed;
        NotificationEvent::status_changed(&issue).unwrap()
    }

    #[test]
    fn test_publish_without_subscribers_counts_drop() {
        let hub = NotificationHub::new(8);
        hub.publish(NotificationEvent::new_issue(&issue(Uuid::new_v4())));
        assert_eq!(hub.stats(), HubStats { published: 0, dropped: 1 });
        assert!((hub.stats().drop_rate() - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_targeted_events_reach_only_their_user() {
        let hub = NotificationHub::new(8);
        let reporter = Uuid::new_v4();
        let mut mine = hub.subscribe(reporter);
        let mut other = hub.subscribe(Uuid::new_v4());

        hub.publish(status_event(reporter));
        hub.publish(NotificationEvent::new_issue(&issue(Uuid::new_v4())));

        assert_eq!(mine.recv().await.unwrap().kind_str(), "status_changed");
        assert_eq!(mine.recv().await.unwrap().kind_str(), "new_issue");
        assert_eq!(other.recv().await.unwrap().kind_str(), "new_issue");
        assert_eq!(hub.stats().published, 2);
    }

    #[tokio::test]
    async fn test_anonymous_stream_sees_broadcasts_only() {
        let hub = NotificationHub::new(8);
        let stream = hub.subscribe_anonymous().into_stream();
        tokio::pin!(stream);

        hub.publish(status_event(Uuid::new_v4()));
        hub.publish(NotificationEvent::new_issue(&issue(Uuid::new_v4())));

        let first = stream.next().await.unwrap();
        assert_eq!(first.kind_str(), "new_issue");
    }

    #[tokio::test]
    async fn test_lagged_subscriber_skips_ahead() {
        let hub = NotificationHub::new(2);
        let mut sub = hub.subscribe_anonymous();
        for _ in 0..5 {
            hub.publish(NotificationEvent::new_issue(&issue(Uuid::new_v4())));
        }
        // Oldest events were overwritten; the newest ones are still delivered.
        assert!(sub.recv().await.is_some());
    }
}
