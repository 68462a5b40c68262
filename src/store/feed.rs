//! Change feed
//!
//! Every committed store write publishes a [`ChangeEvent`]. Consumers attach
//! with [`ChangeFeed::subscribe`], which runs their callback on its own task
//! and hands back a [`SubscriptionHandle`]. Dropping the handle ends the
//! subscription, so a session that goes away cannot leak a listener.
//!
//! Publishing never blocks and never fails. A change with no subscriber, or
//! one a lagging subscriber misses, is gone.

use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::models::{Comment, Issue};

/// Default channel capacity
pub const DEFAULT_FEED_CAPACITY: usize = 256;

/// Table a change happened on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeTable {
    Issues,
    Comments,
}

/// Kind of row change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
}

/// A committed row change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    IssueInserted { issue: Issue },
    IssueUpdated { old: Issue, new: Issue },
    CommentInserted { comment: Comment },
}

impl ChangeEvent {
    pub fn table(&self) -> ChangeTable {
        match self {
            ChangeEvent::IssueInserted { .. } | ChangeEvent::IssueUpdated { .. } => {
                ChangeTable::Issues
            }
            ChangeEvent::CommentInserted { .. } => ChangeTable::Comments,
        }
    }

    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeEvent::IssueInserted { .. } | ChangeEvent::CommentInserted { .. } => {
                ChangeKind::Insert
            }
            ChangeEvent::IssueUpdated { .. } => ChangeKind::Update,
        }
    }
}

/// Which changes a subscriber wants. Empty lists match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeFilter {
    pub tables: Vec<ChangeTable>,
    pub kinds: Vec<ChangeKind>,
}

impl ChangeFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn table(table: ChangeTable, kinds: &[ChangeKind]) -> Self {
        Self {
            tables: vec![table],
            kinds: kinds.to_vec(),
        }
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        (self.tables.is_empty() || self.tables.contains(&event.table()))
            && (self.kinds.is_empty() || self.kinds.contains(&event.kind()))
    }
}

/// Broadcast channel of committed changes. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish a committed change. Never blocks, never fails.
    pub fn publish(&self, event: ChangeEvent) {
        if self.sender.send(event).is_err() {
            debug!("Change published with no subscribers");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Raw receiver, for consumers that drive their own loop.
    pub fn receiver(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    /// Run `callback` for every change matching `filter` until the returned
    /// handle is dropped. Must be called from within a tokio runtime.
    pub fn subscribe<F, Fut>(&self, filter: ChangeFilter, callback: F) -> SubscriptionHandle
    where
        F: Fn(ChangeEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut receiver = self.sender.subscribe();

        let task = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) if filter.matches(&event) => callback(event).await,
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Change subscriber lagged, skipping missed changes");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        SubscriptionHandle { task: Some(task) }
    }
}

/// Live change-feed subscription. Unsubscribes on drop.
#[derive(Debug)]
pub struct SubscriptionHandle {
    task: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop delivery now.
    pub fn unsubscribe(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
