//! Notification events
//!
//! Store changes become [`NotificationEvent`]s in the [`dispatcher`], the
//! [`relay`] feeds them into the [`hub`], and live sessions subscribe to the
//! hub. Nothing here is persisted; a session that is not connected misses
//! the event.

pub mod dispatcher;
pub mod hub;
pub mod relay;
pub mod types;

pub use dispatcher::{DispatcherConfig, NotificationDispatcher};
pub use hub::{HubStats, NotificationHub, NotificationSubscription, DEFAULT_HUB_CAPACITY};
pub use relay::NotificationRelay;
pub use types::{status_change_message, Audience, NotificationEvent};
