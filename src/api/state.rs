//! Shared handler state.

use std::sync::Arc;

use crate::events::NotificationHub;
use crate::services::IssueService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<IssueService>,
    pub hub: Arc<NotificationHub>,
}

impl AppState {
    pub fn new(service: Arc<IssueService>, hub: Arc<NotificationHub>) -> Self {
        Self { service, hub }
    }
}
