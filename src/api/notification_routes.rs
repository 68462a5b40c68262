//! Server-sent notification stream.
//!
//! The principal comes only from the `x-user-id` header set by the auth
//! proxy; query parameters are never trusted. Browser `EventSource` clients
//! must go through that proxy. Without a principal the stream carries
//! broadcasts only.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::StreamExt;

use super::auth::MaybeUser;
use super::state::AppState;

pub fn notification_router() -> Router<AppState> {
    Router::new().route("/api/notifications/stream", get(stream))
}

/// GET /api/notifications/stream
async fn stream(
    State(state): State<AppState>,
    user: MaybeUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = match user.0 {
        Some(profile) => {
            tracing::info!(user_id = %profile.id, "Notification stream opened");
            state.hub.subscribe(profile.id)
        }
        None => state.hub.subscribe_anonymous(),
    };

    let events = subscription.into_stream().map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(Event::default().event("notification").data(data))
    });

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
