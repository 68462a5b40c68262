//! Civic Issues REST API Server
//!
//! ## Usage
//!
//! ```bash
//! # In-memory store (demo data is lost on exit)
//! cargo run --bin civic_server --features server
//!
//! # PostgreSQL store
//! DATABASE_URL=postgresql://localhost/civic cargo run --bin civic_server --features server
//!
//! curl http://localhost:3000/api/issues?sort=most_voted
//! curl -N http://localhost:3000/api/notifications/stream
//! ```

use anyhow::Context;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use civic_issues::api::{create_router, AppState};
use civic_issues::blob_store::LocalBlobStore;
use civic_issues::config::Config;
use civic_issues::events::{NotificationDispatcher, NotificationHub, NotificationRelay};
use civic_issues::identity::ProfileDirectory;
use civic_issues::services::IssueService;
use civic_issues::store::{IssueStore, MemoryStore, PgIssueStore};
use civic_issues::workflow::StatusMachine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("civic_issues=info,tower_http=debug")),
        )
        .init();

    let config = Config::from_env().context("Invalid configuration")?;
    tracing::info!(policy = %config.status_policy, "Starting civic issues server");

    let (store, profiles): (Arc<dyn IssueStore>, Arc<dyn ProfileDirectory>) =
        match &config.database_url {
            Some(url) => {
                let pg = Arc::new(
                    PgIssueStore::connect(url)
                        .await
                        .context("Failed to connect to database")?,
                );
                pg.migrate().await.context("Failed to prepare schema")?;
                tracing::info!("Using PostgreSQL issue store");
                (pg.clone() as Arc<dyn IssueStore>, pg as Arc<dyn ProfileDirectory>)
            }
            None => {
                let memory = Arc::new(MemoryStore::new());
                tracing::warn!("DATABASE_URL not set, using in-memory issue store");
                (memory.clone() as Arc<dyn IssueStore>, memory as Arc<dyn ProfileDirectory>)
            }
        };

    tokio::fs::create_dir_all(&config.image_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.image_dir.display()))?;
    let blobs = Arc::new(LocalBlobStore::new(
        config.image_dir.clone(),
        config.public_image_base_url.clone(),
    ));

    let service = Arc::new(
        IssueService::new(store.clone(), profiles, blobs)
            .with_status_machine(StatusMachine::new(config.status_policy)),
    );
    let hub = Arc::new(NotificationHub::new(config.notification_buffer));

    // Dropping the handle stops the relay, so keep it for the server's lifetime.
    let _relay = NotificationRelay::new(
        store,
        NotificationDispatcher::new(config.dispatcher),
        hub.clone(),
    )
    .start();

    let app = create_router(AppState::new(service, hub))
        .nest_service("/images", ServeDir::new(&config.image_dir))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
