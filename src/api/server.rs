use std::net::SocketAddr;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::bootstrap;
use crate::config::Config;
use crate::worker;

use super::services;
use super::state::AppState;

/// Largest policy submission body accepted: generous relative to
/// `validation.text_max_length` so a well-formed request is never rejected
/// by the transport layer before reaching field-level validation.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Build the router and the shared application state, wiring the API and
/// worker loops onto the same `Supervisor` and ledger. Returns the router
/// so the binary can choose how to serve it (and so tests can exercise it
/// in-process via `tower::ServiceExt::oneshot`).
pub async fn build(config: Config) -> Result<Router, Box<dyn std::error::Error + Send + Sync>> {
    let components = bootstrap::build(config).await?;
    worker::spawn_workers(components.supervisor.clone(), components.worker_receivers);

    let state = AppState {
        supervisor: components.supervisor,
        events: components.events,
        config: components.config,
        metrics: components.metrics,
    };

    Ok(router(state))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/analyses", post(services::submit))
        .route("/analyses/force-new", post(services::force_new))
        .route("/analyses/{job_id}", get(services::status))
        .route("/analyses/{job_id}/stream", get(services::stream))
        .route("/analyses/{job_id}/cancel", post(services::cancel))
        .route("/health", get(services::health))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(addr: SocketAddr, config: Config) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = build(config).await?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "compliance engine API listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
