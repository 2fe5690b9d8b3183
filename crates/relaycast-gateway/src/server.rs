//! HTTP server implementation using Axum.

use axum::{
    Router,
    routing::{get, post},
};
use relaycast_core::config::GatewayConfig;
use relaycast_engine::{DispatchEngine, RecipientSource};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    /// The dispatch engine — owns the ledger, channel senders, and pacer.
    pub engine: Arc<DispatchEngine>,
    /// Optional entity store for id-based recipient selections. Without it
    /// callers must supply entities inline.
    pub source: Option<Arc<dyn RecipientSource>>,
    pub start_time: std::time::Instant,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let shared = Arc::new(state);

    Router::new()
        .route("/health", get(super::routes::health_check))
        .route("/api/v1/campaigns", post(super::routes::create_campaign))
        .route(
            "/api/v1/campaigns/{id}/recipients/dispatch",
            post(super::routes::dispatch_campaign),
        )
        .route("/api/v1/campaigns/{id}/retry", post(super::routes::retry_campaign))
        .route("/api/v1/campaigns/{id}/status", get(super::routes::campaign_status))
        .layer(
            CorsLayer::new()
                .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
                .allow_headers(Any)
                .allow_origin(Any)
                .max_age(std::time::Duration::from_secs(3600)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Start the HTTP server. Resolves only on shutdown.
pub async fn start(
    config: &GatewayConfig,
    engine: Arc<DispatchEngine>,
    source: Option<Arc<dyn RecipientSource>>,
) -> anyhow::Result<()> {
    let app = build_router(AppState {
        engine,
        source,
        start_time: std::time::Instant::now(),
    });

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🌐 Gateway server listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
