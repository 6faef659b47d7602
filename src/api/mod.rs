//! REST API and WebSocket server for the monitoring hub
//!
//! This module exposes the registry over HTTP for dashboards and
//! registration clients, plus WebSocket support for real-time log
//! streaming.
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware
//! - **Shared handles** into the registry, scheduler and dispatcher
//! - **WebSocket** log fan-out with per-connection subscriptions
//!
//! ## Endpoints
//!
//! - `POST /api/v1/services` - Register a service
//! - `GET /api/v1/services` - List services with metric summaries
//! - `GET /api/v1/services/{id}` - Service detail
//! - `GET /api/v1/services/{id}/metrics` - Metric history
//! - `GET /api/v1/services/{id}/logs` - Log history
//! - `GET /api/v1/services/{id}/loggers` - Logger levels (proxied)
//! - `POST /api/v1/services/{id}/loggers/{logger}` - Set a logger level
//! - `GET|POST|PUT|DELETE /api/v1/services/{id}/properties[/{pid}]` - Property CRUD
//! - `POST /api/v1/services/{id}/actions/{action}` - On-demand collection
//! - `WS /api/v1/stream/logs` - Real-time log streaming

#[cfg(feature = "api")]
pub mod error;
#[cfg(feature = "api")]
pub mod routes;
#[cfg(feature = "api")]
pub mod state;
#[cfg(feature = "api")]
pub mod websocket;

#[cfg(feature = "api")]
pub use error::{ApiError, ApiResult};
#[cfg(feature = "api")]
pub use state::ApiState;

#[cfg(feature = "api")]
use axum::{
    Router,
    routing::{get, post, put},
};
use std::net::SocketAddr;
use tracing::info;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    pub bind_addr: SocketAddr,

    /// Enable CORS for dashboard
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".parse().unwrap(),
            enable_cors: true,
        }
    }
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
#[cfg(feature = "api")]
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    info!("starting API server on {}", config.bind_addr);

    // Build router with all routes
    let mut app = Router::new()
        .route(
            "/api/v1/services",
            get(routes::services::list_services).post(routes::services::register_service),
        )
        .route("/api/v1/services/:id", get(routes::services::get_service))
        .route(
            "/api/v1/services/:id/metrics",
            get(routes::services::get_service_metrics),
        )
        .route(
            "/api/v1/services/:id/logs",
            get(routes::services::get_service_logs),
        )
        .route(
            "/api/v1/services/:id/loggers",
            get(routes::loggers::get_loggers),
        )
        .route(
            "/api/v1/services/:id/loggers/:logger",
            post(routes::loggers::set_logger_level),
        )
        .route(
            "/api/v1/services/:id/properties",
            get(routes::properties::list_properties).post(routes::properties::create_property),
        )
        .route(
            "/api/v1/services/:id/properties/:property_id",
            put(routes::properties::update_property)
                .delete(routes::properties::delete_property),
        )
        .route(
            "/api/v1/services/:id/actions/:action",
            post(routes::actions::run_action),
        )
        .route("/api/v1/stream/logs", get(websocket::websocket_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    // Add CORS if enabled
    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    // Bind and serve
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    // Spawn server in background
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
