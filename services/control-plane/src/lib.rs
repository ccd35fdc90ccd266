pub mod clients;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod registry;
pub mod retry;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::{SessionDefaults, Settings};
pub use db::SessionStore;
pub use error::{ApiError, OrchestratorError};
pub use observability::{Logger, MetricsCollector};
pub use orchestrator::SessionOrchestrator;
pub use registry::AgentCatalog;

/// Application state shared across handlers
pub struct AppState {
    pub store: Arc<dyn SessionStore>,
    pub agents: Arc<AgentCatalog>,
    pub orchestrator: Arc<SessionOrchestrator>,
    pub metrics: MetricsCollector,
    pub session_defaults: SessionDefaults,
}

/// Build the API router
pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Routes scoped to the calling wallet
    let wallet_routes = Router::new()
        .route("/me", get(handlers::users::get_me).post(handlers::users::register_me))
        .route("/sessions", get(handlers::sessions::list_sessions))
        .route("/sessions/start", post(handlers::sessions::start_session))
        .route(
            "/agents/{id}/session/start",
            post(handlers::sessions::start_agent_session),
        )
        .layer(axum::middleware::from_fn(middleware::wallet_middleware));

    let public_routes = Router::new()
        .route("/health", get(health::health))
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/health/detail", get(health::health_detail))
        .route("/agents", get(handlers::agents::list_agents))
        .route("/agents/{id}", get(handlers::agents::get_agent))
        .route("/sessions/{id}/status", get(handlers::sessions::session_status))
        .route("/sessions/{id}/stop", post(handlers::sessions::stop_session))
        .route(
            "/agents/{id}/session/{session_id}/status",
            get(handlers::sessions::agent_session_status),
        )
        .route(
            "/agents/{id}/session/{session_id}/stop",
            post(handlers::sessions::stop_agent_session),
        );

    Router::new()
        .nest("/api", wallet_routes.merge(public_routes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
