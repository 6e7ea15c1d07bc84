pub mod health;
pub mod simulate;
pub mod trace_context;

use axum::Router;
use axum::middleware;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use hopsim_core::{NodeName, PayloadLimits};
use hopsim_executor::Interpreter;

/// Shared application state passed to all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Name reported by the health endpoint and recorded on every span.
    pub node: NodeName,
    /// Runs decoded payloads. Clones share the detached-task tracker.
    pub interpreter: Interpreter,
    /// Acceptance limits for inbound payloads.
    pub limits: PayloadLimits,
}

/// Build the node's router.
///
/// The auxiliary routes answer `GET` only; every other method on them, and
/// every other path, reaches the simulation endpoint.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/v1/health",
            get(health::health).fallback(simulate::execute),
        )
        .route(
            "/api/v1/greet",
            get(health::greet).fallback(simulate::execute),
        )
        .fallback(simulate::execute)
        .with_state(state)
        .layer(middleware::from_fn(trace_context::propagate_trace_context))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
