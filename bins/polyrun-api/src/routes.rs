// Route table for the Polyrun API

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::AppState;

/// Smallest request body the server will accept regardless of the source cap.
const MIN_BODY_LIMIT: usize = 2 * 1024 * 1024;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/execute/code", post(handlers::execute_code))
        .route("/languages", get(handlers::list_languages))
        .route("/status", get(handlers::health_check))
        .route("/metrics", get(handlers::export_metrics))
}

/// Full application with state and middleware applied.
///
/// The body limit leaves room for JSON escaping on top of `max_source_bytes`;
/// the exact source size check happens in the service.
pub fn app(state: Arc<AppState>, max_source_bytes: usize) -> Router {
    let body_limit = max_source_bytes.saturating_mul(2).max(MIN_BODY_LIMIT);

    Router::new()
        .merge(routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
