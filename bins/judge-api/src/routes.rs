use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::handlers;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(handlers::root))
        .route("/status", get(handlers::health_check))
        .route("/problems", get(handlers::list_problems))
        .route("/problems/:problem_id", get(handlers::get_problem))
        .route("/run", post(handlers::run_public))
        .route("/submit", post(handlers::submit_all))
        .route("/result/:submission_id", get(handlers::get_result))
}

/// CORS restricted to the configured browser origins
pub fn cors(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn app(state: Arc<AppState>, allowed_origins: &[String]) -> Router {
    routes()
        .layer(TraceLayer::new_for_http())
        .layer(cors(allowed_origins))
        .with_state(state)
}
