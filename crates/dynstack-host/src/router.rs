//! Axum router construction for the control API.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::control::{self, ControlState};

/// Build the control API router.
///
/// CORS allows any origin so a local dashboard can drive the host.
pub fn build_router(state: ControlState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/session/start", post(control::start))
        .route("/api/session/start-sync", post(control::start_sync))
        .route("/api/session/stop", post(control::stop))
        .route("/api/session/status", get(control::status))
        .route("/api/settings", get(control::list_presets))
        .route("/api/settings/{preset}", get(control::get_preset))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
