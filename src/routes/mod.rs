//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! This module binds the chat websocket and the small HTTP surface under a
//! single Axum router. Identity comes from an external login flow; the relay
//! only sees the `userId` a client presents on connect.

pub mod moderation;
pub mod ws;

use axum::Router;
use axum::http::{HeaderValue, StatusCode};
use axum::routing::get;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::RelayConfig;
use crate::state::AppState;

/// Build the application router.
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/api/ws", get(ws::handle_ws))
        .route("/api/timeouts/{user_id}", get(moderation::timeout_status))
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &RelayConfig) -> CorsLayer {
    let origin = match config.cors_origin.as_deref() {
        None => AllowOrigin::from(Any),
        Some(raw) => match HeaderValue::from_str(raw) {
            Ok(value) => AllowOrigin::exact(value),
            Err(e) => {
                warn!(origin = raw, error = %e, "invalid CORS_ORIGIN; allowing any origin");
                AllowOrigin::from(Any)
            }
        },
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
