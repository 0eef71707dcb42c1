//! Defines routes for the image store and messaging relay.
//!
//! ## Structure
//! - **Probes**
//!   - `GET  /healthz`, `GET /readyz`
//!
//! - **Images**
//!   - `POST /api/upload` — admission-checked upload (JSON, base64 payload)
//!   - `GET  /api/objects` — most recent uploads (`?limit=N`)
//!   - `GET  /api/objects/{*key}` — download an object
//!
//! - **Messaging**
//!   - `POST /api/send` — relay a stored image to the allow-listed recipient

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        message_handlers::send_message,
        object_handlers::{get_object, list_recent, upload_object},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

/// Build the CORS layer from the configured origin list. `*` allows any.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("ignoring invalid CORS origin `{}`", o);
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(parsed))
}

/// Build the application router with its state and middleware applied.
pub fn routes(state: AppState) -> Router {
    // base64 inflates payloads by 4/3; leave room for the JSON envelope
    let body_limit = state.config.max_upload_bytes / 3 * 4 + 64 * 1024;
    let cors = cors_layer(&state.config.allowed_origins);

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/api/upload", post(upload_object))
        .route("/api/objects", get(list_recent))
        .route("/api/objects/{*key}", get(get_object))
        .route("/api/send", post(send_message))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
