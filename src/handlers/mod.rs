pub mod health_handlers;
pub mod message_handlers;
pub mod object_handlers;

use crate::{errors::AppError, state::AppState};
use axum::http::HeaderMap;
use chrono::Utc;
use tracing::debug;

/// Best-effort client identifier from edge proxy headers.
pub fn client_id(headers: &HeaderMap) -> String {
    for name in ["cf-connecting-ip", "x-real-ip", "x-forwarded-for"] {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            if let Some(first) = value.split(',').map(str::trim).find(|s| !s.is_empty()) {
                return first.to_string();
            }
        }
    }
    "anonymous".to_string()
}

/// Count this request against the caller's window, or refuse it.
pub async fn enforce_rate_limit(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let client = client_id(headers);
    let outcome = state.rate_limiter.hit(&client, Utc::now()).await;
    if outcome.allowed {
        Ok(())
    } else {
        debug!(client = %client, "rate limited");
        Err(AppError::rate_limited(outcome.retry_after_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn client_id_prefers_edge_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_id(&headers), "anonymous");

        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1, 10.0.0.2"));
        assert_eq!(client_id(&headers), "10.0.0.1");

        headers.insert("cf-connecting-ip", HeaderValue::from_static("203.0.113.7"));
        assert_eq!(client_id(&headers), "203.0.113.7");
    }
}
