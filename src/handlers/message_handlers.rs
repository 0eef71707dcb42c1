//! `POST /api/send`: relay a stored image to the allow-listed recipient.

use crate::{errors::AppError, handlers::enforce_rate_limit, state::AppState};
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

const DEFAULT_BODY: &str = "New image";

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub to: String,
    #[serde(alias = "imageUrl")]
    pub image_url: String,
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub id: Option<String>,
    pub status: Option<String>,
}

/// Pull the object key out of a URL this service handed out, i.e.
/// `{public_base_url}/api/objects/{key}`. Any other origin yields `None`.
pub fn key_from_url<'a>(url: &'a str, public_base_url: &str) -> Option<&'a str> {
    let rest = url
        .strip_prefix(public_base_url.trim_end_matches('/'))?
        .strip_prefix("/api/objects/")?;
    let key = rest.split(['?', '#']).next().unwrap_or(rest);
    (!key.is_empty()).then_some(key)
}

pub async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SendRequest>,
) -> Result<impl IntoResponse, AppError> {
    enforce_rate_limit(&state, &headers).await?;
    state.relay.authorize(&req.to)?;

    let key = key_from_url(&req.image_url, &state.config.public_base_url)
        .ok_or_else(|| AppError::bad_request("image_url does not reference a stored object"))?;
    if state.store.get(key).await?.is_none() {
        return Err(AppError::not_found(format!("object `{}` not found", key)));
    }

    let body = req
        .message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(DEFAULT_BODY);
    let sent = state.relay.send(&req.to, &req.image_url, body).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SendResponse {
            id: sent.id,
            status: sent.status,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_key() {
        let base = "https://img.example.com";
        assert_eq!(
            key_from_url("https://img.example.com/api/objects/1700-cat.png", base),
            Some("1700-cat.png")
        );
        assert_eq!(
            key_from_url("https://img.example.com/api/objects/1700-cat.png?download=1", "https://img.example.com/"),
            Some("1700-cat.png")
        );
        assert_eq!(key_from_url("https://img.example.com/api/objects/", base), None);
        assert_eq!(key_from_url("https://img.example.com/other/1700-cat.png", base), None);
    }

    #[test]
    fn refuses_foreign_origins() {
        let base = "https://img.example.com";
        assert_eq!(
            key_from_url("https://evil.example.net/api/objects/1700-cat.png", base),
            None
        );
        assert_eq!(
            key_from_url("https://img.example.com.evil.net/api/objects/1700-cat.png", base),
            None
        );
        assert_eq!(
            key_from_url("http://img.example.com/api/objects/1700-cat.png", base),
            None
        );
    }
}
