use crate::{
    models::quota::CapacityExceeded,
    services::{
        admission::AdmissionError, messaging::RelayError, object_store::StoreError,
        upload::UploadError,
    },
};
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    /// Extra fields merged into the JSON body.
    pub details: Option<Value>,
    pub retry_after_secs: Option<i64>,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            details: None,
            retry_after_secs: None,
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// The store backend could not be reached. Distinct from a full store.
    pub fn storage_unavailable(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, msg)
    }

    pub fn rate_limited(retry_after_secs: i64) -> Self {
        Self {
            retry_after_secs: Some(retry_after_secs),
            ..Self::new(StatusCode::TOO_MANY_REQUESTS, "too many requests")
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": self.message,
            "status": self.status.as_u16()
        });
        if let (Some(Value::Object(extra)), Some(map)) = (self.details, body.as_object_mut()) {
            map.extend(extra);
        }

        let mut response = (self.status, Json(body)).into_response();
        if let Some(secs) = self.retry_after_secs {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<CapacityExceeded> for AppError {
    fn from(err: CapacityExceeded) -> Self {
        AppError::new(
            StatusCode::INSUFFICIENT_STORAGE,
            "storage is full, try again later",
        )
        .with_details(json!({
            "current": err.current,
            "incoming": err.incoming,
            "limit": err.limit,
        }))
    }
}

impl From<AdmissionError> for AppError {
    fn from(err: AdmissionError) -> Self {
        tracing::error!("admission failed: {}", err);
        AppError::storage_unavailable("storage backend unavailable")
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidObjectKey => AppError::bad_request(err.to_string()),
            StoreError::InvalidCursor(_) => AppError::bad_request(err.to_string()),
            StoreError::NotFound(_) => AppError::not_found(err.to_string()),
            other => {
                tracing::error!("storage error: {}", other);
                AppError::storage_unavailable("storage backend unavailable")
            }
        }
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        let status = match err {
            UploadError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            UploadError::UnsupportedType(_) | UploadError::ExtensionMismatch(_) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            _ => StatusCode::BAD_REQUEST,
        };
        AppError::new(status, err.to_string())
    }
}

impl From<RelayError> for AppError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::NotConfigured => AppError::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
            RelayError::RecipientNotAllowed => AppError::new(StatusCode::FORBIDDEN, err.to_string()),
            RelayError::Provider { .. } | RelayError::Transport(_) => {
                AppError::new(StatusCode::BAD_GATEWAY, err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_and_down_are_distinct() {
        let full: AppError = CapacityExceeded {
            current: 950,
            incoming: 60,
            limit: 1000,
        }
        .into();
        let down: AppError =
            AdmissionError::StorageUnavailable(StoreError::Unavailable("offline".into())).into();
        assert_eq!(full.status, StatusCode::INSUFFICIENT_STORAGE);
        assert_eq!(down.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(full.details.unwrap()["limit"], 1000);
    }

    #[test]
    fn upload_errors_map_to_client_statuses() {
        let too_big: AppError = UploadError::TooLarge { size: 2, limit: 1 }.into();
        assert_eq!(too_big.status, StatusCode::PAYLOAD_TOO_LARGE);
        let bad_type: AppError = UploadError::UnsupportedType("text/html".into()).into();
        assert_eq!(bad_type.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        let encoding: AppError = UploadError::InvalidEncoding.into();
        assert_eq!(encoding.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn rate_limit_sets_retry_after() {
        let response = AppError::rate_limited(12).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "12");
    }
}
