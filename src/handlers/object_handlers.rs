//! HTTP handlers for image upload, recent listing and download.
//! Quota decisions are delegated to the `AdmissionController`.

use crate::{
    errors::AppError,
    handlers::enforce_rate_limit,
    models::{
        object::{ObjectMetadata, StoredObject},
        quota::AdmissionDecision,
    },
    services::{object_store::ensure_key_safe, upload},
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

const DEFAULT_LIST_LIMIT: usize = 20;
const MAX_LIST_LIMIT: usize = 100;

/// Body of `POST /api/upload`.
#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    #[serde(default)]
    pub filename: String,
    #[serde(default, alias = "contentType")]
    pub content_type: String,
    /// Base64 payload, optionally as a `data:` URL.
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub key: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub url: String,
    /// Keys evicted to make room for this upload.
    pub evicted: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ListedImage {
    pub key: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub objects: Vec<ListedImage>,
    pub degraded: bool,
}

fn object_url(state: &AppState, key: &str) -> String {
    format!(
        "{}/api/objects/{}",
        state.config.public_base_url.trim_end_matches('/'),
        key
    )
}

/// `POST /api/upload`: validate, run admission, then write.
pub async fn upload_object(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UploadRequest>,
) -> Result<impl IntoResponse, AppError> {
    enforce_rate_limit(&state, &headers).await?;

    let validated = upload::validate(
        &req.filename,
        &req.content_type,
        &req.data,
        state.config.max_upload_bytes,
    )?;
    let size = validated.bytes.len() as u64;
    // reject a bad key before admission can evict anything
    let key = validated.key_at(Utc::now());
    ensure_key_safe(&key)?;

    let decision = state.admission.admit(size).await?;
    let evicted = match decision {
        AdmissionDecision::Rejected(full) => return Err(full.into()),
        AdmissionDecision::Accepted => Vec::new(),
        AdmissionDecision::AcceptedAfterCleanup(report) => report.deleted,
    };

    let stored: StoredObject = state
        .store
        .put(
            &key,
            validated.bytes,
            ObjectMetadata {
                content_type: Some(validated.content_type),
                original_filename: Some(req.filename),
            },
        )
        .await?;
    info!(key = %stored.key, size = stored.size, evicted = evicted.len(), "upload stored");

    let body = UploadResponse {
        url: object_url(&state, &stored.key),
        key: stored.key,
        size: stored.size,
        uploaded_at: stored.uploaded_at,
        evicted,
    };
    Ok((StatusCode::CREATED, Json(body)))
}

/// `GET /api/objects?limit=N`: newest first. Never fails on a storage
/// outage; the response is flagged `degraded` instead.
pub async fn list_recent(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Json<ListResponse> {
    let limit = q.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    let recent = state.admission.accountant().recent(limit).await;

    let objects = recent
        .objects
        .into_iter()
        .map(|obj| ListedImage {
            url: object_url(&state, &obj.key),
            key: obj.key,
            size: obj.size,
            uploaded_at: obj.uploaded_at,
        })
        .collect();

    Json(ListResponse {
        objects,
        degraded: recent.degraded,
    })
}

/// `GET /api/objects/{*key}`: raw payload.
pub async fn get_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    let Some(body) = state.store.get(&key).await? else {
        return Err(AppError::not_found(format!("object `{}` not found", key)));
    };

    let content_type = body
        .content_type
        .unwrap_or_else(|| "application/octet-stream".into());
    let length = body.bytes.len();

    let mut response = Response::new(Body::from(body.bytes));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );
    Ok(response)
}
