//! Object store adapter contract consumed by the quota core and handlers.

use crate::models::object::{ObjectBody, ObjectMetadata, ObjectPage, StoredObject};
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error("invalid listing cursor `{0}`")]
    InvalidCursor(String),
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A key-value blob store with cursor pagination.
///
/// Implementations normalize whatever timestamp representation the backend
/// uses into `DateTime<Utc>` before returning listing entries.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Return one page of objects ordered by key. Pass the previous page's
    /// `next_cursor` to continue; `None` starts from the beginning.
    async fn list(&self, cursor: Option<&str>) -> StoreResult<ObjectPage>;

    /// Fetch a payload, `Ok(None)` when the key is absent.
    async fn get(&self, key: &str) -> StoreResult<Option<ObjectBody>>;

    /// Write (or overwrite) an object.
    async fn put(&self, key: &str, bytes: Bytes, metadata: ObjectMetadata)
    -> StoreResult<StoredObject>;

    /// Delete an object. Deleting an absent key returns `NotFound`.
    async fn delete(&self, key: &str) -> StoreResult<()>;
}

const MAX_OBJECT_KEY_LEN: usize = 1024;

/// Basic key validation to avoid trivial path traversal vectors.
///
/// Rejects empty or oversized keys, keys that begin with `/`, contain `..`,
/// backslashes or control bytes.
pub fn ensure_key_safe(key: &str) -> StoreResult<()> {
    if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
        return Err(StoreError::InvalidObjectKey);
    }
    if key.starts_with('/') || key.contains("..") {
        return Err(StoreError::InvalidObjectKey);
    }
    if key
        .bytes()
        .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
    {
        return Err(StoreError::InvalidObjectKey);
    }
    Ok(())
}
