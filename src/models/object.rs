//! Represents an object (image blob) held by the bounded store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted blob as seen by the quota core.
///
/// Created on a successful write, never mutated, destroyed only by an
/// explicit delete (eviction).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    /// Unique, opaque key.
    pub key: String,

    /// Payload size in bytes.
    pub size: u64,

    /// Creation time; immutable once set.
    pub uploaded_at: DateTime<Utc>,
}

/// One entry of a paginated listing, as returned by an adapter.
///
/// Some backends do not report a size for every entry; the accountant
/// counts a missing size as zero. The timestamp is already normalized.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ListedObject {
    pub key: String,
    pub size: Option<u64>,
    pub uploaded_at: DateTime<Utc>,
}

impl From<StoredObject> for ListedObject {
    fn from(obj: StoredObject) -> Self {
        Self {
            key: obj.key,
            size: Some(obj.size),
            uploaded_at: obj.uploaded_at,
        }
    }
}

impl From<ListedObject> for StoredObject {
    fn from(entry: ListedObject) -> Self {
        Self {
            key: entry.key,
            size: entry.size.unwrap_or(0),
            uploaded_at: entry.uploaded_at,
        }
    }
}

/// A single page of a listing. `next_cursor == None` ends the listing.
#[derive(Clone, Debug, Default)]
pub struct ObjectPage {
    pub objects: Vec<ListedObject>,
    pub next_cursor: Option<String>,
}

/// Metadata supplied alongside a `put`.
#[derive(Clone, Debug, Default)]
pub struct ObjectMetadata {
    /// MIME type of the payload.
    pub content_type: Option<String>,

    /// Original filename before sanitization.
    pub original_filename: Option<String>,
}

/// A fetched payload with the content type it was stored under.
#[derive(Clone, Debug)]
pub struct ObjectBody {
    pub content_type: Option<String>,
    pub bytes: bytes::Bytes,
}
