//! In-memory object store.
//!
//! Nothing survives a restart. Used by tests and by the `memory` backend
//! option for throwaway deployments.

use crate::models::object::{ListedObject, ObjectBody, ObjectMetadata, ObjectPage, StoredObject};
use crate::services::object_store::{ObjectStore, StoreError, StoreResult, ensure_key_safe};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Clone, Debug)]
struct Entry {
    bytes: Bytes,
    content_type: Option<String>,
    uploaded_at: DateTime<Utc>,
}

pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, Entry>>,
    page_size: usize,
}

impl MemoryObjectStore {
    pub fn new(page_size: usize) -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            page_size: page_size.max(1),
        }
    }

    /// Insert an object with an explicit upload time.
    pub async fn insert_at(&self, key: &str, bytes: Bytes, uploaded_at: DateTime<Utc>) {
        self.objects.write().await.insert(
            key.to_string(),
            Entry {
                bytes,
                content_type: None,
                uploaded_at,
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    pub async fn total_size(&self) -> u64 {
        self.objects
            .read()
            .await
            .values()
            .map(|e| e.bytes.len() as u64)
            .sum()
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new(100)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list(&self, cursor: Option<&str>) -> StoreResult<ObjectPage> {
        use std::ops::Bound::{Excluded, Unbounded};

        let objects = self.objects.read().await;
        let lower = match cursor {
            Some(c) => Excluded(c.to_string()),
            None => Unbounded,
        };
        let mut page: Vec<ListedObject> = objects
            .range((lower, Unbounded))
            .take(self.page_size + 1)
            .map(|(key, entry)| ListedObject {
                key: key.clone(),
                size: Some(entry.bytes.len() as u64),
                uploaded_at: entry.uploaded_at,
            })
            .collect();

        let next_cursor = if page.len() > self.page_size {
            page.pop();
            page.last().map(|last| last.key.clone())
        } else {
            None
        };

        Ok(ObjectPage {
            objects: page,
            next_cursor,
        })
    }

    async fn get(&self, key: &str) -> StoreResult<Option<ObjectBody>> {
        ensure_key_safe(key)?;
        Ok(self.objects.read().await.get(key).map(|e| ObjectBody {
            content_type: e.content_type.clone(),
            bytes: e.bytes.clone(),
        }))
    }

    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        metadata: ObjectMetadata,
    ) -> StoreResult<StoredObject> {
        ensure_key_safe(key)?;
        let uploaded_at = Utc::now();
        let size = bytes.len() as u64;
        self.objects.write().await.insert(
            key.to_string(),
            Entry {
                bytes,
                content_type: metadata.content_type,
                uploaded_at,
            },
        );
        Ok(StoredObject {
            key: key.to_string(),
            size,
            uploaded_at,
        })
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        ensure_key_safe(key)?;
        match self.objects.write().await.remove(key) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }
}
