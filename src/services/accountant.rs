//! Capacity accounting: drains the paginated listing into a snapshot.

use crate::models::{
    inventory::InventorySnapshot,
    object::{ListedObject, StoredObject},
};
use crate::services::object_store::{ObjectStore, StoreError};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum AccountingError {
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] StoreError),
}

/// Newest-first slice of the store for the listing endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecentObjects {
    pub objects: Vec<StoredObject>,
    /// Set when the store could not be read and the list is empty.
    pub degraded: bool,
}

#[derive(Clone)]
pub struct CapacityAccountant {
    store: Arc<dyn ObjectStore>,
    max_objects: u64,
    max_pages: u64,
}

impl CapacityAccountant {
    /// `max_objects` bounds how many entries a single drain collects, so a
    /// backend that hands out a cyclic cursor cannot stall a request.
    pub fn new(store: Arc<dyn ObjectStore>, max_objects: u64) -> Self {
        let max_objects = max_objects.max(1);
        Self {
            store,
            max_objects,
            // empty pages with a cursor still count against this
            max_pages: max_objects.saturating_add(1),
        }
    }

    pub async fn compute_inventory(&self) -> Result<InventorySnapshot, AccountingError> {
        let mut objects: Vec<StoredObject> = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages: u64 = 0;

        loop {
            let page = self.store.list(cursor.as_deref()).await?;
            pages += 1;
            objects.extend(page.objects.into_iter().map(normalize));

            let Some(next) = page.next_cursor else {
                break;
            };
            if objects.len() as u64 > self.max_objects || pages >= self.max_pages {
                warn!(
                    collected = objects.len(),
                    pages, "listing exceeded scan ceiling, using partial inventory"
                );
                break;
            }
            cursor = Some(next);
        }

        let snapshot = InventorySnapshot::from_objects(objects);
        debug!(
            total_size = snapshot.total_size,
            object_count = snapshot.object_count,
            pages,
            "inventory computed"
        );
        Ok(snapshot)
    }

    /// The `limit` most recently uploaded objects. Read-only use fails open:
    /// a storage error yields an empty, degraded result.
    pub async fn recent(&self, limit: usize) -> RecentObjects {
        match self.compute_inventory().await {
            Ok(snapshot) => {
                let mut objects = snapshot.objects;
                objects.sort_by(|a, b| {
                    b.uploaded_at
                        .cmp(&a.uploaded_at)
                        .then_with(|| b.key.cmp(&a.key))
                });
                objects.truncate(limit);
                RecentObjects {
                    objects,
                    degraded: false,
                }
            }
            Err(err) => {
                warn!("recent listing degraded: {}", err);
                RecentObjects {
                    objects: Vec::new(),
                    degraded: true,
                }
            }
        }
    }
}

fn normalize(entry: ListedObject) -> StoredObject {
    if entry.size.is_none() {
        debug!("object {} reported no size, counting as zero", entry.key);
    }
    StoredObject::from(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::object::{ObjectBody, ObjectMetadata, ObjectPage};
    use crate::services::memory_store::MemoryObjectStore;
    use crate::services::object_store::StoreResult;
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::{TimeZone, Utc};

    fn at(secs: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    /// Serves canned pages; can loop forever or fail on demand.
    struct ScriptedStore {
        pages: Vec<ObjectPage>,
        cyclic: bool,
        fail: bool,
    }

    #[async_trait]
    impl ObjectStore for ScriptedStore {
        async fn list(&self, cursor: Option<&str>) -> StoreResult<ObjectPage> {
            if self.fail {
                return Err(StoreError::Unavailable("connection reset".into()));
            }
            let idx: usize = cursor.map(|c| c.parse().unwrap()).unwrap_or(0);
            let mut page = self.pages[idx].clone();
            if self.cyclic {
                page.next_cursor = Some(((idx + 1) % self.pages.len()).to_string());
            }
            Ok(page)
        }

        async fn get(&self, _key: &str) -> StoreResult<Option<ObjectBody>> {
            Ok(None)
        }

        async fn put(
            &self,
            _key: &str,
            _bytes: Bytes,
            _metadata: ObjectMetadata,
        ) -> StoreResult<StoredObject> {
            Err(StoreError::Unavailable("read only".into()))
        }

        async fn delete(&self, _key: &str) -> StoreResult<()> {
            Ok(())
        }
    }

    fn entry(key: &str, size: Option<u64>, secs: i64) -> ListedObject {
        ListedObject {
            key: key.into(),
            size,
            uploaded_at: at(secs),
        }
    }

    #[tokio::test]
    async fn drains_all_pages() {
        let store = Arc::new(MemoryObjectStore::new(2));
        for (i, size) in [10usize, 20, 30, 40, 50].into_iter().enumerate() {
            store
                .insert_at(&format!("k{i}"), Bytes::from(vec![0u8; size]), at(i as i64))
                .await;
        }
        let accountant = CapacityAccountant::new(store, 1000);
        let snapshot = accountant.compute_inventory().await.unwrap();
        assert_eq!(snapshot.object_count, 5);
        assert_eq!(snapshot.total_size, 150);
    }

    #[tokio::test]
    async fn missing_size_counts_as_zero() {
        let store = Arc::new(ScriptedStore {
            pages: vec![
                ObjectPage {
                    objects: vec![entry("a", Some(5), 1), entry("b", None, 2)],
                    next_cursor: Some("1".into()),
                },
                ObjectPage {
                    objects: vec![entry("c", Some(7), 3)],
                    next_cursor: None,
                },
            ],
            cyclic: false,
            fail: false,
        });
        let snapshot = CapacityAccountant::new(store, 100)
            .compute_inventory()
            .await
            .unwrap();
        assert_eq!(snapshot.object_count, 3);
        assert_eq!(snapshot.total_size, 12);
        assert_eq!(snapshot.objects[1].size, 0);
    }

    #[tokio::test]
    async fn cyclic_cursor_terminates() {
        let store = Arc::new(ScriptedStore {
            pages: vec![
                ObjectPage {
                    objects: vec![entry("a", Some(1), 1)],
                    next_cursor: None,
                },
                ObjectPage {
                    objects: vec![entry("b", Some(1), 2)],
                    next_cursor: None,
                },
            ],
            cyclic: true,
            fail: false,
        });
        let snapshot = CapacityAccountant::new(store, 10)
            .compute_inventory()
            .await
            .unwrap();
        assert!(snapshot.object_count > 10);
        assert!(snapshot.object_count <= 12);
    }

    #[tokio::test]
    async fn empty_pages_with_cursor_terminate() {
        let store = Arc::new(ScriptedStore {
            pages: vec![ObjectPage::default()],
            cyclic: true,
            fail: false,
        });
        let snapshot = CapacityAccountant::new(store, 5)
            .compute_inventory()
            .await
            .unwrap();
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn adapter_failure_is_storage_unavailable() {
        let store = Arc::new(ScriptedStore {
            pages: vec![],
            cyclic: false,
            fail: true,
        });
        let accountant = CapacityAccountant::new(store, 10);
        assert!(matches!(
            accountant.compute_inventory().await,
            Err(AccountingError::StorageUnavailable(_))
        ));

        let recent = accountant.recent(5).await;
        assert!(recent.degraded);
        assert!(recent.objects.is_empty());
    }

    #[tokio::test]
    async fn snapshots_are_stable_without_mutation() {
        let store = Arc::new(MemoryObjectStore::new(3));
        for i in 0..7 {
            store
                .insert_at(&format!("k{i}"), Bytes::from_static(b"abc"), at(i))
                .await;
        }
        let accountant = CapacityAccountant::new(store, 100);
        let first = accountant.compute_inventory().await.unwrap();
        let second = accountant.compute_inventory().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn recent_is_newest_first() {
        let store = Arc::new(MemoryObjectStore::new(2));
        store.insert_at("old", Bytes::from_static(b"a"), at(1)).await;
        store.insert_at("mid", Bytes::from_static(b"a"), at(2)).await;
        store.insert_at("new", Bytes::from_static(b"a"), at(3)).await;

        let recent = CapacityAccountant::new(store, 100).recent(2).await;
        assert!(!recent.degraded);
        let keys: Vec<_> = recent.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["new", "mid"]);
    }
}
