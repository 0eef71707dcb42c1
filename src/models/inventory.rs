//! Point-in-time materialization of the store's contents.

use super::object::StoredObject;
use serde::Serialize;

/// A fully drained listing.
///
/// Never persisted; recomputed for every admission decision.
/// `total_size` is the sum of `objects[i].size` and `object_count` is
/// `objects.len()`; `from_objects` is the only constructor that upholds this.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct InventorySnapshot {
    pub total_size: u64,
    pub object_count: u64,
    pub objects: Vec<StoredObject>,
}

impl InventorySnapshot {
    pub fn from_objects(objects: Vec<StoredObject>) -> Self {
        let total_size = objects.iter().map(|o| o.size).sum();
        Self {
            total_size,
            object_count: objects.len() as u64,
            objects,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn totals_match_objects() {
        let objects = vec![
            StoredObject {
                key: "a".into(),
                size: 10,
                uploaded_at: Utc.timestamp_opt(1, 0).unwrap(),
            },
            StoredObject {
                key: "b".into(),
                size: 32,
                uploaded_at: Utc.timestamp_opt(2, 0).unwrap(),
            },
        ];
        let snapshot = InventorySnapshot::from_objects(objects);
        assert_eq!(snapshot.total_size, 42);
        assert_eq!(snapshot.object_count, 2);
        assert!(!snapshot.is_empty());
        assert!(InventorySnapshot::default().is_empty());
    }
}
