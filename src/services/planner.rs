//! Oldest-first eviction planning over an inventory snapshot.

use crate::models::{inventory::InventorySnapshot, object::StoredObject, quota::EvictionPlan};

/// Select the shortest oldest-first prefix whose removal brings the store to
/// `size <= target_size` and `count <= target_count`.
///
/// Objects are ordered by `uploaded_at`, ties by `key`. When even removing
/// everything leaves a target unmet the plan contains every object and
/// `satisfied` is false. The snapshot may already be stale; the plan is only
/// as fresh as the listing it was built from.
pub fn plan(snapshot: &InventorySnapshot, target_size: u64, target_count: u64) -> EvictionPlan {
    let mut ordered: Vec<&StoredObject> = snapshot.objects.iter().collect();
    ordered.sort_by(|a, b| {
        a.uploaded_at
            .cmp(&b.uploaded_at)
            .then_with(|| a.key.cmp(&b.key))
    });

    let mut remaining_size = snapshot.total_size;
    let mut remaining_count = snapshot.object_count;
    let within = |size: u64, count: u64| size <= target_size && count <= target_count;

    let mut keys = Vec::new();
    for obj in ordered {
        if within(remaining_size, remaining_count) {
            break;
        }
        keys.push(obj.key.clone());
        remaining_size = remaining_size.saturating_sub(obj.size);
        remaining_count = remaining_count.saturating_sub(1);
    }

    EvictionPlan {
        keys,
        remaining_size,
        remaining_count,
        satisfied: within(remaining_size, remaining_count),
    }
}
