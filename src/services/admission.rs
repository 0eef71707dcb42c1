//! Admission control for writes against the bounded store.
//!
//! Every call takes a fresh snapshot; nothing is cached and nothing is locked
//! between calls. Two concurrent uploads can therefore both see room and both
//! be admitted, overshooting the hard ceiling by at most one object per
//! concurrent upload until the next admission's cleanup pass brings the store
//! back down.

use crate::models::quota::{AdmissionDecision, CapacityExceeded, CleanupReport, QuotaPolicy};
use crate::services::{
    accountant::{AccountingError, CapacityAccountant},
    object_store::{ObjectStore, StoreError},
    planner,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[source] StoreError),
}

impl From<AccountingError> for AdmissionError {
    fn from(err: AccountingError) -> Self {
        match err {
            AccountingError::StorageUnavailable(inner) => AdmissionError::StorageUnavailable(inner),
        }
    }
}

#[derive(Clone)]
pub struct AdmissionController {
    store: Arc<dyn ObjectStore>,
    accountant: CapacityAccountant,
    policy: QuotaPolicy,
}

impl AdmissionController {
    pub fn new(store: Arc<dyn ObjectStore>, policy: QuotaPolicy) -> Self {
        let accountant = CapacityAccountant::new(store.clone(), policy.scan_ceiling());
        Self {
            store,
            accountant,
            policy,
        }
    }

    pub fn accountant(&self) -> &CapacityAccountant {
        &self.accountant
    }

    /// Decide whether an object of `incoming_size` bytes may be written,
    /// evicting the oldest objects first when the soft watermark is crossed.
    ///
    /// A storage failure while taking the snapshot fails closed: the caller
    /// must not write. Delete failures during cleanup do not.
    pub async fn admit(&self, incoming_size: u64) -> Result<AdmissionDecision, AdmissionError> {
        let snapshot = self.accountant.compute_inventory().await?;

        let projected_size = snapshot.total_size.saturating_add(incoming_size);
        let projected_count = snapshot.object_count.saturating_add(1);

        if projected_size > self.policy.hard_size_limit {
            info!(
                current = snapshot.total_size,
                incoming = incoming_size,
                limit = self.policy.hard_size_limit,
                "upload rejected, capacity exceeded"
            );
            return Ok(AdmissionDecision::Rejected(CapacityExceeded {
                current: snapshot.total_size,
                incoming: incoming_size,
                limit: self.policy.hard_size_limit,
            }));
        }

        let over_soft_size = projected_size as f64 > self.policy.soft_size_threshold();
        let over_count = projected_count > self.policy.hard_count_limit;
        if !over_soft_size && !over_count {
            debug!(projected_size, projected_count, "upload admitted");
            return Ok(AdmissionDecision::Accepted);
        }

        let target_size = self.policy.cleanup_target_size();
        let target_count = self.policy.cleanup_target_count();
        let plan = planner::plan(&snapshot, target_size, target_count);
        info!(
            projected_size,
            projected_count,
            target_size,
            target_count,
            planned = plan.keys.len(),
            "soft threshold crossed, running cleanup"
        );
        if !plan.satisfied {
            warn!(
                remaining_size = plan.remaining_size,
                remaining_count = plan.remaining_count,
                "eviction plan cannot reach cleanup targets, proceeding with best effort"
            );
        }

        let mut report = CleanupReport {
            degenerate: !plan.satisfied,
            ..Default::default()
        };
        for key in plan.keys {
            match self.store.delete(&key).await {
                Ok(()) => {
                    debug!("evicted {}", key);
                    report.deleted.push(key);
                }
                Err(err) => {
                    warn!("failed to evict {}: {}; leaving for a later pass", key, err);
                    report.failed.push(key);
                }
            }
        }
        if !report.failed.is_empty() {
            warn!(
                failed = report.failed.len(),
                deleted = report.deleted.len(),
                "cleanup finished with partial delete failures"
            );
        }

        Ok(AdmissionDecision::AcceptedAfterCleanup(report))
    }
}
