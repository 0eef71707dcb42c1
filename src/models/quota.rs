//! Quota configuration and the values produced by admission checks.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Process-wide quota limits, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuotaPolicy {
    /// Absolute size ceiling in bytes. Writes that would exceed it are refused.
    pub hard_size_limit: u64,

    /// Object count above which cleanup is forced. Count has no hard
    /// rejection of its own.
    pub hard_count_limit: u64,

    /// Fraction of `hard_size_limit` above which proactive eviction starts.
    pub soft_size_threshold_fraction: f64,

    /// Fraction of `hard_count_limit` reported as the soft count watermark.
    pub soft_count_threshold_fraction: f64,

    /// Fraction of the soft watermark (size) and of the hard count that a
    /// cleanup pass shrinks the store down to.
    pub cleanup_target_fraction: f64,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            hard_size_limit: 500 * 1024 * 1024, // 500 MiB
            hard_count_limit: 1000,
            soft_size_threshold_fraction: 0.85,
            soft_count_threshold_fraction: 0.85,
            cleanup_target_fraction: 0.8,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum QuotaPolicyError {
    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),
    #[error("{name} must be within (0, 1], got {value}")]
    FractionOutOfRange { name: &'static str, value: f64 },
}

impl QuotaPolicy {
    /// Reject limits and fractions that would make the arithmetic meaningless.
    pub fn validate(&self) -> Result<(), QuotaPolicyError> {
        if self.hard_size_limit == 0 {
            return Err(QuotaPolicyError::ZeroLimit("hard_size_limit"));
        }
        if self.hard_count_limit == 0 {
            return Err(QuotaPolicyError::ZeroLimit("hard_count_limit"));
        }
        for (name, value) in [
            (
                "soft_size_threshold_fraction",
                self.soft_size_threshold_fraction,
            ),
            (
                "soft_count_threshold_fraction",
                self.soft_count_threshold_fraction,
            ),
            ("cleanup_target_fraction", self.cleanup_target_fraction),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(QuotaPolicyError::FractionOutOfRange { name, value });
            }
        }
        Ok(())
    }

    /// Size watermark that triggers eviction, in (fractional) bytes.
    pub fn soft_size_threshold(&self) -> f64 {
        self.hard_size_limit as f64 * self.soft_size_threshold_fraction
    }

    /// Count watermark, for reporting.
    pub fn soft_count_threshold(&self) -> u64 {
        (self.hard_count_limit as f64 * self.soft_count_threshold_fraction).floor() as u64
    }

    /// Size a cleanup pass shrinks the store to.
    pub fn cleanup_target_size(&self) -> u64 {
        (self.soft_size_threshold() * self.cleanup_target_fraction).floor() as u64
    }

    /// Count a cleanup pass shrinks the store to.
    pub fn cleanup_target_count(&self) -> u64 {
        (self.hard_count_limit as f64 * self.cleanup_target_fraction).floor() as u64
    }

    /// Upper bound on listed objects before the accountant stops draining.
    pub fn scan_ceiling(&self) -> u64 {
        self.hard_count_limit.saturating_mul(10).max(1000)
    }
}

/// Keys selected for deletion, oldest first, and the projected outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvictionPlan {
    pub keys: Vec<String>,
    pub remaining_size: u64,
    pub remaining_count: u64,
    /// False when even evicting everything leaves a target unmet.
    pub satisfied: bool,
}

impl EvictionPlan {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Business rejection: the write would breach the hard size ceiling.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[error("capacity exceeded: current={current} incoming={incoming} limit={limit}")]
pub struct CapacityExceeded {
    pub current: u64,
    pub incoming: u64,
    pub limit: u64,
}

/// What a cleanup pass actually did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Keys removed from the store.
    pub deleted: Vec<String>,
    /// Planned keys whose delete failed; left for a later pass.
    pub failed: Vec<String>,
    /// The plan could not reach both targets.
    pub degenerate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionDecision {
    Accepted,
    Rejected(CapacityExceeded),
    AcceptedAfterCleanup(CleanupReport),
}

impl AdmissionDecision {
    /// Whether the caller may go on to write the object.
    pub fn permits_write(&self) -> bool {
        !matches!(self, AdmissionDecision::Rejected(_))
    }

    /// Keys evicted to make room, empty unless cleanup ran.
    pub fn evicted_keys(&self) -> &[String] {
        match self {
            AdmissionDecision::AcceptedAfterCleanup(report) => &report.deleted,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> QuotaPolicy {
        QuotaPolicy {
            hard_size_limit: 1000,
            hard_count_limit: 10,
            soft_size_threshold_fraction: 0.5,
            soft_count_threshold_fraction: 0.5,
            cleanup_target_fraction: 0.5,
        }
    }

    #[test]
    fn derived_targets() {
        let p = policy();
        assert_eq!(p.soft_size_threshold(), 500.0);
        assert_eq!(p.soft_count_threshold(), 5);
        assert_eq!(p.cleanup_target_size(), 250);
        assert_eq!(p.cleanup_target_count(), 5);
        assert_eq!(p.scan_ceiling(), 1000);
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(policy().validate().is_ok());
        assert!(QuotaPolicy::default().validate().is_ok());

        let zero = QuotaPolicy {
            hard_size_limit: 0,
            ..policy()
        };
        assert_eq!(
            zero.validate(),
            Err(QuotaPolicyError::ZeroLimit("hard_size_limit"))
        );

        let fraction = QuotaPolicy {
            cleanup_target_fraction: 1.5,
            ..policy()
        };
        assert!(matches!(
            fraction.validate(),
            Err(QuotaPolicyError::FractionOutOfRange {
                name: "cleanup_target_fraction",
                ..
            })
        ));

        let nan = QuotaPolicy {
            soft_size_threshold_fraction: f64::NAN,
            ..policy()
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn decision_helpers() {
        let rejected = AdmissionDecision::Rejected(CapacityExceeded {
            current: 1,
            incoming: 2,
            limit: 2,
        });
        assert!(!rejected.permits_write());
        assert!(rejected.evicted_keys().is_empty());

        let cleaned = AdmissionDecision::AcceptedAfterCleanup(CleanupReport {
            deleted: vec!["a".into()],
            ..Default::default()
        });
        assert!(cleaned.permits_write());
        assert_eq!(cleaned.evicted_keys(), ["a".to_string()]);
        assert!(AdmissionDecision::Accepted.permits_write());
    }
}
