//! Per-client fixed-window rate limiting.
//!
//! State lives behind `RateLimitStore` so a shared cache can replace the
//! in-process map when several instances serve the same clients.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Counter for one client within the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    pub count: u32,
    pub window_reset: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitOutcome {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until the window resets.
    pub retry_after_secs: i64,
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Record one request from `client_id` at `now` and report whether it fits
    /// in the client's window.
    async fn hit(&self, client_id: &str, now: DateTime<Utc>) -> RateLimitOutcome;
}

/// Expired windows are swept at least this often, counted in hits.
const SWEEP_EVERY_HITS: u32 = 256;

struct Windows {
    clients: HashMap<String, WindowState>,
    hits_since_sweep: u32,
    last_sweep: Option<DateTime<Utc>>,
}

impl Windows {
    /// Drop windows that have already reset.
    fn sweep(&mut self, now: DateTime<Utc>) {
        self.clients.retain(|_, state| state.window_reset > now);
        self.hits_since_sweep = 0;
        self.last_sweep = Some(now);
    }
}

pub struct InMemoryRateLimitStore {
    limit: u32,
    window: Duration,
    windows: Mutex<Windows>,
}

impl InMemoryRateLimitStore {
    pub fn new(limit: u32, window: std::time::Duration) -> Self {
        Self {
            limit: limit.max(1),
            window: Duration::from_std(window).unwrap_or_else(|_| Duration::seconds(60)),
            windows: Mutex::new(Windows {
                clients: HashMap::new(),
                hits_since_sweep: 0,
                last_sweep: None,
            }),
        }
    }

    /// Number of clients currently holding a window.
    pub async fn tracked_clients(&self) -> usize {
        self.windows.lock().await.clients.len()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn hit(&self, client_id: &str, now: DateTime<Utc>) -> RateLimitOutcome {
        let mut windows = self.windows.lock().await;

        // a full window since the last sweep means every entry older than
        // that sweep has expired
        windows.hits_since_sweep += 1;
        let window_elapsed = windows
            .last_sweep
            .is_none_or(|last| now - last >= self.window);
        if window_elapsed || windows.hits_since_sweep >= SWEEP_EVERY_HITS {
            windows.sweep(now);
        }

        let state = windows
            .clients
            .entry(client_id.to_string())
            .or_insert(WindowState {
                count: 0,
                window_reset: now + self.window,
            });
        if state.window_reset <= now {
            *state = WindowState {
                count: 0,
                window_reset: now + self.window,
            };
        }

        let allowed = state.count < self.limit;
        if allowed {
            state.count += 1;
        }
        RateLimitOutcome {
            allowed,
            limit: self.limit,
            remaining: self.limit - state.count,
            retry_after_secs: (state.window_reset - now).num_seconds().max(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blocks_after_limit_and_resets() {
        let store = InMemoryRateLimitStore::new(2, std::time::Duration::from_secs(60));
        let t0 = Utc::now();

        assert!(store.hit("1.2.3.4", t0).await.allowed);
        let second = store.hit("1.2.3.4", t0).await;
        assert!(second.allowed);
        assert_eq!(second.remaining, 0);

        let blocked = store.hit("1.2.3.4", t0 + Duration::seconds(10)).await;
        assert!(!blocked.allowed);
        assert_eq!(blocked.retry_after_secs, 50);

        assert!(store.hit("1.2.3.4", t0 + Duration::seconds(61)).await.allowed);
    }

    #[tokio::test]
    async fn expired_windows_are_reclaimed() {
        let store = InMemoryRateLimitStore::new(5, std::time::Duration::from_secs(60));
        let t0 = Utc::now();
        for i in 0..10_000 {
            assert!(store.hit(&format!("10.0.{}.{}", i / 256, i % 256), t0).await.allowed);
        }
        assert_eq!(store.tracked_clients().await, 10_000);

        let later = t0 + Duration::hours(1);
        for i in 0..10 {
            assert!(store.hit(&format!("192.0.2.{i}"), later).await.allowed);
        }
        assert_eq!(store.tracked_clients().await, 10);
    }

    #[tokio::test]
    async fn sweep_keeps_live_windows() {
        let store = InMemoryRateLimitStore::new(1, std::time::Duration::from_secs(60));
        let t0 = Utc::now();
        assert!(store.hit("steady", t0).await.allowed);
        for i in 0..SWEEP_EVERY_HITS {
            store.hit(&format!("c{i}"), t0 + Duration::seconds(1)).await;
        }
        // still inside its window, so the count survived the sweep
        assert!(!store.hit("steady", t0 + Duration::seconds(2)).await.allowed);
    }

    #[tokio::test]
    async fn clients_are_independent() {
        let store = InMemoryRateLimitStore::new(1, std::time::Duration::from_secs(60));
        let now = Utc::now();
        assert!(store.hit("a", now).await.allowed);
        assert!(!store.hit("a", now).await.allowed);
        assert!(store.hit("b", now).await.allowed);
    }
}
