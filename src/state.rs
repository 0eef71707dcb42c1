//! Shared state handed to every handler.

use crate::{
    config::AppConfig,
    services::{
        admission::AdmissionController,
        messaging::MessagingRelay,
        object_store::ObjectStore,
        rate_limit::{InMemoryRateLimitStore, RateLimitStore},
    },
};
use std::{sync::Arc, time::Duration};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    pub admission: AdmissionController,
    pub rate_limiter: Arc<dyn RateLimitStore>,
    pub relay: MessagingRelay,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Wire the default collaborators around `store`.
    pub fn new(config: AppConfig, store: Arc<dyn ObjectStore>) -> Self {
        let rate_limiter = Arc::new(InMemoryRateLimitStore::new(
            config.rate_limit_requests,
            Duration::from_secs(config.rate_limit_window_secs),
        ));
        Self::with_rate_limiter(config, store, rate_limiter)
    }

    pub fn with_rate_limiter(
        config: AppConfig,
        store: Arc<dyn ObjectStore>,
        rate_limiter: Arc<dyn RateLimitStore>,
    ) -> Self {
        Self {
            admission: AdmissionController::new(store.clone(), config.quota),
            relay: MessagingRelay::new(config.messaging.clone()),
            store,
            rate_limiter,
            config: Arc::new(config),
        }
    }
}
