use std::sync::Arc;
use tokio::sync::watch;

use crate::config::HubConfig;
use crate::db::store::EventStore;

/// Shared application state, passed to all route handlers via `axum::extract::State`.
pub struct AppState {
    pub config: HubConfig,
    pub store: Arc<dyn EventStore>,
    /// Flips to `true` once the process starts shutting down.
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    pub fn new(
        config: HubConfig,
        store: Arc<dyn EventStore>,
        shutdown: watch::Receiver<bool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            shutdown,
        })
    }
}
