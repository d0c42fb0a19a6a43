//! Application state shared by every handler.

use std::sync::Arc;

use vidlift_core::Config;
use vidlift_storage::{Storage, UrlSigner};
use vidlift_transfer::Coordinator;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub coordinator: Coordinator,
}

impl AppState {
    pub fn new(config: Config, coordinator: Coordinator) -> Arc<Self> {
        Arc::new(AppState {
            config,
            coordinator,
        })
    }

    /// Backend the `/signed` endpoint serves.
    pub fn storage(&self) -> &Arc<dyn Storage> {
        self.coordinator.storage()
    }

    pub fn signer(&self) -> &UrlSigner {
        self.coordinator.signer()
    }
}
