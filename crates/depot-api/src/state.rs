//! Shared application state.

use std::sync::Arc;

use depot_core::ObjectStore;

use crate::config::AppConfig;

/// State handed to every handler. Read-only after startup; cheap to clone.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: ObjectStore,
}

impl AppState {
    /// Open the object store described by `config`, creating its root
    /// directory if needed.
    pub fn new(config: AppConfig) -> std::io::Result<Self> {
        let store = ObjectStore::open(config.store.clone())?;
        Ok(Self {
            config: Arc::new(config),
            store,
        })
    }
}
