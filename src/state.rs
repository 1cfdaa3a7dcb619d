//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::db::{self, SqliteBackend};
use crate::devices::BroadcastHub;
use crate::error::Result;
use crate::records::{MemoryBackend, RecordBackend, RecordStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    store: RecordStore,
    hub: BroadcastHub,
}

impl AppState {
    /// Create application state over an already opened backend
    pub fn new(config: Config, backend: Arc<dyn RecordBackend>) -> Self {
        let hub = BroadcastHub::new(config.sync.send_timeout());

        Self {
            inner: Arc::new(AppStateInner {
                store: RecordStore::new(backend),
                hub,
                config,
            }),
        }
    }

    /// Open the backend named by `config.database.url` and build state over it
    pub async fn from_config(config: Config) -> Result<Self> {
        let backend: Arc<dyn RecordBackend> = if config.database.is_memory() {
            tracing::warn!("Using in-memory record storage; data is lost on restart");
            Arc::new(MemoryBackend::new())
        } else {
            let pool = db::create_pool(&config.database.url).await?;
            tracing::info!("Database initialized at {}", config.database.url);
            Arc::new(SqliteBackend::new(pool))
        };

        Ok(Self::new(config, backend))
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the record store
    pub fn store(&self) -> &RecordStore {
        &self.inner.store
    }

    /// Get the broadcast hub
    pub fn hub(&self) -> &BroadcastHub {
        &self.inner.hub
    }
}
