//! Service wiring: job store, platform publishers and the queue processor.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use jbsaas_infra::{
    InMemoryPublishStore, PgPublishStore, ProcessorConfig, PublishError, PublishStore, Publishers,
    QueueProcessor, StoreError,
};

use crate::config::{AppConfig, StorageConfig};

pub type SharedStore = Arc<dyn PublishStore>;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("job store unavailable: {0}")]
    Store(#[from] StoreError),
    #[error("failed to build platform clients: {0}")]
    Publishers(#[from] PublishError),
}

/// Everything the handlers need, shared behind an `Arc`.
pub struct AppServices {
    store: SharedStore,
    processor: QueueProcessor<SharedStore>,
}

impl AppServices {
    pub fn new(store: SharedStore, publishers: Publishers, config: ProcessorConfig) -> Self {
        Self {
            processor: QueueProcessor::new(Arc::clone(&store), publishers, config),
            store,
        }
    }

    /// Wire services from configuration, connecting to Postgres when
    /// persistent storage is enabled.
    pub async fn from_config(config: &AppConfig) -> Result<Self, StartupError> {
        let store: SharedStore = match &config.storage {
            StorageConfig::InMemory => {
                info!("using in-memory publish store");
                InMemoryPublishStore::arc()
            }
            StorageConfig::Postgres { database_url } => {
                let store = PgPublishStore::connect(database_url).await?;
                store.apply_schema().await?;
                info!("using postgres publish store");
                Arc::new(store)
            }
        };

        let publishers = Publishers::http(&config.endpoints, config.publish_timeout)?;
        Ok(Self::new(store, publishers, config.processor_config()))
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn processor(&self) -> &QueueProcessor<SharedStore> {
        &self.processor
    }
}
