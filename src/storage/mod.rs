pub mod redis_store;
pub mod sqlite;
pub mod trait_def;

pub use redis_store::RedisVisitStore;
pub use sqlite::SqliteVisitStore;
pub use trait_def::{Counter, StorageError, StorageResult, VisitStore};

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::config::{StoreBackend, StoreConfig};

/// Connect to and initialize the configured backend
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn VisitStore>> {
    let store: Arc<dyn VisitStore> = match config.backend {
        StoreBackend::Redis => {
            info!("Using Redis visit store: {}", config.url);
            Arc::new(RedisVisitStore::connect(&config.url).await?)
        }
        StoreBackend::Sqlite => {
            info!("Using SQLite visit store: {}", config.url);
            Arc::new(SqliteVisitStore::new(&config.url, 5).await?)
        }
    };

    store.init().await?;
    Ok(store)
}
