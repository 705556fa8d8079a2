//! Storage strategy selection.
//!
//! The catalog and the task store are reached through the repository traits;
//! which implementation backs them is decided once, at startup.

mod memory;
pub mod scan;

pub use memory::MemoryStore;

use std::sync::Arc;

use tracing::info;

use crate::Result;
use crate::config::{AppConfig, StorageKind};
use crate::database::repositories::{
    CatalogRepository, SqlxCatalogRepository, SqlxTaskRepository, TaskRepository,
};
use crate::database::{self, DbPool};

/// The storage backing a running instance.
#[derive(Clone)]
pub struct Store {
    pub kind: StorageKind,
    pub tasks: Arc<dyn TaskRepository>,
    pub catalog: Arc<dyn CatalogRepository>,
}

impl Store {
    /// Open the store selected by `config.storage`.
    pub async fn open(config: &AppConfig) -> Result<Self> {
        match config.storage {
            StorageKind::Database => {
                let pool = database::init_pool(&config.database_url).await?;
                database::run_migrations(&pool).await?;
                Ok(Self::database(pool))
            }
            StorageKind::Memory => Ok(Self::memory(Arc::new(MemoryStore::new()))),
        }
    }

    pub fn database(pool: DbPool) -> Self {
        info!("Using SQLite storage");
        Self {
            kind: StorageKind::Database,
            tasks: Arc::new(SqlxTaskRepository::new(pool.clone())),
            catalog: Arc::new(SqlxCatalogRepository::new(pool)),
        }
    }

    pub fn memory(store: Arc<MemoryStore>) -> Self {
        info!("Using in-memory storage");
        Self {
            kind: StorageKind::Memory,
            tasks: store.clone(),
            catalog: store,
        }
    }
}
