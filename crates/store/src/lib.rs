//! Storage implementations for hnrag.

pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::sync::Arc;

use hnrag_config::StorageConfig;
use hnrag_core::error::StoreError;
use hnrag_core::store::{ConversationStore, IngestLedger};

pub use in_memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Handles onto one storage backend.
#[derive(Clone)]
pub struct Stores {
    pub conversations: Arc<dyn ConversationStore>,
    pub ledger: Arc<dyn IngestLedger>,
}

impl Stores {
    fn shared<S>(store: S) -> Self
    where
        S: ConversationStore + IngestLedger + 'static,
    {
        let store = Arc::new(store);
        Self {
            conversations: store.clone(),
            ledger: store,
        }
    }

    pub fn in_memory() -> Self {
        Self::shared(InMemoryStore::new())
    }
}

/// Open the backend named in `[storage]`.
pub async fn open(config: &StorageConfig) -> Result<Stores, StoreError> {
    match config.backend.as_str() {
        "memory" => Ok(Stores::in_memory()),
        #[cfg(feature = "sqlite")]
        "sqlite" => Ok(Stores::shared(SqliteStore::new(&config.path).await?)),
        other => Err(StoreError::Storage(format!(
            "Unknown storage backend '{other}'"
        ))),
    }
}
