//! Storage backend abstraction.
//!
//! A backend persists whole collections. It knows nothing about record
//! types: it hands back the raw JSON document on read and receives the
//! full, ordered list of encoded records on write.

use std::sync::Arc;

use convoy_core::{BackendKind, StorageConfig};
use tracing::info;

use crate::embedded::RedbBackend;
use crate::error::{StateError, StateResult};
use crate::file::JsonFileBackend;
use crate::memory::MemoryBackend;

/// One encoded record, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: String,
    pub body: serde_json::Value,
}

/// Durable home for record collections.
pub trait Backend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Read the raw document for `collection`. `None` if it was never written.
    fn read(&self, collection: &str) -> StateResult<Option<serde_json::Value>>;

    /// Replace the whole of `collection` with `records`, in order.
    fn write(&self, collection: &str, records: &[StoredRecord]) -> StateResult<()>;
}

/// Open the backend selected by `config`.
pub fn open_backend(config: &StorageConfig) -> StateResult<Arc<dyn Backend>> {
    let backend: Arc<dyn Backend> = match config.backend {
        BackendKind::Memory => Arc::new(MemoryBackend::new()),
        BackendKind::Json => Arc::new(JsonFileBackend::new(&config.data_dir)),
        BackendKind::Redb => {
            std::fs::create_dir_all(&config.data_dir)
                .map_err(|e| StateError::Open(format!("{}: {e}", config.data_dir.display())))?;
            Arc::new(RedbBackend::open(&config.data_dir.join("convoy.redb"))?)
        }
    };
    info!(backend = backend.name(), data_dir = ?config.data_dir, "storage backend opened");
    Ok(backend)
}
