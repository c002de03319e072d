//! In-process backend. Nothing survives the process.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::backend::{Backend, StoredRecord};
use crate::error::{StateError, StateResult};

#[derive(Debug, Default)]
pub struct MemoryBackend {
    documents: Mutex<HashMap<String, serde_json::Value>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed `collection` with an arbitrary raw document (any shape).
    pub fn put_raw(&self, collection: &str, document: serde_json::Value) -> StateResult<()> {
        self.documents
            .lock()
            .map_err(|_| StateError::Poisoned(collection.to_string()))?
            .insert(collection.to_string(), document);
        Ok(())
    }
}

impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn read(&self, collection: &str) -> StateResult<Option<serde_json::Value>> {
        let documents = self
            .documents
            .lock()
            .map_err(|_| StateError::Poisoned(collection.to_string()))?;
        Ok(documents.get(collection).cloned())
    }

    fn write(&self, collection: &str, records: &[StoredRecord]) -> StateResult<()> {
        let document =
            serde_json::Value::Array(records.iter().map(|r| r.body.clone()).collect());
        self.put_raw(collection, document)
    }
}
