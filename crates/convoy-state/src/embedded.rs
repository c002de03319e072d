//! Embedded document store backed by redb.
//!
//! Each collection is a redb table named after the collection. Rows are
//! keyed by record id; each value is `(position, body)` where `body` is the
//! JSON-serialized record and `position` its place in insertion order. A
//! write replaces the whole table in a single write transaction.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, TableError};
use tracing::debug;

use crate::backend::{Backend, StoredRecord};
use crate::error::{StateError, StateResult, map_err};

/// `id → (position, JSON body)`.
fn table(collection: &str) -> TableDefinition<'_, &'static str, (u64, &'static [u8])> {
    TableDefinition::new(collection)
}

/// Thread-safe redb backend.
#[derive(Clone)]
pub struct RedbBackend {
    db: Arc<Database>,
}

impl RedbBackend {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        debug!(?path, "redb backend opened");
        Ok(Self { db: Arc::new(db) })
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        debug!("in-memory redb backend opened");
        Ok(Self { db: Arc::new(db) })
    }
}

impl Backend for RedbBackend {
    fn name(&self) -> &'static str {
        "redb"
    }

    fn read(&self, collection: &str) -> StateResult<Option<serde_json::Value>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = match txn.open_table(table(collection)) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(StateError::Table(e.to_string())),
        };
        let mut rows = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let (position, raw) = value.value();
            let body: serde_json::Value =
                serde_json::from_slice(raw).map_err(|e| StateError::Corrupt {
                    collection: collection.to_string(),
                    reason: e.to_string(),
                })?;
            rows.push((position, body));
        }
        rows.sort_by_key(|(position, _)| *position);
        Ok(Some(serde_json::Value::Array(
            rows.into_iter().map(|(_, body)| body).collect(),
        )))
    }

    fn write(&self, collection: &str, records: &[StoredRecord]) -> StateResult<()> {
        let encoded = records
            .iter()
            .map(|r| serde_json::to_vec(&r.body))
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_err!(Serialize))?;

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.delete_table(table(collection)).map_err(map_err!(Table))?;
        {
            let mut rows = txn.open_table(table(collection)).map_err(map_err!(Table))?;
            for (position, (record, value)) in records.iter().zip(&encoded).enumerate() {
                rows.insert(record.id.as_str(), (position as u64, value.as_slice()))
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%collection, records = records.len(), "collection table written");
        Ok(())
    }
}
