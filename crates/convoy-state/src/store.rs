//! RecordStore — one keyed collection, loaded whole and persisted whole.
//!
//! The collection lives in memory in insertion order behind a single mutex,
//! so every operation on a collection is serialized. Mutations follow a
//! copy → persist → commit discipline: the change is applied to a copy, the
//! copy is written through the backend, and memory is only replaced once the
//! write succeeded. A failed write therefore leaves memory equal to what the
//! backend last accepted.

use std::sync::{Arc, Mutex, MutexGuard};

use convoy_core::{LoadPolicy, new_id};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::backend::{Backend, StoredRecord};
use crate::error::{StateError, StateResult};

/// A persisted entity with a stable string id.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection the record type lives in.
    const COLLECTION: &'static str;

    fn id(&self) -> &str;
}

/// Outcome of a [`RecordStore::transact`] closure.
#[derive(Debug)]
pub enum Change<R> {
    /// Persist the modified collection and return the value.
    Commit(R),
    /// Drop the modified copy; nothing is written.
    Discard(R),
}

/// Generate an id not used by any record in `records`.
pub fn fresh_id<T: Record>(records: &[T]) -> String {
    loop {
        let id = new_id();
        if !records.iter().any(|r| r.id() == id) {
            return id;
        }
    }
}

pub struct RecordStore<T: Record> {
    backend: Arc<dyn Backend>,
    policy: LoadPolicy,
    records: Mutex<Vec<T>>,
}

impl<T: Record> RecordStore<T> {
    /// Create a store over `backend` and load the collection.
    pub fn open(backend: Arc<dyn Backend>, policy: LoadPolicy) -> StateResult<Self> {
        let store = Self::empty(backend, policy);
        store.reload()?;
        Ok(store)
    }

    /// Create a store over `backend` without reading it. The first write
    /// replaces whatever the backend holds for the collection.
    pub fn empty(backend: Arc<dyn Backend>, policy: LoadPolicy) -> Self {
        Self {
            backend,
            policy,
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn collection(&self) -> &'static str {
        T::COLLECTION
    }

    /// Re-read the collection from the backend, replacing the in-memory copy.
    /// Returns the number of records loaded.
    pub fn reload(&self) -> StateResult<usize> {
        let loaded = self.load()?;
        let count = loaded.len();
        *self.lock()? = loaded;
        debug!(collection = T::COLLECTION, count, "collection loaded");
        Ok(count)
    }

    /// Read and decode the backing document without touching memory.
    pub fn load(&self) -> StateResult<Vec<T>> {
        let result = self
            .backend
            .read(T::COLLECTION)
            .and_then(|doc| doc.map(decode_document::<T>).transpose());
        match (result, self.policy) {
            (Ok(records), _) => Ok(records.unwrap_or_default()),
            (Err(e), LoadPolicy::Lenient) => {
                warn!(
                    collection = T::COLLECTION,
                    error = %e,
                    "collection unreadable, starting empty"
                );
                Ok(Vec::new())
            }
            (Err(e), LoadPolicy::Strict) => Err(e),
        }
    }

    /// Persist the in-memory collection as it stands.
    pub fn save(&self) -> StateResult<()> {
        let records = self.lock()?;
        self.persist(records.iter())
    }

    pub fn get(&self, id: &str) -> StateResult<Option<T>> {
        Ok(self.lock()?.iter().find(|r| r.id() == id).cloned())
    }

    /// All records in insertion order.
    pub fn all(&self) -> StateResult<Vec<T>> {
        Ok(self.lock()?.clone())
    }

    pub fn len(&self) -> StateResult<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> StateResult<bool> {
        Ok(self.lock()?.is_empty())
    }

    /// First record matching `pred`, in insertion order.
    pub fn find(&self, pred: impl Fn(&T) -> bool) -> StateResult<Option<T>> {
        Ok(self.lock()?.iter().find(|r| pred(r)).cloned())
    }

    /// All records matching `pred`, in insertion order.
    pub fn filter(&self, pred: impl Fn(&T) -> bool) -> StateResult<Vec<T>> {
        Ok(self.lock()?.iter().filter(|r| pred(r)).cloned().collect())
    }

    /// Insert a new record built from a freshly generated unique id.
    pub fn insert_new(&self, build: impl FnOnce(String) -> T) -> StateResult<T> {
        let mut records = self.lock()?;
        let record = build(fresh_id(&records));
        self.persist(records.iter().chain(std::iter::once(&record)))?;
        records.push(record.clone());
        debug!(collection = T::COLLECTION, id = record.id(), "record inserted");
        Ok(record)
    }

    /// Insert `record`, replacing any record with the same id in place.
    pub fn set(&self, record: T) -> StateResult<()> {
        let mut records = self.lock()?;
        match records.iter().position(|r| r.id() == record.id()) {
            Some(idx) => {
                self.persist(replaced(&records, idx, &record))?;
                records[idx] = record;
            }
            None => {
                self.persist(records.iter().chain(std::iter::once(&record)))?;
                records.push(record);
            }
        }
        Ok(())
    }

    /// Remove the record with `id`. Returns false (and writes nothing) if
    /// there was no such record.
    pub fn delete(&self, id: &str) -> StateResult<bool> {
        let mut records = self.lock()?;
        let Some(idx) = records.iter().position(|r| r.id() == id) else {
            return Ok(false);
        };
        self.persist(
            records
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != idx)
                .map(|(_, r)| r),
        )?;
        records.remove(idx);
        debug!(collection = T::COLLECTION, %id, "record deleted");
        Ok(true)
    }

    /// Apply `f` to a copy of the record with `id`, persist, then commit.
    /// Returns `None` if there is no such record.
    pub fn update<R>(&self, id: &str, f: impl FnOnce(&mut T) -> R) -> StateResult<Option<R>> {
        let mut records = self.lock()?;
        let Some(idx) = records.iter().position(|r| r.id() == id) else {
            return Ok(None);
        };
        let mut record = records[idx].clone();
        let out = f(&mut record);
        self.persist(replaced(&records, idx, &record))?;
        records[idx] = record;
        Ok(Some(out))
    }

    /// Run `f` against a copy of the whole collection. On
    /// [`Change::Commit`] the copy is persisted and becomes the collection;
    /// on [`Change::Discard`] it is dropped.
    pub fn transact<R>(&self, f: impl FnOnce(&mut Vec<T>) -> Change<R>) -> StateResult<R> {
        let mut records = self.lock()?;
        let mut next = records.clone();
        match f(&mut next) {
            Change::Commit(out) => {
                self.persist(next.iter())?;
                *records = next;
                Ok(out)
            }
            Change::Discard(out) => Ok(out),
        }
    }

    fn lock(&self) -> StateResult<MutexGuard<'_, Vec<T>>> {
        self.records
            .lock()
            .map_err(|_| StateError::Poisoned(T::COLLECTION.to_string()))
    }

    fn persist<'a>(&self, records: impl Iterator<Item = &'a T>) -> StateResult<()> {
        let encoded = records
            .map(|r| {
                serde_json::to_value(r)
                    .map(|body| StoredRecord {
                        id: r.id().to_string(),
                        body,
                    })
                    .map_err(|e| StateError::Serialize(e.to_string()))
            })
            .collect::<StateResult<Vec<_>>>()?;
        self.backend.write(T::COLLECTION, &encoded)?;
        debug!(
            collection = T::COLLECTION,
            backend = self.backend.name(),
            records = encoded.len(),
            "collection persisted"
        );
        Ok(())
    }
}

fn replaced<'a, T>(records: &'a [T], idx: usize, record: &'a T) -> impl Iterator<Item = &'a T> {
    records
        .iter()
        .enumerate()
        .map(move |(i, r)| if i == idx { record } else { r })
}

/// Decode a raw document of either shape into records.
///
/// - array: each element is a record carrying its own `id`;
/// - object: keyed by id; an entry without an `id` field takes its key.
///
/// A later duplicate id replaces the earlier record in place.
fn decode_document<T: Record>(document: serde_json::Value) -> StateResult<Vec<T>> {
    let corrupt = |reason: String| StateError::Corrupt {
        collection: T::COLLECTION.to_string(),
        reason,
    };

    let bodies: Vec<serde_json::Value> = match document {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(entries) => entries
            .into_iter()
            .map(|(key, mut body)| {
                if let Some(fields) = body.as_object_mut() {
                    fields
                        .entry("id")
                        .or_insert_with(|| serde_json::Value::String(key));
                }
                body
            })
            .collect(),
        other => {
            return Err(corrupt(format!(
                "expected an array or an object of records, found {}",
                json_kind(&other)
            )));
        }
    };

    let mut records: Vec<T> = Vec::with_capacity(bodies.len());
    for (position, body) in bodies.into_iter().enumerate() {
        let record: T = serde_json::from_value(body)
            .map_err(|e| corrupt(format!("record {position}: {e}")))?;
        match records.iter().position(|r| r.id() == record.id()) {
            Some(idx) => records[idx] = record,
            None => records.push(record),
        }
    }
    Ok(records)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::JsonFileBackend;
    use crate::memory::MemoryBackend;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Widget {
        id: String,
        size: u32,
    }

    impl Record for Widget {
        const COLLECTION: &'static str = "widgets";

        fn id(&self) -> &str {
            &self.id
        }
    }

    fn widget(id: &str, size: u32) -> Widget {
        Widget {
            id: id.to_string(),
            size,
        }
    }

    /// Backend whose writes can be switched to fail.
    #[derive(Default)]
    struct FlakyBackend {
        inner: MemoryBackend,
        fail_writes: std::sync::atomic::AtomicBool,
    }

    impl FlakyBackend {
        fn set_failing(&self, failing: bool) {
            self.fail_writes
                .store(failing, std::sync::atomic::Ordering::SeqCst);
        }
    }

    impl Backend for FlakyBackend {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn read(&self, collection: &str) -> StateResult<Option<serde_json::Value>> {
            self.inner.read(collection)
        }

        fn write(&self, collection: &str, records: &[StoredRecord]) -> StateResult<()> {
            if self.fail_writes.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(StateError::Write("disk full".into()));
            }
            self.inner.write(collection, records)
        }
    }

    fn memory_store() -> (Arc<MemoryBackend>, RecordStore<Widget>) {
        let backend = Arc::new(MemoryBackend::new());
        let store = RecordStore::open(backend.clone(), LoadPolicy::Strict).unwrap();
        (backend, store)
    }

    #[test]
    fn empty_when_never_written() {
        let (_, store) = memory_store();
        assert!(store.is_empty().unwrap());
        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn loads_array_documents() {
        let backend = Arc::new(MemoryBackend::new());
        backend
            .put_raw("widgets", json!([{ "id": "a", "size": 1 }, { "id": "b", "size": 2 }]))
            .unwrap();
        let store = RecordStore::<Widget>::open(backend, LoadPolicy::Strict).unwrap();
        assert_eq!(store.all().unwrap(), vec![widget("a", 1), widget("b", 2)]);
    }

    #[test]
    fn loads_object_documents_keyed_by_id() {
        let backend = Arc::new(MemoryBackend::new());
        backend
            .put_raw(
                "widgets",
                json!({ "a": { "id": "a", "size": 1 }, "b": { "size": 2 } }),
            )
            .unwrap();
        let store = RecordStore::<Widget>::open(backend, LoadPolicy::Strict).unwrap();
        assert_eq!(store.get("b").unwrap(), Some(widget("b", 2)));
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn later_duplicates_replace_earlier() {
        let backend = Arc::new(MemoryBackend::new());
        backend
            .put_raw("widgets", json!([{ "id": "a", "size": 1 }, { "id": "a", "size": 9 }]))
            .unwrap();
        let store = RecordStore::<Widget>::open(backend, LoadPolicy::Strict).unwrap();
        assert_eq!(store.all().unwrap(), vec![widget("a", 9)]);
    }

    #[test]
    fn strict_policy_surfaces_bad_documents() {
        let backend = Arc::new(MemoryBackend::new());
        backend.put_raw("widgets", json!("oops")).unwrap();
        let result = RecordStore::<Widget>::open(backend.clone(), LoadPolicy::Strict);
        assert!(matches!(result, Err(StateError::Corrupt { .. })));

        backend.put_raw("widgets", json!([{ "size": 3 }])).unwrap();
        let result = RecordStore::<Widget>::open(backend, LoadPolicy::Strict);
        assert!(matches!(result, Err(StateError::Corrupt { .. })));
    }

    #[test]
    fn lenient_policy_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("widgets.json"), "][").unwrap();
        let backend = Arc::new(JsonFileBackend::new(dir.path()));

        let store = RecordStore::<Widget>::open(backend, LoadPolicy::Lenient).unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn insert_new_assigns_unique_ids() {
        let (_, store) = memory_store();
        let a = store.insert_new(|id| Widget { id, size: 1 }).unwrap();
        let b = store.insert_new(|id| Widget { id, size: 2 }).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.all().unwrap(), vec![a, b]);
    }

    #[test]
    fn set_replaces_in_place() {
        let (_, store) = memory_store();
        store.set(widget("a", 1)).unwrap();
        store.set(widget("b", 2)).unwrap();
        store.set(widget("a", 5)).unwrap();
        assert_eq!(store.all().unwrap(), vec![widget("a", 5), widget("b", 2)]);
    }

    #[test]
    fn delete_missing_is_a_no_op() {
        let (backend, store) = memory_store();
        store.set(widget("a", 1)).unwrap();
        let before = backend.read("widgets").unwrap();

        assert!(!store.delete("zzz").unwrap());
        assert_eq!(backend.read("widgets").unwrap(), before);
        assert!(store.delete("a").unwrap());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn update_returns_none_for_missing() {
        let (_, store) = memory_store();
        let out = store.update("missing", |w| w.size += 1).unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let backend: Arc<dyn Backend> = Arc::new(JsonFileBackend::new(dir.path()));
        let store = RecordStore::<Widget>::open(backend.clone(), LoadPolicy::Strict).unwrap();
        for size in 0..5 {
            store.insert_new(|id| Widget { id, size }).unwrap();
        }
        store.save().unwrap();
        let before = store.all().unwrap();

        let reopened = RecordStore::<Widget>::open(backend, LoadPolicy::Strict).unwrap();
        assert_eq!(reopened.load().unwrap(), before);
        assert_eq!(reopened.all().unwrap(), before);
    }

    #[test]
    fn failed_write_leaves_memory_untouched() {
        let backend = Arc::new(FlakyBackend::default());
        let store = RecordStore::<Widget>::open(backend.clone(), LoadPolicy::Strict).unwrap();
        store.set(widget("a", 1)).unwrap();

        backend.set_failing(true);
        assert!(store.set(widget("b", 2)).is_err());
        assert!(store.update("a", |w| w.size = 100).is_err());
        assert!(store.delete("a").is_err());
        assert!(store.insert_new(|id| Widget { id, size: 3 }).is_err());
        assert!(
            store
                .transact(|all| {
                    all.clear();
                    Change::Commit(())
                })
                .is_err()
        );

        assert_eq!(store.all().unwrap(), vec![widget("a", 1)]);
        assert_eq!(store.load().unwrap(), vec![widget("a", 1)]);
    }

    #[test]
    fn transact_discard_writes_nothing() {
        let backend = Arc::new(FlakyBackend::default());
        let store = RecordStore::<Widget>::open(backend.clone(), LoadPolicy::Strict).unwrap();
        store.set(widget("a", 1)).unwrap();

        backend.set_failing(true);
        let seen = store
            .transact(|all| {
                all[0].size = 42;
                Change::Discard(all.len())
            })
            .unwrap();
        assert_eq!(seen, 1);
        assert_eq!(store.get("a").unwrap(), Some(widget("a", 1)));
    }

    #[test]
    fn reload_picks_up_external_changes() {
        let (backend, store) = memory_store();
        store.set(widget("a", 1)).unwrap();
        backend.put_raw("widgets", json!([{ "id": "z", "size": 26 }])).unwrap();

        assert_eq!(store.reload().unwrap(), 1);
        assert_eq!(store.all().unwrap(), vec![widget("z", 26)]);
    }
}
