//! convoy-state — the record store underneath every convoy service.
//!
//! A [`RecordStore`] holds one collection of records in memory, keyed by
//! record id and kept in insertion order. Every mutation is persisted as a
//! full rewrite of the collection through a [`Backend`]:
//!
//! - [`MemoryBackend`] keeps documents in process (tests, ephemeral runs).
//! - [`JsonFileBackend`] keeps one `<collection>.json` per collection and
//!   replaces it atomically via write-to-temp-then-rename.
//! - [`RedbBackend`] keeps one redb table per collection.
//!
//! On load, a document may be a JSON array of records or an object keyed
//! by id; on write it is always an array.

pub mod backend;
pub mod embedded;
pub mod error;
pub mod file;
pub mod memory;
pub mod store;
pub mod tables;
pub mod types;

pub use backend::{Backend, StoredRecord, open_backend};
pub use embedded::RedbBackend;
pub use error::{StateError, StateResult};
pub use file::JsonFileBackend;
pub use memory::MemoryBackend;
pub use store::{Change, Record, RecordStore, fresh_id};
pub use types::*;
