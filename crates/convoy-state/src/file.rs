//! Flat JSON file backend: `<dir>/<collection>.json`.
//!
//! Writes go to a temporary file in the same directory which is then
//! renamed over the target, so a crash mid-write leaves the previous
//! document intact.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::backend::{Backend, StoredRecord};
use crate::error::{StateError, StateResult, map_err};

#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    dir: PathBuf,
}

impl JsonFileBackend {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    pub fn path_for(&self, collection: &str) -> PathBuf {
        self.dir.join(format!("{collection}.json"))
    }
}

impl Backend for JsonFileBackend {
    fn name(&self) -> &'static str {
        "json"
    }

    fn read(&self, collection: &str) -> StateResult<Option<serde_json::Value>> {
        let path = self.path_for(collection);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StateError::Read(format!("{}: {e}", path.display()))),
        };
        let document = serde_json::from_str(&content).map_err(|e| StateError::Corrupt {
            collection: collection.to_string(),
            reason: format!("{}: {e}", path.display()),
        })?;
        debug!(?path, "collection file read");
        Ok(Some(document))
    }

    fn write(&self, collection: &str, records: &[StoredRecord]) -> StateResult<()> {
        let path = self.path_for(collection);
        std::fs::create_dir_all(&self.dir).map_err(map_err!(Write))?;

        let bodies: Vec<&serde_json::Value> = records.iter().map(|r| &r.body).collect();
        let bytes = serde_json::to_vec_pretty(&bodies).map_err(map_err!(Serialize))?;

        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(map_err!(Write))?;
        tmp.write_all(&bytes).map_err(map_err!(Write))?;
        tmp.as_file().sync_all().map_err(map_err!(Write))?;
        tmp.persist(&path).map_err(|e| StateError::Write(e.error.to_string()))?;

        debug!(?path, records = records.len(), "collection file written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str) -> StoredRecord {
        StoredRecord {
            id: id.to_string(),
            body: json!({ "id": id, "name": format!("rec-{id}") }),
        }
    }

    #[test]
    fn missing_file_reads_none() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path());
        assert!(backend.read("applications").unwrap().is_none());
    }

    #[test]
    fn write_creates_parent_dirs_and_array_document() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let backend = JsonFileBackend::new(&nested);

        backend.write("clusters", &[record("1"), record("2")]).unwrap();

        let raw = std::fs::read_to_string(nested.join("clusters.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed[0]["id"], "1");
        assert_eq!(parsed[1]["id"], "2");
        assert_eq!(backend.read("clusters").unwrap(), Some(parsed));
    }

    #[test]
    fn rewrite_replaces_previous_document() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path());

        backend.write("logs", &[record("1"), record("2")]).unwrap();
        backend.write("logs", &[record("3")]).unwrap();

        assert_eq!(
            backend.read("logs").unwrap(),
            Some(json!([{ "id": "3", "name": "rec-3" }]))
        );
        // No temp files left behind.
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn garbage_is_reported_as_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path());
        std::fs::write(backend.path_for("deployments"), "{ not json").unwrap();

        match backend.read("deployments") {
            Err(StateError::Corrupt { collection, .. }) => assert_eq!(collection, "deployments"),
            other => panic!("expected corrupt error, got {other:?}"),
        }
    }
}
