//! Global log collection: append-only, capped, filterable.

use std::collections::BTreeMap;
use std::sync::Arc;

use convoy_core::Timestamp;
use convoy_state::{Change, LogEntry, RecordStore, fresh_id};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ServiceError, ServiceResult};
use crate::support::require;

const KIND: &str = "log entry";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewLogEntry {
    pub level: String,
    pub source: String,
    pub message: String,
    pub application_id: Option<String>,
    pub deployment_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl NewLogEntry {
    pub fn validate(&self) -> ServiceResult<()> {
        require("level", &self.level)?;
        require("source", &self.source)?;
        require("message", &self.message)
    }

    fn into_entry(self, id: String, timestamp: Timestamp) -> LogEntry {
        LogEntry {
            id,
            timestamp,
            level: self.level,
            source: self.source,
            message: self.message,
            application_id: self.application_id,
            deployment_id: self.deployment_id,
            metadata: self.metadata,
        }
    }
}

/// Criteria for listing or clearing logs. Every criterion that is set must
/// match. Time bounds are compared as strings against `timestamp`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogFilter {
    pub level: Option<String>,
    pub source: Option<String>,
    pub application_id: Option<String>,
    pub deployment_id: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    /// Keep the last N matches when listing; `0` means no limit. Ignored
    /// when clearing.
    pub limit: Option<usize>,
}

impl LogFilter {
    fn matches(&self, entry: &LogEntry) -> bool {
        let stamp = entry.timestamp.to_string();
        let linked = |want: &Option<String>, have: &Option<String>| {
            want.as_ref().is_none_or(|w| have.as_ref() == Some(w))
        };
        self.level.as_ref().is_none_or(|l| &entry.level == l)
            && self.source.as_ref().is_none_or(|s| &entry.source == s)
            && linked(&self.application_id, &entry.application_id)
            && linked(&self.deployment_id, &entry.deployment_id)
            && self
                .start_time
                .as_ref()
                .is_none_or(|start| stamp.as_str() >= start.as_str())
            && self
                .end_time
                .as_ref()
                .is_none_or(|end| stamp.as_str() <= end.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogStats {
    pub total: usize,
    pub by_level: BTreeMap<String, usize>,
    pub by_source: BTreeMap<String, usize>,
    pub oldest: Option<Timestamp>,
    pub newest: Option<Timestamp>,
}

#[derive(Clone)]
pub struct LogService {
    store: Arc<RecordStore<LogEntry>>,
    retention: usize,
    default_limit: usize,
}

impl LogService {
    pub fn new(store: Arc<RecordStore<LogEntry>>, retention: usize, default_limit: usize) -> Self {
        Self {
            store,
            retention,
            default_limit,
        }
    }

    /// Matching entries, oldest first, trimmed to the last `limit`.
    pub fn list(&self, filter: &LogFilter) -> ServiceResult<Vec<LogEntry>> {
        let mut matched = self.store.filter(|e| filter.matches(e))?;
        let limit = filter.limit.unwrap_or(self.default_limit);
        if limit > 0 && matched.len() > limit {
            matched.drain(..matched.len() - limit);
        }
        Ok(matched)
    }

    pub fn get(&self, id: &str) -> ServiceResult<LogEntry> {
        self.store
            .get(id)?
            .ok_or_else(|| ServiceError::not_found(KIND, id))
    }

    /// Append one entry, dropping the oldest beyond the retention cap.
    pub fn create(&self, input: NewLogEntry) -> ServiceResult<LogEntry> {
        input.validate()?;
        let retention = self.retention;
        let entry = self.store.transact(|all| {
            let entry = input.into_entry(fresh_id(all), Timestamp::now());
            all.push(entry.clone());
            trim_oldest(all, retention);
            Change::Commit(entry)
        })?;
        debug!(id = %entry.id, level = %entry.level, source = %entry.source, "log entry recorded");
        Ok(entry)
    }

    /// Append a batch with a single write. Entries keep their batch order
    /// and receive strictly increasing timestamps.
    pub fn ingest(&self, batch: Vec<NewLogEntry>) -> ServiceResult<Vec<LogEntry>> {
        for input in &batch {
            input.validate()?;
        }
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let retention = self.retention;
        let count = batch.len();
        let entries = self.store.transact(|all| {
            let mut stamp = Timestamp::now();
            if let Some(last) = all.last() {
                stamp = stamp.max(Timestamp::now_after(last.timestamp));
            }
            let mut added = Vec::with_capacity(batch.len());
            for input in batch {
                let entry = input.into_entry(fresh_id(all), stamp);
                stamp = Timestamp::now_after(stamp);
                all.push(entry.clone());
                added.push(entry);
            }
            trim_oldest(all, retention);
            Change::Commit(added)
        })?;
        info!(count, "log batch ingested");
        Ok(entries)
    }

    pub fn delete(&self, id: &str) -> ServiceResult<()> {
        if !self.store.delete(id)? {
            return Err(ServiceError::not_found(KIND, id));
        }
        Ok(())
    }

    /// Remove every entry matching all criteria in `filter` and return how
    /// many were removed. An empty filter clears the collection.
    pub fn clear(&self, filter: &LogFilter) -> ServiceResult<usize> {
        let removed = self.store.transact(|all| {
            let before = all.len();
            all.retain(|e| !filter.matches(e));
            let removed = before - all.len();
            if removed == 0 {
                Change::Discard(0)
            } else {
                Change::Commit(removed)
            }
        })?;
        info!(removed, "log entries cleared");
        Ok(removed)
    }

    pub fn stats(&self) -> ServiceResult<LogStats> {
        let entries = self.store.all()?;
        let mut by_level: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_source: BTreeMap<String, usize> = BTreeMap::new();
        for entry in &entries {
            *by_level.entry(entry.level.clone()).or_default() += 1;
            *by_source.entry(entry.source.clone()).or_default() += 1;
        }
        Ok(LogStats {
            total: entries.len(),
            by_level,
            by_source,
            oldest: entries.iter().map(|e| e.timestamp).min(),
            newest: entries.iter().map(|e| e.timestamp).max(),
        })
    }
}

fn trim_oldest(entries: &mut Vec<LogEntry>, retention: usize) {
    if entries.len() > retention {
        let excess = entries.len() - retention;
        entries.drain(..excess);
    }
}
