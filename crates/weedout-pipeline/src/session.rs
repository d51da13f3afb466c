//! Per-session result records.
//!
//! The session-based flow processes an upload in one request and reads the
//! outcome back in later ones. [`SessionStore`] keeps the last result per
//! client token with an explicit retention policy: records expire after a
//! TTL, and the oldest are evicted beyond a capacity. Every displaced record
//! is handed back to the caller so its result folder can be reclaimed.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::config::PipelineConfig;
use crate::params::PreprocessingRequest;

/// Outcome of one `/api/preprocess` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionResultRecord {
    pub request: PreprocessingRequest,
    /// Engine diagnostic text, verbatim.
    pub diagnostics: String,
    /// Folder owned by this record; removed when the record is displaced.
    pub result_dir: PathBuf,
    pub result_path: PathBuf,
    pub original_name: String,
    pub created_at: DateTime<Utc>,
}

struct Entry {
    record: SessionResultRecord,
    stored_at: Instant,
}

/// Generate a fresh opaque session token.
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Keyed, expiring store of session results.
pub struct SessionStore {
    entries: RwLock<HashMap<String, Entry>>,
    ttl: Duration,
    capacity: usize,
}

impl SessionStore {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.session_ttl, config.session_capacity)
    }

    /// Store `record` for `session_id`.
    ///
    /// Returns every record displaced by this call: the previous record for
    /// the same session, expired records, and the oldest records beyond
    /// capacity.
    pub fn insert(
        &self,
        session_id: &str,
        record: SessionResultRecord,
    ) -> Vec<(String, SessionResultRecord)> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let mut displaced = Self::drain_expired(&mut entries, now, self.ttl);

        if let Some(previous) = entries.insert(
            session_id.to_string(),
            Entry {
                record,
                stored_at: now,
            },
        ) {
            displaced.push((session_id.to_string(), previous.record));
        }

        while entries.len() > self.capacity {
            let oldest = entries
                .iter()
                .filter(|(id, _)| id.as_str() != session_id)
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(id, _)| id.clone());
            let Some(id) = oldest else { break };
            if let Some(entry) = entries.remove(&id) {
                displaced.push((id, entry.record));
            }
        }

        displaced
    }

    /// The live record for `session_id`, if any.
    pub fn get(&self, session_id: &str) -> Option<SessionResultRecord> {
        let entries = self.entries.read();
        entries
            .get(session_id)
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
            .map(|entry| entry.record.clone())
    }

    /// Remove every expired record and return them.
    pub fn purge_expired(&self) -> Vec<(String, SessionResultRecord)> {
        let mut entries = self.entries.write();
        Self::drain_expired(&mut entries, Instant::now(), self.ttl)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn drain_expired(
        entries: &mut HashMap<String, Entry>,
        now: Instant,
        ttl: Duration,
    ) -> Vec<(String, SessionResultRecord)> {
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.stored_at) >= ttl)
            .map(|(id, _)| id.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| entries.remove(&id).map(|entry| (id, entry.record)))
            .collect()
    }
}

static_assertions::assert_impl_all!(SessionStore: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ModelObjective;

    fn record(name: &str) -> SessionResultRecord {
        SessionResultRecord {
            request: PreprocessingRequest::defaults(ModelObjective::Classification),
            diagnostics: format!("processed {}", name),
            result_dir: PathBuf::from(format!("sessions/{}", name)),
            result_path: PathBuf::from(format!("sessions/{}/processed_{}", name, name)),
            original_name: name.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_insert_and_get() {
        let store = SessionStore::new(Duration::from_secs(60), 4);
        assert!(store.insert("s1", record("a.csv")).is_empty());

        let found = store.get("s1").unwrap();
        assert_eq!(found.original_name, "a.csv");
        assert!(store.get("s2").is_none());
    }

    #[test]
    fn test_replacement_returns_previous() {
        let store = SessionStore::new(Duration::from_secs(60), 4);
        store.insert("s1", record("a.csv"));
        let displaced = store.insert("s1", record("b.csv"));

        assert_eq!(displaced.len(), 1);
        assert_eq!(displaced[0].0, "s1");
        assert_eq!(displaced[0].1.original_name, "a.csv");
        assert_eq!(store.get("s1").unwrap().original_name, "b.csv");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let store = SessionStore::new(Duration::from_secs(60), 2);
        store.insert("s1", record("a.csv"));
        std::thread::sleep(Duration::from_millis(2));
        store.insert("s2", record("b.csv"));
        std::thread::sleep(Duration::from_millis(2));
        let displaced = store.insert("s3", record("c.csv"));

        assert_eq!(displaced.len(), 1);
        assert_eq!(displaced[0].0, "s1");
        assert!(store.get("s1").is_none());
        assert!(store.get("s3").is_some());
    }

    #[test]
    fn test_expired_records_are_hidden_and_purged() {
        let store = SessionStore::new(Duration::ZERO, 4);
        store.insert("s1", record("a.csv"));

        assert!(store.get("s1").is_none());
        let purged = store.purge_expired();
        assert_eq!(purged.len(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_session_ids_are_unique() {
        assert_ne!(new_session_id(), new_session_id());
    }
}
