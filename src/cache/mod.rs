//! Keyed cache of merged vehicle records
//!
//! The cache stores whatever the gateway last merged for a registration,
//! together with a last-updated timestamp and a monotonically increasing
//! request counter. It never judges staleness itself: `lookup` hands back
//! the stored entry and timestamp and leaves the freshness decision to the
//! caller. Entries are never deleted.

pub mod store;

pub use store::CacheStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::data::VehicleRecord;

/// Errors from cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    /// `touch` was called for a registration with no entry
    #[error("No cached record for {0}")]
    NotFound(String),
}

/// One cached registration: the merged record plus bookkeeping
///
/// `request_count` only ever increases. `last_updated` moves only on a
/// successful refresh (`upsert`), never on a counted read (`touch`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The merged vehicle record as of the last refresh
    pub record: VehicleRecord,
    /// When the record data was last refreshed from the upstream sources
    pub last_updated: DateTime<Utc>,
    /// How many lookups have been served for this registration
    pub request_count: u64,
}

/// In-memory record cache with optional write-through disk persistence
///
/// Mutation is serialized per key: the shared map is locked only long enough
/// to obtain a per-key handle, and a per-key mutex guards the entry itself,
/// so concurrent lookups for different registrations do not contend.
#[derive(Debug, Default)]
pub struct RecordCache {
    /// Entry handles keyed by normalized registration
    entries: Mutex<HashMap<String, Arc<Mutex<CacheEntry>>>>,
    /// Optional disk store for surviving restarts
    store: Option<CacheStore>,
}

impl RecordCache {
    /// Creates a purely in-memory cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache that writes through to the given disk store
    ///
    /// Entries are loaded from disk lazily on first access; disk failures
    /// degrade to in-memory operation with a logged warning.
    pub fn with_store(store: CacheStore) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            store: Some(store),
        }
    }

    /// Returns the stored entry for a registration, if any
    ///
    /// The entry is returned as stored, stale or not; judging its age is the
    /// caller's concern.
    pub fn lookup(&self, key: &str) -> Option<CacheEntry> {
        let handle = self.entry_handle(key)?;
        let entry = handle.lock().unwrap_or_else(|e| e.into_inner());
        Some(entry.clone())
    }

    /// Creates or refreshes the entry for a registration
    ///
    /// A new entry starts with `request_count = 1`; an existing one has its
    /// data fields replaced, its `last_updated` refreshed, and its counter
    /// incremented by one.
    pub fn upsert(&self, key: &str, record: VehicleRecord) -> CacheEntry {
        let mut map = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = map.get(key).map(Arc::clone) {
            drop(map);
            let mut entry = handle.lock().unwrap_or_else(|e| e.into_inner());
            entry.record = record;
            entry.last_updated = Utc::now();
            entry.request_count += 1;
            let snapshot = entry.clone();
            // Persisting before releasing the entry lock keeps disk writes
            // for one key in counter order.
            self.persist(key, &snapshot);
            return snapshot;
        }

        // Key absent: build the entry completely before it becomes visible,
        // so no concurrent lookup can observe an unfilled record. A persisted
        // entry's counter carries over.
        let prior_count = self
            .store
            .as_ref()
            .and_then(|s| s.load(key))
            .map_or(0, |entry| entry.request_count);
        let entry = CacheEntry {
            record,
            last_updated: Utc::now(),
            request_count: prior_count + 1,
        };
        let snapshot = entry.clone();
        let handle = Arc::new(Mutex::new(entry));
        // Hold the new entry's lock across the disk write so a concurrent
        // touch/upsert cannot persist a later counter value first.
        let guard = handle.lock().unwrap_or_else(|e| e.into_inner());
        map.insert(key.to_string(), Arc::clone(&handle));
        drop(map);
        self.persist(key, &snapshot);
        drop(guard);
        snapshot
    }

    /// Counts a lookup served from the cache without a refresh
    ///
    /// Increments `request_count` and leaves the record data and
    /// `last_updated` untouched.
    pub fn touch(&self, key: &str) -> Result<CacheEntry, CacheError> {
        let handle = self
            .entry_handle(key)
            .ok_or_else(|| CacheError::NotFound(key.to_string()))?;

        let mut entry = handle.lock().unwrap_or_else(|e| e.into_inner());
        entry.request_count += 1;
        let snapshot = entry.clone();
        // Persisting before releasing the entry lock keeps disk writes for
        // one key in counter order.
        self.persist(key, &snapshot);
        drop(entry);

        Ok(snapshot)
    }

    /// Returns the in-memory handle for a key, loading from disk on miss
    fn entry_handle(&self, key: &str) -> Option<Arc<Mutex<CacheEntry>>> {
        let mut map = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = map.get(key) {
            return Some(Arc::clone(handle));
        }

        let persisted = self.store.as_ref()?.load(key)?;
        let handle = Arc::new(Mutex::new(persisted));
        map.insert(key.to_string(), Arc::clone(&handle));
        Some(handle)
    }

    /// Writes an entry through to disk if a store is configured
    fn persist(&self, key: &str, entry: &CacheEntry) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(key, entry) {
                tracing::warn!(key, error = %e, "failed to persist cache entry");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(registration: &str, make: &str) -> VehicleRecord {
        VehicleRecord {
            registration_number: registration.to_string(),
            make: Some(make.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_lookup_returns_none_for_unknown_key() {
        let cache = RecordCache::new();
        assert!(cache.lookup("AB12CDE").is_none());
    }

    #[test]
    fn test_upsert_creates_entry_with_count_one() {
        let cache = RecordCache::new();
        let entry = cache.upsert("AB12CDE", record("AB12CDE", "TOYOTA"));

        assert_eq!(entry.request_count, 1);
        assert_eq!(entry.record.make.as_deref(), Some("TOYOTA"));
    }

    #[test]
    fn test_upsert_replaces_fields_and_increments() {
        let cache = RecordCache::new();
        let first = cache.upsert("AB12CDE", record("AB12CDE", "TOYOTA"));
        let second = cache.upsert("AB12CDE", record("AB12CDE", "HONDA"));

        assert_eq!(second.request_count, 2);
        assert_eq!(second.record.make.as_deref(), Some("HONDA"));
        assert!(second.last_updated >= first.last_updated);
    }

    #[test]
    fn test_touch_increments_without_changing_data() {
        let cache = RecordCache::new();
        let created = cache.upsert("AB12CDE", record("AB12CDE", "TOYOTA"));
        let touched = cache.touch("AB12CDE").expect("Entry should exist");

        assert_eq!(touched.request_count, 2);
        assert_eq!(touched.record, created.record);
        assert_eq!(touched.last_updated, created.last_updated);
    }

    #[test]
    fn test_touch_missing_key_fails() {
        let cache = RecordCache::new();
        let err = cache.touch("ZZ99ZZZ").unwrap_err();
        assert!(matches!(err, CacheError::NotFound(key) if key == "ZZ99ZZZ"));
    }

    #[test]
    fn test_request_count_never_resets_across_operations() {
        let cache = RecordCache::new();
        cache.upsert("AB12CDE", record("AB12CDE", "TOYOTA"));
        cache.touch("AB12CDE").unwrap();
        cache.touch("AB12CDE").unwrap();
        let entry = cache.upsert("AB12CDE", record("AB12CDE", "TOYOTA"));

        assert_eq!(entry.request_count, 4);
    }

    #[test]
    fn test_keys_are_independent() {
        let cache = RecordCache::new();
        cache.upsert("AB12CDE", record("AB12CDE", "TOYOTA"));
        let other = cache.upsert("XY65ABC", record("XY65ABC", "FORD"));

        assert_eq!(other.request_count, 1);
        assert_eq!(
            cache.lookup("AB12CDE").unwrap().record.make.as_deref(),
            Some("TOYOTA")
        );
    }

    #[test]
    fn test_concurrent_lookup_never_sees_unfilled_entry() {
        use std::thread;

        // Race a first upsert for a key against a polling lookup: the reader
        // must only ever observe the fully built entry, never a default
        // record or a zero counter.
        for i in 0..500 {
            let cache = Arc::new(RecordCache::new());
            let key = format!("AB{:03}Z", i);

            let writer = {
                let cache = Arc::clone(&cache);
                let key = key.clone();
                thread::spawn(move || {
                    cache.upsert(&key, record(&key, "TOYOTA"));
                })
            };
            let reader = {
                let cache = Arc::clone(&cache);
                let key = key.clone();
                thread::spawn(move || loop {
                    if let Some(entry) = cache.lookup(&key) {
                        assert!(entry.request_count >= 1, "observed a zero counter");
                        assert_eq!(entry.record.make.as_deref(), Some("TOYOTA"));
                        break;
                    }
                })
            };

            writer.join().expect("writer thread panicked");
            reader.join().expect("reader thread panicked");
        }
    }

    #[test]
    fn test_disk_count_matches_memory_after_concurrent_touches() {
        use std::thread;

        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let cache = Arc::new(RecordCache::with_store(CacheStore::with_dir(
            temp_dir.path().to_path_buf(),
        )));
        cache.upsert("AB12CDE", record("AB12CDE", "TOYOTA"));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for _ in 0..25 {
                        cache.touch("AB12CDE").expect("Entry should exist");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("touch thread panicked");
        }

        let memory = cache.lookup("AB12CDE").expect("Entry should exist");
        assert_eq!(memory.request_count, 201);

        // Writes go to disk in counter order, so the persisted counter can
        // never lag behind memory and regress after a restart.
        let disk = CacheStore::with_dir(temp_dir.path().to_path_buf())
            .load("AB12CDE")
            .expect("Persisted entry should load");
        assert_eq!(disk.request_count, memory.request_count);
    }

    #[test]
    fn test_entries_survive_restart_with_store() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");

        {
            let cache = RecordCache::with_store(CacheStore::with_dir(temp_dir.path().to_path_buf()));
            cache.upsert("AB12CDE", record("AB12CDE", "TOYOTA"));
            cache.touch("AB12CDE").unwrap();
        }

        // A fresh cache over the same directory sees the persisted entry.
        let cache = RecordCache::with_store(CacheStore::with_dir(temp_dir.path().to_path_buf()));
        let entry = cache.lookup("AB12CDE").expect("Persisted entry should load");
        assert_eq!(entry.request_count, 2);
        assert_eq!(entry.record.make.as_deref(), Some("TOYOTA"));
    }

    #[test]
    fn test_upsert_after_restart_carries_counter_forward() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");

        {
            let cache = RecordCache::with_store(CacheStore::with_dir(temp_dir.path().to_path_buf()));
            cache.upsert("AB12CDE", record("AB12CDE", "TOYOTA"));
        }

        let cache = RecordCache::with_store(CacheStore::with_dir(temp_dir.path().to_path_buf()));
        let entry = cache.upsert("AB12CDE", record("AB12CDE", "HONDA"));
        assert_eq!(entry.request_count, 2);
        assert_eq!(entry.record.make.as_deref(), Some("HONDA"));
    }
}
