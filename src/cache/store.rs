//! Disk persistence for cached vehicle records
//!
//! Stores one JSON file per registration in an XDG-compliant cache directory
//! so records and request counters survive process restarts. The store never
//! judges staleness; it persists entries exactly as the cache hands them over.

use directories::ProjectDirs;
use std::fs;
use std::path::PathBuf;

use super::CacheEntry;

/// Reads and writes cache entries as JSON files on disk
///
/// Uses `~/.cache/regwatch/` on Linux, or the equivalent XDG path on other
/// platforms. A missing or unparsable file is treated as absent.
#[derive(Debug, Clone)]
pub struct CacheStore {
    /// Directory where entry files are stored
    cache_dir: PathBuf,
}

impl CacheStore {
    /// Creates a store in the XDG cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g. no
    /// home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "regwatch")?;
        let cache_dir = project_dirs.cache_dir().to_path_buf();
        Some(Self { cache_dir })
    }

    /// Creates a store with a custom directory
    ///
    /// Useful for testing or when a specific cache location is needed.
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Returns the path to the entry file for the given registration
    fn entry_path(&self, key: &str) -> PathBuf {
        // Keys are normalized registrations (A-Z/0-9 only), safe as file names.
        self.cache_dir.join(format!("{}.json", key))
    }

    /// Ensures the cache directory exists
    fn ensure_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.cache_dir)
    }

    /// Loads the entry for a registration, if one was persisted
    pub fn load(&self, key: &str) -> Option<CacheEntry> {
        let content = fs::read_to_string(self.entry_path(key)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Persists an entry, replacing any previous file for the registration
    pub fn save(&self, key: &str, entry: &CacheEntry) -> std::io::Result<()> {
        self.ensure_dir()?;
        let json = serde_json::to_string_pretty(entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(self.entry_path(key), json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::VehicleRecord;
    use chrono::Utc;
    use tempfile::TempDir;

    fn create_test_store() -> (CacheStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = CacheStore::with_dir(temp_dir.path().to_path_buf());
        (store, temp_dir)
    }

    fn sample_entry(registration: &str, request_count: u64) -> CacheEntry {
        CacheEntry {
            record: VehicleRecord {
                registration_number: registration.to_string(),
                make: Some("TOYOTA".to_string()),
                ..Default::default()
            },
            last_updated: Utc::now(),
            request_count,
        }
    }

    #[test]
    fn test_save_creates_file_named_after_registration() {
        let (store, temp_dir) = create_test_store();
        let entry = sample_entry("AB12CDE", 1);

        store.save("AB12CDE", &entry).expect("Save should succeed");

        assert!(temp_dir.path().join("AB12CDE.json").exists());
    }

    #[test]
    fn test_load_returns_none_for_missing_key() {
        let (store, _temp_dir) = create_test_store();
        assert!(store.load("ZZ99ZZZ").is_none());
    }

    #[test]
    fn test_entry_survives_roundtrip() {
        let (store, _temp_dir) = create_test_store();
        let entry = sample_entry("AB12CDE", 3);

        store.save("AB12CDE", &entry).expect("Save should succeed");
        let loaded = store.load("AB12CDE").expect("Entry should load");

        assert_eq!(loaded, entry);
    }

    #[test]
    fn test_save_overwrites_previous_entry() {
        let (store, _temp_dir) = create_test_store();
        store
            .save("AB12CDE", &sample_entry("AB12CDE", 1))
            .expect("First save should succeed");
        store
            .save("AB12CDE", &sample_entry("AB12CDE", 2))
            .expect("Second save should succeed");

        let loaded = store.load("AB12CDE").expect("Entry should load");
        assert_eq!(loaded.request_count, 2);
    }

    #[test]
    fn test_save_creates_directory_if_missing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let nested = temp_dir.path().join("nested").join("cache");
        let store = CacheStore::with_dir(nested.clone());

        store
            .save("AB12CDE", &sample_entry("AB12CDE", 1))
            .expect("Save should succeed");

        assert!(nested.join("AB12CDE.json").exists());
    }

    #[test]
    fn test_corrupt_file_loads_as_absent() {
        let (store, temp_dir) = create_test_store();
        fs::write(temp_dir.path().join("AB12CDE.json"), "{ not json }")
            .expect("Failed to write corrupt file");

        assert!(store.load("AB12CDE").is_none());
    }
}
