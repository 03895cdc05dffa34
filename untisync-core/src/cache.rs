//! On-disk cache of fetched topic payloads.
//!
//! One JSON file per topic under the cache directory. Each file is an
//! envelope holding the write timestamp and the raw payload string, so
//! freshness checks survive restarts and payload comparison stays
//! byte-for-byte. A missing or unreadable file is simply a miss.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{UntisyncError, UntisyncResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    modified_at: DateTime<Utc>,
    payload: String,
}

/// A cache hit: the stored payload string plus when it was written.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub modified_at: DateTime<Utc>,
    pub payload: String,
}

pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    /// Open the default per-user cache directory, creating it if needed.
    pub fn open() -> UntisyncResult<CacheStore> {
        let dir = dirs::cache_dir()
            .ok_or_else(|| UntisyncError::Cache("Could not determine cache directory".into()))?
            .join("untisync");

        CacheStore::open_at(dir)
    }

    pub fn open_at(dir: PathBuf) -> UntisyncResult<CacheStore> {
        fs::create_dir_all(&dir)?;
        Ok(CacheStore { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Read a topic's cached entry. Corrupt files count as a miss; the
    /// next write replaces them.
    pub fn read(&self, key: &str) -> Option<CacheEntry> {
        let content = fs::read_to_string(self.path_for(key)).ok()?;
        match serde_json::from_str::<Envelope>(&content) {
            Ok(envelope) => Some(CacheEntry {
                modified_at: envelope.modified_at,
                payload: envelope.payload,
            }),
            Err(e) => {
                eprintln!("warning: discarding corrupt cache entry {key}: {e}");
                None
            }
        }
    }

    pub fn write(&self, key: &str, payload: &str) -> UntisyncResult<()> {
        self.write_at(key, payload, Utc::now())
    }

    /// Write with an explicit timestamp. Writes to a sibling temp file and
    /// renames so readers never see a half-written envelope.
    pub(crate) fn write_at(
        &self,
        key: &str,
        payload: &str,
        modified_at: DateTime<Utc>,
    ) -> UntisyncResult<()> {
        let envelope = Envelope {
            modified_at,
            payload: payload.to_string(),
        };
        let content = serde_json::to_string(&envelope)?;

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &path)?;

        Ok(())
    }

    /// Delete every cached entry.
    pub fn clear(&self) -> UntisyncResult<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn roundtrips_payload_and_timestamp() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open_at(dir.path().to_path_buf()).unwrap();

        assert!(store.read("lessons").is_none());

        store.write("lessons", r#"{"a":1}"#).unwrap();
        let entry = store.read("lessons").unwrap();
        assert_eq!(entry.payload, r#"{"a":1}"#);
        assert!((Utc::now() - entry.modified_at).num_seconds() < 5);
    }

    #[test]
    fn corrupt_entry_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open_at(dir.path().to_path_buf()).unwrap();

        std::fs::write(dir.path().join("grades.json"), "not json").unwrap();
        assert!(store.read("grades").is_none());

        store.write("grades", "[]").unwrap();
        assert!(store.read("grades").is_some());
    }

    #[test]
    fn clear_removes_all_entries() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open_at(dir.path().to_path_buf()).unwrap();

        store.write("lessons", "[]").unwrap();
        store.write("exams", "[]").unwrap();

        assert_eq!(store.clear().unwrap(), 2);
        assert!(store.read("lessons").is_none());
    }
}
