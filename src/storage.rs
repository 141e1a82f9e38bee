use std::fs::File;
use std::io::{Read, Result, Write};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tempfile::NamedTempFile;

use crate::models::{CacheEnvelope, LogEntry};

const CACHE_FILE: &str = "group_cache.json";
const LOG_FILE: &str = "activity_log.json";

/// File-backed persistence for the group cache and the activity log.
/// Writes are atomic (temp file + rename) and guarded by an advisory lock
/// so a concurrent reader never observes a torn envelope.
#[derive(Debug, Clone)]
pub struct Store {
    data_dir: PathBuf,
}

impl Store {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    fn cache_path(&self) -> PathBuf {
        self.data_dir.join(CACHE_FILE)
    }

    fn log_path(&self) -> PathBuf {
        self.data_dir.join(LOG_FILE)
    }

    /// The raw envelope, if one has ever been written. TTL policy is the
    /// cache's concern, not the store's.
    pub fn load_cache(&self) -> Option<CacheEnvelope> {
        read_json(&self.cache_path()).ok()
    }

    pub fn save_cache(&self, envelope: &CacheEnvelope) -> Result<()> {
        let _lock = FileLock::new(&self.cache_path())?;
        atomic_write_json(&self.cache_path(), envelope)
    }

    pub fn load_logs(&self) -> Vec<LogEntry> {
        read_json(&self.log_path()).unwrap_or_default()
    }

    pub fn save_logs(&self, entries: &[LogEntry]) -> Result<()> {
        let _lock = FileLock::new(&self.log_path())?;
        atomic_write_json(&self.log_path(), &entries)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let mut file = File::open(path)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

fn atomic_write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;

    let json = serde_json::to_string_pretty(data)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    tmp.write_all(json.as_bytes())?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;

    tmp.persist(path)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    Ok(())
}

struct FileLock {
    file: File,
}

impl FileLock {
    fn new(path: &Path) -> Result<Self> {
        let lock_path = path.with_extension("lock");
        let file = File::create(lock_path)?;
        fs2::FileExt::lock_exclusive(&file)?;
        Ok(Self { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GroupRecord, GroupStatus, LogStatus};
    use chrono::Utc;

    fn record(id: &str) -> GroupRecord {
        GroupRecord {
            id: id.to_string(),
            name: format!("Group {id}"),
            url: format!("https://www.facebook.com/groups/{id}"),
            status: GroupStatus::Active,
            last_checked: Utc::now(),
        }
    }

    #[test]
    fn cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        assert!(store.load_cache().is_none());

        let envelope = CacheEnvelope::new(vec![record("1"), record("2")], Utc::now());
        store.save_cache(&envelope).unwrap();

        let loaded = store.load_cache().unwrap();
        assert_eq!(loaded.groups.len(), 2);
        assert_eq!(loaded.groups[0].id, "1");
    }

    #[test]
    fn logs_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        assert!(store.load_logs().is_empty());

        let entries = vec![LogEntry {
            id: "1".into(),
            timestamp: Utc::now(),
            action: "boot".into(),
            status: LogStatus::Info,
            details: "started".into(),
        }];
        store.save_logs(&entries).unwrap();
        assert_eq!(store.load_logs().len(), 1);
    }

    #[test]
    fn corrupt_cache_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        std::fs::write(dir.path().join(CACHE_FILE), "not json").unwrap();
        assert!(store.load_cache().is_none());
    }
}
