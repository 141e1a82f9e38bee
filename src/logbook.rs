use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use tracing::warn;

use crate::models::{LogEntry, LogStatus};
use crate::storage::Store;

/// Bounded, newest-first activity log. Appends prepend and truncate to the
/// cap; the full list is persisted on every mutation so it survives restarts.
pub struct Logbook {
    entries: Mutex<Vec<LogEntry>>,
    store: Store,
    cap: usize,
    seq: AtomicU64,
}

impl Logbook {
    pub fn load(store: Store, cap: usize) -> Self {
        let mut entries = store.load_logs();
        entries.truncate(cap);
        Self {
            entries: Mutex::new(entries),
            store,
            cap,
            seq: AtomicU64::new(0),
        }
    }

    pub fn append(&self, action: &str, status: LogStatus, details: &str) {
        let entry = LogEntry {
            id: self.next_id(),
            timestamp: Utc::now(),
            action: action.to_string(),
            status,
            details: details.to_string(),
        };

        let snapshot = {
            let mut entries = self.entries.lock().expect("logbook poisoned");
            entries.insert(0, entry);
            entries.truncate(self.cap);
            entries.clone()
        };

        if let Err(e) = self.store.save_logs(&snapshot) {
            warn!("failed to persist activity log: {e}");
        }
    }

    /// Newest first.
    pub fn list(&self) -> Vec<LogEntry> {
        self.entries.lock().expect("logbook poisoned").clone()
    }

    pub fn clear(&self) {
        self.entries.lock().expect("logbook poisoned").clear();
        if let Err(e) = self.store.save_logs(&[]) {
            warn!("failed to persist cleared activity log: {e}");
        }
    }

    // Millisecond timestamp alone collides under burst appends, so a
    // process-local sequence number disambiguates.
    fn next_id(&self) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", Utc::now().timestamp_millis(), seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logbook() -> (tempfile::TempDir, Logbook) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        let book = Logbook::load(store, 100);
        (dir, book)
    }

    #[test]
    fn newest_first_ordering() {
        let (_dir, book) = logbook();
        book.append("first", LogStatus::Info, "");
        book.append("second", LogStatus::Success, "");

        let entries = book.list();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "second");
        assert_eq!(entries[1].action, "first");
    }

    #[test]
    fn cap_evicts_oldest() {
        let (_dir, book) = logbook();
        for i in 0..130 {
            book.append(&format!("entry-{i}"), LogStatus::Info, "");
        }

        let entries = book.list();
        assert_eq!(entries.len(), 100);
        // The 100 most recent, newest first.
        assert_eq!(entries[0].action, "entry-129");
        assert_eq!(entries[99].action, "entry-30");
    }

    #[test]
    fn ids_are_unique_under_burst() {
        let (_dir, book) = logbook();
        for _ in 0..50 {
            book.append("burst", LogStatus::Info, "");
        }
        let mut ids: Vec<String> = book.list().into_iter().map(|e| e.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 50);
    }

    #[test]
    fn survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        {
            let book = Logbook::load(store.clone(), 100);
            book.append("persisted", LogStatus::Info, "");
        }
        let book = Logbook::load(store, 100);
        assert_eq!(book.list().len(), 1);
        assert_eq!(book.list()[0].action, "persisted");
    }

    #[test]
    fn clear_empties_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        let book = Logbook::load(store.clone(), 100);
        book.append("one", LogStatus::Info, "");
        book.clear();
        assert!(book.list().is_empty());
        assert!(store.load_logs().is_empty());
    }
}
