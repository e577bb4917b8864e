//! Row-count cache keyed by file identity and modification time

use crate::data::SourceReader;
use crate::error::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    path: PathBuf,
    delimiter: char,
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    modified: SystemTime,
    rows: u64,
}

/// Explicit row-count cache.
///
/// Callers own an instance and pass it to the components that need row
/// counts. An entry is only served while the file's modification time is
/// unchanged.
#[derive(Debug, Default)]
pub struct RowCountCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl RowCountCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached row count for the reader's file, counting on a miss
    pub fn row_count(&self, reader: &SourceReader) -> Result<u64> {
        let key = Self::key_for(reader.path(), reader.delimiter());
        let modified = std::fs::metadata(reader.path())?.modified()?;

        if let Some(rows) = self.lookup(&key, modified) {
            log::debug!("Row count cache hit for {}", reader.path().display());
            return Ok(rows);
        }

        let rows = reader.count_rows()?;
        self.store(key, modified, rows);
        Ok(rows)
    }

    /// Record a count learned elsewhere (e.g. from a full scan)
    pub fn record(&self, reader: &SourceReader, rows: u64) -> Result<()> {
        let key = Self::key_for(reader.path(), reader.delimiter());
        let modified = std::fs::metadata(reader.path())?.modified()?;
        self.store(key, modified, rows);
        Ok(())
    }

    pub fn invalidate(&self, path: &Path) {
        let canonical = canonicalize(path);
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|key, _| key.path != canonical);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn key_for(path: &Path, delimiter: char) -> CacheKey {
        CacheKey {
            path: canonicalize(path),
            delimiter,
        }
    }

    fn lookup(&self, key: &CacheKey, modified: SystemTime) -> Option<u64> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some(entry) if entry.modified == modified => Some(entry.rows),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn store(&self, key: CacheKey, modified: SystemTime, rows: u64) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, CacheEntry { modified, rows });
        }
    }
}

fn canonicalize(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
