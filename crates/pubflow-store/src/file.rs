//! Directory-per-table JSON store
//!
//! Layout:
//! ```text
//! {root}/
//! └── {table}/
//!     ├── {blake3(id)}.json     # one pretty-printed record
//!     └── .tmp-*                # in-flight writes
//! ```
//!
//! `set` writes a temp file and renames it over the target. `insert` writes
//! a temp file and hard-links it to the target: the link fails when the
//! target exists, which makes first-write-wins atomic per key even across
//! processes sharing the directory.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use pubflow_core::Record;

use crate::hash;
use crate::store::{DocumentStore, StoreError, WriteStatus, check_table, record_id};

/// Disambiguates temp files written by one process.
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(root).map_err(|e| StoreError::io(root, e))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn table_dir(&self, table: &str) -> Result<PathBuf, StoreError> {
        check_table(table)?;
        let dir = self.root.join(table);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        Ok(dir)
    }

    fn record_path(dir: &Path, id: &str) -> PathBuf {
        dir.join(format!("{}.json", hash::key_for(id)))
    }

    /// Write `record` to a fresh temp file in `dir`.
    fn write_tmp(dir: &Path, record: &Record) -> Result<PathBuf, StoreError> {
        let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp = dir.join(format!(".tmp-{}-{n}", std::process::id()));
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&tmp, json).map_err(|e| StoreError::io(&tmp, e))?;
        Ok(tmp)
    }

    fn read(path: &Path) -> Result<Option<Record>, StoreError> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }
}

impl DocumentStore for FileStore {
    fn get(&self, table: &str, id: &str) -> Result<Option<Record>, StoreError> {
        let dir = self.table_dir(table)?;
        Self::read(&Self::record_path(&dir, id))
    }

    fn set(&self, table: &str, record: Record) -> Result<WriteStatus, StoreError> {
        let id = record_id(table, &record)?;
        let dir = self.table_dir(table)?;
        let path = Self::record_path(&dir, &id);

        let status = match Self::read(&path)? {
            Some(existing) if hash::content_hash(&existing) == hash::content_hash(&record) => {
                return Ok(WriteStatus::unchanged());
            }
            Some(_) => WriteStatus::replaced(),
            None => WriteStatus::inserted(),
        };

        let tmp = Self::write_tmp(&dir, &record)?;
        fs::rename(&tmp, &path).map_err(|e| StoreError::io(&path, e))?;
        Ok(status)
    }

    fn insert(&self, table: &str, record: Record) -> Result<WriteStatus, StoreError> {
        let id = record_id(table, &record)?;
        let dir = self.table_dir(table)?;
        let path = Self::record_path(&dir, &id);

        let tmp = Self::write_tmp(&dir, &record)?;
        let linked = fs::hard_link(&tmp, &path);
        fs::remove_file(&tmp).map_err(|e| StoreError::io(&tmp, e))?;

        match linked {
            Ok(()) => Ok(WriteStatus::inserted()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(WriteStatus::skipped()),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    fn scan(&self, table: &str) -> Result<Vec<Record>, StoreError> {
        let dir = self.table_dir(table)?;
        let pattern = format!(
            "{}/*.json",
            glob::Pattern::escape(&dir.to_string_lossy())
        );
        let paths = glob::glob(&pattern).map_err(|e| StoreError::InvalidTable(e.to_string()))?;

        let mut records = Vec::new();
        for entry in paths {
            let path = entry.map_err(|e| {
                let path = e.path().to_path_buf();
                StoreError::io(path, std::io::Error::from(e))
            })?;
            if let Some(record) = Self::read(&path)? {
                records.push(record);
            }
        }
        log::debug!("scanned {} records from {}", records.len(), dir.display());
        Ok(records)
    }
}
