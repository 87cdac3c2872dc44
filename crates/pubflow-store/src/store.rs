//! Document store contract
//!
//! Records are JSON objects keyed by their `id` field. A table is a flat
//! namespace of records; tables spring into existence on first write.

use std::ops::{Add, AddAssign};
use std::path::PathBuf;

use pubflow_core::{Record, field_str};
use serde::Serialize;

/// Error from a store backend. Always fatal to the pipeline that hit it.
#[derive(Debug)]
pub enum StoreError {
    /// Record has no usable `id` field
    MissingId { table: String },
    /// Table name is not a plain identifier
    InvalidTable(String),
    /// Filesystem failure at `path`
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Stored or submitted record is not valid JSON
    Serde(serde_json::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingId { table } => write!(f, "record for table {table} has no id"),
            Self::InvalidTable(name) => write!(f, "invalid table name: {name:?}"),
            Self::Io { path, source } => write!(f, "IO error at {}: {source}", path.display()),
            Self::Serde(e) => write!(f, "JSON error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Serde(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serde(e)
    }
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Outcome counters of one or more writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteStatus {
    pub deleted: usize,
    pub errors: usize,
    pub inserted: usize,
    pub replaced: usize,
    pub skipped: usize,
    pub unchanged: usize,
}

impl WriteStatus {
    pub fn inserted() -> Self {
        Self {
            inserted: 1,
            ..Self::default()
        }
    }

    pub fn replaced() -> Self {
        Self {
            replaced: 1,
            ..Self::default()
        }
    }

    pub fn unchanged() -> Self {
        Self {
            unchanged: 1,
            ..Self::default()
        }
    }

    pub fn skipped() -> Self {
        Self {
            skipped: 1,
            ..Self::default()
        }
    }

    /// Number of records this status accounts for.
    pub fn total(&self) -> usize {
        self.deleted + self.errors + self.inserted + self.replaced + self.skipped + self.unchanged
    }
}

impl Add for WriteStatus {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            deleted: self.deleted + rhs.deleted,
            errors: self.errors + rhs.errors,
            inserted: self.inserted + rhs.inserted,
            replaced: self.replaced + rhs.replaced,
            skipped: self.skipped + rhs.skipped,
            unchanged: self.unchanged + rhs.unchanged,
        }
    }
}

impl AddAssign for WriteStatus {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for WriteStatus {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl std::fmt::Display for WriteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "inserted={} replaced={} unchanged={} skipped={} errors={} deleted={}",
            self.inserted, self.replaced, self.unchanged, self.skipped, self.errors, self.deleted
        )
    }
}

/// Keyed JSON document storage.
pub trait DocumentStore {
    /// Fetch a record by id.
    fn get(&self, table: &str, id: &str) -> Result<Option<Record>, StoreError>;

    /// Insert-or-replace by the record's `id`.
    fn set(&self, table: &str, record: Record) -> Result<WriteStatus, StoreError>;

    /// Insert only if no record with this `id` exists; first write wins.
    ///
    /// Must be atomic per key: of two concurrent inserts of one id, exactly
    /// one reports `inserted`.
    fn insert(&self, table: &str, record: Record) -> Result<WriteStatus, StoreError>;

    /// Every record in a table, in no particular order.
    fn scan(&self, table: &str) -> Result<Vec<Record>, StoreError>;
}

impl<S: DocumentStore + ?Sized> DocumentStore for &S {
    fn get(&self, table: &str, id: &str) -> Result<Option<Record>, StoreError> {
        (**self).get(table, id)
    }

    fn set(&self, table: &str, record: Record) -> Result<WriteStatus, StoreError> {
        (**self).set(table, record)
    }

    fn insert(&self, table: &str, record: Record) -> Result<WriteStatus, StoreError> {
        (**self).insert(table, record)
    }

    fn scan(&self, table: &str) -> Result<Vec<Record>, StoreError> {
        (**self).scan(table)
    }
}

/// The record's `id` as a string (numeric ids are accepted).
pub fn record_id(table: &str, record: &Record) -> Result<String, StoreError> {
    field_str(record.get("id"))
        .filter(|id| !id.is_empty())
        .ok_or_else(|| StoreError::MissingId {
            table: table.to_string(),
        })
}

/// Table names become directory names, so only plain identifiers pass.
pub(crate) fn check_table(table: &str) -> Result<(), StoreError> {
    let ok = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidTable(table.to_string()))
    }
}
