//! In-process store

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use pubflow_core::Record;

use crate::store::{DocumentStore, StoreError, WriteStatus, check_table, record_id};

type Tables = HashMap<String, BTreeMap<String, Record>>;

/// Store backed by a mutex-guarded map. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of records in a table.
    pub fn len(&self, table: &str) -> usize {
        self.tables().get(table).map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, table: &str, id: &str) -> Result<Option<Record>, StoreError> {
        check_table(table)?;
        Ok(self.tables().get(table).and_then(|t| t.get(id)).cloned())
    }

    fn set(&self, table: &str, record: Record) -> Result<WriteStatus, StoreError> {
        check_table(table)?;
        let id = record_id(table, &record)?;
        let mut tables = self.tables();
        let rows = tables.entry(table.to_string()).or_default();
        let status = match rows.get(&id) {
            Some(existing) if *existing == record => WriteStatus::unchanged(),
            Some(_) => WriteStatus::replaced(),
            None => WriteStatus::inserted(),
        };
        rows.insert(id, record);
        Ok(status)
    }

    fn insert(&self, table: &str, record: Record) -> Result<WriteStatus, StoreError> {
        check_table(table)?;
        let id = record_id(table, &record)?;
        let mut tables = self.tables();
        let rows = tables.entry(table.to_string()).or_default();
        if rows.contains_key(&id) {
            return Ok(WriteStatus::skipped());
        }
        rows.insert(id, record);
        Ok(WriteStatus::inserted())
    }

    fn scan(&self, table: &str) -> Result<Vec<Record>, StoreError> {
        check_table(table)?;
        Ok(self
            .tables()
            .get(table)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn set_reports_insert_replace_unchanged() {
        let store = MemoryStore::new();
        let r = record(json!({"id": "1", "v": 1}));
        assert_eq!(store.set("t", r.clone()).unwrap(), WriteStatus::inserted());
        assert_eq!(store.set("t", r).unwrap(), WriteStatus::unchanged());
        let r2 = record(json!({"id": "1", "v": 2}));
        assert_eq!(store.set("t", r2).unwrap(), WriteStatus::replaced());
        assert_eq!(store.get("t", "1").unwrap().unwrap()["v"], json!(2));
    }

    #[test]
    fn insert_first_write_wins() {
        let store = MemoryStore::new();
        let first = record(json!({"id": "a", "v": "first"}));
        let second = record(json!({"id": "a", "v": "second"}));
        assert_eq!(store.insert("t", first).unwrap(), WriteStatus::inserted());
        assert_eq!(store.insert("t", second).unwrap(), WriteStatus::skipped());
        assert_eq!(store.get("t", "a").unwrap().unwrap()["v"], json!("first"));
        assert_eq!(store.len("t"), 1);
    }

    #[test]
    fn tables_are_separate() {
        let store = MemoryStore::new();
        store.set("a", record(json!({"id": "1"}))).unwrap();
        assert!(store.get("b", "1").unwrap().is_none());
        assert!(store.is_empty("b"));
        assert_eq!(store.scan("a").unwrap().len(), 1);
    }

    #[test]
    fn missing_id_rejected() {
        let store = MemoryStore::new();
        assert!(store.set("t", record(json!({"x": 1}))).is_err());
    }
}
