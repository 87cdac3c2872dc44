//! Document loader stage
//!
//! Persists each upstream document with `set` and yields the write status
//! in its place. A store failure is yielded as an error item; downstream
//! consumers stop on it.

use anyhow::{Context, Result};
use pubflow_core::Record;

use crate::store::DocumentStore;
use crate::WriteStatus;

/// Wrap `docs` so that pulling an item writes it to `table`.
pub fn load<I, S>(docs: I, store: S, table: &str) -> Load<I, S>
where
    I: Iterator<Item = Result<Record>>,
    S: DocumentStore,
{
    Load {
        docs,
        store,
        table: table.to_string(),
    }
}

pub struct Load<I, S> {
    docs: I,
    store: S,
    table: String,
}

impl<I, S> Iterator for Load<I, S>
where
    I: Iterator<Item = Result<Record>>,
    S: DocumentStore,
{
    type Item = Result<WriteStatus>;

    fn next(&mut self) -> Option<Self::Item> {
        let doc = match self.docs.next()? {
            Ok(doc) => doc,
            Err(e) => return Some(Err(e)),
        };
        let id = doc.get("id").cloned();
        let status = self
            .store
            .set(&self.table, doc)
            .with_context(|| format!("failed to store document {id:?} in {}", self.table));
        if let Ok(status) = &status {
            log::debug!("stored {id:?} in {}: {status}", self.table);
        }
        Some(status)
    }
}
