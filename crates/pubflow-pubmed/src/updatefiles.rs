//! Update-file discovery
//!
//! Lists the remote update directory, keeps the PubMed data archives and
//! records each one in a ledger table the first time it is seen. Only
//! names that were not in the ledger come out the other end, so repeated
//! runs over the same listing are idempotent.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use pubflow_core::{Deferred, Record, SeqExt};
use pubflow_store::{DocumentStore, record_id};
use regex::Regex;
use serde_json::Value;

use crate::listing::RemoteListing;

/// Path of the update files under the NCBI PubMed root.
pub const UPDATEFILES_PATH: &str = "updatefiles";

static DATA_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^pubmed.+\.xml\.gz$").expect("invalid data file pattern"));

/// Whether `name` is a data archive (not a checksum or stats sidecar).
pub fn is_data_file(name: &str) -> bool {
    DATA_FILE_RE.is_match(name)
}

/// Lazily list `path`; the listing is requested on the first pull.
pub fn extract<'a, L>(listing: &'a L, path: &'a str) -> impl Iterator<Item = Result<(String, Record)>> + 'a
where
    L: RemoteListing + ?Sized,
{
    Deferred::new(move || {
        let (entries, error) = match listing.list(path) {
            Ok(entries) => (entries, None),
            Err(e) => (Vec::new(), Some(Err(e))),
        };
        entries.into_iter().map(Ok).chain(error)
    })
}

/// Keep data archives only.
pub fn data_filter<I>(contents: I) -> impl Iterator<Item = Result<(String, Record)>>
where
    I: Iterator<Item = Result<(String, Record)>>,
{
    contents.filter_ok(|(name, _)| is_data_file(name))
}

/// `(name, facts)` -> ledger record keyed by the file name.
pub fn to_fact((name, mut facts): (String, Record)) -> Record {
    facts.insert("id".into(), Value::String(name.clone()));
    facts.insert("filename".into(), Value::String(name));
    facts
}

/// Map listing entries to ledger records.
pub fn to_facts<I>(contents: I) -> impl Iterator<Item = Result<Record>>
where
    I: Iterator<Item = Result<(String, Record)>>,
{
    contents.map(|item| item.map(to_fact))
}

/// Ledger check-and-record for one fact at a time.
pub struct DedupFilter<S> {
    store: S,
    table: String,
}

impl<S: DocumentStore> DedupFilter<S> {
    pub fn new(store: S, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }

    /// Record `fact` if its id is new. Returns the id when this call was
    /// the one that recorded it.
    pub fn admit(&self, fact: Record) -> Result<Option<String>> {
        let id = record_id(&self.table, &fact)?;
        if self
            .store
            .get(&self.table, &id)
            .with_context(|| format!("Failed to look up {id} in {}", self.table))?
            .is_some()
        {
            log::debug!("Already processed: {id}");
            return Ok(None);
        }

        let status = self
            .store
            .insert(&self.table, fact)
            .with_context(|| format!("Failed to record {id} in {}", self.table))?;
        if status.inserted == 0 {
            // Lost a race with another run
            log::debug!("Already processed: {id} ({status})");
            return Ok(None);
        }

        log::info!("New file: {id}");
        Ok(Some(id))
    }
}

pub struct Dedup<I, S> {
    facts: I,
    filter: DedupFilter<S>,
}

/// Dedup stage: yields the names of newly recorded files.
pub fn dedup<I, S>(facts: I, store: S, table: &str) -> Dedup<I, S>
where
    I: Iterator<Item = Result<Record>>,
    S: DocumentStore,
{
    Dedup {
        facts,
        filter: DedupFilter::new(store, table),
    }
}

impl<I, S> Iterator for Dedup<I, S>
where
    I: Iterator<Item = Result<Record>>,
    S: DocumentStore,
{
    type Item = Result<String>;

    fn next(&mut self) -> Option<Result<String>> {
        loop {
            let fact = match self.facts.next()? {
                Ok(fact) => fact,
                Err(e) => return Some(Err(e)),
            };
            match self.filter.admit(fact) {
                Ok(Some(id)) => return Some(Ok(id)),
                Ok(None) => {}
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Discovery pipeline: list, keep archives, convert, dedup.
pub fn discover<'a, L, S>(
    listing: &'a L,
    path: &'a str,
    store: S,
    table: &'a str,
) -> impl Iterator<Item = Result<String>> + 'a
where
    L: RemoteListing + ?Sized,
    S: DocumentStore + 'a,
{
    dedup(to_facts(data_filter(extract(listing, path))), store, table)
}
