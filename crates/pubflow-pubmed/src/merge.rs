//! PMC supplement and author merge
//!
//! PubMed rarely lists author emails; the PMC copy of an article often
//! does. Stored documents are topped up from their PMC citation: per-author
//! emails are merged in and correspondence notes appended.

use anyhow::Result;
use pubflow_core::{Record, field_str};
use serde_json::Value;

use crate::citation::{Citation, unique_in_order};
use crate::retrieve::CitationSource;

fn as_name(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

/// Merge `citation`'s author emails and correspondence into `doc`.
///
/// New emails go in front of the ones already stored, without duplicates.
/// Authors are matched on (`fore_name`, `last_name`); unmatched authors are
/// ignored.
pub fn supplement_author(doc: &mut Record, citation: &Citation) -> Result<(), serde_json::Error> {
    let mut correspondence = match doc.remove("correspondence") {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };
    for entry in &citation.correspondence {
        correspondence.push(serde_json::to_value(entry)?);
    }
    doc.insert("correspondence".into(), Value::Array(correspondence));

    let Some(Value::Array(doc_authors)) = doc.get_mut("author_list") else {
        return Ok(());
    };

    for author in citation.author_list.iter().filter(|a| a.has_emails()) {
        let matching = doc_authors.iter_mut().find(|doc_author| {
            as_name(doc_author.get("fore_name")) == author.fore_name.as_deref()
                && as_name(doc_author.get("last_name")) == author.last_name.as_deref()
        });
        let Some(Value::Object(doc_author)) = matching else {
            continue;
        };

        let mut emails = author.emails.clone().unwrap_or_default();
        emails.extend(string_list(doc_author.get("emails")));
        let merged = unique_in_order(emails).into_iter().map(Value::String).collect();
        doc_author.insert("emails".into(), Value::Array(merged));
    }

    Ok(())
}

/// Supplement each document from the citation with the same pmid.
/// Returns how many citations found a document.
pub fn supplement_docs(docs: &mut [Record], citations: &[Citation]) -> Result<usize, serde_json::Error> {
    let mut matched = 0;
    for citation in citations {
        let doc = docs
            .iter_mut()
            .find(|doc| field_str(doc.get("pmid")).as_deref() == Some(citation.pmid.as_str()));
        if let Some(doc) = doc {
            supplement_author(doc, citation)?;
            matched += 1;
        }
    }
    Ok(matched)
}

/// Stage over document chunks: fetch the chunk's PMC citations, merge
/// them in, then yield the chunk's documents one at a time.
pub struct PmcSupplement<'s, I, S: ?Sized> {
    chunks: I,
    source: &'s S,
    pending: std::vec::IntoIter<Record>,
}

pub fn pmc_supplement<'s, I, S>(chunks: I, source: &'s S) -> PmcSupplement<'s, I, S>
where
    I: Iterator<Item = Result<Vec<Record>>>,
    S: CitationSource + ?Sized,
{
    PmcSupplement {
        chunks,
        source,
        pending: Vec::new().into_iter(),
    }
}

impl<I, S> PmcSupplement<'_, I, S>
where
    S: CitationSource + ?Sized,
{
    fn supplement(&self, docs: &mut [Record]) -> Result<()> {
        let ids: Vec<String> = docs
            .iter()
            .filter_map(|doc| field_str(doc.get("pmc")))
            .filter(|id| !id.is_empty())
            .collect();
        log::info!("Retrieving {} PMC IDs", ids.len());
        if ids.is_empty() {
            return Ok(());
        }

        for batch in self.source.retrieve(ids) {
            match batch {
                Ok(citations) => {
                    log::info!("Downloaded {} pmc citations", citations.len());
                    supplement_docs(docs, &citations)?;
                }
                Err(failure) => {
                    log::error!("Error retrieving ids: {:?} ({})", failure.ids, failure.reason)
                }
            }
        }
        Ok(())
    }
}

impl<I, S> Iterator for PmcSupplement<'_, I, S>
where
    I: Iterator<Item = Result<Vec<Record>>>,
    S: CitationSource + ?Sized,
{
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Result<Record>> {
        loop {
            if let Some(doc) = self.pending.next() {
                return Some(Ok(doc));
            }
            let mut docs = match self.chunks.next()? {
                Ok(docs) => docs,
                Err(e) => return Some(Err(e)),
            };
            if let Err(e) = self.supplement(&mut docs) {
                return Some(Err(e));
            }
            self.pending = docs.into_iter();
        }
    }
}
