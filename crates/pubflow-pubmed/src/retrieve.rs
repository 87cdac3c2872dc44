//! Retrieval adapter stage
//!
//! Turns a stream of identifiers into a stream of citations by way of a
//! [`CitationSource`]. [`retrieve`] collects the id stream in full on the
//! first pull so the source can batch freely. [`retrieve_each`] pulls one
//! id at a time and asks the source for it alone, which keeps upstream
//! side effects (the update-file ledger) in step with the downloads.

use std::cell::Cell;
use std::fmt;

use anyhow::Result;

use crate::citation::Citation;

/// A provider batch that could not be retrieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalFailure {
    pub reason: String,
    /// Ids the failed batch covered
    pub ids: Vec<String>,
}

impl RetrievalFailure {
    pub fn new(reason: impl fmt::Display, ids: Vec<String>) -> Self {
        Self {
            reason: reason.to_string(),
            ids,
        }
    }
}

impl fmt::Display for RetrievalFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "retrieval of {} ids failed: {}", self.ids.len(), self.reason)
    }
}

impl std::error::Error for RetrievalFailure {}

pub type RetrievalBatch = Result<Vec<Citation>, RetrievalFailure>;

/// Anything that can turn ids into citations, one provider batch at a time.
pub trait CitationSource {
    fn retrieve<'s>(&'s self, ids: Vec<String>) -> Box<dyn Iterator<Item = RetrievalBatch> + 's>;
}

impl<S: CitationSource + ?Sized> CitationSource for &S {
    fn retrieve<'s>(&'s self, ids: Vec<String>) -> Box<dyn Iterator<Item = RetrievalBatch> + 's> {
        (**self).retrieve(ids)
    }
}

/// Outcome counts for one retrieval stage.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalStats {
    pub batches: usize,
    pub failed_batches: usize,
    pub citations: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Materialize every id, one `retrieve` call
    Collect,
    /// One `retrieve` call per pulled id
    Each,
}

/// Stage yielding the citations of every successful batch. Failed batches
/// are logged and dropped.
pub struct Retrieve<'s, I, S: ?Sized> {
    source: &'s S,
    mode: Mode,
    ids: Option<I>,
    batches: Option<Box<dyn Iterator<Item = RetrievalBatch> + 's>>,
    current: std::vec::IntoIter<Citation>,
    stats: RetrievalStats,
    shared: Option<&'s Cell<RetrievalStats>>,
}

fn stage<'s, I, S: ?Sized>(ids: I, source: &'s S, mode: Mode) -> Retrieve<'s, I, S> {
    Retrieve {
        source,
        mode,
        ids: Some(ids),
        batches: None,
        current: Vec::new().into_iter(),
        stats: RetrievalStats::default(),
        shared: None,
    }
}

/// Build the retrieval stage over `ids`, collected on the first pull.
pub fn retrieve<'s, I, S>(ids: I, source: &'s S) -> Retrieve<'s, I, S>
where
    I: Iterator<Item = Result<String>>,
    S: CitationSource + ?Sized,
{
    stage(ids, source, Mode::Collect)
}

/// Build the retrieval stage over `ids`, pulling the next id only once the
/// previous one's citations are used up.
pub fn retrieve_each<'s, I, S>(ids: I, source: &'s S) -> Retrieve<'s, I, S>
where
    I: Iterator<Item = Result<String>>,
    S: CitationSource + ?Sized,
{
    stage(ids, source, Mode::Each)
}

impl<'s, I, S: ?Sized> Retrieve<'s, I, S> {
    pub fn stats(&self) -> RetrievalStats {
        self.stats
    }

    /// Mirror the stage's counts into `cell` as batches complete.
    pub fn report_to(mut self, cell: &'s Cell<RetrievalStats>) -> Self {
        cell.set(self.stats);
        self.shared = Some(cell);
        self
    }

    fn record(&mut self, batch: RetrievalBatch) {
        self.stats.batches += 1;
        match batch {
            Ok(citations) => {
                self.stats.citations += citations.len();
                log::info!("Downloaded {} citations", citations.len());
                self.current = citations.into_iter();
            }
            Err(failure) => {
                self.stats.failed_batches += 1;
                log::error!("Error retrieving ids: {:?} ({})", failure.ids, failure.reason);
            }
        }
        if let Some(cell) = self.shared {
            cell.set(self.stats);
        }
    }
}

impl<'s, I, S> Iterator for Retrieve<'s, I, S>
where
    I: Iterator<Item = Result<String>>,
    S: CitationSource + ?Sized,
{
    type Item = Result<Citation>;

    fn next(&mut self) -> Option<Result<Citation>> {
        loop {
            if let Some(citation) = self.current.next() {
                return Some(Ok(citation));
            }
            if let Some(batch) = self.batches.as_mut().and_then(|b| b.next()) {
                self.record(batch);
                continue;
            }
            self.batches = None;

            let ids = match self.mode {
                Mode::Collect => match self.ids.take()?.collect::<Result<Vec<_>>>() {
                    Ok(ids) => ids,
                    Err(e) => return Some(Err(e)),
                },
                Mode::Each => match self.ids.as_mut()?.next() {
                    Some(Ok(id)) => vec![id],
                    Some(Err(e)) => return Some(Err(e)),
                    None => {
                        self.ids = None;
                        return None;
                    }
                },
            };
            log::debug!("Retrieving {} ids", ids.len());
            self.batches = Some(self.source.retrieve(ids));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::cell::RefCell;

    /// Batches of two; any batch containing "bad" fails.
    struct PairSource {
        seen: RefCell<Vec<Vec<String>>>,
    }

    impl PairSource {
        fn new() -> Self {
            Self {
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl CitationSource for PairSource {
        fn retrieve<'s>(
            &'s self,
            ids: Vec<String>,
        ) -> Box<dyn Iterator<Item = RetrievalBatch> + 's> {
            self.seen.borrow_mut().push(ids.clone());
            let batches: Vec<Vec<String>> = ids.chunks(2).map(|c| c.to_vec()).collect();
            Box::new(batches.into_iter().map(|batch| {
                if batch.iter().any(|id| id == "bad") {
                    Err(RetrievalFailure::new("HTTP 500", batch))
                } else {
                    Ok(batch
                        .into_iter()
                        .map(|pmid| Citation {
                            pmid,
                            ..Default::default()
                        })
                        .collect())
                }
            }))
        }
    }

    fn ids(list: &[&str]) -> impl Iterator<Item = Result<String>> {
        list.iter()
            .map(|s| Ok(s.to_string()))
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn flattens_successful_batches() {
        let source = PairSource::new();
        let pmids: Vec<String> = retrieve(ids(&["1", "2", "3"]), &source)
            .map(|c| c.unwrap().pmid)
            .collect();
        assert_eq!(pmids, vec!["1", "2", "3"]);
    }

    #[test]
    fn failed_batch_is_dropped() {
        let source = PairSource::new();
        let mut stage = retrieve(ids(&["1", "2", "bad", "3", "4"]), &source);
        let pmids: Vec<String> = stage.by_ref().map(|c| c.unwrap().pmid).collect();
        assert_eq!(pmids, vec!["1", "2", "4"]);
        assert_eq!(
            stage.stats(),
            RetrievalStats {
                batches: 3,
                failed_batches: 1,
                citations: 3
            }
        );
    }

    #[test]
    fn ids_are_materialized_once_on_first_pull() {
        let source = PairSource::new();
        let mut stage = retrieve(ids(&["1", "2", "3"]), &source);
        assert!(source.seen.borrow().is_empty());
        stage.next();
        assert_eq!(source.seen.borrow().len(), 1);
        assert_eq!(source.seen.borrow()[0], vec!["1", "2", "3"]);
        stage.by_ref().for_each(drop);
        assert_eq!(source.seen.borrow().len(), 1);
    }

    #[test]
    fn upstream_error_surfaces() {
        let source = PairSource::new();
        let input = vec![Ok("1".to_string()), Err(anyhow!("bad input"))];
        let mut stage = retrieve(input.into_iter(), &source);
        assert!(stage.next().unwrap().is_err());
        assert!(source.seen.borrow().is_empty());
    }

    #[test]
    fn each_mode_pulls_one_id_per_call() {
        let source = PairSource::new();
        let pulled = Cell::new(0);
        let input = ids(&["1", "2", "3"]).inspect(|_| pulled.set(pulled.get() + 1));
        let mut stage = retrieve_each(input, &source);

        assert_eq!(stage.next().unwrap().unwrap().pmid, "1");
        assert_eq!(pulled.get(), 1);
        assert_eq!(source.seen.borrow().len(), 1);

        let rest: Vec<String> = stage.map(|c| c.unwrap().pmid).collect();
        assert_eq!(rest, vec!["2", "3"]);
        assert_eq!(pulled.get(), 3);
        assert_eq!(
            *source.seen.borrow(),
            vec![vec!["1"], vec!["2"], vec!["3"]]
        );
    }

    #[test]
    fn each_mode_skips_failed_ids() {
        let source = PairSource::new();
        let stats = Cell::new(RetrievalStats::default());
        let pmids: Vec<String> = retrieve_each(ids(&["1", "bad", "2"]), &source)
            .report_to(&stats)
            .map(|c| c.unwrap().pmid)
            .collect();
        assert_eq!(pmids, vec!["1", "2"]);
        assert_eq!(stats.get().failed_batches, 1);
        assert_eq!(stats.get().batches, 3);
    }

    #[test]
    fn shared_stats_follow_the_stage() {
        let source = PairSource::new();
        let stats = Cell::new(RetrievalStats::default());
        let count = retrieve(ids(&["1", "bad", "2"]), &source)
            .report_to(&stats)
            .count();
        // "1" shares a provider batch with "bad"
        assert_eq!(count, 1);
        assert_eq!(
            stats.get(),
            RetrievalStats {
                batches: 2,
                failed_batches: 1,
                citations: 1
            }
        );
    }

    #[test]
    fn failure_display() {
        let failure = RetrievalFailure::new("timeout", vec!["1".into(), "2".into()]);
        assert_eq!(failure.to_string(), "retrieval of 2 ids failed: timeout");
    }
}
