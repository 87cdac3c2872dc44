//! Pipeline assembly and execution
//!
//! Every entry point composes a lazy pipeline and then drains it from the
//! end. Nothing runs until the drain pulls, and stopping the drain (a
//! failed stage or a shutdown request) stops everything upstream of it.
//!
//! ```text
//! updates: listing -> data files -> facts -> dedup -> download ─┐   (one file per pull)
//! ids:     ids ---------------------------------------> efetch ─┤   (all ids at once)
//!                                                               v
//!   pubtype -> year -> chunk -> classify -> tally -> positives -> format
//!     -> [chunk -> PMC supplement] -> store
//! ```

use std::cell::Cell;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use pubflow_core::{Pipeline, Record, Seq, SeqExt, fmt_num};
use pubflow_store::{DocumentStore, WriteStatus, load};

use crate::citation::Citation;
use crate::classify::{Classifier, Explanation, HitTally, Prediction, classify, explain};
use crate::config::Config;
use crate::filter::{pubtype_filter, year_filter};
use crate::format::format_predictions;
use crate::listing::RemoteListing;
use crate::merge::pmc_supplement;
use crate::retrieve::{CitationSource, RetrievalStats, retrieve, retrieve_each};
use crate::updatefiles::{UPDATEFILES_PATH, data_filter, dedup, extract, to_facts};

/// Pipeline execution summary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    /// Update files or ids fed into retrieval
    pub inputs: usize,
    /// Citations that reached the classifier
    pub tested: u64,
    pub hits: u64,
    /// Provider batches (files or efetch requests) that failed and were skipped
    pub failed_batches: usize,
    pub stored: WriteStatus,
    pub elapsed: Duration,
}

/// Collaborators shared by the storing pipelines.
pub struct Services<'a> {
    pub store: &'a dyn DocumentStore,
    pub classifier: &'a mut dyn Classifier,
    /// PMC source for the author supplement; `None` skips it
    pub pmc: Option<&'a dyn CitationSource>,
    pub pb: ProgressBar,
}

impl<'a> Services<'a> {
    pub fn new(store: &'a dyn DocumentStore, classifier: &'a mut dyn Classifier) -> Self {
        Self {
            store,
            classifier,
            pmc: None,
            pb: ProgressBar::hidden(),
        }
    }

    pub fn with_pmc(mut self, pmc: &'a dyn CitationSource) -> Self {
        self.pmc = Some(pmc);
        self
    }

    pub fn with_progress(mut self, pb: ProgressBar) -> Self {
        self.pb = pb;
        self
    }
}

/// Shared tail: citations in, write statuses out.
fn classify_and_store<'a, I, C>(
    citations: Pipeline<I>,
    config: &'a Config,
    store: &'a dyn DocumentStore,
    classifier: C,
    pmc: Option<&'a dyn CitationSource>,
    tally: &'a HitTally,
) -> Result<Seq<'a, Result<WriteStatus>>>
where
    I: Iterator<Item = Result<Citation>> + 'a,
    C: Classifier + 'a,
{
    let min_year = config.min_year;
    let documents = citations
        .pipe(pubtype_filter)
        .pipe(move |seq| year_filter(seq, min_year))
        .try_pipe(|seq| seq.chunked(config.classify_batch_size))?
        .pipe(move |batches| classify(batches, classifier))
        .pipe(move |predictions| predictions.inspect_ok(move |p| tally.observe(p)))
        .pipe(|predictions| predictions.filter_ok(Prediction::is_positive))
        .pipe(format_predictions)
        .boxed();

    let documents: Seq<'a, Result<Record>> = match pmc.filter(|_| config.supplement_pmc) {
        Some(source) => documents
            .try_pipe(|docs| docs.chunked(config.supplement_batch_size))?
            .pipe(move |chunks| pmc_supplement(chunks, source))
            .boxed()
            .into_iter(),
        None => documents.into_iter(),
    };

    Ok(Box::new(load(documents, store, &config.documents_table)))
}

/// Pull every write status; stops early on a shutdown request.
fn drain(statuses: Seq<'_, Result<WriteStatus>>, pb: &ProgressBar) -> Result<WriteStatus> {
    let mut total = WriteStatus::default();
    for status in statuses.until_shutdown() {
        total += status?;
        pb.set_message(format!("stored {}", fmt_num(total.total())));
    }
    Ok(total)
}

fn finish(
    inputs: usize,
    tally: &HitTally,
    retrieval: RetrievalStats,
    stored: WriteStatus,
    start: Instant,
) -> Summary {
    let summary = Summary {
        inputs,
        tested: tally.tested(),
        hits: tally.hits(),
        failed_batches: retrieval.failed_batches,
        stored,
        elapsed: start.elapsed(),
    };
    log::info!(
        "Done: {} inputs ({} failed batches), {} tested, {} hits, {} in {:.1}s",
        summary.inputs,
        summary.failed_batches,
        summary.tested,
        summary.hits,
        summary.stored,
        summary.elapsed.as_secs_f64()
    );
    summary
}

/// Classify and store the citations of update files not seen before.
///
/// A file name is recorded in the contents ledger when it is pulled for
/// download, one file at a time. Files after a fatal error stay unrecorded
/// and are picked up by the next run.
pub fn run_updates<L, D>(
    config: &Config,
    listing: &L,
    downloads: &D,
    services: Services<'_>,
) -> Result<Summary>
where
    L: RemoteListing + ?Sized,
    D: CitationSource + ?Sized,
{
    config.validate()?;
    let start = Instant::now();
    let Services {
        store,
        classifier,
        pmc,
        pb,
    } = services;
    let tally = HitTally::default();
    let files = Cell::new(0usize);
    let files_ref = &files;
    let retrieval = Cell::new(RetrievalStats::default());
    let retrieval_ref = &retrieval;
    let contents_table = config.contents_table.as_str();
    let max_files = config.max_files.unwrap_or(usize::MAX);

    let citations = Pipeline::source(move || extract(listing, UPDATEFILES_PATH))
        .pipe(data_filter)
        .pipe(to_facts)
        .pipe(move |facts| dedup(facts, store, contents_table))
        .pipe(move |names| names.limit(max_files))
        .pipe(move |names| names.inspect_ok(move |_| files_ref.set(files_ref.get() + 1)))
        .pipe(move |names| retrieve_each(names, downloads).report_to(retrieval_ref));

    let statuses = classify_and_store(citations, config, store, classifier, pmc, &tally)?;
    let stored = drain(statuses, &pb).context("Update pipeline failed")?;
    pb.finish_and_clear();
    Ok(finish(files.get(), &tally, retrieval.get(), stored, start))
}

/// Classify and store the citations for a list of PubMed ids.
pub fn run_ids<I, S>(config: &Config, ids: I, source: &S, services: Services<'_>) -> Result<Summary>
where
    I: Iterator<Item = Result<String>>,
    S: CitationSource + ?Sized,
{
    config.validate()?;
    let start = Instant::now();
    let Services {
        store,
        classifier,
        pmc,
        pb,
    } = services;
    let tally = HitTally::default();
    let count = Cell::new(0usize);
    let count_ref = &count;
    let retrieval = Cell::new(RetrievalStats::default());
    let retrieval_ref = &retrieval;
    let max_ids = config.max_ids.unwrap_or(usize::MAX);

    let citations = Pipeline::source(move || ids)
        .pipe(move |ids| ids.limit(max_ids))
        .pipe(move |ids| ids.inspect_ok(move |_| count_ref.set(count_ref.get() + 1)))
        .pipe(move |ids| retrieve(ids, source).report_to(retrieval_ref));

    let statuses = classify_and_store(citations, config, store, classifier, pmc, &tally)?;
    let stored = drain(statuses, &pb).context("Id pipeline failed")?;
    pb.finish_and_clear();
    Ok(finish(count.get(), &tally, retrieval.get(), stored, start))
}

/// Score citations for a list of ids, sentence by sentence. Nothing is
/// filtered or stored; the returned sequence is lazy.
pub fn explain_ids<'a, I, S, C>(
    config: &'a Config,
    ids: I,
    source: &'a S,
    classifier: C,
) -> Result<Seq<'a, Result<Explanation>>>
where
    I: Iterator<Item = Result<String>> + 'a,
    S: CitationSource + ?Sized,
    C: Classifier + 'a,
{
    config.validate()?;
    let max_ids = config.max_ids.unwrap_or(usize::MAX);
    let explanations = Pipeline::source(move || ids)
        .pipe(move |ids| ids.limit(max_ids))
        .pipe(move |ids| retrieve(ids, source))
        .try_pipe(|citations| citations.chunked(config.classify_batch_size))?
        .pipe(move |batches| explain(batches, classifier))
        .boxed();
    Ok(explanations.into_iter())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Sentence;
    use crate::retrieve::{RetrievalBatch, RetrievalFailure};
    use pubflow_store::MemoryStore;

    struct OneEach;

    impl CitationSource for OneEach {
        fn retrieve<'s>(
            &'s self,
            ids: Vec<String>,
        ) -> Box<dyn Iterator<Item = RetrievalBatch> + 's> {
            Box::new(ids.into_iter().map(|pmid| {
                if pmid == "bad" {
                    return Err(RetrievalFailure::new("HTTP 500", vec![pmid]));
                }
                Ok(vec![Citation {
                    pmid,
                    pmc: Some("PMC1".into()),
                    publication_type_list: vec!["D016428".into()],
                    ..Default::default()
                }])
            }))
        }
    }

    /// Records every PMC request; returns nothing.
    #[derive(Default)]
    struct PmcCalls(std::cell::RefCell<Vec<Vec<String>>>);

    impl CitationSource for PmcCalls {
        fn retrieve<'s>(
            &'s self,
            ids: Vec<String>,
        ) -> Box<dyn Iterator<Item = RetrievalBatch> + 's> {
            self.0.borrow_mut().push(ids);
            Box::new(std::iter::empty())
        }
    }

    struct AllPositive;

    impl Classifier for AllPositive {
        fn predict(&mut self, documents: Vec<Record>) -> Result<Vec<Prediction>> {
            Ok(documents
                .into_iter()
                .map(|document| Prediction {
                    document,
                    classification: 1,
                    probability: 0.999,
                })
                .collect())
        }

        fn explain(&mut self, documents: Vec<Record>) -> Result<Vec<Explanation>> {
            Ok(documents
                .into_iter()
                .map(|document| Explanation {
                    document,
                    classification: 1,
                    probability: 0.999,
                    sentences: vec![Sentence {
                        text: "pathway".into(),
                        score: 0.5,
                    }],
                })
                .collect())
        }
    }

    fn ids(list: &[&str]) -> impl Iterator<Item = Result<String>> {
        list.iter()
            .map(|s| Ok(s.to_string()))
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn ids_pipeline_stores_documents() {
        let store = MemoryStore::new();
        let mut classifier = AllPositive;
        let config = Config {
            classify_batch_size: 2,
            ..Default::default()
        };
        let summary = run_ids(
            &config,
            ids(&["1", "2", "3"]),
            &OneEach,
            Services::new(&store, &mut classifier),
        )
        .unwrap();
        assert_eq!(summary.inputs, 3);
        assert_eq!(summary.tested, 3);
        assert_eq!(summary.hits, 3);
        assert_eq!(summary.stored.inserted, 3);
        assert!(store.get("documents", "2").unwrap().is_some());
    }

    #[test]
    fn max_ids_caps_input() {
        let store = MemoryStore::new();
        let mut classifier = AllPositive;
        let config = Config {
            max_ids: Some(1),
            ..Default::default()
        };
        let summary = run_ids(
            &config,
            ids(&["1", "2"]),
            &OneEach,
            Services::new(&store, &mut classifier),
        )
        .unwrap();
        assert_eq!(summary.inputs, 1);
        assert_eq!(store.len("documents"), 1);
    }

    #[test]
    fn failed_batches_are_reported() {
        let store = MemoryStore::new();
        let mut classifier = AllPositive;
        let summary = run_ids(
            &Config::default(),
            ids(&["1", "bad", "2"]),
            &OneEach,
            Services::new(&store, &mut classifier),
        )
        .unwrap();
        assert_eq!(summary.inputs, 3);
        assert_eq!(summary.failed_batches, 1);
        assert_eq!(summary.stored.inserted, 2);
    }

    #[test]
    fn supplement_switch_is_honored() {
        for enabled in [true, false] {
            let store = MemoryStore::new();
            let mut classifier = AllPositive;
            let pmc = PmcCalls::default();
            let config = Config {
                supplement_pmc: enabled,
                ..Default::default()
            };
            let summary = run_ids(
                &config,
                ids(&["1"]),
                &OneEach,
                Services::new(&store, &mut classifier).with_pmc(&pmc),
            )
            .unwrap();
            assert_eq!(summary.stored.inserted, 1);
            let calls = pmc.0.borrow();
            if enabled {
                assert_eq!(*calls, vec![vec!["PMC1"]]);
            } else {
                assert!(calls.is_empty());
            }
        }
    }

    #[test]
    fn invalid_config_fails_before_work() {
        let store = MemoryStore::new();
        let mut classifier = AllPositive;
        let config = Config {
            classify_batch_size: 0,
            ..Default::default()
        };
        let result = run_ids(
            &config,
            ids(&["1"]),
            &OneEach,
            Services::new(&store, &mut classifier),
        );
        assert!(result.is_err());
        assert!(store.is_empty("documents"));
    }

    #[test]
    fn explain_yields_best_sentences() {
        let config = Config::default();
        let out: Vec<Explanation> = explain_ids(&config, ids(&["7"]), &OneEach, AllPositive)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].document["pmid"], serde_json::json!("7"));
        assert_eq!(out[0].best_sentence().unwrap().text, "pathway");
    }
}
