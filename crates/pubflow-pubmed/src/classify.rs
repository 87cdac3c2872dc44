//! Classification stage
//!
//! Citations reach the classifier in batches; every batch is one blocking
//! call and its predictions are flattened back into the stream in the
//! classifier's order. A failing call ends the run.

use std::cell::Cell;
use std::time::Instant;

use anyhow::{Context, Result};
use pubflow_core::{Record, field_str};
use serde::{Deserialize, Serialize};

use crate::citation::Citation;

/// Classifier verdict for one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub document: Record,
    /// 1 = relevant, 0 = not
    pub classification: u8,
    pub probability: f64,
}

impl Prediction {
    pub fn is_positive(&self) -> bool {
        self.classification == 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentence {
    pub text: String,
    pub score: f64,
}

/// Prediction plus per-sentence scores.
#[derive(Debug, Clone, PartialEq)]
pub struct Explanation {
    pub document: Record,
    pub classification: u8,
    pub probability: f64,
    pub sentences: Vec<Sentence>,
}

impl Explanation {
    pub fn best_sentence(&self) -> Option<&Sentence> {
        best_sentence(&self.sentences)
    }
}

/// Highest-scoring sentence; the earliest one wins ties.
pub fn best_sentence(sentences: &[Sentence]) -> Option<&Sentence> {
    let mut best: Option<&Sentence> = None;
    for sentence in sentences {
        match best {
            Some(b) if sentence.score <= b.score => {}
            _ => best = Some(sentence),
        }
    }
    best
}

/// Batch classifier. Output order matches input order.
pub trait Classifier {
    fn predict(&mut self, documents: Vec<Record>) -> Result<Vec<Prediction>>;
    fn explain(&mut self, documents: Vec<Record>) -> Result<Vec<Explanation>>;
}

impl<C: Classifier + ?Sized> Classifier for &mut C {
    fn predict(&mut self, documents: Vec<Record>) -> Result<Vec<Prediction>> {
        (**self).predict(documents)
    }

    fn explain(&mut self, documents: Vec<Record>) -> Result<Vec<Explanation>> {
        (**self).explain(documents)
    }
}

type BatchOp<C, T> = fn(&mut C, Vec<Record>) -> Result<Vec<T>>;

/// Stage turning citation batches into per-document classifier output.
pub struct Classify<I, C, T> {
    inner: I,
    classifier: C,
    op: BatchOp<C, T>,
    verb: &'static str,
    pending: std::vec::IntoIter<T>,
}

/// Predict each batch.
pub fn classify<I, C>(batches: I, classifier: C) -> Classify<I, C, Prediction>
where
    I: Iterator<Item = Result<Vec<Citation>>>,
    C: Classifier,
{
    Classify {
        inner: batches,
        classifier,
        op: <C as Classifier>::predict,
        verb: "Classifying",
        pending: Vec::new().into_iter(),
    }
}

/// Explain each batch.
pub fn explain<I, C>(batches: I, classifier: C) -> Classify<I, C, Explanation>
where
    I: Iterator<Item = Result<Vec<Citation>>>,
    C: Classifier,
{
    Classify {
        inner: batches,
        classifier,
        op: <C as Classifier>::explain,
        verb: "Explaining",
        pending: Vec::new().into_iter(),
    }
}

impl<I, C, T> Classify<I, C, T>
where
    I: Iterator<Item = Result<Vec<Citation>>>,
{
    fn run_batch(&mut self, batch: Vec<Citation>) -> Result<Vec<T>> {
        let records = batch
            .iter()
            .map(Citation::to_record)
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to serialize citations")?;

        log::info!("{}: {}", self.verb, records.len());
        let start = Instant::now();
        let out = (self.op)(&mut self.classifier, records).context("Classifier call failed")?;
        log::info!(
            "Finished classification in {:.3} seconds",
            start.elapsed().as_secs_f64()
        );
        Ok(out)
    }
}

impl<I, C, T> Iterator for Classify<I, C, T>
where
    I: Iterator<Item = Result<Vec<Citation>>>,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Result<T>> {
        loop {
            if let Some(item) = self.pending.next() {
                return Some(Ok(item));
            }
            let batch = match self.inner.next()? {
                Ok(batch) => batch,
                Err(e) => return Some(Err(e)),
            };
            match self.run_batch(batch) {
                Ok(out) => self.pending = out.into_iter(),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Running hit statistics over a prediction stream.
///
/// Owned by one pipeline; stages borrow it through `observe`.
#[derive(Debug, Default)]
pub struct HitTally {
    tested: Cell<u64>,
    hits: Cell<u64>,
    probability_sum: Cell<f64>,
}

impl HitTally {
    pub fn observe(&self, prediction: &Prediction) {
        self.tested.set(self.tested.get() + 1);
        if !prediction.is_positive() {
            return;
        }
        self.hits.set(self.hits.get() + 1);
        self.probability_sum
            .set(self.probability_sum.get() + prediction.probability);

        let pmid = field_str(prediction.document.get("pmid")).unwrap_or_default();
        log::info!(
            "Identified {} hits from {} tested ({:.3}%); mean probability: {:.3} --- pmid: {}; prob={:.3}",
            self.hits(),
            self.tested(),
            self.hit_rate(),
            self.mean_probability(),
            pmid,
            prediction.probability
        );
    }

    pub fn tested(&self) -> u64 {
        self.tested.get()
    }

    pub fn hits(&self) -> u64 {
        self.hits.get()
    }

    /// Percentage of tested documents that were hits.
    pub fn hit_rate(&self) -> f64 {
        match self.tested() {
            0 => 0.0,
            t => 100.0 * self.hits() as f64 / t as f64,
        }
    }

    pub fn mean_probability(&self) -> f64 {
        match self.hits() {
            0 => 0.0,
            h => self.probability_sum.get() / h as f64,
        }
    }
}
