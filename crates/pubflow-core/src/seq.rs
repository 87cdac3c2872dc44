//! Lazy sequence combinators
//!
//! Every combinator wraps an iterator and pulls from it only when its own
//! `next` is called, so a chain of them streams one item (or one batch) at a
//! time. Fallible stages carry `Result<T, E>` items; errors travel downstream
//! untouched and the terminal consumer decides whether to stop.

use std::iter::Fuse;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;

use crate::error::PipelineError;
use crate::record::FieldAccess;

/// Extension methods for building pipeline stages out of iterators.
pub trait SeqExt: Iterator + Sized {
    /// Yield at most `n` items. Never pulls from the input once the budget
    /// is spent, so `limit(0)` does not touch the input at all.
    fn limit(self, n: usize) -> Limit<Self> {
        Limit {
            inner: self,
            quota: Quota::new(n),
        }
    }

    /// Group `Ok` items into ordered batches of `size`. The final batch may
    /// be shorter; empty input yields no batch.
    fn chunked<T, E>(self, size: usize) -> Result<Chunks<Self, T>, PipelineError>
    where
        Self: Iterator<Item = Result<T, E>>,
    {
        if size == 0 {
            return Err(PipelineError::configuration("chunk size must be > 0"));
        }
        Ok(Chunks {
            inner: self.fuse(),
            size,
            buf: Vec::with_capacity(size),
        })
    }

    /// Keep `Ok` items accepted by a fallible predicate. Predicate errors are
    /// emitted in place of the item.
    fn try_filter<T, E, P>(self, predicate: P) -> TryFilter<Self, P>
    where
        Self: Iterator<Item = Result<T, E>>,
        P: FnMut(&T) -> Result<bool, E>,
    {
        TryFilter {
            inner: self,
            predicate,
        }
    }

    /// Keep `Ok` items accepted by `predicate`; errors pass through.
    fn filter_ok<T, E, P>(self, predicate: P) -> FilterOk<Self, P>
    where
        Self: Iterator<Item = Result<T, E>>,
        P: FnMut(&T) -> bool,
    {
        FilterOk {
            inner: self,
            predicate,
        }
    }

    /// Replace each `Ok` item by its `field` value.
    fn project<T, E>(self, field: &str) -> Project<Self>
    where
        Self: Iterator<Item = Result<T, E>>,
        T: FieldAccess,
        E: From<PipelineError>,
    {
        Project {
            inner: self,
            field: field.to_string(),
        }
    }

    /// Observe `Ok` items without changing the sequence.
    fn inspect_ok<T, E, F>(self, f: F) -> InspectOk<Self, F>
    where
        Self: Iterator<Item = Result<T, E>>,
        F: FnMut(&T),
    {
        InspectOk { inner: self, f }
    }

    /// Stop pulling once `flag` is raised.
    fn until(self, flag: &'static AtomicBool) -> Until<Self> {
        Until { inner: self, flag }
    }

    /// Stop pulling once a shutdown has been requested.
    fn until_shutdown(self) -> Until<Self> {
        self.until(crate::shutdown::shutdown_flag())
    }
}

impl<I: Iterator> SeqExt for I {}

/// Drain a sequence, returning the number of `Ok` items or the first error.
pub fn exhaust<I, T, E>(seq: I) -> Result<usize, E>
where
    I: IntoIterator<Item = Result<T, E>>,
{
    let mut count = 0usize;
    for item in seq {
        item?;
        count += 1;
    }
    Ok(count)
}

/// Remaining-item budget owned by a single [`Limit`] stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    remaining: usize,
}

impl Quota {
    pub const fn new(n: usize) -> Self {
        Self { remaining: n }
    }

    /// Take one unit of budget. `false` once exhausted.
    pub fn accept(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

#[derive(Debug)]
pub struct Limit<I> {
    inner: I,
    quota: Quota,
}

impl<I: Iterator> Iterator for Limit<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<I::Item> {
        if !self.quota.accept() {
            return None;
        }
        self.inner.next()
    }
}

#[derive(Debug)]
pub struct Chunks<I, T> {
    inner: Fuse<I>,
    size: usize,
    buf: Vec<T>,
}

impl<I, T, E> Iterator for Chunks<I, T>
where
    I: Iterator<Item = Result<T, E>>,
{
    type Item = Result<Vec<T>, E>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next() {
                Some(Ok(item)) => {
                    self.buf.push(item);
                    if self.buf.len() == self.size {
                        let full = std::mem::replace(&mut self.buf, Vec::with_capacity(self.size));
                        return Some(Ok(full));
                    }
                }
                Some(Err(e)) => return Some(Err(e)),
                None if self.buf.is_empty() => return None,
                None => return Some(Ok(std::mem::take(&mut self.buf))),
            }
        }
    }
}

pub struct TryFilter<I, P> {
    inner: I,
    predicate: P,
}

impl<I, P, T, E> Iterator for TryFilter<I, P>
where
    I: Iterator<Item = Result<T, E>>,
    P: FnMut(&T) -> Result<bool, E>,
{
    type Item = Result<T, E>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next()? {
                Ok(item) => match (self.predicate)(&item) {
                    Ok(true) => return Some(Ok(item)),
                    Ok(false) => {}
                    Err(e) => return Some(Err(e)),
                },
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

pub struct FilterOk<I, P> {
    inner: I,
    predicate: P,
}

impl<I, P, T, E> Iterator for FilterOk<I, P>
where
    I: Iterator<Item = Result<T, E>>,
    P: FnMut(&T) -> bool,
{
    type Item = Result<T, E>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next()? {
                Ok(item) if (self.predicate)(&item) => return Some(Ok(item)),
                Ok(_) => {}
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

pub struct Project<I> {
    inner: I,
    field: String,
}

impl<I, T, E> Iterator for Project<I>
where
    I: Iterator<Item = Result<T, E>>,
    T: FieldAccess,
    E: From<PipelineError>,
{
    type Item = Result<Value, E>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.inner.next()?.and_then(|item| {
            item.field(&self.field)
                .cloned()
                .ok_or_else(|| PipelineError::missing_field(&self.field).into())
        }))
    }
}

pub struct InspectOk<I, F> {
    inner: I,
    f: F,
}

impl<I, F, T, E> Iterator for InspectOk<I, F>
where
    I: Iterator<Item = Result<T, E>>,
    F: FnMut(&T),
{
    type Item = Result<T, E>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.next()?;
        if let Ok(value) = &item {
            (self.f)(value);
        }
        Some(item)
    }
}

pub struct Until<I> {
    inner: I,
    flag: &'static AtomicBool,
}

impl<I: Iterator> Iterator for Until<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<I::Item> {
        if self.flag.load(Ordering::Relaxed) {
            log::warn!("Shutdown requested, no longer pulling from pipeline");
            return None;
        }
        self.inner.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    fn oks(n: usize) -> impl Iterator<Item = Result<usize, PipelineError>> {
        (0..n).map(Ok)
    }

    #[test]
    fn limit_caps_output() {
        let out: Vec<_> = (0..10).limit(3).collect();
        assert_eq!(out, vec![0, 1, 2]);
    }

    #[test]
    fn limit_shorter_input_yields_input_length() {
        let out: Vec<_> = (0..2).limit(5).collect();
        assert_eq!(out, vec![0, 1]);
    }

    #[test]
    fn limit_zero_never_pulls() {
        let pulled = Cell::new(0);
        let src = (0..5).inspect(|_| pulled.set(pulled.get() + 1));
        let out: Vec<_> = src.limit(0).collect();
        assert!(out.is_empty());
        assert_eq!(pulled.get(), 0);
    }

    #[test]
    fn limit_stops_pulling_after_budget() {
        let pulled = Cell::new(0);
        let src = (0..100).inspect(|_| pulled.set(pulled.get() + 1));
        let out: Vec<_> = src.limit(4).collect();
        assert_eq!(out.len(), 4);
        assert_eq!(pulled.get(), 4);
    }

    #[test]
    fn limit_never_exceeds_bound() {
        for len in 0..12 {
            for n in 0..12 {
                let count = (0..len).limit(n).count();
                assert_eq!(count, len.min(n));
            }
        }
    }

    #[test]
    fn quota_accepts_exactly_n() {
        let mut quota = Quota::new(2);
        assert!(quota.accept());
        assert!(quota.accept());
        assert!(!quota.accept());
        assert!(!quota.accept());
    }

    #[test]
    fn chunk_zero_rejected() {
        let err = oks(3).chunked(0).err().unwrap();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn chunk_counts_match_ceiling() {
        for len in 0..20usize {
            for size in 1..7usize {
                let batches: Vec<Vec<usize>> = oks(len)
                    .chunked(size)
                    .unwrap()
                    .collect::<Result<_, _>>()
                    .unwrap();
                assert_eq!(batches.len(), len.div_ceil(size), "len={len} size={size}");
                if let Some((last, full)) = batches.split_last() {
                    assert!(full.iter().all(|b| b.len() == size));
                    assert!(!last.is_empty() && last.len() <= size);
                }
                let flat: Vec<usize> = batches.into_iter().flatten().collect();
                assert_eq!(flat, (0..len).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn chunk_empty_input_yields_nothing() {
        assert_eq!(oks(0).chunked(3).unwrap().count(), 0);
    }

    #[test]
    fn chunk_forwards_errors() {
        let items = vec![Ok(1), Err(PipelineError::configuration("boom")), Ok(2)];
        let out: Vec<_> = items.into_iter().chunked(2).unwrap().collect();
        assert!(out[0].is_err());
        assert_eq!(out[1], Ok(vec![1, 2]));
    }

    #[test]
    fn chunk_is_lazy() {
        let pulled = Cell::new(0);
        let src = oks(10).inspect(|_| pulled.set(pulled.get() + 1));
        let mut chunks = src.chunked(3).unwrap();
        assert_eq!(pulled.get(), 0);
        chunks.next();
        assert_eq!(pulled.get(), 3);
    }

    #[test]
    fn try_filter_keeps_order() {
        let out: Vec<_> = oks(6)
            .try_filter(|n| Ok(n % 2 == 0))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(out, vec![0, 2, 4]);
    }

    #[test]
    fn try_filter_propagates_predicate_error() {
        let mut seq = oks(3).try_filter(|n| {
            if *n == 1 {
                Err(PipelineError::configuration("bad"))
            } else {
                Ok(true)
            }
        });
        assert_eq!(seq.next(), Some(Ok(0)));
        assert!(matches!(seq.next(), Some(Err(_))));
        assert_eq!(seq.next(), Some(Ok(2)));
    }

    #[test]
    fn filter_ok_passes_errors() {
        let items = vec![Ok(1), Err(PipelineError::configuration("x")), Ok(2)];
        let out: Vec<_> = items.into_iter().filter_ok(|n| *n > 1).collect();
        assert_eq!(out.len(), 2);
        assert!(out[0].is_err());
        assert_eq!(out[1], Ok(2));
    }

    #[test]
    fn project_extracts_field() {
        let records = vec![json!({"pmid": "1"}), json!({"pmid": "2"})];
        let out: Vec<Value> = records
            .into_iter()
            .map(Ok::<_, PipelineError>)
            .project("pmid")
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(out, vec![json!("1"), json!("2")]);
    }

    #[test]
    fn project_missing_field_errors() {
        let mut seq = vec![json!({"other": 1})]
            .into_iter()
            .map(Ok::<_, PipelineError>)
            .project("pmid");
        assert_eq!(
            seq.next(),
            Some(Err(PipelineError::missing_field("pmid")))
        );
    }

    #[test]
    fn inspect_ok_sees_only_values() {
        let seen = Cell::new(0);
        let items = vec![Ok(1), Err(PipelineError::configuration("x")), Ok(2)];
        let count = items
            .into_iter()
            .inspect_ok(|_| seen.set(seen.get() + 1))
            .count();
        assert_eq!(count, 3);
        assert_eq!(seen.get(), 2);
    }

    #[test]
    fn until_stops_when_flag_raised() {
        static FLAG: AtomicBool = AtomicBool::new(false);
        let mut seq = (0..10).until(&FLAG);
        assert_eq!(seq.next(), Some(0));
        FLAG.store(true, Ordering::Relaxed);
        assert_eq!(seq.next(), None);
    }

    #[test]
    fn exhaust_counts_or_fails() {
        assert_eq!(exhaust(oks(4)), Ok(4));
        let items = vec![Ok(1), Err(PipelineError::configuration("x")), Ok(2)];
        assert!(exhaust(items).is_err());
    }
}
