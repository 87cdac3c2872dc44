//! Pipeline composition
//!
//! A pipeline is a producer followed by any number of stages, each of which
//! turns the previous lazy sequence into a new one. Composing does no work:
//! the producer runs on the first pull of the returned sequence, and every
//! later pull travels back through the chain one item at a time.
//!
//! Two flavours exist:
//! - [`Pipeline`]: statically typed, each stage may change the item type.
//! - [`compose`]: a runtime list of boxed [`Stage`]s over one item type.

use crate::error::PipelineError;

/// Boxed lazy sequence.
pub type Seq<'a, T> = Box<dyn Iterator<Item = T> + 'a>;

/// Iterator that calls its producer on first pull.
pub struct Deferred<F, I> {
    producer: Option<F>,
    seq: Option<I>,
}

impl<F, I> Deferred<F, I>
where
    F: FnOnce() -> I,
    I: Iterator,
{
    pub fn new(producer: F) -> Self {
        Self {
            producer: Some(producer),
            seq: None,
        }
    }

    /// Whether the producer has run yet.
    pub fn started(&self) -> bool {
        self.producer.is_none()
    }
}

impl<F, I> Iterator for Deferred<F, I>
where
    F: FnOnce() -> I,
    I: Iterator,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<I::Item> {
        if let Some(producer) = self.producer.take() {
            self.seq = Some(producer());
        }
        self.seq.as_mut()?.next()
    }
}

/// Typed pipeline builder.
///
/// ```ignore
/// let seq = Pipeline::source(|| listing.into_iter())
///     .pipe(|names| names.filter_ok(is_data_file))
///     .pipe(|names| names.limit(10))
///     .into_iter();
/// ```
pub struct Pipeline<I> {
    seq: I,
}

impl<F, I> Pipeline<Deferred<F, I>>
where
    F: FnOnce() -> I,
    I: Iterator,
{
    /// Start a pipeline from a zero-argument producer.
    pub fn source(producer: F) -> Self {
        Self {
            seq: Deferred::new(producer),
        }
    }
}

impl<I: Iterator> Pipeline<I> {
    /// Append a stage. The stage function is called now, but must only wrap
    /// its input; any work belongs in the returned iterator's `next`.
    pub fn pipe<O, S>(self, stage: S) -> Pipeline<O>
    where
        S: FnOnce(I) -> O,
        O: Iterator,
    {
        Pipeline {
            seq: stage(self.seq),
        }
    }

    /// Append a stage whose construction can fail (e.g. `chunked(0)`).
    pub fn try_pipe<O, S, E>(self, stage: S) -> Result<Pipeline<O>, E>
    where
        S: FnOnce(I) -> Result<O, E>,
        O: Iterator,
    {
        Ok(Pipeline {
            seq: stage(self.seq)?,
        })
    }

    pub fn boxed<'a>(self) -> Pipeline<Seq<'a, I::Item>>
    where
        I: 'a,
    {
        Pipeline {
            seq: Box::new(self.seq),
        }
    }
}

impl<I: Iterator> IntoIterator for Pipeline<I> {
    type Item = I::Item;
    type IntoIter = I;

    fn into_iter(self) -> I {
        self.seq
    }
}

/// One entry of a runtime-composed pipeline.
pub enum Stage<'a, T> {
    /// Zero-argument producer; must be first.
    Source(Box<dyn FnOnce() -> Seq<'a, T> + 'a>),
    /// Sequence-to-sequence transform.
    Transform(Box<dyn FnOnce(Seq<'a, T>) -> Seq<'a, T> + 'a>),
}

impl<'a, T: 'a> Stage<'a, T> {
    pub fn source<F, I>(producer: F) -> Self
    where
        F: FnOnce() -> I + 'a,
        I: Iterator<Item = T> + 'a,
    {
        Self::Source(Box::new(move || Box::new(producer()) as Seq<'a, T>))
    }

    pub fn transform<F, O>(stage: F) -> Self
    where
        F: FnOnce(Seq<'a, T>) -> O + 'a,
        O: Iterator<Item = T> + 'a,
    {
        Self::Transform(Box::new(move |seq| Box::new(stage(seq)) as Seq<'a, T>))
    }
}

/// Compose a runtime list of stages into one lazy sequence.
///
/// Stage 0 must be a [`Stage::Source`]; every later stage must be a
/// [`Stage::Transform`]. The source is deferred until the result is pulled.
pub fn compose<'a, T: 'a>(stages: Vec<Stage<'a, T>>) -> Result<Seq<'a, T>, PipelineError> {
    let mut stages = stages.into_iter();
    let mut seq: Seq<'a, T> = match stages.next() {
        None => return Err(PipelineError::configuration("pipeline requires at least one stage")),
        Some(Stage::Source(producer)) => Box::new(Deferred::new(producer)),
        Some(Stage::Transform(_)) => {
            return Err(PipelineError::configuration(
                "first pipeline stage must be a source",
            ))
        }
    };

    for (idx, stage) in stages.enumerate() {
        seq = match stage {
            Stage::Transform(f) => f(seq),
            Stage::Source(_) => {
                return Err(PipelineError::configuration(format!(
                    "stage {} is a source; only stage 0 may produce",
                    idx + 1
                )))
            }
        };
    }

    Ok(seq)
}
