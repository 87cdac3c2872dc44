//! Pubflow Core - lazy pipeline building blocks
//!
//! Sequence combinators, pipeline composition, and the shared plumbing
//! (logging, progress, HTTP, retry, shutdown) used by the PubMed stages.

pub mod error;
pub mod logging;
pub mod pipeline;
pub mod progress;
pub mod record;
pub mod retry;
pub mod seq;
pub mod shutdown;
pub mod stream;

// Re-exports for convenience
pub use error::PipelineError;
pub use logging::{IndicatifLogger, init_logging};
pub use pipeline::{Deferred, Pipeline, Seq, Stage, compose};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use record::{FieldAccess, Record, field_str};
pub use retry::retry_with_backoff;
pub use seq::{Quota, SeqExt, exhaust};
pub use shutdown::{is_shutdown_requested, request_shutdown, shutdown_flag};
pub use stream::{
    HttpConfig, SHARED_RUNTIME, StreamError, fetch_bytes, fetch_text, gunzip, http_client,
    http_config, set_http_config,
};
