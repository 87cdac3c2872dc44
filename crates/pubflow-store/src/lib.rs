//! pubflow-store: Document tables for the PubMed pipeline
//!
//! A [`DocumentStore`] holds JSON records keyed by their `id` field, one
//! table per concern (classified documents, the update-file ledger). Two
//! backends ship here: a directory-per-table [`FileStore`] and an
//! in-process [`MemoryStore`]. The loader stage and the read feed sit on
//! top of the trait.

pub mod feed;
pub mod file;
pub mod hash;
pub mod loader;
pub mod memory;
pub mod store;

pub use feed::{FeedError, FeedQuery};
pub use file::FileStore;
pub use hash::{content_hash, key_for};
pub use loader::{Load, load};
pub use memory::MemoryStore;
pub use store::{DocumentStore, StoreError, WriteStatus, record_id};
