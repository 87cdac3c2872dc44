//! Pubflow PubMed - citation classification pipelines
//!
//! Retrieves PubMed citations (daily update files or E-utilities by id),
//! keeps primary research articles, classifies them through an external
//! model and stores the positives with a publication date, optionally
//! enriching author emails from PubMed Central.
//!
//! # Features
//!
//! - Lazy stages: nothing is downloaded until the store pulls
//! - Update-file ledger so each file is processed once
//! - Streaming XML parsing with quick-xml (MEDLINE and JATS)
//! - Classifier behind a trait; a JSON-lines sidecar ships here
//!
//! # Example
//!
//! ```ignore
//! use pubflow_pubmed::{Config, DownloadSource, HttpListing, Services, run_updates};
//!
//! let config = Config { max_files: Some(1), ..Default::default() };
//! let services = Services::new(&store, &mut classifier);
//! let summary = run_updates(&config, &HttpListing::default(), &DownloadSource::default(), services)?;
//! println!("Stored {} documents", summary.stored.total());
//! ```

pub mod citation;
pub mod classify;
pub mod config;
pub mod eutils;
pub mod filter;
pub mod format;
pub mod jats;
pub mod listing;
pub mod merge;
pub mod parser;
pub mod retrieve;
pub mod runner;
pub mod sidecar;
pub mod updatefiles;

// Re-exports
pub use citation::{Author, Citation, Correspondence, Journal};
pub use classify::{Classifier, Explanation, HitTally, Prediction, Sentence};
pub use config::Config;
pub use eutils::{Db, DownloadSource, EutilsSource};
pub use listing::{HttpListing, RemoteListing};
pub use retrieve::{CitationSource, RetrievalBatch, RetrievalFailure};
pub use runner::{Services, Summary, explain_ids, run_ids, run_updates};
pub use sidecar::{SidecarClassifier, SidecarError};
