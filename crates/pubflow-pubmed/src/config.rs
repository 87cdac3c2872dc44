//! PubMed pipeline configuration

use pubflow_core::PipelineError;

/// Knobs shared by every pipeline the runner builds.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Classifier probability cutoff on [0, 1]
    pub threshold: f64,
    /// Drop citations published before this year
    pub min_year: Option<i32>,
    /// Citations per classifier call
    pub classify_batch_size: usize,
    /// Documents per PMC supplement request
    pub supplement_batch_size: usize,
    /// Fetch author emails from PMC before storing (when a PMC source is given)
    pub supplement_pmc: bool,
    /// Classified documents
    pub documents_table: String,
    /// Update-file ledger
    pub contents_table: String,
    /// Maximum new update files per run (for testing)
    pub max_files: Option<usize>,
    /// Maximum input ids per run
    pub max_ids: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold: 0.99,
            min_year: None,
            classify_batch_size: 1000,
            supplement_batch_size: 1000,
            supplement_pmc: true,
            documents_table: "documents".to_string(),
            contents_table: "contents".to_string(),
            max_files: None,
            max_ids: None,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(PipelineError::configuration(format!(
                "threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        if self.classify_batch_size == 0 {
            return Err(PipelineError::configuration("classify batch size must be > 0"));
        }
        if self.supplement_batch_size == 0 {
            return Err(PipelineError::configuration("supplement batch size must be > 0"));
        }
        if self.documents_table == self.contents_table {
            return Err(PipelineError::configuration(format!(
                "documents and contents tables must differ (both '{}')",
                self.documents_table
            )));
        }
        Ok(())
    }
}
