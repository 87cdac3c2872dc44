//! Error type for pipeline assembly and generic stages

/// Error raised by the generic pipeline machinery.
///
/// Both variants are fatal: they describe a pipeline that was assembled
/// wrongly or fed records of the wrong shape, not a transient condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Invalid pipeline configuration (empty stage list, zero chunk size, ...)
    Configuration(String),
    /// A record lacked a field a projection asked for
    MissingField { field: String },
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "configuration error: {msg}"),
            Self::MissingField { field } => write!(f, "missing field: {field}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl PipelineError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }
}
