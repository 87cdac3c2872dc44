//! Configuration loading from TOML files

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global configuration for pubflow
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub ncbi: NcbiConfig,
    pub classifier: ClassifierConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory of the file store
    pub dir: PathBuf,
    pub documents_table: String,
    pub contents_table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data"),
            documents_table: "documents".to_string(),
            contents_table: "contents".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NcbiConfig {
    /// Directory index holding `updatefiles/`
    pub pubmed_url: String,
    pub efetch_url: String,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub api_key: Option<String>,
    /// Ids per efetch request
    pub efetch_batch_size: usize,
    /// Enrich author emails from PMC before storing
    pub supplement_pmc: bool,
    pub supplement_batch_size: usize,
}

impl Default for NcbiConfig {
    fn default() -> Self {
        Self {
            pubmed_url: pubflow_pubmed::listing::NCBI_PUBMED_URL.to_string(),
            efetch_url: pubflow_pubmed::eutils::EFETCH_URL.to_string(),
            api_key: std::env::var("NCBI_API_KEY").ok(),
            efetch_batch_size: pubflow_pubmed::eutils::DEFAULT_BATCH_SIZE,
            supplement_pmc: true,
            supplement_batch_size: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Sidecar executable speaking JSON lines on stdin/stdout
    pub command: Option<String>,
    pub args: Vec<String>,
    pub threshold: f64,
    pub batch_size: usize,
    pub min_year: Option<i32>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            threshold: 0.99,
            batch_size: 1000,
            min_year: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Seconds before a request is abandoned
    pub read_timeout: u64,
    pub max_retries: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            read_timeout: 60,
            max_retries: 3,
        }
    }
}

/// Deserialize a string that may contain environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./pubflow.toml (current directory)
    /// 2. ~/.config/pubflow/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("pubflow.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "pubflow") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Pipeline knobs derived from the file settings.
    pub fn pipeline(&self) -> pubflow_pubmed::Config {
        pubflow_pubmed::Config {
            threshold: self.classifier.threshold,
            min_year: self.classifier.min_year,
            classify_batch_size: self.classifier.batch_size,
            supplement_batch_size: self.ncbi.supplement_batch_size,
            supplement_pmc: self.ncbi.supplement_pmc,
            documents_table: self.store.documents_table.clone(),
            contents_table: self.store.contents_table.clone(),
            max_files: None,
            max_ids: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.store.dir, PathBuf::from("./data"));
        assert_eq!(config.classifier.threshold, 0.99);
        assert!(config.classifier.command.is_none());
        assert!(config.ncbi.supplement_pmc);
    }

    #[test]
    fn expand_env_var_simple() {
        std::env::set_var("PUBFLOW_TEST_VAR", "test_value");
        assert_eq!(
            expand_env_var("${PUBFLOW_TEST_VAR}"),
            Some("test_value".to_string())
        );
        std::env::remove_var("PUBFLOW_TEST_VAR");
    }

    #[test]
    fn expand_env_var_literal() {
        assert_eq!(expand_env_var("literal"), Some("literal".to_string()));
    }

    #[test]
    fn expand_env_var_missing() {
        assert_eq!(expand_env_var("${NONEXISTENT_VAR_12345}"), None);
    }

    #[test]
    fn parse_config_toml() {
        let toml = r#"
[store]
dir = "/tmp/pubflow"

[ncbi]
api_key = "abc"
supplement_pmc = false

[classifier]
command = "python3"
args = ["-m", "classifier"]
threshold = 0.5
min_year = 2020
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.store.dir, PathBuf::from("/tmp/pubflow"));
        assert_eq!(config.store.documents_table, "documents");
        assert_eq!(config.ncbi.api_key.as_deref(), Some("abc"));
        assert_eq!(config.classifier.command.as_deref(), Some("python3"));
        assert_eq!(config.classifier.args, vec!["-m", "classifier"]);

        let pipeline = config.pipeline();
        assert_eq!(pipeline.threshold, 0.5);
        assert_eq!(pipeline.min_year, Some(2020));
        assert!(!pipeline.supplement_pmc);
        assert!(pipeline.validate().is_ok());
    }

    #[test]
    fn from_file_reports_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("pubflow.toml");
        std::fs::write(&path, "[http]\nread_timeout = \"soon\"\n").unwrap();
        let err = Config::from_file(&path).unwrap_err();
        assert!(format!("{err}").contains("pubflow.toml"));
    }
}
