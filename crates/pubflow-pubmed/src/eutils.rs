//! NCBI-backed citation sources
//!
//! - [`EutilsSource`]: E-utilities efetch, ids in provider batches.
//! - [`DownloadSource`]: whole update files, one batch per file.

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use pubflow_core::{fetch_bytes, fetch_text, gunzip, retry_with_backoff};

use crate::citation::Citation;
use crate::jats::parse_pmc_xml;
use crate::parser::parse_pubmed_xml;
use crate::retrieve::{CitationSource, RetrievalBatch, RetrievalFailure};

pub const EFETCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi";
pub const UPDATEFILES_URL: &str = "https://ftp.ncbi.nlm.nih.gov/pubmed/updatefiles/";

/// Ids per efetch request.
pub const DEFAULT_BATCH_SIZE: usize = 200;

/// Entrez database to fetch from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Db {
    Pubmed,
    Pmc,
}

impl Db {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pubmed => "pubmed",
            Self::Pmc => "pmc",
        }
    }

    fn parse(self, xml: &str) -> Result<Vec<Citation>> {
        match self {
            Self::Pubmed => {
                let result = parse_pubmed_xml(xml)?;
                if !result.deleted_pmids.is_empty() {
                    log::debug!("Ignoring {} deleted citations", result.deleted_pmids.len());
                }
                Ok(result.citations)
            }
            Self::Pmc => parse_pmc_xml(xml),
        }
    }

    /// efetch wants bare numeric PMC ids.
    fn request_id(self, id: &str) -> &str {
        match self {
            Self::Pubmed => id.trim(),
            Self::Pmc => id.trim().trim_start_matches("PMC"),
        }
    }
}

/// E-utilities efetch client.
pub struct EutilsSource {
    url: String,
    db: Db,
    api_key: Option<String>,
    batch_size: usize,
    pb: ProgressBar,
}

impl EutilsSource {
    pub fn new(db: Db) -> Self {
        Self {
            url: EFETCH_URL.to_string(),
            db,
            api_key: None,
            batch_size: DEFAULT_BATCH_SIZE,
            pb: ProgressBar::hidden(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.is_empty());
        self
    }

    /// Zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_progress(mut self, pb: ProgressBar) -> Self {
        self.pb = pb;
        self
    }

    pub fn db(&self) -> Db {
        self.db
    }

    /// Fetch and parse one provider batch.
    pub fn fetch_batch(&self, ids: Vec<String>) -> RetrievalBatch {
        let joined = ids
            .iter()
            .map(|id| self.db.request_id(id))
            .collect::<Vec<_>>()
            .join(",");

        let mut params = vec![
            ("db", self.db.as_str()),
            ("id", joined.as_str()),
            ("retmode", "xml"),
        ];
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.as_str()));
        }

        self.pb
            .set_message(format!("efetch {} ({} ids)", self.db.as_str(), ids.len()));
        let label = format!("efetch {}", self.db.as_str());
        let xml = match retry_with_backoff(&label, &self.pb, || fetch_text(&self.url, &params)) {
            Ok(xml) => xml,
            Err(e) => return Err(RetrievalFailure::new(e, ids)),
        };
        self.db
            .parse(&xml)
            .map_err(|e| RetrievalFailure::new(format!("{e:#}"), ids))
    }
}

impl CitationSource for EutilsSource {
    fn retrieve<'s>(&'s self, ids: Vec<String>) -> Box<dyn Iterator<Item = RetrievalBatch> + 's> {
        let batches: Vec<Vec<String>> = ids
            .chunks(self.batch_size)
            .map(|chunk| chunk.to_vec())
            .collect();
        Box::new(batches.into_iter().map(move |batch| self.fetch_batch(batch)))
    }
}

/// Update-file downloader: each id is a file name under `base_url`.
pub struct DownloadSource {
    base_url: String,
    pb: ProgressBar,
}

impl Default for DownloadSource {
    fn default() -> Self {
        Self::new(UPDATEFILES_URL)
    }
}

impl DownloadSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            base_url,
            pb: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, pb: ProgressBar) -> Self {
        self.pb = pb;
        self
    }

    fn download(&self, name: &str) -> Result<Vec<Citation>> {
        let url = format!("{}{}", self.base_url, name);
        self.pb.set_message(format!("downloading {name}"));
        let compressed = retry_with_backoff(name, &self.pb, || fetch_bytes(&url, &[]))
            .with_context(|| format!("Failed to download {url}"))?;
        let raw = gunzip(&compressed).with_context(|| format!("Failed to decompress {name}"))?;
        let xml = String::from_utf8(raw).with_context(|| format!("{name} is not UTF-8"))?;
        let result = parse_pubmed_xml(&xml).with_context(|| format!("Failed to parse {name}"))?;
        log::info!(
            "{name}: {} citations, {} deletions",
            result.citations.len(),
            result.deleted_pmids.len()
        );
        Ok(result.citations)
    }
}

impl CitationSource for DownloadSource {
    fn retrieve<'s>(&'s self, ids: Vec<String>) -> Box<dyn Iterator<Item = RetrievalBatch> + 's> {
        Box::new(ids.into_iter().map(move |name| {
            self.download(&name)
                .map_err(|e| RetrievalFailure::new(format!("{e:#}"), vec![name]))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pmc_ids_lose_prefix() {
        assert_eq!(Db::Pmc.request_id("PMC6736425"), "6736425");
        assert_eq!(Db::Pmc.request_id("6736425"), "6736425");
        assert_eq!(Db::Pubmed.request_id(" 31452104 "), "31452104");
    }

    #[test]
    fn batches_follow_batch_size() {
        let source = EutilsSource::new(Db::Pubmed).with_batch_size(0);
        assert_eq!(source.batch_size, 1);
        let source = EutilsSource::new(Db::Pubmed).with_batch_size(2);
        let ids: Vec<String> = (0..5).map(|i| i.to_string()).collect();
        let batches: Vec<Vec<String>> = ids.chunks(source.batch_size).map(|c| c.to_vec()).collect();
        assert_eq!(batches.len(), 3);
    }

    #[test]
    fn empty_api_key_is_dropped() {
        let source = EutilsSource::new(Db::Pubmed).with_api_key(Some(String::new()));
        assert!(source.api_key.is_none());
    }

    #[test]
    fn unreachable_host_fails_the_batch() {
        let source = EutilsSource::new(Db::Pubmed).with_url("not a url");
        let batch = source.fetch_batch(vec!["1".into(), "2".into()]);
        let failure = batch.unwrap_err();
        assert_eq!(failure.ids, vec!["1", "2"]);
    }

    #[test]
    fn download_base_gets_trailing_slash() {
        assert_eq!(DownloadSource::new("http://x/y").base_url, "http://x/y/");
    }

    #[test]
    #[ignore = "requires network access"]
    fn efetch_pubmed_live() {
        let source = EutilsSource::new(Db::Pubmed);
        let citations = source.fetch_batch(vec!["31452104".into()]).unwrap();
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].pmid, "31452104");
    }

    #[test]
    #[ignore = "requires network access"]
    fn efetch_pmc_live() {
        let source = EutilsSource::new(Db::Pmc);
        let citations = source.fetch_batch(vec!["PMC6736425".into()]).unwrap();
        assert_eq!(citations.len(), 1);
        assert!(!citations[0].author_list.is_empty());
    }
}
