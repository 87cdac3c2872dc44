//! Remote directory listings
//!
//! NCBI serves the update files from a plain HTTP index page. Each entry
//! becomes a `(name, facts)` pair, where facts are the attributes the page
//! shows: `modify`, `size` and `type`.

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use pubflow_core::{Record, fetch_text, retry_with_backoff};
use serde_json::Value;

pub const NCBI_PUBMED_URL: &str = "https://ftp.ncbi.nlm.nih.gov/pubmed/";

/// Lists the entries of a remote directory.
pub trait RemoteListing {
    fn list(&self, path: &str) -> Result<Vec<(String, Record)>>;
}

impl<L: RemoteListing + ?Sized> RemoteListing for &L {
    fn list(&self, path: &str) -> Result<Vec<(String, Record)>> {
        (**self).list(path)
    }
}

/// Listing backed by an HTTP directory index.
pub struct HttpListing {
    base_url: String,
    pb: ProgressBar,
}

impl Default for HttpListing {
    fn default() -> Self {
        Self::new(NCBI_PUBMED_URL)
    }
}

impl HttpListing {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            pb: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, pb: ProgressBar) -> Self {
        self.pb = pb;
        self
    }

    /// Directory URL for `path`, always with a trailing slash.
    pub fn url_for(&self, path: &str) -> String {
        let path = path.trim_matches('/');
        let base = self.base_url.trim_end_matches('/');
        if path.is_empty() {
            format!("{base}/")
        } else {
            format!("{base}/{path}/")
        }
    }
}

impl RemoteListing for HttpListing {
    fn list(&self, path: &str) -> Result<Vec<(String, Record)>> {
        let url = self.url_for(path);
        self.pb.set_message(format!("listing {url}"));
        let html = retry_with_backoff("listing", &self.pb, || fetch_text(&url, &[]))
            .with_context(|| format!("Failed to list {url}"))?;
        let entries = parse_html_listing(&html);
        log::info!("Listed {} entries under {url}", entries.len());
        Ok(entries)
    }
}

/// Parse an Apache-style index page, sorted by name.
///
/// Lines look like:
/// `<a href="pubmed26n1335.xml.gz">pubmed26n1335.xml.gz</a>     2026-01-29 14:48   19M`
pub fn parse_html_listing(html: &str) -> Vec<(String, Record)> {
    let mut entries = Vec::new();

    for line in html.lines() {
        let Some(start) = line.find("href=\"") else {
            continue;
        };
        let rest = &line[start + 6..];
        let Some(end) = rest.find('"') else {
            continue;
        };
        let href = &rest[..end];

        // Sort links, parent directory, absolute links
        if href.starts_with('?') || href.starts_with('/') || href.starts_with("..") || href.contains("://") {
            continue;
        }

        let (name, kind) = match href.strip_suffix('/') {
            Some(dir) => (dir, "dir"),
            None => (href, "file"),
        };
        if name.is_empty() {
            continue;
        }

        let tail = rest[end..].rsplit("</a>").next().unwrap_or_default();
        entries.push((name.to_string(), facts_from_tail(tail, kind)));
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries.dedup_by(|a, b| a.0 == b.0);
    entries
}

fn facts_from_tail(tail: &str, kind: &str) -> Record {
    let mut facts = Record::new();
    facts.insert("type".into(), Value::String(kind.into()));

    let parts: Vec<&str> = tail.split_whitespace().collect();
    if let [date, time, ..] = parts.as_slice() {
        if date.len() == 10 && date.as_bytes()[4] == b'-' {
            facts.insert("modify".into(), Value::String(format!("{date} {time}")));
        }
    }
    if let Some(size) = parts.last().and_then(|s| parse_size_string(s)) {
        facts.insert("size".into(), Value::String(size.to_string()));
    }
    facts
}

/// "19M" / "4.5K" / "60" -> bytes
fn parse_size_string(s: &str) -> Option<u64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let (num_str, multiplier) = if let Some(n) = s.strip_suffix('K') {
        (n, 1024u64)
    } else if let Some(n) = s.strip_suffix('M') {
        (n, 1024 * 1024)
    } else if let Some(n) = s.strip_suffix('G') {
        (n, 1024 * 1024 * 1024)
    } else if s.chars().all(|c| c.is_ascii_digit()) {
        (s, 1)
    } else {
        return None;
    };

    num_str
        .parse::<f64>()
        .ok()
        .map(|n| (n * multiplier as f64) as u64)
}
