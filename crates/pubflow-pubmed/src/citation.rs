//! Citation data model
//!
//! A citation is immutable once retrieved. Stages that need a loosely-typed
//! view (the classifier, the document store) go through [`Citation::to_record`].

use std::sync::LazyLock;

use pubflow_core::Record;
use regex::Regex;
use serde::{Deserialize, Serialize};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(?:\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}")
        .expect("invalid email pattern")
});

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Journal {
    pub title: Option<String>,
    pub iso_abbreviation: Option<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub pub_year: Option<String>,
    pub pub_month: Option<String>,
    pub pub_day: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub fore_name: Option<String>,
    pub last_name: Option<String>,
    pub initials: Option<String>,
    pub collective_name: Option<String>,
    pub affiliations: Vec<String>,
    /// `None` when the source listed no address at all
    pub emails: Option<Vec<String>>,
}

impl Author {
    /// Whether this author carries at least one email.
    pub fn has_emails(&self) -> bool {
        self.emails.as_ref().is_some_and(|e| !e.is_empty())
    }
}

/// Corresponding-author note (PMC articles only).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correspondence {
    pub emails: Option<Vec<String>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub pmid: String,
    pub pmc: Option<String>,
    pub doi: Option<String>,
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub journal: Journal,
    /// MeSH publication type UIs, e.g. `D016428`
    pub publication_type_list: Vec<String>,
    pub author_list: Vec<Author>,
    pub keyword_list: Vec<String>,
    pub correspondence: Vec<Correspondence>,
}

impl Citation {
    /// JSON object view, as handed to classifiers and stored in documents.
    pub fn to_record(&self) -> Result<Record, serde_json::Error> {
        serde_json::from_value(serde_json::to_value(self)?)
    }
}

/// Email addresses found in free text, in order of appearance.
pub fn extract_emails(text: &str) -> Vec<String> {
    EMAIL_RE
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches('.').to_string())
        .collect()
}

/// Drop repeated items, keeping the first occurrence.
pub fn unique_in_order<T: PartialEq>(items: Vec<T>) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
