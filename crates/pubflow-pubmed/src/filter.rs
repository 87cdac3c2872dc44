//! Citation filters
//!
//! Both filters are pure predicates over a [`Citation`]; the stage
//! functions wrap them with [`SeqExt::filter_ok`] so errors from upstream
//! stages pass through untouched.

use anyhow::Result;
use pubflow_core::SeqExt;
use rustc_hash::FxHashSet;

use crate::citation::Citation;

/// MeSH publication types that disqualify a citation.
pub const EXCLUDED_PUBTYPES: [&str; 5] = [
    "D016420", // Comment
    "D016454", // Review
    "D016440", // Retraction of Publication
    "D016441", // Retracted Publication
    "D016425", // Published Erratum
];

/// A citation must carry at least one of these.
pub const REQUIRED_PUBTYPES: [&str; 1] = [
    "D016428", // Journal Article
];

/// Keeps journal articles that are not reviews, comments, errata or
/// retractions. Exclusion wins over inclusion.
#[derive(Debug, Clone)]
pub struct PubTypeFilter {
    excluded: FxHashSet<&'static str>,
    required: FxHashSet<&'static str>,
}

impl Default for PubTypeFilter {
    fn default() -> Self {
        Self {
            excluded: EXCLUDED_PUBTYPES.into_iter().collect(),
            required: REQUIRED_PUBTYPES.into_iter().collect(),
        }
    }
}

impl PubTypeFilter {
    pub fn accepts(&self, citation: &Citation) -> bool {
        let types = &citation.publication_type_list;
        let excluded = types.iter().any(|t| self.excluded.contains(t.as_str()));
        let required = types.iter().any(|t| self.required.contains(t.as_str()));
        required && !excluded
    }
}

/// Keeps citations published in or after `min_year`.
#[derive(Debug, Clone, Copy, Default)]
pub struct YearFilter {
    min_year: Option<i32>,
}

impl YearFilter {
    pub fn new(min_year: Option<i32>) -> Self {
        Self { min_year }
    }

    /// Absent or unreadable years are dropped, never raised.
    pub fn accepts(&self, citation: &Citation) -> bool {
        let Some(min_year) = self.min_year else {
            return true;
        };
        match citation.journal.pub_year.as_deref().map(str::trim) {
            Some(raw) => match raw.parse::<i32>() {
                Ok(year) => year >= min_year,
                Err(_) => {
                    log::info!(
                        "Could not identify publication year '{raw}' (pmid {})",
                        citation.pmid
                    );
                    false
                }
            },
            None => {
                log::info!("Missing publication year (pmid {})", citation.pmid);
                false
            }
        }
    }
}

/// Publication-type filter stage.
pub fn pubtype_filter<I>(citations: I) -> impl Iterator<Item = Result<Citation>>
where
    I: Iterator<Item = Result<Citation>>,
{
    let filter = PubTypeFilter::default();
    citations.filter_ok(move |c| filter.accepts(c))
}

/// Minimum-year filter stage; `None` passes everything.
pub fn year_filter<I>(citations: I, min_year: Option<i32>) -> impl Iterator<Item = Result<Citation>>
where
    I: Iterator<Item = Result<Citation>>,
{
    let filter = YearFilter::new(min_year);
    citations.filter_ok(move |c| filter.accepts(c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::citation::Journal;

    fn with_types(pmid: &str, types: &[&str]) -> Citation {
        Citation {
            pmid: pmid.into(),
            publication_type_list: types.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    fn with_year(year: Option<&str>) -> Citation {
        Citation {
            pmid: "1".into(),
            journal: Journal {
                pub_year: year.map(String::from),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn pubtype_requires_journal_article() {
        let filter = PubTypeFilter::default();
        assert!(filter.accepts(&with_types("1", &["D016428"])));
        assert!(filter.accepts(&with_types("1", &["D016428", "D013485"])));
        assert!(!filter.accepts(&with_types("1", &["D016422"])));
        assert!(!filter.accepts(&with_types("1", &[])));
    }

    #[test]
    fn pubtype_exclusion_wins() {
        let filter = PubTypeFilter::default();
        for excluded in EXCLUDED_PUBTYPES {
            assert!(!filter.accepts(&with_types("1", &["D016428", excluded])));
        }
    }

    #[test]
    fn pubtype_output_is_exact_subset() {
        let codes = ["D016428", "D016454", "D016420", "D016422", "D013485"];
        let mut citations = Vec::new();
        // Every subset of the code pool
        for mask in 0u32..(1 << codes.len()) {
            let types: Vec<&str> = codes
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, c)| *c)
                .collect();
            citations.push(with_types(&mask.to_string(), &types));
        }

        let kept: Vec<String> = pubtype_filter(citations.clone().into_iter().map(Ok))
            .map(|c| c.unwrap().pmid)
            .collect();

        let expected: Vec<String> = citations
            .iter()
            .filter(|c| {
                let t = &c.publication_type_list;
                t.iter().any(|x| REQUIRED_PUBTYPES.contains(&x.as_str()))
                    && !t.iter().any(|x| EXCLUDED_PUBTYPES.contains(&x.as_str()))
            })
            .map(|c| c.pmid.clone())
            .collect();
        assert_eq!(kept, expected);
        assert!(!kept.is_empty());
    }

    #[test]
    fn year_unset_passes_everything() {
        let filter = YearFilter::new(None);
        assert!(filter.accepts(&with_year(None)));
        assert!(filter.accepts(&with_year(Some("abc"))));
    }

    #[test]
    fn year_compares_coerced_value() {
        let filter = YearFilter::new(Some(2010));
        assert!(filter.accepts(&with_year(Some("2010"))));
        assert!(filter.accepts(&with_year(Some(" 2021 "))));
        assert!(!filter.accepts(&with_year(Some("2009"))));
    }

    #[test]
    fn year_unreadable_or_absent_is_dropped() {
        let filter = YearFilter::new(Some(2000));
        assert!(!filter.accepts(&with_year(Some("Spring"))));
        assert!(!filter.accepts(&with_year(None)));
    }

    #[test]
    fn year_stage_never_errors() {
        let items = vec![with_year(Some("x")), with_year(Some("2020"))];
        let out: Vec<_> = year_filter(items.into_iter().map(Ok), Some(2000)).collect();
        assert_eq!(out.len(), 1);
        assert!(out[0].is_ok());
    }
}
