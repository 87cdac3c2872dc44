//! Prediction formatting
//!
//! Turns a classifier verdict into the document that gets stored: the
//! citation record plus `id`, `classification`, `probability`, a derived
//! `pub_date` and `last_updated`.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use pubflow_core::{PipelineError, Record, field_str};
use serde_json::Value;

use crate::classify::Prediction;

const MONTH_ABBR: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Journal date parts that do not form a calendar date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateError {
    Year(String),
    Month(String),
    Day(String),
    /// Parts parse but name no real day (e.g. Feb 30)
    Calendar { year: i32, month: u32, day: u32 },
}

impl std::fmt::Display for DateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Year(v) => write!(f, "unreadable year {v:?}"),
            Self::Month(v) => write!(f, "unreadable month {v:?}"),
            Self::Day(v) => write!(f, "unreadable day {v:?}"),
            Self::Calendar { year, month, day } => {
                write!(f, "no such date {year:04}-{month:02}-{day:02}")
            }
        }
    }
}

impl std::error::Error for DateError {}

/// `"3"`, `"03"` or `"Mar"` -> 3.
pub fn month_number(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<u32>() {
        return (1..=12).contains(&n).then_some(n);
    }
    let lower = raw.to_ascii_lowercase();
    MONTH_ABBR
        .iter()
        .position(|abbr| *abbr == lower)
        .map(|i| i as u32 + 1)
}

fn journal_part<'a>(doc: &'a Record, key: &str) -> Option<&'a str> {
    doc.get("journal")?
        .get(key)?
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Publication date at UTC midnight. No year means no date; a missing
/// month or day counts as the first.
pub fn pub_date(doc: &Record) -> Result<Option<DateTime<Utc>>, DateError> {
    let Some(year_raw) = journal_part(doc, "pub_year") else {
        return Ok(None);
    };
    let year: i32 = year_raw
        .parse()
        .map_err(|_| DateError::Year(year_raw.to_string()))?;
    let month = match journal_part(doc, "pub_month") {
        Some(raw) => month_number(raw).ok_or_else(|| DateError::Month(raw.to_string()))?,
        None => 1,
    };
    let day = match journal_part(doc, "pub_day") {
        Some(raw) => raw.parse().map_err(|_| DateError::Day(raw.to_string()))?,
        None => 1,
    };

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Some(dt.and_utc()))
        .ok_or(DateError::Calendar { year, month, day })
}

/// RFC 3339 with a `Z` suffix, the form stored documents use.
pub fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Build the stored document for `prediction`, stamped with `now`.
pub fn to_document(prediction: Prediction, now: DateTime<Utc>) -> Result<Record, PipelineError> {
    let Prediction {
        mut document,
        classification,
        probability,
    } = prediction;

    let pmid = field_str(document.get("pmid"))
        .filter(|p| !p.is_empty())
        .ok_or_else(|| PipelineError::missing_field("pmid"))?;

    let pub_date = match pub_date(&document) {
        Ok(date) => date,
        Err(e) => {
            log::warn!("pmid {pmid}: {e}; storing without pub_date");
            None
        }
    };

    document.insert("id".into(), Value::String(pmid));
    document.insert("classification".into(), Value::from(classification));
    document.insert("probability".into(), Value::from(probability));
    match pub_date {
        Some(date) => document.insert("pub_date".into(), Value::String(timestamp(date))),
        None => document.remove("pub_date"),
    };
    document.insert("last_updated".into(), Value::String(timestamp(now)));
    Ok(document)
}

/// Formatting stage; `last_updated` is taken as each document passes.
pub fn format_predictions<I>(predictions: I) -> impl Iterator<Item = anyhow::Result<Record>>
where
    I: Iterator<Item = anyhow::Result<Prediction>>,
{
    predictions.map(|p| Ok(to_document(p?, Utc::now())?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn doc(journal: Value) -> Record {
        json!({"pmid": "123", "journal": journal})
            .as_object()
            .unwrap()
            .clone()
    }

    fn ymd(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn abbreviated_month_without_day() {
        let d = doc(json!({"pub_year": "2021", "pub_month": "Jan", "pub_day": null}));
        assert_eq!(pub_date(&d).unwrap(), Some(ymd(2021, 1, 1)));
    }

    #[test]
    fn no_year_no_date() {
        let d = doc(json!({"pub_year": null, "pub_month": "Jan"}));
        assert_eq!(pub_date(&d).unwrap(), None);
        assert_eq!(pub_date(&doc(json!({}))).unwrap(), None);
    }

    #[test]
    fn numeric_month_and_day() {
        let d = doc(json!({"pub_year": "2019", "pub_month": "09", "pub_day": "05"}));
        assert_eq!(pub_date(&d).unwrap(), Some(ymd(2019, 9, 5)));
    }

    #[test]
    fn year_only_is_first_of_january() {
        let d = doc(json!({"pub_year": "1998"}));
        assert_eq!(pub_date(&d).unwrap(), Some(ymd(1998, 1, 1)));
    }

    #[test]
    fn month_names() {
        assert_eq!(month_number("Dec"), Some(12));
        assert_eq!(month_number("sep"), Some(9));
        assert_eq!(month_number("13"), None);
        assert_eq!(month_number("Spring"), None);
    }

    #[test]
    fn bad_parts_are_errors() {
        let d = doc(json!({"pub_year": "2020", "pub_month": "Winter"}));
        assert_eq!(pub_date(&d), Err(DateError::Month("Winter".into())));
        let d = doc(json!({"pub_year": "2021", "pub_month": "Feb", "pub_day": "30"}));
        assert!(matches!(pub_date(&d), Err(DateError::Calendar { .. })));
    }

    fn prediction(journal: Value) -> Prediction {
        Prediction {
            document: doc(journal),
            classification: 1,
            probability: 0.995,
        }
    }

    #[test]
    fn document_fields() {
        let now = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        let out = to_document(prediction(json!({"pub_year": "2021", "pub_month": "Jan"})), now)
            .unwrap();
        assert_eq!(out["id"], json!("123"));
        assert_eq!(out["pmid"], json!("123"));
        assert_eq!(out["classification"], json!(1));
        assert_eq!(out["probability"], json!(0.995));
        assert_eq!(out["pub_date"], json!("2021-01-01T00:00:00Z"));
        assert_eq!(out["last_updated"], json!("2024-05-06T07:08:09Z"));
    }

    #[test]
    fn document_without_year_has_no_pub_date_key() {
        let out = to_document(prediction(json!({"pub_year": null})), Utc::now()).unwrap();
        assert!(!out.contains_key("pub_date"));
    }

    #[test]
    fn invalid_date_is_omitted() {
        let out = to_document(prediction(json!({"pub_year": "20x1"})), Utc::now()).unwrap();
        assert!(!out.contains_key("pub_date"));
        assert_eq!(out["id"], json!("123"));
    }

    #[test]
    fn document_requires_pmid() {
        let p = Prediction {
            document: Record::new(),
            classification: 1,
            probability: 1.0,
        };
        assert_eq!(
            to_document(p, Utc::now()),
            Err(PipelineError::missing_field("pmid"))
        );
    }
}
