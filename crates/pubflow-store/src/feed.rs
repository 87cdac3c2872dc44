//! Read feed over stored documents
//!
//! Selects documents updated on or after a date whose publication date
//! falls in an inclusive range, newest publication first, then paginates.

use chrono::{DateTime, NaiveDate, Utc};
use pubflow_core::Record;

use crate::store::{DocumentStore, StoreError};

pub const MIN_DATE: &str = "1400-01-01";
pub const MAX_DATE: &str = "9999-12-31";
pub const MAX_NUM_ITEMS: usize = 100_000;
pub const DEFAULT_LIMIT: usize = 1000;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Rejected feed parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// Not a `YYYY-MM-DD` date
    InvalidDate { field: &'static str, value: String },
    /// Date outside [`MIN_DATE`, `MAX_DATE`]
    DateOutOfRange { field: &'static str, value: String },
    /// `limit` or `skip` above [`MAX_NUM_ITEMS`]
    TooMany { field: &'static str, value: usize },
}

impl std::fmt::Display for FeedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDate { field, value } => write!(f, "{field}: invalid date {value:?}"),
            Self::DateOutOfRange { field, value } => {
                write!(f, "{field}: {value} outside {MIN_DATE}..{MAX_DATE}")
            }
            Self::TooMany { field, value } => {
                write!(f, "{field}: {value} exceeds {MAX_NUM_ITEMS}")
            }
        }
    }
}

impl std::error::Error for FeedError {}

/// Parameters of one feed read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedQuery {
    /// Minimum `last_updated` date (inclusive)
    pub updated: NaiveDate,
    /// Earliest `pub_date` (inclusive)
    pub start: NaiveDate,
    /// Latest `pub_date` (inclusive)
    pub end: NaiveDate,
    pub limit: usize,
    pub skip: usize,
}

impl Default for FeedQuery {
    fn default() -> Self {
        Self {
            updated: min_date(),
            start: min_date(),
            end: max_date(),
            limit: DEFAULT_LIMIT,
            skip: 0,
        }
    }
}

fn min_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1400, 1, 1).unwrap_or(NaiveDate::MIN)
}

fn max_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(9999, 12, 31).unwrap_or(NaiveDate::MAX)
}

/// Parse a `YYYY-MM-DD` feed parameter and check it is within bounds.
pub fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate, FeedError> {
    let date = NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| {
        FeedError::InvalidDate {
            field,
            value: value.to_string(),
        }
    })?;
    if !(min_date()..=max_date()).contains(&date) {
        return Err(FeedError::DateOutOfRange {
            field,
            value: value.to_string(),
        });
    }
    Ok(date)
}

impl FeedQuery {
    /// Build a query from raw parameters; `None` takes the default.
    pub fn parse(
        updated: Option<&str>,
        start: Option<&str>,
        end: Option<&str>,
        limit: Option<usize>,
        skip: Option<usize>,
    ) -> Result<Self, FeedError> {
        let defaults = Self::default();
        let query = Self {
            updated: updated.map_or(Ok(defaults.updated), |v| parse_date("updated", v))?,
            start: start.map_or(Ok(defaults.start), |v| parse_date("start", v))?,
            end: end.map_or(Ok(defaults.end), |v| parse_date("end", v))?,
            limit: limit.unwrap_or(defaults.limit),
            skip: skip.unwrap_or(defaults.skip),
        };
        query.validate()?;
        Ok(query)
    }

    pub fn validate(&self) -> Result<(), FeedError> {
        if self.limit > MAX_NUM_ITEMS {
            return Err(FeedError::TooMany {
                field: "limit",
                value: self.limit,
            });
        }
        if self.skip > MAX_NUM_ITEMS {
            return Err(FeedError::TooMany {
                field: "skip",
                value: self.skip,
            });
        }
        Ok(())
    }

    /// Whether a stored document passes the date filters.
    ///
    /// Documents without a parseable `pub_date` or `last_updated` never match.
    pub fn matches(&self, doc: &Record) -> bool {
        let (Some(updated), Some(pub_date)) = (
            date_field(doc, "last_updated"),
            date_field(doc, "pub_date"),
        ) else {
            return false;
        };
        updated >= self.updated && pub_date >= self.start && pub_date <= self.end
    }

    /// Run the query against `table`.
    ///
    /// Order is `pub_date` descending, ties by `id` ascending; `skip` is
    /// applied before `limit`.
    pub fn run<S: DocumentStore + ?Sized>(
        &self,
        store: &S,
        table: &str,
    ) -> Result<Vec<Record>, StoreError> {
        let mut hits: Vec<(DateTime<Utc>, String, Record)> = store
            .scan(table)?
            .into_iter()
            .filter(|doc| self.matches(doc))
            .filter_map(|doc| {
                let pub_date = timestamp_field(&doc, "pub_date")?;
                let id = pubflow_core::field_str(doc.get("id")).unwrap_or_default();
                Some((pub_date, id, doc))
            })
            .collect();

        hits.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        let page: Vec<Record> = hits
            .into_iter()
            .skip(self.skip)
            .take(self.limit)
            .map(|(_, _, doc)| doc)
            .collect();
        log::debug!("feed {self:?}: {} documents", page.len());
        Ok(page)
    }
}

fn timestamp_field(doc: &Record, name: &str) -> Option<DateTime<Utc>> {
    let raw = doc.get(name)?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn date_field(doc: &Record, name: &str) -> Option<NaiveDate> {
    timestamp_field(doc, name).map(|dt| dt.date_naive())
}
