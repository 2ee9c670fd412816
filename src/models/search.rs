//! Search request model and eager validation of raw tool arguments.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{Months, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Number of identifiers requested when `retmax` is omitted
pub const DEFAULT_RETMAX: u32 = 20;

/// Largest `retmax` accepted by ESearch
pub const MAX_RETMAX: u32 = 10_000;

/// A tool argument that failed validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid argument '{field}': {reason}")]
pub struct ArgumentError {
    /// Name of the offending argument
    pub field: &'static str,
    /// Human-readable reason
    pub reason: String,
}

impl ArgumentError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Sort order for PubMed search results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Descending by publication date
    PubDate,
    /// Ascending by first author
    Author,
    /// Ascending by journal name
    JournalName,
    /// "Best Match"
    Relevance,
}

impl SortOrder {
    /// Values advertised in the tool schema
    pub const VALUES: [&'static str; 4] = ["pub_date", "author", "journal_name", "relevance"];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::PubDate => "pub_date",
            SortOrder::Author => "author",
            SortOrder::JournalName => "journal_name",
            SortOrder::Relevance => "relevance",
        }
    }

    /// Spelling expected by the ESearch `sort` parameter
    pub fn upstream_value(&self) -> &'static str {
        match self {
            SortOrder::PubDate => "pub_date",
            SortOrder::Author => "Author",
            SortOrder::JournalName => "JournalName",
            SortOrder::Relevance => "relevance",
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pub_date" => Ok(SortOrder::PubDate),
            "author" | "Author" => Ok(SortOrder::Author),
            "journal_name" | "JournalName" => Ok(SortOrder::JournalName),
            "relevance" => Ok(SortOrder::Relevance),
            other => Err(format!(
                "unknown sort '{}', expected one of: {}",
                other,
                Self::VALUES.join(", ")
            )),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which date a date filter applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateType {
    /// Modification date
    Mdat,
    /// Publication date
    Pdat,
    /// Entrez date
    Edat,
}

impl DateType {
    pub const VALUES: [&'static str; 3] = ["mdat", "pdat", "edat"];

    pub fn as_str(&self) -> &'static str {
        match self {
            DateType::Mdat => "mdat",
            DateType::Pdat => "pdat",
            DateType::Edat => "edat",
        }
    }
}

impl FromStr for DateType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mdat" => Ok(DateType::Mdat),
            "pdat" => Ok(DateType::Pdat),
            "edat" => Ok(DateType::Edat),
            other => Err(format!(
                "unknown datetype '{}', expected one of: {}",
                other,
                Self::VALUES.join(", ")
            )),
        }
    }
}

impl fmt::Display for DateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{4})(?:/(\d{2})(?:/(\d{2}))?)?$").expect("date pattern is valid")
    })
}

/// A calendar date at year, month or day precision (`YYYY`, `YYYY/MM`, `YYYY/MM/DD`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateBound {
    year: i32,
    month: Option<u32>,
    day: Option<u32>,
}

impl DateBound {
    /// First calendar day covered by this bound
    pub fn earliest(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month.unwrap_or(1), self.day.unwrap_or(1))
            .unwrap_or(NaiveDate::MIN)
    }

    /// Last calendar day covered by this bound
    pub fn latest(&self) -> NaiveDate {
        match (self.month, self.day) {
            (Some(month), Some(day)) => NaiveDate::from_ymd_opt(self.year, month, day),
            (Some(month), None) => NaiveDate::from_ymd_opt(self.year, month, 1)
                .and_then(|first| first.checked_add_months(Months::new(1)))
                .and_then(|next| next.pred_opt()),
            _ => NaiveDate::from_ymd_opt(self.year, 12, 31),
        }
        .unwrap_or(NaiveDate::MAX)
    }
}

impl FromStr for DateBound {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = date_pattern()
            .captures(s)
            .ok_or_else(|| format!("'{}' is not a YYYY/MM/DD, YYYY/MM or YYYY date", s))?;

        let number = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());

        let bound = DateBound {
            year: number(1).map(|y| y as i32).unwrap_or_default(),
            month: number(2),
            day: number(3),
        };

        let valid = NaiveDate::from_ymd_opt(
            bound.year,
            bound.month.unwrap_or(1),
            bound.day.unwrap_or(1),
        )
        .is_some();
        if !valid {
            return Err(format!("'{}' is not a valid calendar date", s));
        }

        Ok(bound)
    }
}

impl fmt::Display for DateBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.year)?;
        if let Some(month) = self.month {
            write!(f, "/{:02}", month)?;
        }
        if let Some(day) = self.day {
            write!(f, "/{:02}", day)?;
        }
        Ok(())
    }
}

/// Inclusive `mindate`..`maxdate` window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub min: DateBound,
    pub max: DateBound,
}

/// A validated PubMed search
///
/// Built from raw tool arguments by [`SearchRequest::from_arguments`], which is the
/// only path the tool surface uses; the setters exist for callers that already hold
/// typed values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Entrez text query
    pub term: String,

    /// Maximum number of identifiers to return, within `1..=MAX_RETMAX`
    pub retmax: u32,

    pub sort: Option<SortOrder>,

    /// Search field restriction, equivalent to appending `[field]` to the term
    pub field: Option<String>,

    pub datetype: Option<DateType>,

    /// Only items whose `datetype` falls within the last N days
    pub reldate: Option<u32>,

    /// Explicit date window; never set together with `reldate`
    pub date_range: Option<DateRange>,
}

impl SearchRequest {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            retmax: DEFAULT_RETMAX,
            sort: None,
            field: None,
            datetype: None,
            reldate: None,
            date_range: None,
        }
    }

    pub fn retmax(mut self, retmax: u32) -> Self {
        self.retmax = retmax;
        self
    }

    pub fn sort(mut self, sort: SortOrder) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn datetype(mut self, datetype: DateType) -> Self {
        self.datetype = Some(datetype);
        self
    }

    pub fn reldate(mut self, days: u32) -> Self {
        self.reldate = Some(days);
        self
    }

    pub fn date_range(mut self, min: DateBound, max: DateBound) -> Self {
        self.date_range = Some(DateRange { min, max });
        self
    }

    /// Validate a raw argument mapping into a search request.
    ///
    /// Policy decisions:
    /// - `retmax` outside `1..=10000` is rejected, never clamped
    /// - `reldate` combined with `mindate`/`maxdate` is rejected on `reldate`
    /// - `mindate` and `maxdate` must be given together
    /// - empty strings in optional text fields count as absent
    pub fn from_arguments(arguments: &Value) -> Result<Self, ArgumentError> {
        let empty = Map::new();
        let args = match arguments {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => return Err(ArgumentError::new("arguments", "expected an object")),
        };

        let term = match present(args, "term") {
            None => return Err(ArgumentError::new("term", "is required")),
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::String(_)) => {
                return Err(ArgumentError::new("term", "must not be empty"))
            }
            Some(_) => return Err(ArgumentError::new("term", "expected a string")),
        };

        let retmax = match optional_integer(args, "retmax")? {
            None => DEFAULT_RETMAX,
            Some(n) if (1..=i64::from(MAX_RETMAX)).contains(&n) => n as u32,
            Some(n) => {
                return Err(ArgumentError::new(
                    "retmax",
                    format!("{} is outside 1..={}", n, MAX_RETMAX),
                ))
            }
        };

        let sort = optional_str(args, "sort")?
            .map(|s| s.parse::<SortOrder>())
            .transpose()
            .map_err(|e| ArgumentError::new("sort", e))?;

        let field = optional_str(args, "field")?.map(str::to_string);

        let datetype = optional_str(args, "datetype")?
            .map(|s| s.parse::<DateType>())
            .transpose()
            .map_err(|e| ArgumentError::new("datetype", e))?;

        let reldate = match optional_integer(args, "reldate")? {
            None => None,
            Some(n) => Some(u32::try_from(n).map_err(|_| {
                ArgumentError::new("reldate", format!("{} is not a non-negative day count", n))
            })?),
        };

        let mindate = optional_date(args, "mindate")?;
        let maxdate = optional_date(args, "maxdate")?;

        let date_range = match (mindate, maxdate) {
            (None, None) => None,
            (Some(_), None) => {
                return Err(ArgumentError::new("maxdate", "is required when mindate is set"))
            }
            (None, Some(_)) => {
                return Err(ArgumentError::new("mindate", "is required when maxdate is set"))
            }
            (Some(min), Some(max)) => {
                if min.earliest() > max.latest() {
                    return Err(ArgumentError::new(
                        "mindate",
                        format!("{} is later than maxdate {}", min, max),
                    ));
                }
                Some(DateRange { min, max })
            }
        };

        if reldate.is_some() && date_range.is_some() {
            return Err(ArgumentError::new(
                "reldate",
                "cannot be combined with mindate/maxdate",
            ));
        }

        Ok(Self {
            term,
            retmax,
            sort,
            field,
            datetype,
            reldate,
            date_range,
        })
    }
}

fn present<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    args.get(key).filter(|v| !v.is_null())
}

fn optional_str<'a>(
    args: &'a Map<String, Value>,
    field: &'static str,
) -> Result<Option<&'a str>, ArgumentError> {
    match present(args, field) {
        None => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            Ok((!s.is_empty()).then_some(s))
        }
        Some(_) => Err(ArgumentError::new(field, "expected a string")),
    }
}

fn optional_integer(
    args: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<i64>, ArgumentError> {
    match present(args, field) {
        None => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| ArgumentError::new(field, format!("{} is not an integer", n))),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ArgumentError::new(field, format!("'{}' is not an integer", s))),
        Some(_) => Err(ArgumentError::new(field, "expected an integer")),
    }
}

fn optional_date(
    args: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<DateBound>, ArgumentError> {
    optional_str(args, field)?
        .map(|s| s.parse::<DateBound>())
        .transpose()
        .map_err(|e| ArgumentError::new(field, e))
}
