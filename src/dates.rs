//! Date column detection.
//!
//! A column is flagged when its sampled values parse against a fixed list of
//! common date and date-time formats, or when only its name suggests a date.
//! Value evidence decides the confidence; a name-only match still produces a
//! low-confidence flag.

use std::{collections::BTreeSet, sync::OnceLock};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use heck::ToSnakeCase;
use log::debug;
use regex::Regex;
use serde::Serialize;

use crate::{config::AnalysisConfig, profile::ColumnProfile};

pub const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%d %b %Y",
    "%b %d, %Y",
    "%B %d, %Y",
];

pub const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%d/%m/%Y %H:%M",
    "%m/%d/%Y %H:%M",
];

const RFC3339_HINT: &str = "rfc3339";
const NAME_ONLY_BASE_CONFIDENCE: f64 = 0.25;
const NAME_ONLY_RATIO_WEIGHT: f64 = 0.25;

/// Returns the first format hint that parses `value`, if any.
pub fn match_date_format(value: &str) -> Option<&'static str> {
    let value = value.trim();
    if DateTime::parse_from_rfc3339(value).is_ok() {
        return Some(RFC3339_HINT);
    }
    if let Some(format) = DATETIME_FORMATS
        .iter()
        .find(|fmt| NaiveDateTime::parse_from_str(value, fmt).is_ok())
    {
        return Some(*format);
    }
    DATE_FORMATS
        .iter()
        .find(|fmt| NaiveDate::parse_from_str(value, fmt).is_ok())
        .copied()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DateParseSummary {
    pub sampled: usize,
    pub parsed: usize,
    pub formats: BTreeSet<&'static str>,
}

impl DateParseSummary {
    pub fn ratio(&self) -> f64 {
        if self.sampled == 0 {
            0.0
        } else {
            self.parsed as f64 / self.sampled as f64
        }
    }
}

pub fn summarize_dates<'a, I>(values: I) -> DateParseSummary
where
    I: IntoIterator<Item = &'a str>,
{
    let mut summary = DateParseSummary::default();
    for value in values {
        summary.sampled += 1;
        if let Some(format) = match_date_format(value) {
            summary.parsed += 1;
            summary.formats.insert(format);
        }
    }
    summary
}

fn date_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"date|time|created|updated|modified|(^|_)dt(_|$)|(^|_)ts(_|$)")
            .expect("date name pattern is a valid regex")
    })
}

pub fn name_suggests_date(column: &str) -> bool {
    date_name_pattern().is_match(&column.to_snake_case())
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DateSignal {
    NameAndValues,
    Values,
    NameOnly,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DateColumnFlag {
    pub table: String,
    pub column: String,
    pub formats: Vec<String>,
    pub parse_ratio: f64,
    pub confidence: f64,
    pub signal: DateSignal,
}

pub fn detect_date_columns(
    columns: &[ColumnProfile],
    config: &AnalysisConfig,
) -> Vec<DateColumnFlag> {
    columns
        .iter()
        .filter_map(|profile| flag_column(profile, config))
        .collect()
}

fn flag_column(profile: &ColumnProfile, config: &AnalysisConfig) -> Option<DateColumnFlag> {
    let summary = summarize_dates(profile.sample_values.iter().map(String::as_str));
    let ratio = summary.ratio();
    let by_name = name_suggests_date(&profile.column);
    let by_values = summary.sampled > 0
        && !profile.is_numeric()
        && ratio >= config.date_parse_success_threshold;

    let (signal, confidence) = match (by_name, by_values) {
        (true, true) => (DateSignal::NameAndValues, ratio),
        (false, true) => (DateSignal::Values, ratio),
        (true, false) => (
            DateSignal::NameOnly,
            NAME_ONLY_BASE_CONFIDENCE + NAME_ONLY_RATIO_WEIGHT * ratio,
        ),
        (false, false) => return None,
    };
    debug!(
        "Date column {}.{} ({signal:?}, {:.0}% parsed)",
        profile.table,
        profile.column,
        ratio * 100.0
    );
    Some(DateColumnFlag {
        table: profile.table.clone(),
        column: profile.column.clone(),
        formats: summary.formats.iter().map(|f| f.to_string()).collect(),
        parse_ratio: ratio,
        confidence,
        signal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_formats_are_recognised() {
        assert_eq!(match_date_format("2024-03-05"), Some("%Y-%m-%d"));
        assert_eq!(match_date_format("2024-03-05T10:15:00Z"), Some("rfc3339"));
        assert_eq!(
            match_date_format("2024-03-05 10:15:00"),
            Some("%Y-%m-%d %H:%M:%S")
        );
        assert_eq!(match_date_format("Mar 5, 2024"), Some("%b %d, %Y"));
        assert_eq!(match_date_format("20240305"), None);
        assert_eq!(match_date_format("A-17"), None);
    }

    #[test]
    fn summary_tracks_ratio_and_formats() {
        let summary = summarize_dates(["2024-01-01", "05/02/2024", "soon"]);
        assert_eq!(summary.sampled, 3);
        assert_eq!(summary.parsed, 2);
        assert!(summary.formats.contains("%Y-%m-%d"));
        assert!((summary.ratio() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn date_names_match_tokens_and_substrings() {
        assert!(name_suggests_date("signup_date"));
        assert!(name_suggests_date("CreatedAt"));
        assert!(name_suggests_date("order_dt"));
        assert!(name_suggests_date("update_code"));
        assert!(!name_suggests_date("width"));
        assert!(!name_suggests_date("customer_id"));
    }
}
