//! Tunables for one analysis run.
//!
//! Every option has a default, so a YAML file only needs to list the values it
//! changes:
//!
//! ```yaml
//! chunk_size_rows: 20000
//! distinct_value_cap: 250000
//! uniqueness_null_tolerance: 0.01
//! ```

use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{error::AnalysisError, io_utils};

pub const DEFAULT_CHUNK_SIZE_ROWS: usize = 50_000;
pub const DEFAULT_LARGE_FILE_THRESHOLD_BYTES: u64 = 50 * 1024 * 1024;
pub const DEFAULT_DISTINCT_VALUE_CAP: usize = 1_000_000;
pub const DEFAULT_APPROXIMATE_SAMPLE_SIZE: usize = 4_096;
pub const DEFAULT_DATE_PARSE_SAMPLE_SIZE: usize = 200;
pub const DEFAULT_DATE_PARSE_SUCCESS_THRESHOLD: f64 = 0.8;
pub const DEFAULT_NUMERIC_THRESHOLD: f64 = 0.95;
pub const DEFAULT_MAX_ROWS_PER_SOURCE: usize = 500_000_000;
pub const DEFAULT_MAX_BUFFERED_BYTES: u64 = 512 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Rows per chunk handed from a loader to the profiler.
    pub chunk_size_rows: usize,
    /// Delimited sources larger than this are streamed instead of materialized.
    pub large_file_threshold_bytes: u64,
    /// Distinct values tracked exactly per column before switching to a sketch.
    pub distinct_value_cap: usize,
    /// Number of values retained by an approximate column sketch.
    pub approximate_sample_size: usize,
    /// Fraction of null rows a column may hold and still be claimed as a key.
    pub uniqueness_null_tolerance: f64,
    /// Fraction of sampled values that must be numeric for `is_numeric`.
    pub numeric_threshold: f64,
    pub date_parse_sample_size: usize,
    pub date_parse_success_threshold: f64,
    /// Hard row ceiling per source, even when streaming.
    pub max_rows_per_source: usize,
    /// Ceiling for sources that must be buffered whole (JSON, spreadsheets).
    pub max_buffered_bytes: u64,
    pub input_encoding: Option<String>,
    /// Worker threads used for the per-table load and profile phase.
    pub jobs: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            chunk_size_rows: DEFAULT_CHUNK_SIZE_ROWS,
            large_file_threshold_bytes: DEFAULT_LARGE_FILE_THRESHOLD_BYTES,
            distinct_value_cap: DEFAULT_DISTINCT_VALUE_CAP,
            approximate_sample_size: DEFAULT_APPROXIMATE_SAMPLE_SIZE,
            uniqueness_null_tolerance: 0.0,
            numeric_threshold: DEFAULT_NUMERIC_THRESHOLD,
            date_parse_sample_size: DEFAULT_DATE_PARSE_SAMPLE_SIZE,
            date_parse_success_threshold: DEFAULT_DATE_PARSE_SUCCESS_THRESHOLD,
            max_rows_per_source: DEFAULT_MAX_ROWS_PER_SOURCE,
            max_buffered_bytes: DEFAULT_MAX_BUFFERED_BYTES,
            input_encoding: None,
            jobs: 1,
        }
    }
}

impl AnalysisConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let reader = BufReader::new(file);
        let config: AnalysisConfig =
            serde_yaml::from_reader(reader).context("Parsing analysis config YAML")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        let invalid = |message: String| Err(AnalysisError::InvalidConfig(message));
        if self.chunk_size_rows == 0 {
            return invalid("chunk_size_rows must be greater than zero".to_string());
        }
        if self.approximate_sample_size < 2 {
            return invalid("approximate_sample_size must be at least 2".to_string());
        }
        if self.distinct_value_cap < self.approximate_sample_size {
            return invalid(format!(
                "distinct_value_cap ({}) must not be smaller than approximate_sample_size ({})",
                self.distinct_value_cap, self.approximate_sample_size
            ));
        }
        for (name, value) in [
            ("uniqueness_null_tolerance", self.uniqueness_null_tolerance),
            ("numeric_threshold", self.numeric_threshold),
            (
                "date_parse_success_threshold",
                self.date_parse_success_threshold,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("{name} must be within [0, 1], got {value}"));
            }
        }
        if self.date_parse_sample_size == 0 {
            return invalid("date_parse_sample_size must be greater than zero".to_string());
        }
        if self.max_rows_per_source == 0 {
            return invalid("max_rows_per_source must be greater than zero".to_string());
        }
        if let Err(err) = io_utils::resolve_encoding(self.input_encoding.as_deref()) {
            return invalid(err.to_string());
        }
        Ok(())
    }

    pub fn encoding(&self) -> &'static encoding_rs::Encoding {
        io_utils::resolve_encoding(self.input_encoding.as_deref()).unwrap_or(encoding_rs::UTF_8)
    }
}
