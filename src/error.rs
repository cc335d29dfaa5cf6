//! Error taxonomy for the inference engine.
//!
//! [`SourceError`] covers everything that can go wrong with a single input
//! source. Those failures are collected into the report and never abort the
//! run. [`AnalysisError`] is reserved for conditions that stop a whole run.

use std::io;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{input}: {message}")]
    Format { input: String, message: String },
    #[error("{input}: source contains no data rows")]
    EmptyTable { input: String },
    #[error("{input}: {message}")]
    ResourceLimit { input: String, message: String },
    #[error("{input}: {error}")]
    Io {
        input: String,
        #[source]
        error: io::Error,
    },
}

impl SourceError {
    pub fn format(input: impl Into<String>, message: impl Into<String>) -> Self {
        SourceError::Format {
            input: input.into(),
            message: message.into(),
        }
    }

    pub fn empty(input: impl Into<String>) -> Self {
        SourceError::EmptyTable {
            input: input.into(),
        }
    }

    pub fn resource_limit(input: impl Into<String>, message: impl Into<String>) -> Self {
        SourceError::ResourceLimit {
            input: input.into(),
            message: message.into(),
        }
    }

    pub fn io(input: impl Into<String>, error: io::Error) -> Self {
        SourceError::Io {
            input: input.into(),
            error,
        }
    }

    pub fn input(&self) -> &str {
        match self {
            SourceError::Format { input, .. }
            | SourceError::EmptyTable { input }
            | SourceError::ResourceLimit { input, .. }
            | SourceError::Io { input, .. } => input,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            SourceError::Format { .. } => FailureKind::FormatError,
            SourceError::EmptyTable { .. } => FailureKind::EmptyTableError,
            SourceError::ResourceLimit { .. } => FailureKind::ResourceLimitError,
            SourceError::Io { .. } => FailureKind::IoError,
        }
    }
}

/// Serializable tag for a [`SourceError`], used in reports.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    FormatError,
    EmptyTableError,
    ResourceLimitError,
    IoError,
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis run was cancelled")]
    Cancelled,
    #[error("invalid analysis configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Source(#[from] SourceError),
}
