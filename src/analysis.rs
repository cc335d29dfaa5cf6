//! Run orchestration: load and profile every source, then detect keys and
//! date columns per table and infer relationships across tables.
//!
//! The per-table phase has no cross-table dependency and may run on a worker
//! pool. Inference starts only after every table has been profiled. All state
//! lives in the returned [`AnalysisReport`]; nothing survives the call.

use std::collections::HashSet;

use log::{info, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::{
    cancel::CancelToken,
    config::AnalysisConfig,
    dates::{DateColumnFlag, detect_date_columns},
    error::{AnalysisError, FailureKind, SourceError},
    keys::{PrimaryKeyCandidate, detect_primary_keys},
    loader::load_source,
    profile::{ColumnKind, TableProfile, profile_table},
    relations::{Relationship, infer_relationships},
    source::SourceInput,
};

/// Everything one run needs, owned by the caller.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub config: AnalysisConfig,
    pub cancel: CancelToken,
}

impl RunContext {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ColumnSummary {
    pub name: String,
    pub row_count: usize,
    pub null_count: usize,
    pub distinct_count: usize,
    pub kind: ColumnKind,
    pub approximate: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TableSummary {
    pub name: String,
    pub source: String,
    pub row_count: usize,
    pub columns: Vec<ColumnSummary>,
}

impl From<&TableProfile> for TableSummary {
    fn from(profile: &TableProfile) -> Self {
        TableSummary {
            name: profile.name.clone(),
            source: profile.source.clone(),
            row_count: profile.row_count,
            columns: profile
                .columns
                .iter()
                .map(|column| ColumnSummary {
                    name: column.column.clone(),
                    row_count: column.row_count,
                    null_count: column.null_count,
                    distinct_count: column.distinct_count,
                    kind: column.kind,
                    approximate: column.is_approximate(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SourceFailure {
    pub input: String,
    pub kind: FailureKind,
    pub message: String,
}

impl From<&SourceError> for SourceFailure {
    fn from(err: &SourceError) -> Self {
        SourceFailure {
            input: err.input().to_string(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct AnalysisReport {
    pub tables: Vec<TableSummary>,
    pub primary_keys: Vec<PrimaryKeyCandidate>,
    pub date_columns: Vec<DateColumnFlag>,
    pub relationships: Vec<Relationship>,
    pub failures: Vec<SourceFailure>,
}

impl AnalysisReport {
    pub fn primary_keys_for<'a>(
        &'a self,
        table: &'a str,
    ) -> impl Iterator<Item = &'a PrimaryKeyCandidate> + 'a {
        self.primary_keys.iter().filter(move |key| key.table == table)
    }

    pub fn date_columns_for<'a>(
        &'a self,
        table: &'a str,
    ) -> impl Iterator<Item = &'a DateColumnFlag> + 'a {
        self.date_columns.iter().filter(move |flag| flag.table == table)
    }
}

type TableOutcome = Result<TableProfile, SourceError>;

pub fn analyze(
    context: &RunContext,
    sources: Vec<SourceInput>,
) -> Result<AnalysisReport, AnalysisError> {
    context.config.validate()?;
    context.cancel.check()?;
    info!("Analyzing {} source(s)", sources.len());

    let mut profiles = Vec::new();
    let mut failures = Vec::new();
    for outcome in profile_sources(context, sources)? {
        match outcome {
            Ok(profile) => profiles.push(profile),
            Err(err) => {
                warn!("Skipping source: {err}");
                failures.push(SourceFailure::from(&err));
            }
        }
    }
    assign_unique_names(&mut profiles);

    context.cancel.check()?;
    let primary_keys = profiles
        .iter()
        .flat_map(|table| detect_primary_keys(table, &context.config))
        .collect::<Vec<_>>();
    info!(
        "Detected {} primary key candidate(s) across {} table(s)",
        primary_keys.len(),
        profiles.len()
    );

    context.cancel.check()?;
    let date_columns = profiles
        .iter()
        .flat_map(|table| detect_date_columns(&table.columns, &context.config))
        .collect::<Vec<_>>();
    info!("Flagged {} date column(s)", date_columns.len());

    context.cancel.check()?;
    let relationships = infer_relationships(&profiles, &primary_keys);
    info!("Inferred {} relationship(s)", relationships.len());

    Ok(AnalysisReport {
        tables: profiles.iter().map(TableSummary::from).collect(),
        primary_keys,
        date_columns,
        relationships,
        failures,
    })
}

/// Loads and profiles every source, returning one outcome per table in
/// source order regardless of how many workers ran.
fn profile_sources(
    context: &RunContext,
    sources: Vec<SourceInput>,
) -> Result<Vec<TableOutcome>, AnalysisError> {
    let jobs = context.config.jobs.clamp(1, sources.len().max(1));
    let per_source = if jobs > 1 {
        match rayon::ThreadPoolBuilder::new().num_threads(jobs).build() {
            Ok(pool) => pool.install(|| {
                sources
                    .into_par_iter()
                    .map(|source| process_source(context, source))
                    .collect::<Result<Vec<_>, _>>()
            })?,
            Err(err) => {
                warn!("Falling back to sequential profiling: {err}");
                sequential(context, sources)?
            }
        }
    } else {
        sequential(context, sources)?
    };
    Ok(per_source.into_iter().flatten().collect())
}

fn sequential(
    context: &RunContext,
    sources: Vec<SourceInput>,
) -> Result<Vec<Vec<TableOutcome>>, AnalysisError> {
    sources
        .into_iter()
        .map(|source| process_source(context, source))
        .collect()
}

/// Per-source failures become outcomes; only cancellation escapes.
fn process_source(
    context: &RunContext,
    source: SourceInput,
) -> Result<Vec<TableOutcome>, AnalysisError> {
    context.cancel.check()?;
    let tables = match load_source(source, &context.config) {
        Ok(tables) => tables,
        Err(err) => return Ok(vec![Err(err)]),
    };
    let mut outcomes = Vec::with_capacity(tables.len());
    for table in tables {
        match profile_table(table, &context.config, &context.cancel) {
            Ok(profile) => outcomes.push(Ok(profile)),
            Err(AnalysisError::Source(err)) => outcomes.push(Err(err)),
            Err(err) => return Err(err),
        }
    }
    Ok(outcomes)
}

/// Appends `_{k}` to repeated table names so every table is addressable.
fn assign_unique_names(profiles: &mut [TableProfile]) {
    let mut taken: HashSet<String> = HashSet::new();
    for profile in profiles.iter_mut() {
        if taken.insert(profile.name.clone()) {
            continue;
        }
        let mut suffix = 2usize;
        let mut candidate = format!("{}_{suffix}", profile.name);
        while taken.contains(&candidate) {
            suffix += 1;
            candidate = format!("{}_{suffix}", profile.name);
        }
        warn!(
            "Table name '{}' from '{}' is already in use; renamed to '{candidate}'",
            profile.name, profile.source
        );
        taken.insert(candidate.clone());
        profile.rename(candidate);
    }
}
