//! Primary-key candidate detection.

use std::cmp::Ordering;

use log::debug;
use serde::Serialize;

use crate::{
    config::AnalysisConfig,
    naming::{self, KeyNameMatch},
    profile::{ColumnProfile, TableProfile},
};

const UNIQUENESS_WEIGHT: f64 = 0.8;
const APPROXIMATE_PENALTY: f64 = 0.6;
const SINGLE_VALUE_PENALTY: f64 = 0.5;

/// Whether a candidate's uniqueness was counted or estimated.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Evidence {
    Exact,
    Approximate,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PrimaryKeyCandidate {
    pub table: String,
    pub column: String,
    pub confidence: f64,
    pub evidence: Evidence,
    pub name_match: KeyNameMatch,
}

/// Ranks the columns of `table` that could identify its rows, highest
/// confidence first. An empty list is a valid answer.
pub fn detect_primary_keys(
    table: &TableProfile,
    config: &AnalysisConfig,
) -> Vec<PrimaryKeyCandidate> {
    let mut ranked = table
        .columns
        .iter()
        .filter_map(|column| score_column(column, config).map(|candidate| (column.position, candidate)))
        .collect::<Vec<_>>();
    ranked.sort_by(|(left_pos, left), (right_pos, right)| {
        right
            .confidence
            .partial_cmp(&left.confidence)
            .unwrap_or(Ordering::Equal)
            .then(left_pos.cmp(right_pos))
    });
    ranked.into_iter().map(|(_, candidate)| candidate).collect()
}

fn score_column(column: &ColumnProfile, config: &AnalysisConfig) -> Option<PrimaryKeyCandidate> {
    if column.non_null_count() == 0 || column.null_fraction() > config.uniqueness_null_tolerance {
        return None;
    }
    if !column.appears_unique() {
        return None;
    }
    let name_match = naming::key_name_match(&column.table_stems(), &column.column);
    let uniqueness = column.distinct_ratio().min(1.0);
    let mut confidence =
        (UNIQUENESS_WEIGHT * uniqueness + name_match.bonus()) * (1.0 - column.null_fraction());
    let evidence = if column.is_approximate() {
        confidence *= APPROXIMATE_PENALTY;
        Evidence::Approximate
    } else {
        Evidence::Exact
    };
    if column.distinct_count <= 1 {
        confidence *= SINGLE_VALUE_PENALTY;
    }
    let confidence = confidence.clamp(0.0, 1.0);
    debug!(
        "Primary key candidate {}.{} ({evidence:?}, {name_match:?}, confidence {confidence:.2})",
        column.table, column.column
    );
    Some(PrimaryKeyCandidate {
        table: column.table.clone(),
        column: column.column.clone(),
        confidence,
        evidence,
        name_match,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data::Row, profile::TableProfiler};

    fn profile(table: &str, columns: &[&str], rows: &[&[Option<&str>]], config: &AnalysisConfig) -> TableProfile {
        let names: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        let mut profiler = TableProfiler::new(table, &names, config);
        let data: Vec<Row> = rows
            .iter()
            .map(|row| row.iter().map(|cell| cell.map(str::to_string)).collect())
            .collect();
        profiler.ingest(&data);
        profiler.finish(&format!("{table}.csv"))
    }

    #[test]
    fn unique_id_column_ranks_first() {
        let config = AnalysisConfig::default();
        let table = profile(
            "Customers",
            &["name", "id"],
            &[
                &[Some("Ada"), Some("1")],
                &[Some("Bob"), Some("2")],
                &[Some("Cy"), Some("3")],
            ],
            &config,
        );
        let keys = detect_primary_keys(&table, &config);
        let columns: Vec<_> = keys.iter().map(|k| k.column.as_str()).collect();
        assert_eq!(columns, vec!["id", "name"]);
        assert_eq!(keys[0].evidence, Evidence::Exact);
        assert_eq!(keys[0].name_match, KeyNameMatch::Id);
        assert!((keys[0].confidence - 1.0).abs() < 1e-9);
        assert!(keys[1].confidence < keys[0].confidence);
    }

    #[test]
    fn duplicated_columns_are_not_candidates() {
        let config = AnalysisConfig::default();
        let table = profile(
            "Orders",
            &["customer_id"],
            &[&[Some("1")], &[Some("1")], &[Some("2")]],
            &config,
        );
        assert!(detect_primary_keys(&table, &config).is_empty());
    }

    #[test]
    fn nulls_are_only_allowed_within_tolerance() {
        let rows: &[&[Option<&str>]] = &[&[Some("1")], &[Some("2")], &[None], &[Some("4")]];
        let strict = AnalysisConfig::default();
        let table = profile("Items", &["item_id"], rows, &strict);
        assert!(detect_primary_keys(&table, &strict).is_empty());

        let tolerant = AnalysisConfig {
            uniqueness_null_tolerance: 0.3,
            ..AnalysisConfig::default()
        };
        let table = profile("Items", &["item_id"], rows, &tolerant);
        let keys = detect_primary_keys(&table, &tolerant);
        assert_eq!(keys.len(), 1);
        assert!(keys[0].confidence < 1.0);
    }

    #[test]
    fn approximate_profiles_are_penalised() {
        // The sketch holds every value, so the distinct estimate is exact.
        let config = AnalysisConfig {
            distinct_value_cap: 16,
            approximate_sample_size: 4_096,
            ..AnalysisConfig::default()
        };
        let names = vec!["id".to_string()];
        let mut profiler = TableProfiler::new("Events", &names, &config);
        let data: Vec<Row> = (0..2_000).map(|i| vec![Some(i.to_string())]).collect();
        profiler.ingest(&data);
        let table = profiler.finish("Events.csv");
        assert!(table.columns[0].is_approximate());

        let keys = detect_primary_keys(&table, &config);
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].evidence, Evidence::Approximate);
        assert!((keys[0].confidence - APPROXIMATE_PENALTY).abs() < 1e-9);
    }

    #[test]
    fn approximate_columns_with_visible_repeats_are_not_keys() {
        let config = AnalysisConfig {
            distinct_value_cap: 16,
            approximate_sample_size: 4_096,
            ..AnalysisConfig::default()
        };
        let names = vec!["session_id".to_string()];
        let mut profiler = TableProfiler::new("Events", &names, &config);
        let data: Vec<Row> = (0..2_000).map(|i| vec![Some((i % 1_000).to_string())]).collect();
        profiler.ingest(&data);
        let table = profiler.finish("Events.csv");
        assert!(table.columns[0].is_approximate());
        assert!(detect_primary_keys(&table, &config).is_empty());
    }

    #[test]
    fn tables_without_rows_have_no_candidates() {
        let config = AnalysisConfig::default();
        let table = profile("Empty", &["id"], &[&[None], &[None]], &config);
        assert!(detect_primary_keys(&table, &config).is_empty());
    }
}
