//! Rendering of an [`AnalysisReport`] for people (text tables) or tools
//! (JSON, YAML).

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;

use crate::{
    analysis::AnalysisReport,
    table::{Align, render_section},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Table,
    Json,
    Yaml,
}

pub fn render(report: &AnalysisReport, format: ReportFormat, include_profiles: bool) -> Result<String> {
    match format {
        ReportFormat::Table => Ok(render_text(report, include_profiles)),
        ReportFormat::Json => {
            let mut json =
                serde_json::to_string_pretty(report).context("Serializing report as JSON")?;
            json.push('\n');
            Ok(json)
        }
        ReportFormat::Yaml => serde_yaml::to_string(report).context("Serializing report as YAML"),
    }
}

pub fn render_text(report: &AnalysisReport, include_profiles: bool) -> String {
    let mut sections = Vec::new();

    sections.push(render_section(
        "Tables",
        &["Table", "Source", "Rows", "Columns"],
        &report
            .tables
            .iter()
            .map(|table| {
                vec![
                    table.name.clone(),
                    table.source.clone(),
                    table.row_count.to_string(),
                    table.columns.len().to_string(),
                ]
            })
            .collect::<Vec<_>>(),
        &[Align::Left, Align::Left, Align::Right, Align::Right],
    ));

    if include_profiles {
        let rows = report
            .tables
            .iter()
            .flat_map(|table| {
                table.columns.iter().map(|column| {
                    vec![
                        table.name.clone(),
                        column.name.clone(),
                        label(&column.kind),
                        column.row_count.to_string(),
                        column.null_count.to_string(),
                        column.distinct_count.to_string(),
                        if column.approximate { "yes" } else { "no" }.to_string(),
                    ]
                })
            })
            .collect::<Vec<_>>();
        sections.push(render_section(
            "Column Profiles",
            &["Table", "Column", "Kind", "Rows", "Nulls", "Distinct", "Approximate"],
            &rows,
            &[
                Align::Left,
                Align::Left,
                Align::Left,
                Align::Right,
                Align::Right,
                Align::Right,
            ],
        ));
    }

    sections.push(render_section(
        "Primary Key Candidates",
        &["Table", "Column", "Confidence", "Evidence", "Name Match"],
        &report
            .primary_keys
            .iter()
            .map(|key| {
                vec![
                    key.table.clone(),
                    key.column.clone(),
                    format!("{:.2}", key.confidence),
                    label(&key.evidence),
                    label(&key.name_match),
                ]
            })
            .collect::<Vec<_>>(),
        &[Align::Left, Align::Left, Align::Right],
    ));

    sections.push(render_section(
        "Date Columns",
        &["Table", "Column", "Formats", "Parsed", "Confidence", "Signal"],
        &report
            .date_columns
            .iter()
            .map(|flag| {
                vec![
                    flag.table.clone(),
                    flag.column.clone(),
                    flag.formats.join(", "),
                    format!("{:.0}%", flag.parse_ratio * 100.0),
                    format!("{:.2}", flag.confidence),
                    label(&flag.signal),
                ]
            })
            .collect::<Vec<_>>(),
        &[Align::Left, Align::Left, Align::Left, Align::Right, Align::Right],
    ));

    sections.push(render_section(
        "Relationships",
        &[
            "Child Table",
            "Child Column (FK)",
            "Parent Table",
            "Parent Column (PK)",
            "Cardinality",
            "Confidence",
            "Evidence",
        ],
        &report
            .relationships
            .iter()
            .map(|rel| {
                vec![
                    rel.child_table.clone(),
                    rel.child_column.clone(),
                    rel.parent_table.clone(),
                    rel.parent_column.clone(),
                    rel.cardinality.to_string(),
                    format!("{:.2}", rel.confidence),
                    label(&rel.evidence),
                ]
            })
            .collect::<Vec<_>>(),
        &[
            Align::Left,
            Align::Left,
            Align::Left,
            Align::Left,
            Align::Left,
            Align::Right,
        ],
    ));

    if !report.failures.is_empty() {
        sections.push(render_section(
            "Failed Sources",
            &["Source", "Kind", "Message"],
            &report
                .failures
                .iter()
                .map(|failure| {
                    vec![
                        failure.input.clone(),
                        label(&failure.kind),
                        failure.message.clone(),
                    ]
                })
                .collect::<Vec<_>>(),
            &[],
        ));
    }

    sections.join("\n")
}

/// The serialized name of a unit enum variant, e.g. `name_and_values`.
fn label<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{RunContext, analyze},
        source::SourceInput,
    };

    fn sample_report() -> AnalysisReport {
        analyze(
            &RunContext::default(),
            vec![
                SourceInput::from_bytes("Customers.csv", b"id,name\n1,Ada\n2,Bob\n3,Cy\n".to_vec()),
                SourceInput::from_bytes("Orders.csv", b"order_id,customer_id\n10,1\n11,1\n12,2\n".to_vec()),
                SourceInput::from_bytes("Empty.csv", b"id\n".to_vec()),
            ],
        )
        .expect("analysis")
    }

    #[test]
    fn text_report_lists_every_section() {
        let rendered = render_text(&sample_report(), false);
        for title in [
            "Tables",
            "Primary Key Candidates",
            "Date Columns",
            "Relationships",
            "Failed Sources",
        ] {
            assert!(rendered.contains(title), "missing {title}");
        }
        assert!(rendered.contains("Child Column (FK)"));
        assert!(rendered.contains("n:1"));
        assert!(rendered.contains("empty_table_error"));
        assert!(!rendered.contains("Column Profiles"));
    }

    #[test]
    fn json_report_uses_plain_labels() {
        let rendered = render(&sample_report(), ReportFormat::Json, false).expect("json");
        let value: serde_json::Value = serde_json::from_str(&rendered).expect("parse");
        let rel = &value["relationships"][0];
        assert_eq!(rel["child_table"], "Orders");
        assert_eq!(rel["cardinality"], "n:1");
        assert_eq!(rel["evidence"], "exact");
        assert_eq!(value["failures"][0]["kind"], "empty_table_error");
    }

    #[test]
    fn yaml_report_round_trips_as_a_mapping() {
        let rendered = render(&sample_report(), ReportFormat::Yaml, true).expect("yaml");
        let value: serde_yaml::Value = serde_yaml::from_str(&rendered).expect("parse");
        assert!(value.get("primary_keys").is_some());
    }
}
