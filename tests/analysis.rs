mod common;

use std::{collections::BTreeSet, io::Cursor};

use common::{csv_source, customers_and_orders};
use proptest::prelude::*;
use relation_scout::{
    AnalysisConfig, AnalysisError, AnalysisReport, CancelToken, RunContext, SourceInput, analyze,
    dates::DateSignal,
    error::FailureKind,
    keys::Evidence,
    relations::Cardinality,
};

fn run(config: AnalysisConfig, sources: Vec<SourceInput>) -> AnalysisReport {
    analyze(&RunContext::new(config), sources).expect("analysis run")
}

type Link = (String, String, String, String, Cardinality);

fn links(report: &AnalysisReport) -> BTreeSet<Link> {
    report
        .relationships
        .iter()
        .map(|rel| {
            (
                rel.child_table.clone(),
                rel.child_column.clone(),
                rel.parent_table.clone(),
                rel.parent_column.clone(),
                rel.cardinality,
            )
        })
        .collect()
}

fn keys(report: &AnalysisReport) -> BTreeSet<(String, String, Evidence)> {
    report
        .primary_keys
        .iter()
        .map(|key| (key.table.clone(), key.column.clone(), key.evidence))
        .collect()
}

#[test]
fn orders_link_to_customers_many_to_one() {
    let report = run(AnalysisConfig::default(), customers_and_orders());

    let customer_keys: Vec<_> = report.primary_keys_for("Customers").collect();
    assert_eq!(customer_keys[0].column, "id");

    let expected: Link = (
        "Orders".into(),
        "customer_id".into(),
        "Customers".into(),
        "id".into(),
        Cardinality::ManyToOne,
    );
    assert_eq!(links(&report), BTreeSet::from([expected]));
    assert!(report.failures.is_empty());
}

#[test]
fn mostly_parseable_signup_dates_are_flagged_with_their_ratio() {
    let mut body = String::from("user_id,signup_date\n");
    for day in 1..=9 {
        body.push_str(&format!("{day},2024-03-{day:02}\n"));
    }
    body.push_str("10,someday\n");
    let report = run(
        AnalysisConfig::default(),
        vec![csv_source("Users.csv", &body)],
    );

    let flag = report
        .date_columns_for("Users")
        .find(|flag| flag.column == "signup_date")
        .expect("signup_date flagged");
    assert_eq!(flag.signal, DateSignal::NameAndValues);
    assert!((flag.parse_ratio - 0.9).abs() < 1e-9);
    assert!((flag.confidence - 0.9).abs() < 1e-9);
    assert!(flag.formats.contains(&"%Y-%m-%d".to_string()));
}

#[test]
fn header_only_source_is_reported_and_the_rest_continue() {
    let mut sources = customers_and_orders();
    sources.push(csv_source("Returns.csv", "return_id,order_id\n"));
    let report = run(AnalysisConfig::default(), sources);

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].input, "Returns.csv");
    assert_eq!(report.failures[0].kind, FailureKind::EmptyTableError);
    assert!(report.tables.iter().all(|t| t.name != "Returns"));
    assert!(report.primary_keys.iter().all(|k| k.table != "Returns"));
    assert!(report.date_columns.iter().all(|d| d.table != "Returns"));
    assert!(
        report
            .relationships
            .iter()
            .all(|r| r.child_table != "Returns" && r.parent_table != "Returns")
    );
    assert_eq!(report.relationships.len(), 1);
}

#[test]
fn malformed_sources_are_reported_per_source() {
    let mut sources = customers_and_orders();
    sources.push(csv_source("Broken.csv", "a,b\n1,2\n3\n"));
    sources.push(SourceInput::from_bytes(
        "Nested.json",
        br#"[{"id": 1, "tags": ["x"]}]"#.to_vec(),
    ));
    let report = run(AnalysisConfig::default(), sources);

    let failed: BTreeSet<_> = report
        .failures
        .iter()
        .map(|f| (f.input.as_str(), f.kind))
        .collect();
    assert_eq!(
        failed,
        BTreeSet::from([
            ("Broken.csv", FailureKind::FormatError),
            ("Nested.json", FailureKind::FormatError),
        ])
    );
    assert_eq!(report.tables.len(), 2);
}

#[test]
fn row_ceiling_is_a_resource_limit() {
    let config = AnalysisConfig {
        max_rows_per_source: 2,
        ..AnalysisConfig::default()
    };
    let report = run(config, customers_and_orders());
    assert!(
        report
            .failures
            .iter()
            .all(|f| f.kind == FailureKind::ResourceLimitError)
    );
    assert_eq!(report.failures.len(), 2);
}

#[test]
fn primary_key_candidates_are_unique_over_non_null_rows() {
    let report = run(AnalysisConfig::default(), customers_and_orders());
    for key in report
        .primary_keys
        .iter()
        .filter(|key| key.evidence == Evidence::Exact)
    {
        let table = report
            .tables
            .iter()
            .find(|t| t.name == key.table)
            .expect("table summary");
        let column = table
            .columns
            .iter()
            .find(|c| c.name == key.column)
            .expect("column summary");
        assert_eq!(column.distinct_count, column.row_count - column.null_count);
    }
}

#[test]
fn streaming_and_materialized_loads_agree() {
    let materialized = run(AnalysisConfig::default(), customers_and_orders());
    let streaming = run(
        AnalysisConfig {
            large_file_threshold_bytes: 0,
            chunk_size_rows: 1,
            ..AnalysisConfig::default()
        },
        customers_and_orders(),
    );
    assert_eq!(materialized.tables, streaming.tables);
    assert_eq!(links(&materialized), links(&streaming));
    assert_eq!(keys(&materialized), keys(&streaming));
}

#[test]
fn unknown_length_streams_are_profiled() {
    let sources = vec![
        SourceInput::from_reader(
            "Customers.csv",
            Cursor::new(b"id\n1\n2\n3\n".to_vec()),
            None,
        ),
        SourceInput::from_reader(
            "Orders.csv",
            Cursor::new(b"customer_id\n3\n3\n".to_vec()),
            None,
        ),
    ];
    let report = run(AnalysisConfig::default(), sources);
    assert_eq!(report.relationships.len(), 1);
    assert_eq!(report.relationships[0].parent_table, "Customers");
}

#[test]
fn parallel_profiling_matches_sequential() {
    let sequential = run(AnalysisConfig::default(), customers_and_orders());
    let parallel = run(
        AnalysisConfig {
            jobs: 4,
            ..AnalysisConfig::default()
        },
        customers_and_orders(),
    );
    assert_eq!(sequential, parallel);
}

#[test]
fn cancelled_token_discards_the_run() {
    let cancel = CancelToken::new();
    let context = RunContext::new(AnalysisConfig::default()).with_cancel(cancel.clone());
    cancel.cancel();
    let err = analyze(&context, customers_and_orders()).expect_err("cancelled run");
    assert!(matches!(err, AnalysisError::Cancelled));
}

/// Accounts and Logins tables whose id columns exceed a 256-value cap. The
/// sketch keeps every value, so distinct estimates are exact while evidence
/// stays approximate.
fn capped_accounts_and_logins() -> (AnalysisConfig, Vec<SourceInput>) {
    let mut parent = String::from("account_id\n");
    let mut child = String::from("login_id,account_id\n");
    for i in 0..3_000 {
        parent.push_str(&format!("A{i:05}\n"));
    }
    for i in 0..1_500 {
        child.push_str(&format!("L{i},A{:05}\n", (i * 7) % 3_000));
    }
    let config = AnalysisConfig {
        distinct_value_cap: 256,
        approximate_sample_size: 4_096,
        ..AnalysisConfig::default()
    };
    let sources = vec![csv_source("Accounts.csv", &parent), csv_source("Logins.csv", &child)];
    (config, sources)
}

#[test]
fn capped_profiles_only_yield_reduced_confidence_links() {
    let (config, sources) = capped_accounts_and_logins();
    let report = run(config, sources);

    assert!(
        report
            .tables
            .iter()
            .flat_map(|t| t.columns.iter())
            .all(|c| c.approximate)
    );
    assert!(!report.primary_keys.is_empty());
    for key in &report.primary_keys {
        assert_eq!(key.evidence, Evidence::Approximate);
        assert!(key.confidence < 0.7);
    }

    let expected: Link = (
        "Logins".into(),
        "account_id".into(),
        "Accounts".into(),
        "account_id".into(),
        Cardinality::OneToOne,
    );
    assert_eq!(links(&report), BTreeSet::from([expected]));
    let rel = &report.relationships[0];
    assert_eq!(rel.evidence, Evidence::Approximate);
    assert!(rel.confidence > 0.0 && rel.confidence < 0.7);
}

#[test]
fn approximate_links_rank_below_every_exact_link() {
    let (config, mut sources) = capped_accounts_and_logins();
    sources.extend(customers_and_orders());
    let report = run(config, sources);

    let (approximate, exact): (Vec<_>, Vec<_>) = report
        .relationships
        .iter()
        .partition(|rel| rel.evidence == Evidence::Approximate);
    assert!(!approximate.is_empty());
    assert!(!exact.is_empty());
    let strongest_sampled = approximate
        .iter()
        .map(|rel| rel.confidence)
        .fold(f64::MIN, f64::max);
    let weakest_proven = exact
        .iter()
        .map(|rel| rel.confidence)
        .fold(f64::MAX, f64::min);
    assert!(strongest_sampled < weakest_proven);
}

#[test]
fn wide_numeric_ids_stay_distinct() {
    let report = run(
        AnalysisConfig::default(),
        vec![
            csv_source(
                "Cards.csv",
                "card_id\n12345678901234567890\n12345678901234567891\n",
            ),
            csv_source("Payments.csv", "card_id\n12345678901234567892\n"),
        ],
    );

    let cards = report
        .tables
        .iter()
        .find(|t| t.name == "Cards")
        .expect("cards summary");
    assert_eq!(cards.columns[0].distinct_count, 2);
    assert!(report.primary_keys_for("Cards").any(|k| k.column == "card_id"));
    assert!(report.relationships.is_empty());
}

#[test]
fn repeated_runs_are_identical() {
    let first = run(AnalysisConfig::default(), customers_and_orders());
    let second = run(AnalysisConfig::default(), customers_and_orders());
    assert_eq!(first, second);
}

fn shuffled_csv(header: &str, rows: &[String]) -> String {
    let mut body = format!("{header}\n");
    for row in rows {
        body.push_str(row);
        body.push('\n');
    }
    body
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn results_ignore_row_order_and_chunk_size(
        customer_count in 1usize..40,
        refs in proptest::collection::vec(0usize..40, 1..60),
        chunk in 1usize..16,
        rotation in 0usize..60,
    ) {
        let customers: Vec<String> = (0..customer_count).map(|i| format!("{},name{i}", i + 1)).collect();
        let orders: Vec<String> = refs
            .iter()
            .enumerate()
            .map(|(n, r)| format!("{},{}", 1000 + n, (r % customer_count) + 1))
            .collect();
        let mut rotated = orders.clone();
        rotated.rotate_left(rotation % orders.len());
        let mut reversed = customers.clone();
        reversed.reverse();

        let baseline = run(
            AnalysisConfig::default(),
            vec![
                csv_source("Customers.csv", &shuffled_csv("id,name", &customers)),
                csv_source("Orders.csv", &shuffled_csv("order_id,customer_id", &orders)),
            ],
        );
        let reordered = run(
            AnalysisConfig {
                chunk_size_rows: chunk,
                large_file_threshold_bytes: 0,
                ..AnalysisConfig::default()
            },
            vec![
                csv_source("Customers.csv", &shuffled_csv("id,name", &reversed)),
                csv_source("Orders.csv", &shuffled_csv("order_id,customer_id", &rotated)),
            ],
        );

        prop_assert_eq!(&baseline.tables, &reordered.tables);
        prop_assert_eq!(links(&baseline), links(&reordered));
        prop_assert_eq!(keys(&baseline), keys(&reordered));
        prop_assert!(baseline.relationships.iter().all(|r| r.child_table != r.parent_table));
    }
}
