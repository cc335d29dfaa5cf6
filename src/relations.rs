//! Cross-table relationship inference.
//!
//! Every primary-key candidate of every table is a potential parent. A column
//! of another table becomes its child when the two names pass the
//! compatibility gate and the child's values are contained in the parent's.
//! Exact value sets prove containment; if either side is approximate the test
//! compares coordinated sketch samples and membership filters and can only
//! support a claim.

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
};

use log::debug;
use serde::Serialize;

use crate::{
    data::value_hash,
    keys::{Evidence, PrimaryKeyCandidate},
    naming,
    profile::{ColumnProfile, TableProfile, ValueSet, ValueSketch},
};

const PROVEN_BASE: f64 = 0.7;
const PROVEN_KEY_WEIGHT: f64 = 0.3;
const SAMPLED_CEILING: f64 = 0.6;
/// Comparable sample values needed before sampled support is at full weight.
const SAMPLED_FULL_SUPPORT: f64 = 32.0;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Cardinality {
    #[serde(rename = "1:1")]
    OneToOne,
    #[serde(rename = "n:1")]
    ManyToOne,
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cardinality::OneToOne => write!(f, "1:1"),
            Cardinality::ManyToOne => write!(f, "n:1"),
        }
    }
}

/// Which naming convention tied the child column to the parent key.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NameLink {
    /// Equal names after case and underscore folding.
    SameName,
    /// Child spells `{parent table}{parent column}`, e.g. `customer_id` to `Customers.id`.
    ParentPrefixed,
    /// Child spells `{parent table}_id` or `id` and the parent column is a key of its table.
    ParentKey,
    /// Parent spells `{child table}{child column}` and the child column is a key of its own table.
    ChildPrefixed,
    /// Parent spells `{child table}_id` or `id` and the child column is a key of its own table.
    ChildKey,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Relationship {
    pub child_table: String,
    pub child_column: String,
    pub parent_table: String,
    pub parent_column: String,
    pub cardinality: Cardinality,
    pub confidence: f64,
    pub evidence: Evidence,
    pub link: NameLink,
}

enum Containment {
    Proven,
    Sampled { compared: usize },
}

pub fn infer_relationships(
    tables: &[TableProfile],
    keys: &[PrimaryKeyCandidate],
) -> Vec<Relationship> {
    let mut keys_by_table: HashMap<&str, Vec<&PrimaryKeyCandidate>> = HashMap::new();
    for key in keys {
        keys_by_table.entry(key.table.as_str()).or_default().push(key);
    }

    let mut seen = BTreeSet::new();
    let mut relationships = Vec::new();
    for parent_table in tables {
        let Some(parent_keys) = keys_by_table.get(parent_table.name.as_str()) else {
            continue;
        };
        for key in parent_keys {
            let Some(parent) = parent_table.column(&key.column) else {
                continue;
            };
            for child_table in tables.iter().filter(|t| t.name != parent_table.name) {
                let child_keys = keys_by_table
                    .get(child_table.name.as_str())
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                for child in child_table.columns.iter().filter(|c| c.non_null_count() > 0) {
                    let child_is_key = child_keys.iter().any(|k| k.column == child.column);
                    let Some(link) = name_link(child, child_is_key, parent) else {
                        continue;
                    };
                    let Some(containment) = containment(child, parent) else {
                        continue;
                    };
                    let tuple = (
                        child.table.clone(),
                        child.column.clone(),
                        parent.table.clone(),
                        parent.column.clone(),
                    );
                    if !seen.insert(tuple) {
                        continue;
                    }
                    let relationship = build(child, parent, key, link, containment);
                    debug!(
                        "Relationship {}.{} -> {}.{} ({}, {:?}, confidence {:.2})",
                        relationship.child_table,
                        relationship.child_column,
                        relationship.parent_table,
                        relationship.parent_column,
                        relationship.cardinality,
                        relationship.evidence,
                        relationship.confidence
                    );
                    relationships.push(relationship);
                }
            }
        }
    }

    let mut relationships = drop_mirrored_links(relationships);
    relationships.sort_by(|left, right| {
        (
            &left.child_table,
            &left.child_column,
            &left.parent_table,
            &left.parent_column,
        )
            .cmp(&(
                &right.child_table,
                &right.child_column,
                &right.parent_table,
                &right.parent_column,
            ))
    });
    relationships
}

fn name_link(
    child: &ColumnProfile,
    child_is_key: bool,
    parent: &ColumnProfile,
) -> Option<NameLink> {
    let child_name = naming::normalize_name(&child.column);
    let parent_name = naming::normalize_name(&parent.column);
    if child_name == parent_name {
        return Some(NameLink::SameName);
    }
    let parent_stems = parent.table_stems();
    if naming::is_prefixed_by(&child.column, &parent_stems, &parent.column) {
        return Some(NameLink::ParentPrefixed);
    }
    if child_name == "id" || naming::is_table_id(&child.column, &parent_stems) {
        return Some(NameLink::ParentKey);
    }
    if !child_is_key {
        return None;
    }
    let child_stems = child.table_stems();
    if naming::is_prefixed_by(&parent.column, &child_stems, &child.column) {
        return Some(NameLink::ChildPrefixed);
    }
    if parent_name == "id" || naming::is_table_id(&parent.column, &child_stems) {
        return Some(NameLink::ChildKey);
    }
    None
}

fn containment(child: &ColumnProfile, parent: &ColumnProfile) -> Option<Containment> {
    match (&child.values, &parent.values) {
        (ValueSet::Exact(child_values), ValueSet::Exact(parent_values)) => {
            let contained = !child_values.is_empty() && child_values.is_subset(parent_values);
            contained.then_some(Containment::Proven)
        }
        // An exact parent never exceeded the cap, a sketched child did.
        (ValueSet::Approximate { .. }, ValueSet::Exact(_)) => None,
        (ValueSet::Exact(child_values), ValueSet::Approximate { sketch, filter, .. }) => {
            coordinated_overlap(
                child_values.iter().map(|v| (value_hash(v), v.as_str())),
                sketch,
            )?;
            child_values
                .iter()
                .all(|value| filter.may_contain(value))
                .then_some(Containment::Sampled {
                    compared: child_values.len(),
                })
        }
        (
            ValueSet::Approximate {
                sketch: child_sketch,
                ..
            },
            ValueSet::Approximate { sketch, filter, .. },
        ) => {
            let coordinated = coordinated_overlap(child_sketch.entries(), sketch)?;
            let retained = child_sketch.values().all(|value| filter.may_contain(value));
            (retained && coordinated > 0).then_some(Containment::Sampled {
                compared: child_sketch.len(),
            })
        }
    }
}

/// Every child value hashing at or below the parent sketch threshold must be
/// retained by the parent sketch. Returns how many child values fell under
/// the threshold, or `None` on the first one the parent lacks.
fn coordinated_overlap<'a, I>(child: I, parent: &ValueSketch) -> Option<usize>
where
    I: IntoIterator<Item = (u64, &'a str)>,
{
    let threshold = parent.threshold();
    let mut compared = 0usize;
    for (hash, value) in child {
        if hash > threshold {
            continue;
        }
        if parent.lookup(hash) != Some(value) {
            return None;
        }
        compared += 1;
    }
    Some(compared)
}

/// Two key columns holding the same value set link 1:1 in both directions.
/// Keeps the direction towards the stronger parent key, falling back to the
/// parent whose table and column names sort first.
fn drop_mirrored_links(relationships: Vec<Relationship>) -> Vec<Relationship> {
    let dropped: Vec<bool> = {
        let position: HashMap<(&str, &str, &str, &str), usize> = relationships
            .iter()
            .enumerate()
            .map(|(idx, rel)| {
                (
                    (
                        rel.child_table.as_str(),
                        rel.child_column.as_str(),
                        rel.parent_table.as_str(),
                        rel.parent_column.as_str(),
                    ),
                    idx,
                )
            })
            .collect();
        relationships
            .iter()
            .map(|rel| {
                let mirror = (
                    rel.parent_table.as_str(),
                    rel.parent_column.as_str(),
                    rel.child_table.as_str(),
                    rel.child_column.as_str(),
                );
                let Some(other) = position.get(&mirror).map(|&idx| &relationships[idx]) else {
                    return false;
                };
                let one_to_one = |r: &Relationship| r.cardinality == Cardinality::OneToOne;
                if !one_to_one(rel) || !one_to_one(other) {
                    return false;
                }
                let preferred = rel.confidence.total_cmp(&other.confidence).then_with(|| {
                    (&other.parent_table, &other.parent_column)
                        .cmp(&(&rel.parent_table, &rel.parent_column))
                });
                if preferred.is_lt() {
                    debug!(
                        "Dropping mirrored link {}.{} -> {}.{}",
                        rel.child_table, rel.child_column, rel.parent_table, rel.parent_column
                    );
                }
                preferred.is_lt()
            })
            .collect()
    };
    relationships
        .into_iter()
        .zip(dropped)
        .filter_map(|(rel, dropped)| (!dropped).then_some(rel))
        .collect()
}

fn build(
    child: &ColumnProfile,
    parent: &ColumnProfile,
    key: &PrimaryKeyCandidate,
    link: NameLink,
    containment: Containment,
) -> Relationship {
    let cardinality = if child.appears_unique() {
        Cardinality::OneToOne
    } else {
        Cardinality::ManyToOne
    };
    let (confidence, evidence) = match containment {
        Containment::Proven => (
            PROVEN_BASE + PROVEN_KEY_WEIGHT * key.confidence,
            Evidence::Exact,
        ),
        Containment::Sampled { compared } => {
            let support = (compared as f64 / SAMPLED_FULL_SUPPORT).min(1.0);
            (
                SAMPLED_CEILING * support * (0.5 + 0.5 * key.confidence),
                Evidence::Approximate,
            )
        }
    };
    Relationship {
        child_table: child.table.clone(),
        child_column: child.column.clone(),
        parent_table: parent.table.clone(),
        parent_column: parent.column.clone(),
        cardinality,
        confidence: confidence.clamp(0.0, 1.0),
        evidence,
        link,
    }
}
