//! Identifier-name conventions used by key detection and the relationship gate.

use heck::ToSnakeCase;
use serde::Serialize;

/// Case- and underscore-insensitive form of a table or column name.
///
/// `CustomerID`, `customer_id` and `Customer Id` all normalize to
/// `customerid`.
pub fn normalize_name(name: &str) -> String {
    name.to_snake_case().replace('_', "")
}

/// Normalized table name plus its singular forms, so that `Customers`,
/// `Categories` and `Boxes` yield `customer`, `category` and `box`.
pub fn table_stems(table: &str) -> Vec<String> {
    let normalized = normalize_name(table);
    let mut stems = vec![normalized.clone()];
    let mut push = |stem: String| {
        if !stem.is_empty() && !stems.contains(&stem) {
            stems.push(stem);
        }
    };
    if let Some(base) = normalized.strip_suffix("ies") {
        push(format!("{base}y"));
    }
    for suffix in ["ses", "xes", "zes", "ches", "shes"] {
        if normalized.ends_with(suffix) {
            push(normalized[..normalized.len() - 2].to_string());
        }
    }
    if normalized.ends_with('s') && !normalized.ends_with("ss") {
        push(normalized[..normalized.len() - 1].to_string());
    }
    stems
}

/// How a column name relates to the identifier conventions of its table.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum KeyNameMatch {
    /// `{table}_id` or `{table}id`.
    TableId,
    /// Exactly `id`.
    Id,
    /// Any other `*_id` name.
    IdSuffix,
    None,
}

impl KeyNameMatch {
    pub fn bonus(self) -> f64 {
        match self {
            KeyNameMatch::TableId | KeyNameMatch::Id => 0.2,
            KeyNameMatch::IdSuffix => 0.1,
            KeyNameMatch::None => 0.0,
        }
    }
}

/// Classifies `column` against the stems of its table (see [`table_stems`]).
pub fn key_name_match(stems: &[String], column: &str) -> KeyNameMatch {
    if normalize_name(column) == "id" {
        return KeyNameMatch::Id;
    }
    if is_table_id(column, stems) {
        return KeyNameMatch::TableId;
    }
    if column.to_snake_case().ends_with("_id") {
        KeyNameMatch::IdSuffix
    } else {
        KeyNameMatch::None
    }
}

/// True when `column` spells `{table}{key}` for one of the table `stems`,
/// e.g. `customer_id` against table `Customers` and key column `id`.
pub fn is_prefixed_by(column: &str, stems: &[String], key_column: &str) -> bool {
    let column = normalize_name(column);
    let key = normalize_name(key_column);
    stems.iter().any(|stem| column == format!("{stem}{key}"))
}

/// True when `column` spells `{table}_id` or `{table}id` for one of `stems`.
pub fn is_table_id(column: &str, stems: &[String]) -> bool {
    is_prefixed_by(column, stems, "id")
}
