//! Online column profiling.
//!
//! [`TableProfiler`] consumes row chunks in arrival order and keeps, per
//! column, the row and null counts plus a distinct-value tracker. The tracker
//! holds the exact value set until it grows past `distinct_value_cap`; beyond
//! that it spills into a [`ValueSketch`], a bottom-k sample keyed by
//! [`value_hash`]. Sketches built from the same values are identical no matter
//! how rows were chunked or ordered, and two sketches can be compared below a
//! shared hash threshold to test containment. Sketched columns also keep a
//! [`MembershipFilter`] over every value they saw, so a small exact column can
//! still be checked value by value against them.

use std::collections::{BTreeMap, HashSet};

use log::{info, warn};
use serde::Serialize;

use crate::{
    cancel::CancelToken,
    config::AnalysisConfig,
    data::{self, Row, value_hash, value_hash_pair},
    dates,
    error::{AnalysisError, SourceError},
    loader::{Table, TableBody},
    naming,
};

/// Minimum estimated distinct/non-null ratio for an approximate column to be
/// treated as unique.
pub const APPROXIMATE_UNIQUENESS_FLOOR: f64 = 0.95;

const FILTER_HASHES: usize = 4;
const FILTER_BITS_PER_CAPPED_VALUE: usize = 16;
const FILTER_MIN_BITS: usize = 1 << 20;
const FILTER_MAX_BITS: usize = 1 << 27;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Date,
    Text,
}

#[derive(Debug, Clone)]
struct SketchEntry {
    value: String,
    occurrences: usize,
}

/// Bottom-k sample of distinct values, ordered by hash.
#[derive(Debug, Clone)]
pub struct ValueSketch {
    capacity: usize,
    entries: BTreeMap<u64, SketchEntry>,
}

impl ValueSketch {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: BTreeMap::new(),
        }
    }

    pub fn observe(&mut self, value: &str) {
        let hash = value_hash(value);
        if let Some(entry) = self.entries.get_mut(&hash) {
            entry.occurrences += 1;
            return;
        }
        if self.entries.len() < self.capacity {
            self.insert(hash, value);
        } else if hash < self.threshold() {
            self.insert(hash, value);
            self.entries.pop_last();
        }
    }

    fn insert(&mut self, hash: u64, value: &str) {
        self.entries.insert(
            hash,
            SketchEntry {
                value: value.to_string(),
                occurrences: 1,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Largest retained hash once the sketch is full. Every distinct value
    /// hashing at or below it is guaranteed to be retained.
    pub fn threshold(&self) -> u64 {
        if self.is_full() {
            self.entries.keys().next_back().copied().unwrap_or(u64::MAX)
        } else {
            u64::MAX
        }
    }

    pub fn lookup(&self, hash: u64) -> Option<&str> {
        self.entries.get(&hash).map(|entry| entry.value.as_str())
    }

    /// Retained `(hash, value)` pairs in ascending hash order.
    pub fn entries(&self) -> impl Iterator<Item = (u64, &str)> {
        self.entries
            .iter()
            .map(|(hash, entry)| (*hash, entry.value.as_str()))
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|entry| entry.value.as_str())
    }

    pub fn has_repeats(&self) -> bool {
        self.entries.values().any(|entry| entry.occurrences > 1)
    }

    /// K-minimum-values estimate of the number of distinct values observed.
    pub fn estimate_distinct(&self) -> f64 {
        if !self.is_full() {
            return self.entries.len() as f64;
        }
        let fraction = self.threshold().max(1) as f64 / u64::MAX as f64;
        (self.capacity as f64 - 1.0) / fraction
    }
}

/// Fixed-size Bloom filter over the values of a sketched column. A miss is
/// certain; a hit may be a false positive.
#[derive(Debug, Clone)]
pub struct MembershipFilter {
    words: Vec<u64>,
    mask: u64,
}

impl MembershipFilter {
    /// Filter with `bits` rounded up to a power of two, at most 2^27.
    pub fn with_bits(bits: usize) -> Self {
        let bits = bits.clamp(64, FILTER_MAX_BITS).next_power_of_two();
        Self {
            words: vec![0; bits / 64],
            mask: bits as u64 - 1,
        }
    }

    fn for_cap(distinct_value_cap: usize) -> Self {
        Self::with_bits(
            distinct_value_cap
                .saturating_mul(FILTER_BITS_PER_CAPPED_VALUE)
                .max(FILTER_MIN_BITS),
        )
    }

    fn positions(&self, value: &str) -> [u64; FILTER_HASHES] {
        let (first, second) = value_hash_pair(value);
        let step = second | 1;
        std::array::from_fn(|i| first.wrapping_add((i as u64).wrapping_mul(step)) & self.mask)
    }

    pub fn insert(&mut self, value: &str) {
        for bit in self.positions(value) {
            self.words[(bit / 64) as usize] |= 1u64 << (bit % 64);
        }
    }

    pub fn may_contain(&self, value: &str) -> bool {
        self.positions(value)
            .iter()
            .all(|bit| self.words[(bit / 64) as usize] & (1u64 << (bit % 64)) != 0)
    }
}

/// Distinct values of a column, either complete or sketched.
#[derive(Debug, Clone)]
pub enum ValueSet {
    Exact(HashSet<String>),
    Approximate {
        sketch: ValueSketch,
        filter: MembershipFilter,
        estimated_distinct: usize,
    },
}

#[derive(Debug, Clone)]
pub struct ColumnProfile {
    pub table: String,
    /// Worksheet the table came from, for multi-sheet workbooks.
    pub sheet: Option<String>,
    pub column: String,
    pub position: usize,
    pub row_count: usize,
    pub null_count: usize,
    pub distinct_count: usize,
    pub kind: ColumnKind,
    /// Up to `date_parse_sample_size` distinct values, chosen by hash.
    pub sample_values: Vec<String>,
    pub values: ValueSet,
    duplicates_seen: bool,
}

impl ColumnProfile {
    pub fn non_null_count(&self) -> usize {
        self.row_count - self.null_count
    }

    pub fn null_fraction(&self) -> f64 {
        if self.row_count == 0 {
            0.0
        } else {
            self.null_count as f64 / self.row_count as f64
        }
    }

    pub fn is_approximate(&self) -> bool {
        matches!(self.values, ValueSet::Approximate { .. })
    }

    pub fn is_numeric(&self) -> bool {
        self.kind == ColumnKind::Numeric
    }

    /// Name stems of the owning table, plus those of its worksheet.
    pub fn table_stems(&self) -> Vec<String> {
        let mut stems = naming::table_stems(&self.table);
        for stem in self.sheet.iter().flat_map(|sheet| naming::table_stems(sheet)) {
            if !stems.contains(&stem) {
                stems.push(stem);
            }
        }
        stems
    }

    pub fn distinct_ratio(&self) -> f64 {
        let non_null = self.non_null_count();
        if non_null == 0 {
            0.0
        } else {
            self.distinct_count as f64 / non_null as f64
        }
    }

    /// Whether every non-null value occurs once. Exact profiles answer
    /// precisely; approximate ones answer from the duplicates they could see
    /// and the estimated distinct ratio.
    pub fn appears_unique(&self) -> bool {
        if self.non_null_count() == 0 {
            return false;
        }
        match &self.values {
            ValueSet::Exact(set) => set.len() == self.non_null_count(),
            ValueSet::Approximate { sketch, .. } => {
                !self.duplicates_seen
                    && !sketch.has_repeats()
                    && self.distinct_ratio() >= APPROXIMATE_UNIQUENESS_FLOOR
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct TableProfile {
    pub name: String,
    pub sheet: Option<String>,
    pub source: String,
    pub row_count: usize,
    pub columns: Vec<ColumnProfile>,
}

impl TableProfile {
    pub fn column(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns.iter().find(|column| column.column == name)
    }

    pub(crate) fn rename(&mut self, name: String) {
        for column in &mut self.columns {
            column.table = name.clone();
        }
        self.name = name;
    }
}

#[derive(Debug)]
enum DistinctTracker {
    Exact(HashSet<String>),
    Sketch {
        sketch: ValueSketch,
        filter: MembershipFilter,
    },
}

#[derive(Debug)]
struct ColumnAccumulator {
    name: String,
    nulls: usize,
    tracker: DistinctTracker,
    duplicates_seen: bool,
}

impl ColumnAccumulator {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            nulls: 0,
            tracker: DistinctTracker::Exact(HashSet::new()),
            duplicates_seen: false,
        }
    }

    /// Records one cell; returns true when the column just spilled into a
    /// sketch.
    fn observe(&mut self, cell: Option<&str>, cap: usize, sketch_capacity: usize) -> bool {
        let Some(value) = cell else {
            self.nulls += 1;
            return false;
        };
        match &mut self.tracker {
            DistinctTracker::Exact(set) => {
                if set.contains(value) {
                    self.duplicates_seen = true;
                    return false;
                }
                set.insert(value.to_string());
                if set.len() > cap {
                    self.spill(cap, sketch_capacity);
                    return true;
                }
                false
            }
            DistinctTracker::Sketch { sketch, filter } => {
                sketch.observe(value);
                filter.insert(value);
                false
            }
        }
    }

    fn spill(&mut self, cap: usize, sketch_capacity: usize) {
        if let DistinctTracker::Exact(set) = &mut self.tracker {
            let mut sketch = ValueSketch::new(sketch_capacity);
            let mut filter = MembershipFilter::for_cap(cap);
            for value in set.drain() {
                sketch.observe(&value);
                filter.insert(&value);
            }
            self.tracker = DistinctTracker::Sketch { sketch, filter };
        }
    }
}

pub struct TableProfiler {
    table: String,
    sheet: Option<String>,
    rows: usize,
    columns: Vec<ColumnAccumulator>,
    distinct_value_cap: usize,
    sketch_capacity: usize,
    sample_size: usize,
    numeric_threshold: f64,
    date_threshold: f64,
}

impl TableProfiler {
    pub fn new(table: &str, columns: &[String], config: &AnalysisConfig) -> Self {
        Self {
            table: table.to_string(),
            sheet: None,
            rows: 0,
            columns: columns.iter().map(|c| ColumnAccumulator::new(c)).collect(),
            distinct_value_cap: config.distinct_value_cap,
            sketch_capacity: config.approximate_sample_size,
            sample_size: config.date_parse_sample_size,
            numeric_threshold: config.numeric_threshold,
            date_threshold: config.date_parse_success_threshold,
        }
    }

    pub fn with_sheet(mut self, sheet: Option<String>) -> Self {
        self.sheet = sheet;
        self
    }

    pub fn rows_seen(&self) -> usize {
        self.rows
    }

    pub fn ingest(&mut self, chunk: &[Row]) {
        for row in chunk {
            for (idx, column) in self.columns.iter_mut().enumerate() {
                let cell = row.get(idx).and_then(|cell| cell.as_deref());
                if column.observe(cell, self.distinct_value_cap, self.sketch_capacity) {
                    warn!(
                        "Column {}.{} exceeded {} distinct values; continuing with an approximate profile",
                        self.table, column.name, self.distinct_value_cap
                    );
                }
            }
            self.rows += 1;
        }
    }

    pub fn finish(self, source: &str) -> TableProfile {
        let rows = self.rows;
        let columns = self
            .columns
            .into_iter()
            .enumerate()
            .map(|(position, column)| {
                let non_null = rows - column.nulls;
                let (values, distinct_count) = match column.tracker {
                    DistinctTracker::Exact(set) => {
                        let distinct = set.len();
                        (ValueSet::Exact(set), distinct)
                    }
                    DistinctTracker::Sketch { sketch, filter } => {
                        let estimated = (sketch.estimate_distinct().round() as usize)
                            .max(self.distinct_value_cap + 1)
                            .min(non_null);
                        (
                            ValueSet::Approximate {
                                sketch,
                                filter,
                                estimated_distinct: estimated,
                            },
                            estimated,
                        )
                    }
                };
                let sample_values = representative_sample(&values, self.sample_size);
                let kind = classify(&sample_values, self.numeric_threshold, self.date_threshold);
                ColumnProfile {
                    table: self.table.clone(),
                    sheet: self.sheet.clone(),
                    column: column.name,
                    position,
                    row_count: rows,
                    null_count: column.nulls,
                    distinct_count,
                    kind,
                    sample_values,
                    values,
                    duplicates_seen: column.duplicates_seen,
                }
            })
            .collect();
        TableProfile {
            name: self.table,
            sheet: self.sheet,
            source: source.to_string(),
            row_count: rows,
            columns,
        }
    }
}

fn representative_sample(values: &ValueSet, size: usize) -> Vec<String> {
    match values {
        ValueSet::Exact(set) => {
            let mut pick = ValueSketch::new(size);
            for value in set {
                pick.observe(value);
            }
            pick.values().map(str::to_string).collect()
        }
        ValueSet::Approximate { sketch, .. } => {
            sketch.values().take(size).map(str::to_string).collect()
        }
    }
}

fn classify(sample: &[String], numeric_threshold: f64, date_threshold: f64) -> ColumnKind {
    if sample.is_empty() {
        return ColumnKind::Text;
    }
    let numeric = sample.iter().filter(|value| data::is_numeric(value)).count();
    if numeric as f64 / sample.len() as f64 >= numeric_threshold {
        return ColumnKind::Numeric;
    }
    if dates::summarize_dates(sample.iter().map(String::as_str)).ratio() >= date_threshold {
        ColumnKind::Date
    } else {
        ColumnKind::Text
    }
}

/// Drives a loaded table through the profiler chunk by chunk, checking for
/// cancellation between chunks and enforcing the per-source row ceiling.
pub fn profile_table(
    table: Table,
    config: &AnalysisConfig,
    cancel: &CancelToken,
) -> Result<TableProfile, AnalysisError> {
    let Table {
        name,
        source,
        columns,
        sheet,
        body,
    } = table;
    let mut profiler = TableProfiler::new(&name, &columns, config).with_sheet(sheet);
    let check_ceiling = |profiler: &TableProfiler| -> Result<(), AnalysisError> {
        if profiler.rows_seen() > config.max_rows_per_source {
            return Err(SourceError::resource_limit(
                &source,
                format!(
                    "more than {} rows; raise max_rows_per_source to analyze it",
                    config.max_rows_per_source
                ),
            )
            .into());
        }
        Ok(())
    };

    match body {
        TableBody::Materialized(rows) => {
            for chunk in rows.chunks(config.chunk_size_rows) {
                cancel.check()?;
                profiler.ingest(chunk);
                check_ceiling(&profiler)?;
            }
        }
        TableBody::Streaming(mut chunks) => loop {
            cancel.check()?;
            let Some(chunk) = chunks.next_chunk()? else {
                break;
            };
            profiler.ingest(&chunk);
            check_ceiling(&profiler)?;
        },
    }

    if profiler.rows_seen() == 0 {
        return Err(SourceError::empty(&source).into());
    }
    let profile = profiler.finish(&source);
    let approximate = profile
        .columns
        .iter()
        .filter(|column| column.is_approximate())
        .count();
    info!(
        "Profiled table '{}' ({} row(s), {} column(s), {} approximate)",
        profile.name,
        profile.row_count,
        profile.columns.len(),
        approximate
    );
    Ok(profile)
}
