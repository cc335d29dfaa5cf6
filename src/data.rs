//! Cell normalization shared by every loader.
//!
//! Loaders hand raw text to [`normalize_cell`], which trims it, maps null
//! placeholders to `None`, and canonicalizes numbers so that the same value
//! compares equal no matter which source format produced it.

use sha2::{Digest, Sha256};

/// One normalized row. `None` marks a null cell.
pub type Row = Vec<Option<String>>;

const NUMERIC_INTEGER_LIMIT: f64 = 9.0e15;
const F64_EXACT_DIGITS: usize = 15;

pub fn normalize_cell(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || is_placeholder_token(&trimmed.to_ascii_lowercase()) {
        return None;
    }
    Some(canonical_number(trimmed).unwrap_or_else(|| trimmed.to_string()))
}

pub fn is_placeholder_token(lowered: &str) -> bool {
    let stripped = lowered.trim_start_matches('#');
    matches!(
        stripped,
        "na" | "n/a" | "n.a." | "nan" | "null" | "none" | "nil" | "<na>" | "-"
    )
}

/// Canonical text for numeric tokens: integral values lose any fractional
/// zeros, sign prefix, or leading zeros (`"+007.0"` becomes `"7"`).
///
/// Plain decimals are canonicalized textually so values wider than an `i64`
/// or an `f64` mantissa keep every digit. Only exponent notation goes through
/// `f64`, and only while its mantissa fits the float exactly.
pub fn canonical_number(value: &str) -> Option<String> {
    if let Ok(integer) = value.parse::<i64>() {
        return Some(integer.to_string());
    }
    let (negative, unsigned) = split_sign(value);
    if let Some(decimal) = canonical_decimal(unsigned) {
        return Some(if negative && decimal != "0" {
            format!("-{decimal}")
        } else {
            decimal
        });
    }
    canonical_scientific(value)
}

fn split_sign(value: &str) -> (bool, &str) {
    match value.as_bytes().first() {
        Some(b'-') => (true, &value[1..]),
        Some(b'+') => (false, &value[1..]),
        _ => (false, value),
    }
}

fn canonical_decimal(unsigned: &str) -> Option<String> {
    let (integral, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let digits_only = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if integral.is_empty() && fraction.is_empty() {
        return None;
    }
    if !digits_only(integral) || !digits_only(fraction) {
        return None;
    }
    let integral = match integral.trim_start_matches('0') {
        "" => "0",
        trimmed => trimmed,
    };
    Some(match fraction.trim_end_matches('0') {
        "" => integral.to_string(),
        fraction => format!("{integral}.{fraction}"),
    })
}

fn canonical_scientific(value: &str) -> Option<String> {
    let (mantissa, exponent) = value.split_once(['e', 'E'])?;
    let (_, unsigned) = split_sign(mantissa);
    canonical_decimal(unsigned)?;
    exponent.parse::<i32>().ok()?;
    let significant = unsigned
        .bytes()
        .filter(u8::is_ascii_digit)
        .skip_while(|b| *b == b'0')
        .count();
    if significant > F64_EXACT_DIGITS {
        return Some(value.to_string());
    }
    let parsed = value.parse::<f64>().ok().filter(|f| f.is_finite())?;
    if parsed.fract() == 0.0 && parsed.abs() < NUMERIC_INTEGER_LIMIT {
        Some(format!("{}", parsed as i64))
    } else {
        Some(parsed.to_string())
    }
}

pub fn is_numeric(value: &str) -> bool {
    canonical_number(value).is_some()
}

/// Stable 64-bit hash of a normalized value.
///
/// Derived from SHA-256 so sketches built in separate runs, or from different
/// chunkings of the same data, retain exactly the same values.
pub fn value_hash(value: &str) -> u64 {
    value_hash_pair(value).0
}

/// Two independent 64-bit hashes of a value: [`value_hash`] and the next
/// eight digest bytes.
pub fn value_hash_pair(value: &str) -> (u64, u64) {
    let digest = Sha256::digest(value.as_bytes());
    let mut first = [0u8; 8];
    let mut second = [0u8; 8];
    first.copy_from_slice(&digest[..8]);
    second.copy_from_slice(&digest[8..16]);
    (u64::from_be_bytes(first), u64::from_be_bytes(second))
}

/// Makes header names unique and non-empty. Blank headers become
/// `column_{n}` and repeats get a `.{k}` suffix.
pub fn dedupe_headers(headers: Vec<String>) -> (Vec<String>, usize) {
    let mut seen = std::collections::HashSet::new();
    let mut renamed = 0usize;
    let mut output = Vec::with_capacity(headers.len());
    for (idx, header) in headers.into_iter().enumerate() {
        let trimmed = header.trim();
        let base = if trimmed.is_empty() {
            renamed += 1;
            format!("column_{}", idx + 1)
        } else {
            trimmed.to_string()
        };
        let mut candidate = base.clone();
        let mut suffix = 1usize;
        while !seen.insert(candidate.clone()) {
            candidate = format!("{base}.{suffix}");
            suffix += 1;
        }
        if candidate != base {
            renamed += 1;
        }
        output.push(candidate);
    }
    (output, renamed)
}
