//! I/O utilities for delimited reading, decoding, and delimiter resolution.
//!
//! All delimited-text parsing in relation-scout flows through this module. It
//! provides:
//!
//! - **Encoding**: input decoding via `encoding_rs`, defaulting to UTF-8.
//! - **Reader construction**: `open_csv_reader` over any `Read`, never seeking.
//! - **Delimiter sniffing**: probing the head of a `.txt` source for the
//!   candidate delimiter that yields a consistent field count.

use std::io::{self, Cursor, Read};

use anyhow::{Result, anyhow};
use encoding_rs::{Encoding, UTF_8};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

/// Candidates tried, in preference order, when a delimiter must be detected.
pub const SNIFF_CANDIDATES: &[u8] = &[b',', b'\t', b';', b'|'];
/// Bytes read from the head of a source to detect its delimiter.
pub const SNIFF_SAMPLE_BYTES: u64 = 64 * 1024;
const SNIFF_MAX_ROWS: usize = 20;

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8, has_headers: bool) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(has_headers)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(false);
    builder.from_reader(reader)
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

/// Reads up to `limit` bytes from `reader` and returns them together with a
/// reader that replays those bytes before continuing with the rest.
pub fn peek_head<R>(mut reader: R, limit: u64) -> io::Result<(Vec<u8>, impl Read + Send)>
where
    R: Read + Send,
{
    let mut head = Vec::new();
    reader.by_ref().take(limit).read_to_end(&mut head)?;
    let replay = Cursor::new(head.clone()).chain(reader);
    Ok((head, replay))
}

/// Picks the delimiter that splits the sampled rows into a consistent number
/// of fields greater than one. Returns `None` when no candidate qualifies.
///
/// `complete` signals that `head` holds the entire source; otherwise the
/// trailing partial line is ignored.
pub fn sniff_delimiter(head: &[u8], complete: bool) -> Option<u8> {
    let head_sample = if complete {
        head
    } else {
        match head.iter().rposition(|byte| *byte == b'\n') {
            Some(end) => &head[..=end],
            None => return None,
        }
    };

    let mut best: Option<(u8, usize)> = None;
    for &candidate in SNIFF_CANDIDATES {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .delimiter(candidate)
            .flexible(true)
            .from_reader(head_sample);
        let mut widths = Vec::new();
        let mut record = csv::ByteRecord::new();
        while widths.len() < SNIFF_MAX_ROWS {
            match reader.read_byte_record(&mut record) {
                Ok(true) => widths.push(record.len()),
                Ok(false) => break,
                Err(_) => {
                    widths.clear();
                    break;
                }
            }
        }
        let Some(&width) = widths.first() else {
            continue;
        };
        if width < 2 || widths.iter().any(|w| *w != width) {
            continue;
        }
        if best.is_none_or(|(_, best_width)| width > best_width) {
            best = Some((candidate, width));
        }
    }
    best.map(|(delimiter, _)| delimiter)
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniff_prefers_consistent_tab_layout() {
        let data = b"id\tname\tnote\n1\tAda\thello, world\n2\tBob\tfine\n";
        assert_eq!(sniff_delimiter(data, true), Some(b'\t'));
    }

    #[test]
    fn sniff_detects_comma_layout() {
        let data = b"id,name\n1,Ada\n2,Bob\n";
        assert_eq!(sniff_delimiter(data, true), Some(b','));
    }

    #[test]
    fn sniff_rejects_ragged_rows() {
        let data = b"a,b,c\n1,2\n3\n";
        assert_eq!(sniff_delimiter(data, true), None);
    }

    #[test]
    fn sniff_ignores_trailing_partial_line() {
        let data = b"a;b\n1;2\n3;4;5;6";
        assert_eq!(sniff_delimiter(data, false), Some(b';'));
    }

    #[test]
    fn peek_head_replays_consumed_bytes() {
        let source = Cursor::new(b"abcdefgh".to_vec());
        let (head, mut replay) = peek_head(source, 3).expect("peek");
        assert_eq!(head, b"abc");
        let mut all = String::new();
        replay.read_to_string(&mut all).expect("read replay");
        assert_eq!(all, "abcdefgh");
    }
}
