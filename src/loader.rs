//! Table loading for every supported source format.
//!
//! Delimited sources above `large_file_threshold_bytes` (or of unknown size)
//! are never materialized: the loader returns a [`TableBody::Streaming`] body
//! whose [`ChunkSource`] pulls `chunk_size_rows` rows at a time, so the
//! profiler sees the data in bounded pieces. JSON documents and spreadsheets
//! have to be parsed whole and are guarded by `max_buffered_bytes` instead.

use std::{
    collections::HashMap,
    io::{Cursor, Read},
};

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use chrono::Timelike;
use encoding_rs::Encoding;
use log::{debug, info, warn};

use crate::{
    config::AnalysisConfig,
    data::{self, Row},
    error::SourceError,
    io_utils,
    source::{SourceData, SourceFormat, SourceInput},
};

const SUPPORTED_EXTENSIONS: &str = ".csv, .json, .ods, .tsv, .txt, .xls, .xlsb, .xlsm, .xlsx";

/// Pull-based supplier of row chunks. Chunks concatenated in arrival order
/// reconstitute the table.
pub trait ChunkSource: Send {
    fn next_chunk(&mut self) -> Result<Option<Vec<Row>>, SourceError>;
}

pub enum TableBody {
    Materialized(Vec<Row>),
    Streaming(Box<dyn ChunkSource>),
}

pub struct Table {
    pub name: String,
    /// Source label used when reporting failures for this table.
    pub source: String,
    pub columns: Vec<String>,
    /// Worksheet name when the table is one of several sheets in a workbook.
    pub sheet: Option<String>,
    pub body: TableBody,
}

impl Table {
    pub fn is_streaming(&self) -> bool {
        matches!(self.body, TableBody::Streaming(_))
    }
}

pub fn load_source(input: SourceInput, config: &AnalysisConfig) -> Result<Vec<Table>, SourceError> {
    let input = match input.data {
        SourceData::Unreadable(err) => return Err(SourceError::io(input.name, err)),
        data => SourceInput { data, ..input },
    };
    let Some(format) = input.resolved_format() else {
        return Err(SourceError::format(
            &input.name,
            format!("unsupported file format; supported extensions: {SUPPORTED_EXTENSIONS}"),
        ));
    };
    debug!("Loading '{}' as {format:?}", input.name);
    match format {
        SourceFormat::Csv => load_delimited(input, Some(io_utils::DEFAULT_CSV_DELIMITER), config),
        SourceFormat::Tsv => load_delimited(input, Some(io_utils::DEFAULT_TSV_DELIMITER), config),
        SourceFormat::Text => load_delimited(input, None, config),
        SourceFormat::Spreadsheet => load_spreadsheet(input, config),
        SourceFormat::Json => load_json(input, config),
    }
}

fn load_delimited(
    input: SourceInput,
    delimiter: Option<u8>,
    config: &AnalysisConfig,
) -> Result<Vec<Table>, SourceError> {
    let source = input.name.clone();
    let name = input.stem();
    let streaming = input
        .data
        .size_hint()
        .is_none_or(|size| size > config.large_file_threshold_bytes);
    let reader = input
        .data
        .into_reader()
        .map_err(|err| SourceError::io(&source, err))?;

    let (delimiter, reader): (u8, Box<dyn Read + Send>) = match delimiter {
        Some(delimiter) => (delimiter, reader),
        None => {
            let (head, replay) = io_utils::peek_head(reader, io_utils::SNIFF_SAMPLE_BYTES)
                .map_err(|err| SourceError::io(&source, err))?;
            if head.iter().all(u8::is_ascii_whitespace) {
                return Err(SourceError::empty(&source));
            }
            let complete = (head.len() as u64) < io_utils::SNIFF_SAMPLE_BYTES;
            let detected = io_utils::sniff_delimiter(&head, complete).ok_or_else(|| {
                SourceError::format(
                    &source,
                    "could not detect a delimiter giving a consistent column count",
                )
            })?;
            debug!(
                "Detected delimiter '{}' for '{source}'",
                io_utils::printable_delimiter(detected)
            );
            (detected, Box::new(replay))
        }
    };

    let mut chunks = CsvChunks::open(reader, delimiter, &source, config)?;
    let columns = chunks.columns.clone();
    let body = if streaming {
        info!(
            "Streaming '{source}' in chunks of {} row(s)",
            config.chunk_size_rows
        );
        TableBody::Streaming(Box::new(chunks))
    } else {
        let mut rows = Vec::new();
        while let Some(chunk) = chunks.next_chunk()? {
            rows.extend(chunk);
        }
        info!("Loaded '{source}' with {} row(s)", rows.len());
        TableBody::Materialized(rows)
    };
    Ok(vec![Table {
        name,
        source,
        columns,
        sheet: None,
        body,
    }])
}

struct CsvChunks<R: Read> {
    reader: csv::Reader<R>,
    source: String,
    columns: Vec<String>,
    encoding: &'static Encoding,
    chunk_size: usize,
    record: csv::ByteRecord,
    line: usize,
    finished: bool,
}

impl<R: Read> CsvChunks<R> {
    fn open(
        reader: R,
        delimiter: u8,
        source: &str,
        config: &AnalysisConfig,
    ) -> Result<Self, SourceError> {
        let encoding = config.encoding();
        let mut reader = io_utils::open_csv_reader(reader, delimiter, true);
        let header_record = reader
            .byte_headers()
            .map_err(|err| csv_failure(source, err))?
            .clone();
        if header_record.is_empty() {
            return Err(SourceError::empty(source));
        }
        let mut headers = io_utils::decode_record(&header_record, encoding)
            .map_err(|err| SourceError::format(source, format!("header: {err}")))?;
        if let Some(first) = headers.first_mut()
            && let Some(stripped) = first.strip_prefix('\u{feff}')
        {
            *first = stripped.to_string();
        }
        let (columns, renamed) = data::dedupe_headers(headers);
        if renamed > 0 {
            warn!("Renamed {renamed} blank or duplicate header(s) in '{source}'");
        }
        Ok(Self {
            reader,
            source: source.to_string(),
            columns,
            encoding,
            chunk_size: config.chunk_size_rows,
            record: csv::ByteRecord::new(),
            line: 1,
            finished: false,
        })
    }
}

impl<R: Read + Send> ChunkSource for CsvChunks<R> {
    fn next_chunk(&mut self) -> Result<Option<Vec<Row>>, SourceError> {
        if self.finished {
            return Ok(None);
        }
        let mut chunk = Vec::with_capacity(self.chunk_size.min(8_192));
        while chunk.len() < self.chunk_size {
            match self.reader.read_byte_record(&mut self.record) {
                Ok(true) => {
                    self.line += 1;
                    let decoded = io_utils::decode_record(&self.record, self.encoding)
                        .map_err(|err| {
                            SourceError::format(&self.source, format!("row {}: {err}", self.line))
                        })?;
                    chunk.push(decoded.iter().map(|field| data::normalize_cell(field)).collect());
                }
                Ok(false) => {
                    self.finished = true;
                    break;
                }
                Err(err) => return Err(csv_failure(&self.source, err)),
            }
        }
        debug!("Read chunk of {} row(s) from '{}'", chunk.len(), self.source);
        Ok((!chunk.is_empty()).then_some(chunk))
    }
}

fn csv_failure(source: &str, err: csv::Error) -> SourceError {
    match err.into_kind() {
        csv::ErrorKind::Io(error) => SourceError::io(source, error),
        csv::ErrorKind::UnequalLengths {
            pos,
            expected_len,
            len,
        } => {
            let line = pos.map(|pos| pos.line()).unwrap_or_default();
            SourceError::format(
                source,
                format!("line {line} has {len} field(s), expected {expected_len}"),
            )
        }
        other => SourceError::format(source, format!("malformed delimited data: {other:?}")),
    }
}

fn buffer_source(input: SourceInput, config: &AnalysisConfig) -> Result<Vec<u8>, SourceError> {
    let limit = config.max_buffered_bytes;
    let too_large = || {
        SourceError::resource_limit(
            &input.name,
            format!("larger than {limit} bytes and cannot be streamed; raise max_buffered_bytes"),
        )
    };
    if let Some(size) = input.data.size_hint()
        && size > limit
    {
        return Err(too_large());
    }
    match input.data {
        SourceData::Bytes(bytes) => Ok(bytes),
        SourceData::Stream { reader, .. } => {
            let mut buffer = Vec::new();
            reader
                .take(limit.saturating_add(1))
                .read_to_end(&mut buffer)
                .map_err(|err| SourceError::io(&input.name, err))?;
            if buffer.len() as u64 > limit {
                return Err(too_large());
            }
            Ok(buffer)
        }
        SourceData::Unreadable(err) => Err(SourceError::io(&input.name, err)),
    }
}

fn load_spreadsheet(
    input: SourceInput,
    config: &AnalysisConfig,
) -> Result<Vec<Table>, SourceError> {
    let source = input.name.clone();
    let stem = input.stem();
    let bytes = buffer_source(input, config)?;
    if bytes.is_empty() {
        return Err(SourceError::empty(&source));
    }
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|err| SourceError::format(&source, format!("unreadable workbook: {err}")))?;
    let sheet_names = workbook.sheet_names();
    if sheet_names.is_empty() {
        return Err(SourceError::empty(&source));
    }
    let multiple = sheet_names.len() > 1;

    let mut tables = Vec::with_capacity(sheet_names.len());
    for sheet in sheet_names {
        let range = workbook
            .worksheet_range(&sheet)
            .map_err(|err| SourceError::format(&source, format!("sheet '{sheet}': {err}")))?;
        let mut rows = range.rows();
        let header = rows
            .next()
            .map(|cells| {
                cells
                    .iter()
                    .map(|cell| cell_text(cell).unwrap_or_default())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let (columns, renamed) = data::dedupe_headers(header);
        if renamed > 0 {
            warn!("Renamed {renamed} blank or duplicate header(s) in '{source}' sheet '{sheet}'");
        }
        let width = columns.len();
        let body = rows
            .map(|cells| {
                let mut row: Row = cells
                    .iter()
                    .take(width)
                    .map(|cell| cell_text(cell).and_then(|text| data::normalize_cell(&text)))
                    .collect();
                row.resize(width, None);
                row
            })
            .collect::<Vec<_>>();
        info!("Loaded sheet '{sheet}' of '{source}' with {} row(s)", body.len());
        let (name, label, sheet) = if multiple {
            (
                format!("{stem}_{sheet}"),
                format!("{source} [{sheet}]"),
                Some(sheet),
            )
        } else {
            (stem.clone(), source.clone(), None)
        };
        tables.push(Table {
            name,
            source: label,
            columns,
            sheet,
            body: TableBody::Materialized(body),
        });
    }
    Ok(tables)
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(text) | Data::DateTimeIso(text) | Data::DurationIso(text) => {
            Some(text.clone())
        }
        Data::Int(value) => Some(value.to_string()),
        Data::Float(value) => Some(value.to_string()),
        Data::Bool(value) => Some(value.to_string()),
        Data::DateTime(value) => {
            if value.is_duration() {
                return Some(value.as_f64().to_string());
            }
            Some(match value.as_datetime() {
                Some(moment) if moment.num_seconds_from_midnight() == 0 => {
                    moment.format("%Y-%m-%d").to_string()
                }
                Some(moment) => moment.format("%Y-%m-%d %H:%M:%S").to_string(),
                None => value.as_f64().to_string(),
            })
        }
    }
}

fn load_json(input: SourceInput, config: &AnalysisConfig) -> Result<Vec<Table>, SourceError> {
    let source = input.name.clone();
    let name = input.stem();
    let bytes = buffer_source(input, config)?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(SourceError::empty(&source));
    }
    let document: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|err| SourceError::format(&source, format!("invalid JSON: {err}")))?;
    let serde_json::Value::Array(records) = document else {
        return Err(SourceError::format(
            &source,
            "expected a top-level array of flat objects",
        ));
    };

    let mut columns: Vec<String> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for (idx, record) in records.iter().enumerate() {
        let serde_json::Value::Object(fields) = record else {
            return Err(SourceError::format(
                &source,
                format!("record {idx} is not an object"),
            ));
        };
        for (key, value) in fields {
            if value.is_array() || value.is_object() {
                return Err(SourceError::format(
                    &source,
                    format!(
                        "record {idx} field '{key}' holds a nested value; flatten records before analysis"
                    ),
                ));
            }
            if !positions.contains_key(key) {
                positions.insert(key.clone(), columns.len());
                columns.push(key.clone());
            }
        }
    }

    let rows = records
        .iter()
        .filter_map(|record| record.as_object())
        .map(|fields| {
            let mut row: Row = vec![None; columns.len()];
            for (key, value) in fields {
                if let Some(&idx) = positions.get(key) {
                    row[idx] = json_cell(value);
                }
            }
            row
        })
        .collect::<Vec<_>>();
    let (columns, _) = data::dedupe_headers(columns);
    info!(
        "Loaded '{source}' with {} record(s) and {} key(s)",
        rows.len(),
        columns.len()
    );
    Ok(vec![Table {
        name,
        source,
        columns,
        sheet: None,
        body: TableBody::Materialized(rows),
    }])
}

fn json_cell(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(text) => data::normalize_cell(text),
        serde_json::Value::Number(number) => data::normalize_cell(&number.to_string()),
        serde_json::Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}
