//! Named byte sources handed to the engine, and format resolution.

use std::{
    collections::BTreeSet,
    fs::{self, File},
    io::{self, BufReader, Read},
    path::{Path, PathBuf},
};

use serde::Serialize;

/// File name fragment identifying reports written by earlier runs.
pub const REPORT_FILE_STEM: &str = "relationship_report";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    Csv,
    Tsv,
    /// Delimited text whose delimiter must be detected.
    Text,
    Spreadsheet,
    Json,
}

impl SourceFormat {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "csv" => Some(SourceFormat::Csv),
            "tsv" => Some(SourceFormat::Tsv),
            "txt" => Some(SourceFormat::Text),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Some(SourceFormat::Spreadsheet),
            "json" => Some(SourceFormat::Json),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

pub enum SourceData {
    Bytes(Vec<u8>),
    Stream {
        reader: Box<dyn Read + Send>,
        size_hint: Option<u64>,
    },
    /// The source could not be opened; loading it reports this error.
    Unreadable(io::Error),
}

impl SourceData {
    /// Known total size in bytes, if any. Unknown-size streams are treated as
    /// large.
    pub fn size_hint(&self) -> Option<u64> {
        match self {
            SourceData::Bytes(bytes) => Some(bytes.len() as u64),
            SourceData::Stream { size_hint, .. } => *size_hint,
            SourceData::Unreadable(_) => None,
        }
    }

    pub fn into_reader(self) -> io::Result<Box<dyn Read + Send>> {
        match self {
            SourceData::Bytes(bytes) => Ok(Box::new(io::Cursor::new(bytes))),
            SourceData::Stream { reader, .. } => Ok(reader),
            SourceData::Unreadable(error) => Err(error),
        }
    }
}

/// One input of an analysis run: a file name (used to derive the table name
/// and infer the format) and its contents.
pub struct SourceInput {
    pub name: String,
    pub format: Option<SourceFormat>,
    pub data: SourceData,
}

impl SourceInput {
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            format: None,
            data: SourceData::Bytes(bytes),
        }
    }

    pub fn from_reader<R>(name: impl Into<String>, reader: R, size_hint: Option<u64>) -> Self
    where
        R: Read + Send + 'static,
    {
        Self {
            name: name.into(),
            format: None,
            data: SourceData::Stream {
                reader: Box::new(reader),
                size_hint,
            },
        }
    }

    /// Opens a file as a sequential stream; nothing is read until the loader
    /// pulls from it.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata().ok().map(|meta| meta.len());
        Ok(Self::from_reader(file_label(path), BufReader::new(file), size))
    }

    /// Stands in for a file that failed to open so the run can report it as
    /// an I/O failure of that source.
    pub fn unreadable(path: &Path, error: io::Error) -> Self {
        Self {
            name: file_label(path),
            format: None,
            data: SourceData::Unreadable(error),
        }
    }

    pub fn with_format(mut self, format: SourceFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn resolved_format(&self) -> Option<SourceFormat> {
        self.format.or_else(|| SourceFormat::from_name(&self.name))
    }

    /// File name without its extension, used as the base table name.
    pub fn stem(&self) -> String {
        Path::new(&self.name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .filter(|stem| !stem.is_empty())
            .unwrap_or_else(|| self.name.clone())
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[derive(Debug, Default)]
pub struct Discovery {
    pub supported: Vec<PathBuf>,
    pub unsupported_extensions: BTreeSet<String>,
    pub skipped_reports: usize,
}

impl Discovery {
    pub fn is_empty_directory(&self) -> bool {
        self.supported.is_empty()
            && self.unsupported_extensions.is_empty()
            && self.skipped_reports == 0
    }
}

/// Lists the analyzable files directly inside `dir`, sorted by name.
pub fn discover_sources(dir: &Path) -> io::Result<Discovery> {
    let mut discovery = Discovery::default();
    let mut entries = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect::<Vec<_>>();
    entries.sort();

    for path in entries {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if file_name.starts_with(REPORT_FILE_STEM) {
            discovery.skipped_reports += 1;
            continue;
        }
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_string();
        if SourceFormat::from_extension(&extension).is_some() {
            discovery.supported.push(path);
        } else {
            discovery
                .unsupported_extensions
                .insert(format!(".{}", extension.to_ascii_lowercase()));
        }
    }
    Ok(discovery)
}
