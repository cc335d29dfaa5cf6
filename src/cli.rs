use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::report::ReportFormat;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Infer primary keys, date columns, and relationships across tabular files",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Profile a set of files and report inferred keys, dates, and relationships
    Analyze(AnalyzeArgs),
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Input files or directories (directories contribute every supported file they contain)
    #[arg(short = 'i', long = "input", required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,
    /// YAML file with analysis options; flags below override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Report format
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Table)]
    pub format: ReportFormat,
    /// Write the report to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Include per-column profiles in table output
    #[arg(long)]
    pub profiles: bool,
    /// Rows per chunk when streaming large delimited files
    #[arg(long)]
    pub chunk_size_rows: Option<usize>,
    /// Delimited files larger than this many bytes are streamed
    #[arg(long)]
    pub large_file_threshold_bytes: Option<u64>,
    /// Distinct values tracked exactly per column before switching to an approximate profile
    #[arg(long)]
    pub distinct_value_cap: Option<usize>,
    /// Fraction of null rows still allowed for a primary key claim
    #[arg(long)]
    pub uniqueness_null_tolerance: Option<f64>,
    /// Distinct values sampled per column for date detection
    #[arg(long)]
    pub date_parse_sample_size: Option<usize>,
    /// Fraction of sampled values that must parse as dates
    #[arg(long)]
    pub date_parse_success_threshold: Option<f64>,
    /// Character encoding of delimited inputs (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Worker threads for loading and profiling
    #[arg(short = 'j', long)]
    pub jobs: Option<usize>,
}
