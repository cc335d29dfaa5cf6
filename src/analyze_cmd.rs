use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use itertools::Itertools;
use log::{debug, info, warn};

use crate::{
    analysis::{RunContext, analyze},
    cli::AnalyzeArgs,
    config::AnalysisConfig,
    report,
    source::{SourceInput, discover_sources},
};

pub fn execute(args: &AnalyzeArgs) -> Result<()> {
    let config = build_config(args)?;
    let paths = expand_inputs(&args.inputs)?;
    if paths.is_empty() {
        info!("No input files to analyze");
        return Ok(());
    }

    let sources = paths
        .iter()
        .map(|path| {
            SourceInput::open(path).unwrap_or_else(|err| {
                warn!("Cannot open input {path:?}: {err}");
                SourceInput::unreadable(path, err)
            })
        })
        .collect::<Vec<_>>();
    let context = RunContext::new(config);
    let report = analyze(&context, sources).context("Analyzing inputs")?;

    let rendered = report::render(&report, args.format, args.profiles)?;
    match &args.output {
        Some(path) => {
            fs::write(path, rendered).with_context(|| format!("Writing report to {path:?}"))?;
            info!("Report written to {path:?}");
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(rendered.as_bytes())
                .context("Writing report to stdout")?;
            stdout.flush().context("Flushing stdout")?;
        }
    }
    info!(
        "Analysis complete: {} table(s), {} relationship(s), {} failed source(s)",
        report.tables.len(),
        report.relationships.len(),
        report.failures.len()
    );
    Ok(())
}

fn build_config(args: &AnalyzeArgs) -> Result<AnalysisConfig> {
    let mut config = match &args.config {
        Some(path) => {
            AnalysisConfig::load(path).with_context(|| format!("Loading config from {path:?}"))?
        }
        None => AnalysisConfig::default(),
    };
    if let Some(value) = args.chunk_size_rows {
        config.chunk_size_rows = value;
    }
    if let Some(value) = args.large_file_threshold_bytes {
        config.large_file_threshold_bytes = value;
    }
    if let Some(value) = args.distinct_value_cap {
        config.distinct_value_cap = value;
    }
    if let Some(value) = args.uniqueness_null_tolerance {
        config.uniqueness_null_tolerance = value;
    }
    if let Some(value) = args.date_parse_sample_size {
        config.date_parse_sample_size = value;
    }
    if let Some(value) = args.date_parse_success_threshold {
        config.date_parse_success_threshold = value;
    }
    if let Some(value) = &args.input_encoding {
        config.input_encoding = Some(value.clone());
    }
    if let Some(value) = args.jobs {
        config.jobs = value;
    }
    config.validate()?;
    debug!("Effective analysis config: {config:?}");
    Ok(config)
}

/// Replaces each directory with the supported files inside it. Explicit file
/// paths are kept even when their extension is unsupported; the engine
/// reports those per source.
fn expand_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for input in inputs {
        if !input.is_dir() {
            paths.push(input.clone());
            continue;
        }
        let discovery =
            discover_sources(input).with_context(|| format!("Listing directory {input:?}"))?;
        if discovery.is_empty_directory() {
            info!("Directory {input:?} is empty; nothing to analyze there");
            continue;
        }
        if discovery.skipped_reports > 0 {
            debug!(
                "Skipped {} earlier report file(s) in {input:?}",
                discovery.skipped_reports
            );
        }
        if discovery.supported.is_empty() && !discovery.unsupported_extensions.is_empty() {
            bail!(
                "No supported files in {input:?}; found {}",
                discovery.unsupported_extensions.iter().join(", ")
            );
        }
        paths.extend(discovery.supported);
    }
    Ok(dedupe_paths(paths))
}

fn dedupe_paths(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    paths
        .into_iter()
        .unique_by(|path| canonical(path))
        .collect()
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
