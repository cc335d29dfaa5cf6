pub mod analysis;
pub mod analyze_cmd;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod data;
pub mod dates;
pub mod error;
pub mod io_utils;
pub mod keys;
pub mod loader;
pub mod naming;
pub mod profile;
pub mod relations;
pub mod report;
pub mod source;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;

use crate::cli::{Cli, Commands};

pub use crate::{
    analysis::{AnalysisReport, RunContext, analyze},
    cancel::CancelToken,
    config::AnalysisConfig,
    error::{AnalysisError, SourceError},
    source::SourceInput,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("relation_scout", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Analyze(args) => analyze_cmd::execute(&args),
    }
}
