//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - installs the tracing subscriber
//! - parses CLI arguments
//! - resolves the remote-transform channel from the environment
//! - drives the acquisition/derivation pipeline or the read-side loader

use chrono::{Duration, NaiveDate};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, LoadArgs, PurgeArgs, RunArgs};
use crate::data::FileCache;
use crate::domain::PipelineConfig;
use crate::error::PipelineError;
use crate::io::table::DataLoader;

pub mod pipeline;

/// Entry point for the `wavepower` binary.
pub fn run() -> Result<(), PipelineError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::Load(args) => handle_load(args),
        Command::Purge(args) => handle_purge(args),
    }
}

fn handle_run(args: RunArgs) -> Result<(), PipelineError> {
    let config = pipeline_config_from_args(&args);
    let transform = crate::remote::from_env();
    let dates = date_range(args.start, args.end);
    pipeline::process_dates(&config, transform.as_ref(), &dates, &args.sc)
}

fn handle_load(args: LoadArgs) -> Result<(), PipelineError> {
    let end = args.end.unwrap_or(args.start + Duration::days(1));
    let loader = DataLoader::new(&args.cache_root);
    let rows = loader.load(args.start, end)?;

    println!("{} rows for {}..{}", rows.len(), args.start, end);
    for row in rows.iter().take(5) {
        println!(
            "  {} {} B={:.3} pT L={:.3} L*={:.3} fce={:.1} Hz",
            row.epoch, row.spacecraft, row.b_total_pt, row.l, row.lstar, row.fce
        );
    }
    Ok(())
}

fn handle_purge(args: PurgeArgs) -> Result<(), PipelineError> {
    let cache = FileCache::new(&args.cache_root);
    let end = args.end.unwrap_or(args.start + Duration::days(1));
    for date in date_range(args.start, Some(end)) {
        cache.purge(date)?;
    }
    Ok(())
}

pub fn pipeline_config_from_args(args: &RunArgs) -> PipelineConfig {
    let mut config = PipelineConfig::with_cache_root(args.cache_root.clone());
    config.level = args.level.clone();
    config.keep_raw_files = args.keep_raw;
    if !args.band.is_empty() {
        config.band_limits = Some(
            args.band
                .chunks_exact(2)
                .map(|pair| (pair[0], pair[1]))
                .collect(),
        );
    }
    config
}

fn date_range(start: NaiveDate, end: Option<NaiveDate>) -> Vec<NaiveDate> {
    let end = end.unwrap_or(start + Duration::days(1));
    let mut dates = Vec::new();
    let mut date = start;
    while date < end {
        dates.push(date);
        date = date + Duration::days(1);
    }
    dates
}
