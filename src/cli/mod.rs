//! Command-line parsing for the wave-power pipeline.
//!
//! The goal of this module is to keep **argument parsing** and **command
//! dispatch** separate from the acquisition/derivation code.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{ArgAction, Parser, Subcommand};

use crate::domain::Spacecraft;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "wavepower", version, about = "Satellite wave-power acquisition and derivation pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Acquire, derive and merge a date range.
    Run(RunArgs),
    /// Concatenate merged tables over a date range and print a summary.
    Load(LoadArgs),
    /// Remove cached raw files for a date range.
    Purge(PurgeArgs),
}

/// Options for the acquisition/derivation run.
#[derive(Debug, Parser, Clone)]
pub struct RunArgs {
    /// First date to process (YYYY-MM-DD).
    #[arg(short = 's', long)]
    pub start: NaiveDate,

    /// End date, exclusive (defaults to start + 1 day).
    #[arg(short = 'e', long)]
    pub end: Option<NaiveDate>,

    /// Spacecraft to process, in order.
    #[arg(long, value_enum, num_args = 1.., default_values_t = Spacecraft::BOTH)]
    pub sc: Vec<Spacecraft>,

    /// Local cache root directory.
    #[arg(long, default_value = "tmp/EMFISIS")]
    pub cache_root: PathBuf,

    /// Dataset level tag substituted into remote directory URLs.
    #[arg(long, default_value = "L2")]
    pub level: String,

    /// Fixed integration band as `MIN MAX` in Hz; repeat for several bands.
    /// Absent means the adaptive cyclotron-relative policy.
    #[arg(long = "band", num_args = 2, value_names = ["MIN", "MAX"], action = ArgAction::Append)]
    pub band: Vec<f64>,

    /// Keep raw downloaded files instead of purging them after bundling.
    #[arg(long, default_value_t = false)]
    pub keep_raw: bool,
}

/// Options for the read-side loader.
#[derive(Debug, Parser, Clone)]
pub struct LoadArgs {
    /// First date to load (YYYY-MM-DD).
    #[arg(short = 's', long)]
    pub start: NaiveDate,

    /// End date, exclusive (defaults to start + 1 day).
    #[arg(short = 'e', long)]
    pub end: Option<NaiveDate>,

    /// Local cache root directory.
    #[arg(long, default_value = "tmp/EMFISIS")]
    pub cache_root: PathBuf,
}

/// Options for cache cleanup.
#[derive(Debug, Parser, Clone)]
pub struct PurgeArgs {
    /// First date to purge (YYYY-MM-DD).
    #[arg(short = 's', long)]
    pub start: NaiveDate,

    /// End date, exclusive (defaults to start + 1 day).
    #[arg(short = 'e', long)]
    pub end: Option<NaiveDate>,

    /// Local cache root directory.
    #[arg(long, default_value = "tmp/EMFISIS")]
    pub cache_root: PathBuf,
}
