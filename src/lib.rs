//! `wave-power` library crate.
//!
//! The binary (`wavepower`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - modules are reusable (e.g., batch drivers, notebooks)
//! - code stays easy to navigate as the project grows
//!
//! The pipeline: remote catalog discovery -> file cache -> spectral/ephemeris
//! ingest -> derivation (resampling + band integration) -> remote coordinate
//! transform -> per-day merged tables.

pub mod app;
pub mod cli;
pub mod data;
pub mod derive;
pub mod domain;
pub mod error;
pub mod io;
pub mod math;
pub mod remote;
