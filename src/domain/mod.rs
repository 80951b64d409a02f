//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - acquisition identities (`Spacecraft`, `DatasetKind`, `FileRecord`)
//! - ingested frames (`SpectralFrame`, `EphemerisFrame`)
//! - derived outputs (`DerivedSample`)
//! - run configuration (`PipelineConfig`, `BandPolicy`)

pub mod types;

pub use types::*;
