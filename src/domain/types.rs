//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during derivation
//! - cached as per-day bundles (bincode)
//! - exported to CSV and reloaded later

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};
use clap::ValueEnum;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Which Van Allen Probe the data belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Spacecraft {
    A,
    B,
}

impl Spacecraft {
    pub const BOTH: [Spacecraft; 2] = [Spacecraft::A, Spacecraft::B];

    /// Lowercase tag used in URLs, filenames and the `sc` table column.
    pub fn tag(self) -> &'static str {
        match self {
            Spacecraft::A => "a",
            Spacecraft::B => "b",
        }
    }

    /// Uppercase tag used in remote directory paths (`RBSP-A`, `RBSP-B`).
    pub fn upper_tag(self) -> &'static str {
        match self {
            Spacecraft::A => "A",
            Spacecraft::B => "B",
        }
    }

    /// Satellite label used in the `SAT` table column.
    pub fn sat_label(self) -> &'static str {
        match self {
            Spacecraft::A => "RBSP-A",
            Spacecraft::B => "RBSP-B",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Spacecraft> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "a" => Some(Spacecraft::A),
            "b" => Some(Spacecraft::B),
            _ => None,
        }
    }
}

impl std::fmt::Display for Spacecraft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Remote dataset families, each discoverable by a filename substring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatasetKind {
    Spectral,
    Waveform,
    Ephemeris,
}

impl DatasetKind {
    /// Substring that identifies this kind in remote directory listings.
    pub fn filename_kind(self) -> &'static str {
        match self {
            DatasetKind::Spectral => "WFR-spectral-matrix-diagonal_emfisis",
            DatasetKind::Waveform => "WFR-waveform_emfisis",
            DatasetKind::Ephemeris => "MagEphem",
        }
    }
}

/// One discovered remote file and its cache slot.
///
/// Created at discovery time; `fetched` flips true on successful download or
/// cache-hit detection and the record is never mutated afterward. Removal
/// happens only through [`crate::data::FileCache::purge`].
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub date: NaiveDate,
    pub spacecraft: Spacecraft,
    pub kind: DatasetKind,
    pub remote_url: String,
    pub local_path: PathBuf,
    pub fetched: bool,
}

/// Spectral-matrix data for one spacecraft/day (possibly several files).
///
/// Each channel matrix is [time x frequency] and row-aligned with `epoch`;
/// `frequency_bins` is strictly increasing and shared by all channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectralFrame {
    pub epoch: Vec<NaiveDateTime>,
    pub channels: BTreeMap<String, DMatrix<f64>>,
    pub frequency_bins: Vec<f64>,
    pub bandwidths: Vec<f64>,
}

impl SpectralFrame {
    pub fn len(&self) -> usize {
        self.epoch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epoch.is_empty()
    }

    /// Channel matrix lookup; requested channels are a hard requirement.
    pub fn channel(&self, name: &str) -> Result<&DMatrix<f64>, PipelineError> {
        self.channels.get(name).ok_or_else(|| PipelineError::MissingKey {
            key: name.to_string(),
        })
    }
}

/// Magnetic-ephemeris data for one spacecraft/day (possibly several files).
///
/// `matrices` holds per-time vector fields ([time x pitch-angle] for L/L*,
/// [time x component] for `Bmin_gsm`); `scalars` holds per-time series such
/// as the CDMAG coordinate fields. Negative L/L* entries are physically
/// invalid and are masked (not deleted) during reduction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EphemerisFrame {
    pub epoch: Vec<NaiveDateTime>,
    pub matrices: BTreeMap<String, DMatrix<f64>>,
    pub scalars: BTreeMap<String, Vec<f64>>,
}

impl EphemerisFrame {
    pub fn len(&self) -> usize {
        self.epoch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epoch.is_empty()
    }

    pub fn matrix(&self, name: &str) -> Result<&DMatrix<f64>, PipelineError> {
        self.matrices.get(name).ok_or_else(|| PipelineError::MissingKey {
            key: name.to_string(),
        })
    }

    pub fn scalar(&self, name: &str) -> Option<&[f64]> {
        self.scalars.get(name).map(Vec::as_slice)
    }
}

/// One derived row: band-integrated wave amplitudes plus the matched
/// ephemeris fields, per spectral epoch sample.
///
/// Missing ephemeris matches are encoded as NaN, never dropped, so the row
/// count always equals the spectral epoch count.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedSample {
    pub epoch: NaiveDateTime,
    pub spacecraft: Spacecraft,
    pub b_total_pt: f64,
    pub b_lower_pt: f64,
    pub b_upper_pt: f64,
    pub l: f64,
    pub lstar: f64,
    pub fce: f64,
    pub cdmag_mlat: f64,
    pub cdmag_mlon: f64,
    pub cdmag_mlt: f64,
    pub cdmag_r: f64,
}

impl DerivedSample {
    /// A fully-missing row for a spectral epoch with no ephemeris match.
    pub fn missing(epoch: NaiveDateTime, spacecraft: Spacecraft) -> Self {
        DerivedSample {
            epoch,
            spacecraft,
            b_total_pt: f64::NAN,
            b_lower_pt: f64::NAN,
            b_upper_pt: f64::NAN,
            l: f64::NAN,
            lstar: f64::NAN,
            fce: f64::NAN,
            cdmag_mlat: f64::NAN,
            cdmag_mlon: f64::NAN,
            cdmag_mlt: f64::NAN,
            cdmag_r: f64::NAN,
        }
    }
}

/// Frequency-band integration policy.
///
/// `Adaptive` tracks the local electron cyclotron frequency; `Fixed` uses
/// explicit `[min, max]` pairs and reports no lower/upper split.
#[derive(Debug, Clone, PartialEq)]
pub enum BandPolicy {
    Adaptive,
    Fixed(Vec<(f64, f64)>),
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Remote archive root, e.g. `http://emfisis.physics.uiowa.edu/Flight`.
    pub base_url: String,
    /// Dataset level tag substituted into dated directory URLs.
    pub level: String,
    /// Ephemeris product version tag (templated into the direct filename).
    pub ephem_version: String,
    /// Local cache root directory.
    pub cache_root: PathBuf,
    /// Explicit band limits; absent means the adaptive cyclotron policy.
    pub band_limits: Option<Vec<(f64, f64)>>,
    /// Resample cadence for the common ephemeris time base, in seconds.
    pub resample_step_s: i64,
    /// Keep raw downloaded files after bundling instead of purging them.
    pub keep_raw_files: bool,
}

impl PipelineConfig {
    pub fn with_cache_root(cache_root: PathBuf) -> Self {
        PipelineConfig {
            base_url: "http://emfisis.physics.uiowa.edu/Flight".to_string(),
            level: "L2".to_string(),
            ephem_version: "3.0.0".to_string(),
            cache_root,
            band_limits: None,
            resample_step_s: 1,
            keep_raw_files: false,
        }
    }

    pub fn band_policy(&self) -> BandPolicy {
        match &self.band_limits {
            Some(pairs) => BandPolicy::Fixed(pairs.clone()),
            None => BandPolicy::Adaptive,
        }
    }
}
