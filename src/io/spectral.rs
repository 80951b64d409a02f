//! Spectral-matrix ingest.
//!
//! Turns one day's set of spectral-matrix files into a single
//! [`SpectralFrame`]: epochs and channel matrices concatenated across files
//! in the given order (discovery order is chronological by construction of
//! the catalog, so no re-sort happens here), frequency-bin metadata taken
//! from the first file only.
//!
//! Policy: requested channels are a **strict schema** — a channel missing
//! from any member file aborts the load with `SchemaMismatch`. This is the
//! counterpart of the lenient ephemeris policy in [`crate::io::ephemeris`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDateTime};
use nalgebra::DMatrix;

use crate::domain::SpectralFrame;
use crate::error::PipelineError;
use crate::io::varfile::VarFile;

/// Channels present in the spectral-matrix diagonal products.
pub const DEFAULT_CHANNELS: [&str; 6] = ["BuBu", "BvBv", "BwBw", "EuEu", "EvEv", "EwEw"];

/// The magnetic auto-power triple summed for band integration.
pub const B_CHANNELS: [&str; 3] = ["BuBu", "BvBv", "BwBw"];

const EPOCH_VAR: &str = "Epoch";
const FREQUENCY_VAR: &str = "WFR_frequencies";
const BANDWIDTH_VAR: &str = "WFR_bandwidth";

/// Load and concatenate spectral files, in file order.
pub fn load(paths: &[PathBuf], channel_keys: &[&str]) -> Result<SpectralFrame, PipelineError> {
    let mut epoch: Vec<NaiveDateTime> = Vec::new();
    let mut channels: BTreeMap<String, DMatrix<f64>> = BTreeMap::new();
    let mut frequency_bins: Vec<f64> = Vec::new();
    let mut bandwidths: Vec<f64> = Vec::new();

    for (file_idx, path) in paths.iter().enumerate() {
        let vf = VarFile::open(path)?;

        let file_epoch: Vec<NaiveDateTime> = vf
            .require(EPOCH_VAR)?
            .as_series()
            .iter()
            .map(|&s| epoch_from_unix_seconds(s))
            .collect::<Result<_, _>>()
            .map_err(|detail| PipelineError::Format {
                path: path.clone(),
                detail,
            })?;

        for &key in channel_keys {
            let var = vf.require(key)?;
            let m = var.to_matrix();
            if m.nrows() != file_epoch.len() {
                return Err(PipelineError::SchemaMismatch {
                    path: path.clone(),
                    detail: format!(
                        "`{key}` has {} rows for {} epochs",
                        m.nrows(),
                        file_epoch.len()
                    ),
                });
            }
            match channels.remove(key) {
                None => {
                    channels.insert(key.to_string(), m);
                }
                Some(prev) => {
                    if prev.ncols() != m.ncols() {
                        return Err(PipelineError::SchemaMismatch {
                            path: path.clone(),
                            detail: format!(
                                "`{key}` bin count {} differs from reference {}",
                                m.ncols(),
                                prev.ncols()
                            ),
                        });
                    }
                    let mut stacked =
                        DMatrix::zeros(prev.nrows() + m.nrows(), prev.ncols());
                    stacked.rows_mut(0, prev.nrows()).copy_from(&prev);
                    stacked.rows_mut(prev.nrows(), m.nrows()).copy_from(&m);
                    channels.insert(key.to_string(), stacked);
                }
            }
        }

        // Bin layout is assumed constant across one day's files; read it from
        // the first (reference) file only.
        if file_idx == 0 {
            frequency_bins = vf.require(FREQUENCY_VAR)?.as_series().to_vec();
            bandwidths = vf.require(BANDWIDTH_VAR)?.as_series().to_vec();
            if !strictly_increasing(&frequency_bins) {
                return Err(PipelineError::SchemaMismatch {
                    path: path.clone(),
                    detail: "frequency bins are not strictly increasing".to_string(),
                });
            }
        }

        epoch.extend(file_epoch);
    }

    Ok(SpectralFrame {
        epoch,
        channels,
        frequency_bins,
        bandwidths,
    })
}

/// Epochs are stored as f64 Unix seconds; sub-second precision is dropped,
/// matching the archive's second-resolution epoch breakdown.
fn epoch_from_unix_seconds(secs: f64) -> Result<NaiveDateTime, String> {
    if !secs.is_finite() {
        return Err(format!("non-finite epoch value {secs}"));
    }
    DateTime::from_timestamp(secs.trunc() as i64, 0)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| format!("epoch value {secs} out of range"))
}

fn strictly_increasing(v: &[f64]) -> bool {
    v.windows(2).all(|w| w[0] < w[1])
}
