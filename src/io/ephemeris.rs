//! Magnetic-ephemeris ingest.
//!
//! Each file carries one day of orbit-propagation records. The `UTC`
//! variable holds fractional hour-of-day offsets from the file's anchor
//! date; the final record of every file conceptually sits at hour 24 and is
//! realized as `anchor + 1 day` (end-of-day boundary fix). Remaining keys
//! concatenate as raw series, extending on recurrence across a multi-day
//! load.
//!
//! Policy: requested keys are **lenient** — a key absent from a file is
//! logged and omitted from the result rather than aborting. Only `UTC`
//! itself is a hard requirement, since nothing downstream works without a
//! time base. This asymmetry with the strict spectral schema is deliberate
//! and preserved.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use nalgebra::DMatrix;
use tracing::warn;

use crate::domain::EphemerisFrame;
use crate::error::PipelineError;
use crate::io::varfile::VarFile;

/// Fields consumed by the derivation step.
pub const DEFAULT_KEYS: [&str; 7] = [
    "L",
    "Lstar",
    "Bmin_gsm",
    "CDMAG_MLAT",
    "CDMAG_MLON",
    "CDMAG_MLT",
    "CDMAG_R",
];

const UTC_VAR: &str = "UTC";

/// Load and concatenate ephemeris files; each entry pairs the file with its
/// anchor date.
pub fn load(
    files: &[(NaiveDate, PathBuf)],
    keys: &[&str],
) -> Result<EphemerisFrame, PipelineError> {
    let mut epoch: Vec<NaiveDateTime> = Vec::new();
    let mut matrices: BTreeMap<String, DMatrix<f64>> = BTreeMap::new();
    let mut scalars: BTreeMap<String, Vec<f64>> = BTreeMap::new();

    for (anchor, path) in files {
        let vf = VarFile::open(path)?;
        let utc = vf.var(UTC_VAR).ok_or_else(|| PipelineError::MissingKey {
            key: UTC_VAR.to_string(),
        })?;
        epoch.extend(epochs_from_hours(*anchor, utc.as_series()));

        for &key in keys {
            let Some(var) = vf.var(key) else {
                warn!(key, file = %path.display(), "ephemeris key absent, omitting");
                continue;
            };
            if var.is_vector() {
                scalars
                    .entry(key.to_string())
                    .or_default()
                    .extend_from_slice(var.as_series());
            } else {
                let m = var.to_matrix();
                match matrices.remove(key) {
                    None => {
                        matrices.insert(key.to_string(), m);
                    }
                    Some(prev) => {
                        if prev.ncols() != m.ncols() {
                            return Err(PipelineError::SchemaMismatch {
                                path: path.clone(),
                                detail: format!(
                                    "`{key}` width {} differs from previous file's {}",
                                    m.ncols(),
                                    prev.ncols()
                                ),
                            });
                        }
                        let mut stacked =
                            DMatrix::zeros(prev.nrows() + m.nrows(), prev.ncols());
                        stacked.rows_mut(0, prev.nrows()).copy_from(&prev);
                        stacked.rows_mut(prev.nrows(), m.nrows()).copy_from(&m);
                        matrices.insert(key.to_string(), stacked);
                    }
                }
            }
        }
    }

    Ok(EphemerisFrame {
        epoch,
        matrices,
        scalars,
    })
}

/// Fractional hour-of-day offsets to absolute timestamps; the last sample of
/// a file is forced to the start of the next day.
fn epochs_from_hours(anchor: NaiveDate, hours: &[f64]) -> Vec<NaiveDateTime> {
    let midnight = anchor.and_hms_opt(0, 0, 0).expect("midnight exists");
    let mut out: Vec<NaiveDateTime> = hours
        .iter()
        .map(|&h| midnight + Duration::milliseconds((h * 3_600_000.0).round() as i64))
        .collect();
    if let Some(last) = out.last_mut() {
        *last = midnight + Duration::days(1);
    }
    out
}
