//! Time-series reduction and resampling.
//!
//! The ephemeris arrives at an irregular ~1-minute cadence with a
//! pitch-angle dimension; the spectral epochs arrive at their own cadence.
//! This module reduces the angular dimension (NaN-aware median) and places
//! the reduced series on a strictly regular grid so that spectral samples
//! can be matched by exact timestamp equality.

use chrono::{NaiveDateTime, Timelike};
use nalgebra::DMatrix;

/// Mask physically invalid (negative) entries as NaN, in place.
pub fn mask_negative(m: &mut DMatrix<f64>) {
    for v in m.iter_mut() {
        if *v < 0.0 {
            *v = f64::NAN;
        }
    }
}

/// Per-row median ignoring NaN entries; an all-NaN row reduces to NaN.
pub fn nan_row_median(m: &DMatrix<f64>) -> Vec<f64> {
    let mut out = Vec::with_capacity(m.nrows());
    for r in 0..m.nrows() {
        let mut vals: Vec<f64> = m.row(r).iter().copied().filter(|v| v.is_finite()).collect();
        if vals.is_empty() {
            out.push(f64::NAN);
            continue;
        }
        vals.sort_by(f64::total_cmp);
        let n = vals.len();
        let median = if n % 2 == 1 {
            vals[n / 2]
        } else {
            0.5 * (vals[n / 2 - 1] + vals[n / 2])
        };
        out.push(median);
    }
    out
}

/// A strictly regular time grid spanning a set of source epochs.
#[derive(Debug, Clone)]
pub struct RegularGrid {
    pub start: NaiveDateTime,
    pub step_s: i64,
    pub len: usize,
}

impl RegularGrid {
    /// Grid from the first to the last source epoch (inclusive), anchored on
    /// the first epoch truncated to whole seconds.
    pub fn span(epochs: &[NaiveDateTime], step_s: i64) -> Option<RegularGrid> {
        let first = *epochs.first()?;
        let last = *epochs.last()?;
        let start = first.with_nanosecond(0)?;
        let total = (last - start).num_seconds();
        if total < 0 || step_s <= 0 {
            return None;
        }
        Some(RegularGrid {
            start,
            step_s,
            len: (total / step_s) as usize + 1,
        })
    }

    pub fn timestamp(&self, index: usize) -> NaiveDateTime {
        self.start + chrono::Duration::seconds(index as i64 * self.step_s)
    }

    /// Exact-equality lookup: sub-second timestamps and off-grid instants
    /// never match (the caller marks those samples as missing).
    pub fn index_of(&self, t: NaiveDateTime) -> Option<usize> {
        if t.nanosecond() != 0 {
            return None;
        }
        let dt = (t - self.start).num_seconds();
        if dt < 0 || dt % self.step_s != 0 {
            return None;
        }
        let idx = (dt / self.step_s) as usize;
        if idx < self.len { Some(idx) } else { None }
    }
}

/// Linearly resample an irregular `(epoch, value)` series onto `grid`.
///
/// Interpolation runs between adjacent *valid* (finite) samples; NaN source
/// samples are skipped rather than propagated. Grid points outside the valid
/// span stay NaN. Source epochs must be ascending.
pub fn resample_linear(epochs: &[NaiveDateTime], values: &[f64], grid: &RegularGrid) -> Vec<f64> {
    let mut out = vec![f64::NAN; grid.len];
    let n = epochs.len().min(values.len());
    let pts: Vec<(f64, f64)> = (0..n)
        .filter(|&i| values[i].is_finite())
        .map(|i| (epoch_seconds(epochs[i]), values[i]))
        .collect();
    if pts.is_empty() {
        return out;
    }

    let start = epoch_seconds(grid.start);
    let mut k = 0usize;
    for (i, slot) in out.iter_mut().enumerate() {
        let t = start + (i as i64 * grid.step_s) as f64;
        if t < pts[0].0 || t > pts[pts.len() - 1].0 {
            continue;
        }
        while k + 1 < pts.len() && pts[k + 1].0 < t {
            k += 1;
        }
        let (t0, v0) = pts[k];
        if t <= t0 {
            *slot = v0;
        } else if k + 1 < pts.len() {
            let (t1, v1) = pts[k + 1];
            *slot = v0 + (v1 - v0) * (t - t0) / (t1 - t0);
        } else {
            *slot = v0;
        }
    }
    out
}

fn epoch_seconds(t: NaiveDateTime) -> f64 {
    t.and_utc().timestamp() as f64 + f64::from(t.and_utc().timestamp_subsec_nanos()) * 1e-9
}
