//! Band-power integration of spectral density.
//!
//! Power spectral density (nT^2/Hz) integrated over a frequency band gives
//! squared wave amplitude in nT^2; `1000 * sqrt` converts that to an
//! amplitude in picotesla.

/// Trapezoidal integral of `psd` over the bins with `lo <= f <= hi`.
///
/// Bins are taken as-is (no partial-bin interpolation at the edges); fewer
/// than two in-range bins integrate to zero.
pub fn trapezoid_in_band(freq: &[f64], psd: &[f64], lo: f64, hi: f64) -> f64 {
    let n = freq.len().min(psd.len());
    let mut acc = 0.0;
    let mut prev: Option<(f64, f64)> = None;
    for i in 0..n {
        let f = freq[i];
        if f < lo || f > hi {
            continue;
        }
        if let Some((pf, pv)) = prev {
            acc += 0.5 * (pv + psd[i]) * (f - pf);
        }
        prev = Some((f, psd[i]));
    }
    acc
}

/// PSD-area to amplitude: `1000 * sqrt(integral)` picotesla.
pub fn amplitude_pt(integral: f64) -> f64 {
    1e3 * integral.sqrt()
}

/// Band amplitude in picotesla over `[lo, hi]` Hz.
pub fn band_amplitude_pt(freq: &[f64], psd: &[f64], lo: f64, hi: f64) -> f64 {
    amplitude_pt(trapezoid_in_band(freq, psd, lo, hi))
}
