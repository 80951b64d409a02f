//! End-to-end derivation over real files: variable-table fixtures are
//! written to disk, ingested, derived, round-tripped through a deterministic
//! transform fake and merged.

use std::path::Path;

use chrono::{Duration, NaiveDate};

use wave_power::derive::DerivationEngine;
use wave_power::domain::{DerivedSample, PipelineConfig, Spacecraft};
use wave_power::error::PipelineError;
use wave_power::io::spectral::{self, DEFAULT_CHANNELS};
use wave_power::io::table;
use wave_power::io::varfile::VarFile;
use wave_power::io::ephemeris;
use wave_power::remote::RemoteTransform;

const ELEMENTARY_CHARGE_C: f64 = 1.602_176_634e-19;
const ELECTRON_MASS_KG: f64 = 9.109_383_701_5e-31;

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2012, 10, 6).unwrap()
}

fn unix(date: NaiveDate, h: u32, m: u32, s: u32) -> f64 {
    date.and_hms_opt(h, m, s).unwrap().and_utc().timestamp() as f64
}

/// Field magnitude (nT) that produces the requested cyclotron frequency.
fn b_nt_for_fce(fce: f64) -> f64 {
    fce * 2.0 * std::f64::consts::PI * ELECTRON_MASS_KG / ELEMENTARY_CHARGE_C / 1e-9
}

/// A spectral-matrix file with flat PSD 1e-6 (split across the three
/// magnetic channels) on bins 50..=3000 Hz and epochs at the given times.
fn write_spectral_file(path: &Path, epochs_s: &[f64]) {
    let freq: Vec<f64> = (1..=60).map(|i| 50.0 * i as f64).collect();
    let n = epochs_s.len();
    let b = vec![1e-6 / 3.0; n * freq.len()];
    let e = vec![0.0; n * freq.len()];
    let bw = vec![50.0; freq.len()];
    VarFile::write(
        path,
        &[
            ("Epoch", 1, n, epochs_s),
            ("BuBu", n, freq.len(), &b),
            ("BvBv", n, freq.len(), &b),
            ("BwBw", n, freq.len(), &b),
            ("EuEu", n, freq.len(), &e),
            ("EvEv", n, freq.len(), &e),
            ("EwEw", n, freq.len(), &e),
            ("WFR_frequencies", 1, freq.len(), &freq),
            ("WFR_bandwidth", 1, freq.len(), &bw),
        ],
    )
    .unwrap();
}

/// A magnetic-ephemeris file with samples at the given fractional hours,
/// fce = 1000 Hz throughout and one masked (negative) pitch-angle column.
fn write_ephemeris_file(path: &Path, hours: &[f64]) {
    let n = hours.len();
    let mut l = Vec::with_capacity(n * 3);
    let mut lstar = Vec::with_capacity(n * 3);
    for _ in 0..n {
        l.extend_from_slice(&[4.4, 4.6, -1.0e31]);
        lstar.extend_from_slice(&[4.1, 4.3, -1.0e31]);
    }
    let b_nt = b_nt_for_fce(1000.0);
    let mut bmin = Vec::with_capacity(n * 4);
    for _ in 0..n {
        bmin.extend_from_slice(&[0.0, 0.0, 0.0, b_nt]);
    }
    let mlat = vec![15.0; n];
    let mlon = vec![-60.0; n];
    let mlt = vec![6.0; n];
    let r = vec![4.4; n];
    VarFile::write(
        path,
        &[
            ("UTC", 1, n, hours),
            ("L", n, 3, &l),
            ("Lstar", n, 3, &lstar),
            ("Bmin_gsm", n, 4, &bmin),
            ("CDMAG_MLAT", 1, n, &mlat),
            ("CDMAG_MLON", 1, n, &mlon),
            ("CDMAG_MLT", 1, n, &mlt),
            ("CDMAG_R", 1, n, &r),
        ],
    )
    .unwrap();
}

/// Deterministic rewrite standing in for the legacy coordinate conversion:
/// shifts CDMAG_MLAT by +1 degree and rewrites the table in place.
struct ShiftingTransform;

impl RemoteTransform for ShiftingTransform {
    fn transform(&self, path: &Path) -> Result<(), PipelineError> {
        let mut rows: Vec<DerivedSample> = table::read_table(path)?;
        for row in &mut rows {
            row.cdmag_mlat += 1.0;
        }
        table::write_table(path, &rows)
    }
}

#[test]
fn flat_psd_day_derives_28_pt_and_survives_the_transform_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let spectral_path = dir.path().join("spectral.bin");
    let ephem_path = dir.path().join("ephem.bin");

    // Three spectral epochs at minutes 1..3; ephemeris at minutes 0..5
    // (the file's final sample is forced to the next-day boundary).
    write_spectral_file(
        &spectral_path,
        &[
            unix(date(), 0, 1, 0),
            unix(date(), 0, 2, 0),
            unix(date(), 0, 3, 0),
        ],
    );
    let hours: Vec<f64> = (0..=5).map(|m| m as f64 / 60.0).collect();
    write_ephemeris_file(&ephem_path, &hours);

    let spectral = spectral::load(&[spectral_path], &DEFAULT_CHANNELS).unwrap();
    let ephemeris = ephemeris::load(&[(date(), ephem_path)], &ephemeris::DEFAULT_KEYS).unwrap();

    let config = PipelineConfig::with_cache_root(dir.path().join("cache"));
    let engine = DerivationEngine::new(&config, &ShiftingTransform);
    let rows = engine
        .derive_day(date(), Spacecraft::A, &spectral, &ephemeris)
        .unwrap();

    assert_eq!(rows.len(), 3);
    for row in &rows {
        // Flat PSD 1e-6 over [100, 900] Hz: 1000*sqrt(1e-6*800) ≈ 28.28 pT.
        assert!((row.b_total_pt - 28.284271).abs() < 1e-3, "B = {}", row.b_total_pt);
        assert!((row.fce - 1000.0).abs() < 1e-3);
        // Median over {4.4, 4.6, masked}: 4.5.
        assert!((row.l - 4.5).abs() < 1e-6);
        assert!((row.lstar - 4.2).abs() < 1e-6);
        // The transform's rewrite must be visible in the returned table.
        assert!((row.cdmag_mlat - 16.0).abs() < 1e-6);
        assert!(row.b_lower_pt <= row.b_total_pt + 1e-9);
        assert!(row.b_upper_pt <= row.b_total_pt + 1e-9);
    }
}

#[test]
fn unmatched_epoch_stays_as_a_nan_row() {
    let dir = tempfile::tempdir().unwrap();
    let spectral_path = dir.path().join("spectral.bin");
    let ephem_path = dir.path().join("ephem.bin");

    // The first spectral epoch precedes the ephemeris span; the derived
    // table must still carry one row per spectral epoch.
    write_spectral_file(
        &spectral_path,
        &[
            unix(date(), 0, 1, 0),
            unix(date(), 0, 2, 0),
            unix(date(), 0, 3, 0),
        ],
    );
    let hours: Vec<f64> = vec![90.0 / 3600.0, 120.0 / 3600.0, 180.0 / 3600.0, 240.0 / 3600.0];
    write_ephemeris_file(&ephem_path, &hours);

    let spectral = spectral::load(&[spectral_path], &DEFAULT_CHANNELS).unwrap();
    let ephemeris = ephemeris::load(&[(date(), ephem_path)], &ephemeris::DEFAULT_KEYS).unwrap();

    let config = PipelineConfig::with_cache_root(dir.path().join("cache"));
    let engine = DerivationEngine::new(&config, &ShiftingTransform);
    let rows = engine
        .derive_day(date(), Spacecraft::A, &spectral, &ephemeris)
        .unwrap();

    assert_eq!(rows.len(), 3);
    assert!(rows[0].b_total_pt.is_nan());
    assert!(rows[0].l.is_nan());
    assert!(rows[0].fce.is_nan());
    for row in &rows[1..] {
        assert!(row.b_total_pt.is_finite());
        assert!(row.l.is_finite());
    }
}

#[test]
fn merged_day_is_the_union_of_both_spacecraft() {
    let dir = tempfile::tempdir().unwrap();
    let spectral_a = dir.path().join("spectral_a.bin");
    let spectral_b = dir.path().join("spectral_b.bin");
    let ephem_path = dir.path().join("ephem.bin");

    write_spectral_file(
        &spectral_a,
        &[unix(date(), 0, 1, 0), unix(date(), 0, 2, 0), unix(date(), 0, 3, 0)],
    );
    write_spectral_file(&spectral_b, &[unix(date(), 0, 1, 0), unix(date(), 0, 2, 0)]);
    let hours: Vec<f64> = (0..=5).map(|m| m as f64 / 60.0).collect();
    write_ephemeris_file(&ephem_path, &hours);

    let ephemeris = ephemeris::load(&[(date(), ephem_path)], &ephemeris::DEFAULT_KEYS).unwrap();
    let frame_a = spectral::load(&[spectral_a], &DEFAULT_CHANNELS).unwrap();
    let frame_b = spectral::load(&[spectral_b], &DEFAULT_CHANNELS).unwrap();

    let config = PipelineConfig::with_cache_root(dir.path().join("cache"));
    let engine = DerivationEngine::new(&config, &ShiftingTransform);
    let a = engine
        .derive_day(date(), Spacecraft::A, &frame_a, &ephemeris)
        .unwrap();
    let b = engine
        .derive_day(date(), Spacecraft::B, &frame_b, &ephemeris)
        .unwrap();
    let merged_path = engine.merge_day(date(), &[a, b]).unwrap();

    let merged = table::read_table(&merged_path).unwrap();
    assert_eq!(merged.len(), 5);

    // The read-side loader anchors the range start with a synthesized row.
    let loader = table::DataLoader::new(&config.cache_root);
    let loaded = loader.load(date(), date() + Duration::days(1)).unwrap();
    assert_eq!(loaded.len(), 6);
    assert_eq!(loaded[0].epoch, date().and_hms_opt(0, 0, 0).unwrap());
}
