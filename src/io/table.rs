//! Derived and merged CSV tables, plus the read-side loader.
//!
//! The per-(spacecraft, day) table is the derivation idempotence unit: its
//! presence on disk means that day's expensive derivation (including the
//! remote transform round-trip) is done. The merged per-date table is a pure
//! row union across spacecraft, derived and read-only with respect to the
//! per-spacecraft files.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use csv::StringRecord;

use crate::domain::{DerivedSample, Spacecraft};
use crate::error::PipelineError;

pub const TABLE_HEADER: &str =
    "epoch,sc,SAT,B(pT),Bl(pT),Bu(pT),L,Lstar,Fce,CDMAG_MLAT,CDMAG_MLON,CDMAG_MLT,CDMAG_R";

const EPOCH_FMT: &str = "%Y-%m-%d %H:%M:%S";

pub fn derived_table_path(cache_root: &Path, spacecraft: Spacecraft, date: NaiveDate) -> PathBuf {
    cache_root
        .join("derived")
        .join(format!("{}_{}.csv", date.format("%Y%m%d"), spacecraft.tag()))
}

pub fn merged_table_path(cache_root: &Path, date: NaiveDate) -> PathBuf {
    cache_root
        .join("merged")
        .join(format!("{}.csv", date.format("%Y%m%d")))
}

/// Write one table; parent directories are created as needed.
pub fn write_table(path: &Path, rows: &[DerivedSample]) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| PipelineError::io(format!("Failed to create '{}'", parent.display()), e))?;
    }
    let mut file = File::create(path)
        .map_err(|e| PipelineError::io(format!("Failed to create table '{}'", path.display()), e))?;

    writeln!(file, "{TABLE_HEADER}")
        .map_err(|e| PipelineError::io(format!("Failed to write '{}'", path.display()), e))?;
    for r in rows {
        writeln!(
            file,
            "{},{},{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}",
            r.epoch.format(EPOCH_FMT),
            r.spacecraft.tag(),
            r.spacecraft.sat_label(),
            r.b_total_pt,
            r.b_lower_pt,
            r.b_upper_pt,
            r.l,
            r.lstar,
            r.fce,
            r.cdmag_mlat,
            r.cdmag_mlon,
            r.cdmag_mlt,
            r.cdmag_r,
        )
        .map_err(|e| PipelineError::io(format!("Failed to write '{}'", path.display()), e))?;
    }
    Ok(())
}

/// Merged per-date table: plain row union in the given table order, no
/// deduplication, no cross-spacecraft alignment.
pub fn write_merged(path: &Path, tables: &[Vec<DerivedSample>]) -> Result<(), PipelineError> {
    let rows: Vec<DerivedSample> = tables.iter().flatten().cloned().collect();
    write_table(path, &rows)
}

/// Read a table back (also used after the remote transform rewrote one in
/// place; the transform contract preserves the header and row order).
pub fn read_table(path: &Path) -> Result<Vec<DerivedSample>, PipelineError> {
    let file = File::open(path)
        .map_err(|e| PipelineError::io(format!("Failed to open table '{}'", path.display()), e))?;
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| PipelineError::Format {
            path: path.to_path_buf(),
            detail: format!("failed to read CSV header: {e}"),
        })?
        .clone();
    let header_map = build_header_map(&headers);

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| PipelineError::Format {
            path: path.to_path_buf(),
            detail: format!("CSV parse error at row {}: {e}", idx + 2),
        })?;
        rows.push(parse_row(&record, &header_map).map_err(|detail| PipelineError::Format {
            path: path.to_path_buf(),
            detail: format!("row {}: {detail}", idx + 2),
        })?);
    }
    Ok(rows)
}

/// Read-side loader over the merged per-date tables.
#[derive(Debug, Clone)]
pub struct DataLoader {
    cache_root: PathBuf,
}

impl DataLoader {
    pub fn new(cache_root: &Path) -> DataLoader {
        DataLoader {
            cache_root: cache_root.to_path_buf(),
        }
    }

    /// Concatenate all available merged tables for `[start, end)`.
    ///
    /// If the very first record's timestamp differs from the requested start
    /// date, a leading duplicate of that record is synthesized and stamped
    /// with the exact start date, so downstream joins have an anchored first
    /// sample. An entirely empty range stays empty.
    pub fn load(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DerivedSample>, PipelineError> {
        let mut rows = Vec::new();
        let mut date = start;
        while date < end {
            let path = merged_table_path(&self.cache_root, date);
            if path.exists() {
                rows.extend(read_table(&path)?);
            }
            date = date + Duration::days(1);
        }

        let start_epoch = start.and_hms_opt(0, 0, 0).expect("midnight exists");
        if let Some(first) = rows.first() {
            if first.epoch != start_epoch {
                let mut lead = first.clone();
                lead.epoch = start_epoch;
                rows.insert(0, lead);
            }
        }
        Ok(rows)
    }
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.trim().to_string(), idx))
        .collect()
}

fn parse_row(
    record: &StringRecord,
    header_map: &HashMap<String, usize>,
) -> Result<DerivedSample, String> {
    let get = |name: &str| -> Result<&str, String> {
        let idx = header_map
            .get(name)
            .ok_or_else(|| format!("missing column `{name}`"))?;
        record
            .get(*idx)
            .ok_or_else(|| format!("missing value for `{name}`"))
    };
    let get_f64 = |name: &str| -> Result<f64, String> {
        let raw = get(name)?;
        raw.parse::<f64>()
            .map_err(|_| format!("invalid `{name}` value '{raw}'"))
    };

    let epoch = NaiveDateTime::parse_from_str(get("epoch")?, EPOCH_FMT)
        .map_err(|e| format!("invalid epoch: {e}"))?;
    let sc_raw = get("sc")?;
    let spacecraft = Spacecraft::from_tag(sc_raw)
        .ok_or_else(|| format!("invalid spacecraft tag '{sc_raw}'"))?;

    Ok(DerivedSample {
        epoch,
        spacecraft,
        b_total_pt: get_f64("B(pT)")?,
        b_lower_pt: get_f64("Bl(pT)")?,
        b_upper_pt: get_f64("Bu(pT)")?,
        l: get_f64("L")?,
        lstar: get_f64("Lstar")?,
        fce: get_f64("Fce")?,
        cdmag_mlat: get_f64("CDMAG_MLAT")?,
        cdmag_mlon: get_f64("CDMAG_MLON")?,
        cdmag_mlt: get_f64("CDMAG_MLT")?,
        cdmag_r: get_f64("CDMAG_R")?,
    })
}
