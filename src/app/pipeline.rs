//! Shared acquisition/derivation pipeline used by the CLI front-end.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! discover -> cache -> ingest -> bundle -> derive -> transform -> merge.
//!
//! Everything runs sequentially: one date at a time, spacecraft one after
//! the other, files downloaded serially. Concurrent runs against the same
//! cache directory are not supported.

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::data::{FileCache, RemoteCatalog};
use crate::domain::{DatasetKind, PipelineConfig, Spacecraft};
use crate::derive::DerivationEngine;
use crate::error::PipelineError;
use crate::io::bundle::{BundleCache, DayBundle};
use crate::io::{ephemeris, spectral};
use crate::remote::RemoteTransform;

/// Day-level downloader: raw ingest frames cached as per-day bundles,
/// keyed by the active spacecraft.
pub struct Downloader<'a> {
    config: &'a PipelineConfig,
    catalog: RemoteCatalog,
    cache: FileCache,
    bundles: BundleCache,
    spacecraft: Spacecraft,
}

impl<'a> Downloader<'a> {
    pub fn new(config: &'a PipelineConfig, spacecraft: Spacecraft) -> Self {
        Downloader {
            catalog: RemoteCatalog::new(config),
            cache: FileCache::new(&config.cache_root),
            bundles: BundleCache::new(&config.cache_root),
            config,
            spacecraft,
        }
    }

    pub fn spacecraft(&self) -> Spacecraft {
        self.spacecraft
    }

    /// Swap the active spacecraft. Bundle filenames are spacecraft-qualified,
    /// so bundles already downloaded for the previous spacecraft stay valid.
    pub fn reset_params(&mut self, spacecraft: Spacecraft) {
        self.spacecraft = spacecraft;
    }

    /// Load the day bundle, fetching and ingesting on a miss.
    pub fn download(&self, date: NaiveDate) -> Result<DayBundle, PipelineError> {
        if let Some(bundle) = self.bundles.load(self.spacecraft, date)? {
            info!(date = %date, sc = self.spacecraft.tag(), "bundle hit");
            return Ok(bundle);
        }

        let mut ephem_record =
            self.catalog
                .ephemeris_record(date, self.spacecraft, &self.config.cache_root);
        let ephem_path = self.cache.ensure_local(&mut ephem_record)?;
        let ephemeris = ephemeris::load(&[(date, ephem_path)], &ephemeris::DEFAULT_KEYS)?;

        let mut spectral_paths = Vec::new();
        for mut record in
            self.catalog
                .discover(date, self.spacecraft, DatasetKind::Spectral, &self.config.cache_root)?
        {
            spectral_paths.push(self.cache.ensure_local(&mut record)?);
        }
        let spectral = spectral::load(&spectral_paths, &spectral::DEFAULT_CHANNELS)?;

        let bundle = DayBundle { ephemeris, spectral };
        self.bundles.store(self.spacecraft, date, &bundle)?;
        Ok(bundle)
    }
}

/// Run the full pipeline over a date range.
///
/// An unavailable catalog or failed download degrades to skipping that
/// (date, spacecraft); any later failure aborts the current date only.
/// Outputs of previously processed dates are never touched.
pub fn process_dates(
    config: &PipelineConfig,
    transform: &dyn RemoteTransform,
    dates: &[NaiveDate],
    spacecraft: &[Spacecraft],
) -> Result<(), PipelineError> {
    let engine = DerivationEngine::new(config, transform);
    let cache = FileCache::new(&config.cache_root);
    let mut downloader = Downloader::new(config, *spacecraft.first().unwrap_or(&Spacecraft::A));

    for &date in dates {
        let mut tables = Vec::new();
        let mut date_failed = false;

        for &sc in spacecraft {
            downloader.reset_params(sc);
            let bundle = match downloader.download(date) {
                Ok(bundle) => bundle,
                Err(
                    e @ (PipelineError::CatalogUnavailable { .. }
                    | PipelineError::DownloadFailed { .. }),
                ) => {
                    warn!(date = %date, sc = sc.tag(), error = %e, "skipping spacecraft");
                    continue;
                }
                Err(e) => {
                    warn!(date = %date, sc = sc.tag(), error = %e, "aborting date");
                    date_failed = true;
                    break;
                }
            };

            match engine.derive_day(date, sc, &bundle.spectral, &bundle.ephemeris) {
                Ok(rows) => tables.push(rows),
                Err(e) => {
                    warn!(date = %date, sc = sc.tag(), error = %e, "aborting date");
                    date_failed = true;
                    break;
                }
            }
        }

        if !date_failed && !tables.is_empty() {
            engine.merge_day(date, &tables)?;
        }
        if !config.keep_raw_files {
            cache.purge(date)?;
        }
    }
    Ok(())
}
