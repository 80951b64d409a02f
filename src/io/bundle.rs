//! Per-day raw-ingest bundle cache.
//!
//! The bundle holds both ingest frames for one (spacecraft, date) *before*
//! derivation, so a re-run skips discovery, download and parsing entirely.
//! This cache is deliberately separate from the derived-table cache in
//! [`crate::io::table`]: the two have different keys, formats and
//! invalidation units (raw ingest vs derived table).

use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{EphemerisFrame, Spacecraft, SpectralFrame};
use crate::error::PipelineError;

/// Raw ingest frames for one spacecraft/day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayBundle {
    pub ephemeris: EphemerisFrame,
    pub spectral: SpectralFrame,
}

/// Bundle store rooted at `{cache_root}/bundles`.
#[derive(Debug, Clone)]
pub struct BundleCache {
    dir: PathBuf,
}

impl BundleCache {
    pub fn new(cache_root: &Path) -> BundleCache {
        BundleCache {
            dir: cache_root.join("bundles"),
        }
    }

    /// Bundle filenames are spacecraft-qualified so swapping the active
    /// spacecraft never invalidates the other one's bundles.
    pub fn path(&self, spacecraft: Spacecraft, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}_{}.bundle", spacecraft.tag(), date.format("%Y%m%d")))
    }

    pub fn load(
        &self,
        spacecraft: Spacecraft,
        date: NaiveDate,
    ) -> Result<Option<DayBundle>, PipelineError> {
        let path = self.path(spacecraft, date);
        if !path.exists() {
            return Ok(None);
        }
        let file = fs::File::open(&path)
            .map_err(|e| PipelineError::io(format!("Failed to open bundle '{}'", path.display()), e))?;
        let bundle = bincode::deserialize_from(BufReader::new(file)).map_err(|e| {
            PipelineError::Format {
                path: path.clone(),
                detail: format!("bundle decode failed: {e}"),
            }
        })?;
        Ok(Some(bundle))
    }

    pub fn store(
        &self,
        spacecraft: Spacecraft,
        date: NaiveDate,
        bundle: &DayBundle,
    ) -> Result<(), PipelineError> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| PipelineError::io(format!("Failed to create '{}'", self.dir.display()), e))?;
        let path = self.path(spacecraft, date);
        let file = fs::File::create(&path)
            .map_err(|e| PipelineError::io(format!("Failed to create bundle '{}'", path.display()), e))?;
        bincode::serialize_into(BufWriter::new(file), bundle).map_err(|e| {
            PipelineError::Format {
                path,
                detail: format!("bundle encode failed: {e}"),
            }
        })?;
        Ok(())
    }
}
