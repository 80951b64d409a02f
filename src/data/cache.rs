//! Local file cache.
//!
//! Maps discovered records to `{root}/{YYYYMMDD}/{filename}` slots. A hit
//! returns the existing path with no network access and no content
//! revalidation (staleness is out of scope). A miss streams the transfer to
//! a `.part` sibling and renames into place only on full success, so a
//! partial transfer can never masquerade as a cached file.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use reqwest::blocking::Client;
use tracing::info;

use crate::domain::FileRecord;
use crate::error::PipelineError;

pub struct FileCache {
    client: Client,
    root: PathBuf,
}

impl FileCache {
    pub fn new(root: &Path) -> FileCache {
        FileCache {
            client: Client::new(),
            root: root.to_path_buf(),
        }
    }

    pub fn dated_dir(&self, date: NaiveDate) -> PathBuf {
        self.root.join(date.format("%Y%m%d").to_string())
    }

    /// Return the record's local path, downloading at most once.
    pub fn ensure_local(&self, record: &mut FileRecord) -> Result<PathBuf, PipelineError> {
        if record.local_path.exists() {
            info!(path = %record.local_path.display(), "cache hit");
            record.fetched = true;
            return Ok(record.local_path.clone());
        }

        if let Some(parent) = record.local_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                PipelineError::io(format!("Failed to create '{}'", parent.display()), e)
            })?;
        }

        info!(url = %record.remote_url, "downloading");
        let part = record.local_path.with_extension("part");
        match self.stream_to(&record.remote_url, &part) {
            Ok(()) => {}
            Err(e) => {
                let _ = fs::remove_file(&part);
                return Err(e);
            }
        }
        fs::rename(&part, &record.local_path).map_err(|e| {
            PipelineError::io(
                format!("Failed to install '{}'", record.local_path.display()),
                e,
            )
        })?;

        record.fetched = true;
        Ok(record.local_path.clone())
    }

    fn stream_to(&self, url: &str, part: &Path) -> Result<(), PipelineError> {
        let mut response =
            self.client
                .get(url)
                .send()
                .map_err(|e| PipelineError::DownloadFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
        if !response.status().is_success() {
            return Err(PipelineError::DownloadFailed {
                url: url.to_string(),
                reason: format!("status {}", response.status()),
            });
        }
        let mut file = fs::File::create(part)
            .map_err(|e| PipelineError::io(format!("Failed to create '{}'", part.display()), e))?;
        response
            .copy_to(&mut file)
            .map_err(|e| PipelineError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    /// Remove everything cached under one dated directory. Calling this when
    /// nothing was downloaded is a no-op, not an error.
    pub fn purge(&self, date: NaiveDate) -> Result<(), PipelineError> {
        let dir = self.dated_dir(date);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::io(
                format!("Failed to purge '{}'", dir.display()),
                e,
            )),
        }
    }
}
