//! Remote catalog discovery.
//!
//! The archive exposes plain HTTP directory listings, one dated directory
//! per spacecraft/level/day. Discovery GETs the listing page, pulls the
//! anchor texts out of the HTML and keeps the filenames matching the
//! dataset kind, in listing order. Ephemeris products live under a separate
//! yearly directory with a fully templated filename, so they are addressed
//! directly without a listing round-trip.

use std::path::Path;

use chrono::{Datelike, NaiveDate};
use reqwest::blocking::Client;

use crate::domain::{DatasetKind, FileRecord, PipelineConfig, Spacecraft};
use crate::error::PipelineError;

pub struct RemoteCatalog {
    client: Client,
    base_url: String,
    level: String,
    ephem_version: String,
}

impl RemoteCatalog {
    pub fn new(config: &PipelineConfig) -> RemoteCatalog {
        RemoteCatalog {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            level: config.level.clone(),
            ephem_version: config.ephem_version.clone(),
        }
    }

    /// Dated listing URL for one spacecraft/day.
    pub fn listing_url(&self, date: NaiveDate, spacecraft: Spacecraft) -> String {
        format!(
            "{}/RBSP-{}/{}/{}/{:02}/{:02}/",
            self.base_url,
            spacecraft.upper_tag(),
            self.level,
            date.year(),
            date.month(),
            date.day()
        )
    }

    /// Filenames under the dated listing whose text contains the kind's
    /// filename substring; listing order, duplicates dropped.
    pub fn list_candidates(
        &self,
        date: NaiveDate,
        spacecraft: Spacecraft,
        kind: DatasetKind,
    ) -> Result<Vec<String>, PipelineError> {
        let url = self.listing_url(date, spacecraft);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| PipelineError::CatalogUnavailable {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(PipelineError::CatalogUnavailable {
                url,
                reason: format!("status {}", response.status()),
            });
        }
        let body = response
            .text()
            .map_err(|e| PipelineError::CatalogUnavailable {
                url,
                reason: e.to_string(),
            })?;
        Ok(filter_candidates(&body, kind.filename_kind()))
    }

    /// Discover one day's files of `kind` and lay out their cache slots.
    pub fn discover(
        &self,
        date: NaiveDate,
        spacecraft: Spacecraft,
        kind: DatasetKind,
        cache_root: &Path,
    ) -> Result<Vec<FileRecord>, PipelineError> {
        let url = self.listing_url(date, spacecraft);
        let dated_dir = cache_root.join(date.format("%Y%m%d").to_string());
        Ok(self
            .list_candidates(date, spacecraft, kind)?
            .into_iter()
            .map(|fname| FileRecord {
                date,
                spacecraft,
                kind,
                remote_url: format!("{url}{fname}"),
                local_path: dated_dir.join(&fname),
                fetched: false,
            })
            .collect())
    }

    /// Ephemeris files have a templated name under the yearly directory; no
    /// listing round-trip is needed.
    pub fn ephemeris_record(
        &self,
        date: NaiveDate,
        spacecraft: Spacecraft,
        cache_root: &Path,
    ) -> FileRecord {
        let fname = format!(
            "rbsp{}_def_MagEphem_OP77Q_{}_v{}.h5",
            spacecraft.tag(),
            date.format("%Y%m%d"),
            self.ephem_version
        );
        let url = format!(
            "{}/RBSP-{}/LANL/MagEphem/{}/{}",
            self.base_url,
            spacecraft.upper_tag(),
            date.year(),
            fname
        );
        FileRecord {
            date,
            spacecraft,
            kind: DatasetKind::Ephemeris,
            remote_url: url,
            local_path: cache_root
                .join(date.format("%Y%m%d").to_string())
                .join(fname),
            fetched: false,
        }
    }
}

/// Anchor texts of a listing page that contain `kind_substring`, in page
/// order with duplicates dropped.
pub fn filter_candidates(html: &str, kind_substring: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for text in anchor_texts(html) {
        if text.contains(kind_substring) && !out.iter().any(|t| t == &text) {
            out.push(text);
        }
    }
    out
}

/// Extract `<a ...>text</a>` contents from a directory-listing page.
///
/// Listing pages are machine-generated and flat; a full HTML parser buys
/// nothing here. Tags inside the anchor body are not expected.
fn anchor_texts(html: &str) -> Vec<String> {
    let mut out = Vec::new();
    let lower = html.to_ascii_lowercase();
    let mut pos = 0usize;
    while let Some(open) = lower[pos..].find("<a") {
        let tag_start = pos + open;
        let Some(gt) = lower[tag_start..].find('>') else {
            break;
        };
        let body_start = tag_start + gt + 1;
        let Some(close) = lower[body_start..].find("</a>") else {
            break;
        };
        let text = html[body_start..body_start + close].trim();
        if !text.is_empty() {
            out.push(text.to_string());
        }
        pos = body_start + close + 4;
    }
    out
}
