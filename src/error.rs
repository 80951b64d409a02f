//! Pipeline error taxonomy.
//!
//! Failure policy (one date's failure never touches another date's outputs):
//!
//! - `CatalogUnavailable` / `DownloadFailed`: skip that (date, spacecraft)
//! - `SchemaMismatch` / `MissingKey`: fatal for the current ingest/derivation
//! - `RemoteTransformFailure`: fatal for the current date, retryable because
//!   the pre-transform bundle checkpoint survives

use std::path::PathBuf;

#[derive(Debug)]
pub enum PipelineError {
    /// Remote directory listing did not return success.
    CatalogUnavailable { url: String, reason: String },
    /// A file transfer failed (non-2xx or transport error).
    DownloadFailed { url: String, reason: String },
    /// A requested spectral channel or structural invariant is absent/violated.
    SchemaMismatch { path: PathBuf, detail: String },
    /// A required ephemeris field is absent where the caller cannot proceed.
    MissingKey { key: String },
    /// The remote coordinate-conversion channel failed or returned non-zero.
    RemoteTransformFailure { path: PathBuf, reason: String },
    /// A source file is structurally malformed.
    Format { path: PathBuf, detail: String },
    /// Local filesystem failure.
    Io { context: String, source: std::io::Error },
}

impl PipelineError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        PipelineError::Io {
            context: context.into(),
            source,
        }
    }

    /// Process exit code for the binary front-end.
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::CatalogUnavailable { .. }
            | PipelineError::DownloadFailed { .. }
            | PipelineError::RemoteTransformFailure { .. } => 4,
            PipelineError::SchemaMismatch { .. }
            | PipelineError::MissingKey { .. }
            | PipelineError::Format { .. } => 3,
            PipelineError::Io { .. } => 2,
        }
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::CatalogUnavailable { url, reason } => {
                write!(f, "Remote listing unavailable at {url}: {reason}")
            }
            PipelineError::DownloadFailed { url, reason } => {
                write!(f, "Download failed for {url}: {reason}")
            }
            PipelineError::SchemaMismatch { path, detail } => {
                write!(f, "Schema mismatch in '{}': {detail}", path.display())
            }
            PipelineError::MissingKey { key } => {
                write!(f, "Required field `{key}` is missing from the source set")
            }
            PipelineError::RemoteTransformFailure { path, reason } => {
                write!(
                    f,
                    "Remote coordinate transform failed for '{}': {reason}",
                    path.display()
                )
            }
            PipelineError::Format { path, detail } => {
                write!(f, "Malformed file '{}': {detail}", path.display())
            }
            PipelineError::Io { context, source } => write!(f, "{context}: {source}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}
