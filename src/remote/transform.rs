//! Remote coordinate-transform capability.
//!
//! The legacy coordinate library rewrites a persisted table in place,
//! converting the CDMAG columns into the target geomagnetic frame. The core
//! only depends on the file-based contract: hand over a path, block until
//! the command ran to completion, read the rewritten file afterwards. The
//! capability is injected so the engine stays testable with a deterministic
//! fake.
//!
//! Neither channel enforces a timeout: a hang in the legacy process hangs
//! the date's derivation, which is the accepted contract.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::info;

use crate::error::PipelineError;

pub trait RemoteTransform {
    /// Rewrite the table at `path` in place; must not return before the
    /// legacy command completed.
    fn transform(&self, path: &Path) -> Result<(), PipelineError>;
}

/// Secure-shell channel: ship the file to the host, run the legacy command
/// against it there, bring the rewritten file home.
pub struct SshTransform {
    host: String,
    command: String,
    remote_dir: String,
}

impl SshTransform {
    pub fn new(host: impl Into<String>, command: impl Into<String>, remote_dir: impl Into<String>) -> SshTransform {
        SshTransform {
            host: host.into(),
            command: command.into(),
            remote_dir: remote_dir.into(),
        }
    }

    fn remote_path(&self, path: &Path) -> Result<String, PipelineError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PipelineError::RemoteTransformFailure {
                path: path.to_path_buf(),
                reason: "path has no usable file name".to_string(),
            })?;
        Ok(format!("{}/{}", self.remote_dir.trim_end_matches('/'), name))
    }

    fn run(&self, path: &Path, program: &str, args: &[String]) -> Result<(), PipelineError> {
        let output = Command::new(program).args(args).output().map_err(|e| {
            PipelineError::RemoteTransformFailure {
                path: path.to_path_buf(),
                reason: format!("failed to spawn {program}: {e}"),
            }
        })?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            info!(%program, output = %stdout.trim(), "remote transform output");
        }
        if !output.status.success() {
            return Err(PipelineError::RemoteTransformFailure {
                path: path.to_path_buf(),
                reason: format!(
                    "{program} exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(())
    }
}

impl RemoteTransform for SshTransform {
    fn transform(&self, path: &Path) -> Result<(), PipelineError> {
        let local = path.to_string_lossy().to_string();
        let remote = self.remote_path(path)?;
        let remote_spec = format!("{}:{}", self.host, remote);

        self.run(path, "scp", &[local.clone(), remote_spec.clone()])?;
        self.run(
            path,
            "ssh",
            &[self.host.clone(), format!("{} {}", self.command, remote)],
        )?;
        self.run(path, "scp", &[remote_spec, local])?;
        Ok(())
    }
}

/// Local channel: the legacy toolchain is installed beside the pipeline and
/// invoked directly against the path.
pub struct CommandTransform {
    program: String,
}

impl CommandTransform {
    pub fn new(program: impl Into<String>) -> CommandTransform {
        CommandTransform {
            program: program.into(),
        }
    }
}

impl RemoteTransform for CommandTransform {
    fn transform(&self, path: &Path) -> Result<(), PipelineError> {
        let output = Command::new(&self.program).arg(path).output().map_err(|e| {
            PipelineError::RemoteTransformFailure {
                path: path.to_path_buf(),
                reason: format!("failed to spawn {}: {e}", self.program),
            }
        })?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            info!(program = %self.program, output = %stdout.trim(), "transform output");
        }
        if !output.status.success() {
            return Err(PipelineError::RemoteTransformFailure {
                path: path.to_path_buf(),
                reason: format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(())
    }
}

/// Resolve the configured channel from `.env`/environment: SSH when a host
/// is set, local command otherwise.
pub fn from_env() -> Box<dyn RemoteTransform> {
    dotenvy::dotenv().ok();
    let command = std::env::var("WAVEPOWER_TRANSFORM_CMD")
        .unwrap_or_else(|_| "magcoord-convert".to_string());
    match std::env::var("WAVEPOWER_TRANSFORM_HOST") {
        Ok(host) if !host.trim().is_empty() => {
            let remote_dir = std::env::var("WAVEPOWER_TRANSFORM_DIR")
                .unwrap_or_else(|_| "/tmp".to_string());
            Box::new(SshTransform::new(host, command, remote_dir))
        }
        _ => Box::new(CommandTransform::new(command)),
    }
}
