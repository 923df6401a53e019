//! Spawns a fresh instance of the executable for self-restart.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::info;

use super::PROCESS_TARGET;

/// Errors raised while relaunching the executable.
#[derive(Debug, Error)]
#[error("failed to relaunch '{executable}': {source}")]
pub struct RelaunchError {
    executable: PathBuf,
    #[source]
    source: io::Error,
}

/// Starts a new process instance.
pub trait Relauncher: Send + Sync {
    /// Spawns `executable` with `arguments` without waiting for it.
    fn relaunch(&self, executable: &Path, arguments: &[OsString]) -> Result<(), RelaunchError>;
}

/// Relauncher backed by [`std::process::Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SpawnRelauncher;

impl Relauncher for SpawnRelauncher {
    fn relaunch(&self, executable: &Path, arguments: &[OsString]) -> Result<(), RelaunchError> {
        let child = Command::new(executable)
            .args(arguments)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| RelaunchError {
                executable: executable.to_path_buf(),
                source,
            })?;
        info!(
            target: PROCESS_TARGET,
            pid = child.id(),
            executable = %executable.display(),
            "started new instance"
        );
        Ok(())
    }
}
