//! Lifecycle status snapshots written next to the program data.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, SystemTimeError, UNIX_EPOCH};

use serde::Serialize;
use tempfile::Builder;
use thiserror::Error;
use tracing::{debug, warn};

use super::PROCESS_TARGET;
use crate::state::LifecycleState;

/// Errors raised while persisting a status snapshot.
#[derive(Debug, Error)]
pub enum StatusError {
    /// Writing the snapshot failed.
    #[error("failed to write status snapshot '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Serialising the snapshot failed.
    #[error("failed to serialise status snapshot: {0}")]
    Serialise(#[from] serde_json::Error),
    /// Obtaining the current timestamp failed.
    #[error("failed to read system time: {0}")]
    Clock(#[from] SystemTimeError),
}

#[derive(Debug, Serialize)]
struct StatusSnapshot<'a> {
    state: &'a str,
    pid: u32,
    timestamp: u64,
}

impl<'a> StatusSnapshot<'a> {
    fn new(state: LifecycleState, pid: u32) -> Result<Self, StatusError> {
        let timestamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
        Ok(Self {
            state: state.as_str(),
            pid,
            timestamp,
        })
    }
}

/// Status file mirroring the supervisor's lifecycle state.
#[derive(Debug, Clone)]
pub(crate) struct StatusFile {
    path: PathBuf,
    pid: u32,
}

impl StatusFile {
    pub(crate) fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            pid: std::process::id(),
        }
    }

    pub(crate) fn write(&self, state: LifecycleState) -> Result<(), StatusError> {
        let snapshot = StatusSnapshot::new(state, self.pid)?;
        let mut payload = serde_json::to_vec(&snapshot)?;
        payload.push(b'\n');
        self.replace_contents(&payload)
            .map_err(|source| StatusError::Write {
                path: self.path.clone(),
                source,
            })?;
        debug!(
            target: PROCESS_TARGET,
            state = snapshot.state,
            file = %self.path.display(),
            "status snapshot updated"
        );
        Ok(())
    }

    /// Stages `payload` beside the status file and renames it into place, so
    /// readers see either the previous snapshot or the new one.
    fn replace_contents(&self, payload: &[u8]) -> io::Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;
        let mut builder = Builder::new();
        builder.prefix(".status-").suffix(".tmp");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            builder.permissions(fs::Permissions::from_mode(0o600));
        }
        let mut staged = builder.tempfile_in(dir)?;
        staged.write_all(payload)?;
        staged.as_file().sync_all()?;
        staged.persist(&self.path).map_err(|error| error.error)?;
        Ok(())
    }

    /// Records `state`, logging instead of failing.
    pub(crate) fn record(&self, state: LifecycleState) {
        if let Err(error) = self.write(state) {
            warn!(
                target: PROCESS_TARGET,
                state = %state,
                error = %error,
                "failed to record lifecycle status"
            );
        }
    }

    pub(crate) fn remove(&self) {
        let removed = match fs::remove_file(&self.path) {
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        };
        if let Err(error) = removed {
            warn!(
                target: PROCESS_TARGET,
                file = %self.path.display(),
                error = %error,
                "failed to remove status file"
            );
        }
    }
}
