//! Detection and hand-off of staged self-updates.
//!
//! A staged update is an archive with a well-known name inside the
//! temp-update directory. Its presence alone triggers the update path: the
//! external updater is started and the current process exits so the updater
//! can replace the binaries and start the new version. A failed hand-off never
//! blocks startup.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::{debug, info};
use warden_config::ApplicationPaths;

const UPDATE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::update");

/// A staged update archive awaiting installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateArtifact {
    archive_path: PathBuf,
    target_service_name: Option<String>,
}

impl UpdateArtifact {
    /// Describes an archive and, in service mode, the service to restart.
    pub fn new(archive_path: impl Into<PathBuf>, target_service_name: Option<String>) -> Self {
        Self {
            archive_path: archive_path.into(),
            target_service_name,
        }
    }

    /// Location of the staged archive.
    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// Service the updater restarts once the archive is installed.
    pub fn target_service_name(&self) -> Option<&str> {
        self.target_service_name.as_deref()
    }
}

/// Result of checking for a staged update.
#[derive(Debug)]
pub enum UpdateOutcome {
    /// No archive was staged.
    NoUpdate,
    /// The updater was started; the process must exit without starting the
    /// host.
    UpdateStarted(UpdateArtifact),
    /// The updater could not be started; startup continues.
    UpdateFailed(UpdateError),
}

/// Errors raised while handing an update to the updater.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The configured updater executable does not exist.
    #[error("updater '{path}' does not exist")]
    MissingUpdater { path: PathBuf },
    /// Spawning the updater failed.
    #[error("failed to launch updater '{path}': {source}")]
    Launch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// External program that installs a staged update.
pub trait Updater: Send + Sync {
    /// Starts installing `artifact`. Returns once the updater is running.
    fn launch(
        &self,
        paths: &ApplicationPaths,
        artifact: &UpdateArtifact,
    ) -> Result<(), UpdateError>;
}

/// Updater that spawns the updater executable from the application layout.
///
/// The updater is told which process to wait for (`--parent-pid`) and is not
/// awaited here.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExternalUpdater;

impl ExternalUpdater {
    fn arguments(paths: &ApplicationPaths, artifact: &UpdateArtifact) -> Vec<OsString> {
        let mut arguments: Vec<OsString> = vec![
            "--archive".into(),
            artifact.archive_path().into(),
            "--program-data".into(),
            paths.program_data_dir().into(),
            "--executable".into(),
            paths.executable_path().into(),
            "--parent-pid".into(),
            std::process::id().to_string().into(),
        ];
        if let Some(service) = artifact.target_service_name() {
            arguments.push("--service".into());
            arguments.push(service.into());
        }
        arguments
    }
}

impl Updater for ExternalUpdater {
    fn launch(
        &self,
        paths: &ApplicationPaths,
        artifact: &UpdateArtifact,
    ) -> Result<(), UpdateError> {
        let updater = paths.updater_path();
        if !updater.is_file() {
            return Err(UpdateError::MissingUpdater {
                path: updater.to_path_buf(),
            });
        }
        let child = Command::new(updater)
            .args(Self::arguments(paths, artifact))
            .current_dir(paths.resource_dir())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| UpdateError::Launch {
                path: updater.to_path_buf(),
                source,
            })?;
        info!(
            target: UPDATE_TARGET,
            pid = child.id(),
            updater = %updater.display(),
            "updater started"
        );
        Ok(())
    }
}

/// Checks for a staged archive and hands it to the updater.
pub struct UpdateApplier {
    updater: Box<dyn Updater>,
    service_name: String,
}

impl UpdateApplier {
    /// Builds an applier; `service_name` is passed on in service mode.
    pub fn new(updater: Box<dyn Updater>, service_name: impl Into<String>) -> Self {
        Self {
            updater,
            service_name: service_name.into(),
        }
    }

    /// Applies a staged update if one exists.
    pub fn check_and_apply(
        &self,
        paths: &ApplicationPaths,
        running_as_service: bool,
    ) -> UpdateOutcome {
        let archive = paths.update_archive_path();
        if !archive.exists() {
            debug!(
                target: UPDATE_TARGET,
                archive = %archive.display(),
                "no staged update"
            );
            return UpdateOutcome::NoUpdate;
        }
        let artifact = UpdateArtifact::new(
            archive,
            running_as_service.then(|| self.service_name.clone()),
        );
        info!(
            target: UPDATE_TARGET,
            archive = %artifact.archive_path().display(),
            "staged update found"
        );
        match self.updater.launch(paths, &artifact) {
            Ok(()) => UpdateOutcome::UpdateStarted(artifact),
            Err(error) => UpdateOutcome::UpdateFailed(error),
        }
    }
}
