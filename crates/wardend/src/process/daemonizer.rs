//! Detaches the service process from its controlling terminal.

use daemonize_me::Daemon;
use std::ffi::OsStr;
use thiserror::Error;
use tracing::info;

use super::PROCESS_TARGET;
use warden_config::{ApplicationPaths, Config, StartupOptions};

/// Abstraction over daemonisation strategies.
pub trait Daemonizer: Send + Sync {
    /// Detaches the process into the background.
    fn daemonize(&self, paths: &ApplicationPaths) -> Result<(), DaemonizeError>;
}

/// Errors surfaced by the daemonisation backend.
#[derive(Debug, Error)]
pub enum DaemonizeError {
    /// System-level daemonisation failed.
    #[error(transparent)]
    System(#[from] daemonize_me::DaemonError),
}

/// Daemoniser that delegates to `daemonize-me`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDaemonizer;

impl Daemonizer for SystemDaemonizer {
    fn daemonize(&self, paths: &ApplicationPaths) -> Result<(), DaemonizeError> {
        info!(
            target: PROCESS_TARGET,
            work_dir = %paths.program_data_dir().display(),
            "detaching service into background"
        );
        Daemon::new()
            .work_dir(paths.program_data_dir())
            .name(OsStr::new(env!("CARGO_PKG_NAME")))
            .start()?;
        info!(
            target: PROCESS_TARGET,
            pid = std::process::id(),
            "service detached; continuing in child"
        );
        Ok(())
    }
}

/// Detaches a service run whose configuration asks for it.
///
/// The fork keeps only the calling thread, so this must run at process entry
/// before the supervisor, its host or any client thread exists. Returns
/// whether the process detached.
pub fn detach_if_requested(
    options: &StartupOptions,
    config: &Config,
    paths: &ApplicationPaths,
    daemonizer: &dyn Daemonizer,
) -> Result<bool, DaemonizeError> {
    if !(options.run_as_service() && config.detach) {
        return Ok(false);
    }
    daemonizer.daemonize(paths)?;
    Ok(true)
}
