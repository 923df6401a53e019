//! Contract between the supervisor and the application host.
//!
//! The host owns the product's real functionality (HTTP server, media
//! pipeline, storage). The supervisor only constructs it, waits for `init`,
//! launches `run_startup_tasks` in the background, and disposes it exactly
//! once.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;
use warden_config::ApplicationPaths;

const HOST_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::host");

/// Receives initialisation progress from the host.
pub trait ProgressSink: Send + Sync {
    /// Reports completion as a percentage in `0.0..=100.0`.
    fn report(&self, percent: f64);
}

/// Progress sink that records updates at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingProgress;

impl ProgressSink for LoggingProgress {
    fn report(&self, percent: f64) {
        debug!(target: HOST_TARGET, percent, "host initialisation progress");
    }
}

/// The externally-defined application host.
pub trait ApplicationHost: Send + Sync {
    /// Initialises the host. Startup blocks until this returns.
    fn init(&self, progress: &dyn ProgressSink) -> Result<(), HostError>;

    /// Runs post-initialisation work. Called on a background thread.
    fn run_startup_tasks(&self) -> Result<(), HostError>;

    /// Releases every host resource. Called at most once.
    fn dispose(&self);

    /// Paths the host was configured with.
    fn paths(&self) -> &ApplicationPaths;
}

/// Builds the application host once startup checks have passed.
pub trait HostFactory: Send + Sync {
    /// Constructs a host for the resolved layout.
    fn create(&self, paths: &ApplicationPaths) -> Result<Arc<dyn ApplicationHost>, HostError>;
}

/// Errors raised by the application host.
#[derive(Debug, Error)]
pub enum HostError {
    /// The host could not be constructed.
    #[error("failed to construct application host: {message}")]
    Construction { message: String },
    /// `init` failed.
    #[error("application host failed to initialise: {message}")]
    Init { message: String },
    /// Post-initialisation work failed.
    #[error("application host startup tasks failed: {message}")]
    StartupTasks { message: String },
}
