//! Shared configuration for the Warden lifecycle supervisor.
//!
//! The crate owns three pieces of process-entry state:
//!
//! - [`StartupOptions`]: raw startup switches (service vs. interactive),
//!   parsed before anything else.
//! - [`Config`]: layered configuration loaded through `ortho_config`
//!   (defaults, configuration file, `WARDEN_*` environment, CLI flags).
//! - [`ApplicationPaths`]: the directory layout derived from both, computed
//!   once and immutable for the lifetime of the process.

use std::ffi::OsString;
use std::sync::Arc;

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};

mod defaults;
mod logging;
mod options;
mod paths;

pub use defaults::{
    DEFAULT_DEPENDENCY_MIN_VERSION, DEFAULT_DEPENDENCY_NAME, DEFAULT_ELEVATE_COMMAND,
    DEFAULT_LOG_FILTER, DEFAULT_SERVICE_NAME, UPDATE_ARCHIVE_NAME, UPDATER_BINARY_NAME,
    default_log_filter_string, default_log_format,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use options::{SERVICE_SWITCH, StartupOptions};
pub use paths::{ApplicationPaths, PathsError};

/// Layered supervisor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "WARDEN")]
pub struct Config {
    /// `tracing_subscriber::EnvFilter` expression.
    #[ortho_config(default = defaults::default_log_filter_string())]
    pub log_filter: String,
    /// Output format for structured logs.
    #[ortho_config(default = defaults::default_log_format())]
    pub log_format: LogFormat,
    /// Overrides the resolved program-data root.
    pub program_data_dir: Option<Utf8PathBuf>,
    /// Overrides the location of the external updater.
    pub updater_path: Option<Utf8PathBuf>,
    /// Service name handed to the updater in service mode.
    #[ortho_config(default = defaults::default_service_name())]
    pub service_name: String,
    /// Fork into the background before registering with the service manager.
    #[ortho_config(default = false)]
    pub detach: bool,
    /// Optional runtime dependency checked after startup.
    #[ortho_config(default = defaults::default_dependency_name())]
    pub dependency_name: String,
    /// Lowest compatible dependency version (semver).
    #[ortho_config(default = defaults::default_dependency_min_version())]
    pub dependency_min_version: String,
    /// Where the dependency installer is downloaded from.
    pub dependency_url: Option<String>,
    /// Program used to elevate the dependency installer.
    #[ortho_config(default = defaults::default_elevate_command())]
    pub elevate_command: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: defaults::default_log_filter_string(),
            log_format: defaults::default_log_format(),
            program_data_dir: None,
            updater_path: None,
            service_name: defaults::default_service_name(),
            detach: false,
            dependency_name: defaults::default_dependency_name(),
            dependency_min_version: defaults::default_dependency_min_version(),
            dependency_url: None,
            elevate_command: defaults::default_elevate_command(),
        }
    }
}

impl Config {
    /// Loads configuration from the process arguments and environment.
    pub fn load() -> Result<Self, Arc<OrthoError>> {
        <Self as OrthoConfig>::load()
    }

    /// Loads configuration from an explicit argument list.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, Arc<OrthoError>>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as OrthoConfig>::load_from_iter(args)
    }

    /// Loads configuration from the arguments left after startup switches are
    /// stripped.
    pub fn load_for(options: &StartupOptions) -> Result<Self, Arc<OrthoError>> {
        Self::load_from_iter(options.config_arguments())
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
