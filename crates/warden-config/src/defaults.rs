use crate::logging::LogFormat;

/// Default log filter expression used by the supervisor.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// File name of the staged update archive inside the temp-update directory.
pub const UPDATE_ARCHIVE_NAME: &str = "warden-update.zip";

/// File name of the external updater shipped next to the executable.
pub const UPDATER_BINARY_NAME: &str = "warden-updater";

/// Service name handed to the updater when running under a service manager.
pub const DEFAULT_SERVICE_NAME: &str = "wardend";

/// Optional runtime dependency probed after the host reaches `Running`.
pub const DEFAULT_DEPENDENCY_NAME: &str = "media-runtime";

/// Lowest compatible version of the optional runtime dependency.
pub const DEFAULT_DEPENDENCY_MIN_VERSION: &str = "12.0.0";

/// Program used to request elevated privileges for the dependency installer.
pub const DEFAULT_ELEVATE_COMMAND: &str = "pkexec";

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the supervisor.
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default service name.
pub fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_owned()
}

/// Default dependency name.
pub fn default_dependency_name() -> String {
    DEFAULT_DEPENDENCY_NAME.to_owned()
}

/// Default minimum dependency version.
pub fn default_dependency_min_version() -> String {
    DEFAULT_DEPENDENCY_MIN_VERSION.to_owned()
}

/// Default elevation helper.
pub fn default_elevate_command() -> String {
    DEFAULT_ELEVATE_COMMAND.to_owned()
}
