//! Best-effort installation of an optional runtime dependency.
//!
//! Once the host is running, a background thread checks whether a compatible
//! version of the dependency is recorded in the version store. When it is not,
//! the installer is downloaded, staged under an executable name, and run
//! through the configured elevation command. Every failure is reported and
//! swallowed: the check never affects readiness or the exit status.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;

use semver::Version;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::reporter::LifecycleReporter;

const DEPENDENCY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dependency");

/// Errors raised while probing for or installing the dependency.
#[derive(Debug, Error)]
pub enum DependencyError {
    /// The version record could not be read.
    #[error("failed to read version record '{path}': {source}")]
    Probe {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A version string was not valid.
    #[error("invalid version '{text}': {source}")]
    Version {
        text: String,
        #[source]
        source: semver::Error,
    },
    /// The HTTP client could not be constructed.
    #[error("failed to build download client: {0}")]
    Client(#[source] reqwest::Error),
    /// Downloading the installer failed.
    #[error("failed to download installer from '{url}': {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// Staging the installer on disk failed.
    #[error("failed to stage installer at '{path}': {source}")]
    Stage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The installer could not be started.
    #[error("failed to run installer '{path}': {source}")]
    Launch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The installer ran but reported failure.
    #[error("installer '{path}' exited with {status}")]
    InstallerFailed { path: PathBuf, status: ExitStatus },
}

/// Parses a version string, tolerating a leading `v` and missing minor or
/// patch components.
pub fn parse_version(text: &str) -> Result<Version, DependencyError> {
    let trimmed = text.trim();
    let bare = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    let padded = match bare.matches('.').count() {
        0 => format!("{bare}.0.0"),
        1 => format!("{bare}.0"),
        _ => bare.to_owned(),
    };
    Version::parse(&padded).map_err(|source| DependencyError::Version {
        text: text.to_owned(),
        source,
    })
}

/// Same major version as `minimum` and not older than it.
#[must_use]
pub fn is_compatible(installed: &Version, minimum: &Version) -> bool {
    installed.major == minimum.major && installed >= minimum
}

/// Registry-like store holding installed dependency versions.
pub trait VersionStore: Send + Sync {
    /// Version of `name` recorded as installed.
    fn installed_version(&self, name: &str) -> Result<Version, DependencyError>;
}

/// Version store backed by `<dir>/<name>.version` files.
#[derive(Debug, Clone)]
pub struct FileVersionStore {
    dir: PathBuf,
}

impl FileVersionStore {
    /// Builds a store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.version"))
    }
}

impl VersionStore for FileVersionStore {
    fn installed_version(&self, name: &str) -> Result<Version, DependencyError> {
        let path = self.record_path(name);
        let text =
            fs::read_to_string(&path).map_err(|source| DependencyError::Probe { path, source })?;
        parse_version(&text)
    }
}

/// Source of the dependency installer binary.
pub trait InstallerSource: Send + Sync {
    /// Downloads the installer into a temporary file.
    fn fetch(&self) -> Result<NamedTempFile, DependencyError>;
}

/// Installer source that downloads over HTTP(S).
#[derive(Debug)]
pub struct HttpInstallerSource {
    url: String,
    client: reqwest::blocking::Client,
}

impl HttpInstallerSource {
    /// Builds a source for `url`.
    pub fn new(url: impl Into<String>) -> Result<Self, DependencyError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(DependencyError::Client)?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

impl InstallerSource for HttpInstallerSource {
    fn fetch(&self) -> Result<NamedTempFile, DependencyError> {
        let download = |source: reqwest::Error| DependencyError::Download {
            url: self.url.clone(),
            source,
        };
        let mut response = self
            .client
            .get(&self.url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(download)?;
        let mut file = NamedTempFile::new().map_err(|source| DependencyError::Stage {
            path: std::env::temp_dir(),
            source,
        })?;
        let bytes = response.copy_to(&mut file).map_err(download)?;
        debug!(
            target: DEPENDENCY_TARGET,
            url = %self.url,
            bytes,
            "installer downloaded"
        );
        Ok(file)
    }
}

/// Runs a staged installer and waits for it to exit.
pub trait InstallerLauncher: Send + Sync {
    /// Runs `installer` with elevated privileges.
    fn launch(&self, installer: &Path) -> Result<(), DependencyError>;
}

/// Launcher that elevates through an external command unless already root.
#[derive(Debug, Clone)]
pub struct ElevatedLauncher {
    elevate_command: String,
}

impl ElevatedLauncher {
    /// Builds a launcher that elevates with `elevate_command` (e.g. `pkexec`).
    pub fn new(elevate_command: impl Into<String>) -> Self {
        Self {
            elevate_command: elevate_command.into(),
        }
    }

    fn command(&self, installer: &Path) -> Command {
        if is_privileged() {
            Command::new(installer)
        } else {
            let mut command = Command::new(&self.elevate_command);
            command.arg(installer);
            command
        }
    }
}

#[cfg(unix)]
fn is_privileged() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(not(unix))]
fn is_privileged() -> bool {
    false
}

impl InstallerLauncher for ElevatedLauncher {
    fn launch(&self, installer: &Path) -> Result<(), DependencyError> {
        let status = self
            .command(installer)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|source| DependencyError::Launch {
                path: installer.to_path_buf(),
                source,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(DependencyError::InstallerFailed {
                path: installer.to_path_buf(),
                status,
            })
        }
    }
}

/// What [`DependencyInstaller::ensure_installed`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// A compatible version was already installed.
    AlreadyInstalled(Version),
    /// No compatible version was found and no download source is configured.
    NoSource,
    /// The installer ran successfully.
    Installed,
}

/// Probes for the dependency and installs it when missing.
pub struct DependencyInstaller {
    name: String,
    staging_dir: PathBuf,
    store: Box<dyn VersionStore>,
    source: Option<Box<dyn InstallerSource>>,
    launcher: Box<dyn InstallerLauncher>,
}

impl DependencyInstaller {
    /// Builds an installer for `name`, staging downloads in `staging_dir`.
    pub fn new(
        name: impl Into<String>,
        staging_dir: impl Into<PathBuf>,
        store: Box<dyn VersionStore>,
        source: Option<Box<dyn InstallerSource>>,
        launcher: Box<dyn InstallerLauncher>,
    ) -> Self {
        Self {
            name: name.into(),
            staging_dir: staging_dir.into(),
            store,
            source,
            launcher,
        }
    }

    /// Name of the managed dependency.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ensures a version compatible with `minimum` is installed.
    ///
    /// Probe failures count as "not installed".
    pub fn ensure_installed(&self, minimum: &Version) -> Result<InstallOutcome, DependencyError> {
        match self.store.installed_version(&self.name) {
            Ok(installed) if is_compatible(&installed, minimum) => {
                debug!(
                    target: DEPENDENCY_TARGET,
                    dependency = %self.name,
                    installed = %installed,
                    "compatible dependency already installed"
                );
                return Ok(InstallOutcome::AlreadyInstalled(installed));
            }
            Ok(installed) => info!(
                target: DEPENDENCY_TARGET,
                dependency = %self.name,
                installed = %installed,
                minimum = %minimum,
                "installed dependency is incompatible"
            ),
            Err(error) => debug!(
                target: DEPENDENCY_TARGET,
                dependency = %self.name,
                error = %error,
                "dependency not installed"
            ),
        }
        let Some(source) = self.source.as_ref() else {
            info!(
                target: DEPENDENCY_TARGET,
                dependency = %self.name,
                "no installer source configured; skipping install"
            );
            return Ok(InstallOutcome::NoSource);
        };
        let download = source.fetch()?;
        let installer = self.stage(download.path())?;
        let result = self.launcher.launch(&installer);
        if let Err(error) = fs::remove_file(&installer) {
            debug!(
                target: DEPENDENCY_TARGET,
                path = %installer.display(),
                error = %error,
                "failed to remove staged installer"
            );
        }
        result.map(|()| InstallOutcome::Installed)
    }

    fn stage(&self, download: &Path) -> Result<PathBuf, DependencyError> {
        let stage_error = |path: &Path| {
            let path = path.to_path_buf();
            move |source| DependencyError::Stage { path, source }
        };
        fs::create_dir_all(&self.staging_dir).map_err(stage_error(self.staging_dir.as_path()))?;
        let installer = self
            .staging_dir
            .join(format!("{}-installer.{}", self.name, installer_extension()));
        fs::copy(download, &installer).map_err(stage_error(installer.as_path()))?;
        mark_executable(&installer).map_err(stage_error(installer.as_path()))?;
        Ok(installer)
    }
}

fn installer_extension() -> &'static str {
    match std::env::consts::EXE_EXTENSION {
        "" => "run",
        extension => extension,
    }
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Detached background run of [`DependencyInstaller::ensure_installed`].
pub struct DependencyTask {
    installer: DependencyInstaller,
    minimum: Version,
}

impl DependencyTask {
    /// Pairs an installer with the minimum version it must satisfy.
    pub fn new(installer: DependencyInstaller, minimum: Version) -> Self {
        Self { installer, minimum }
    }

    /// Runs the check synchronously, reporting instead of failing.
    pub fn run(&self, reporter: &dyn LifecycleReporter) {
        match self.installer.ensure_installed(&self.minimum) {
            Ok(InstallOutcome::Installed) => reporter.dependency_installed(self.installer.name()),
            Ok(_) => {}
            Err(error) => reporter.dependency_failed(&error),
        }
    }

    /// Starts the check on a detached thread.
    pub fn spawn(self, reporter: Arc<dyn LifecycleReporter>) {
        let spawned = thread::Builder::new()
            .name("dependency-check".to_owned())
            .spawn(move || self.run(reporter.as_ref()));
        if let Err(error) = spawned {
            warn!(
                target: DEPENDENCY_TARGET,
                error = %error,
                "failed to start dependency check"
            );
        }
    }
}
