//! Resolves the directory layout shared by the supervisor and its helpers.
//!
//! The layout is computed once at process entry from the startup options, the
//! loaded configuration, and the location of the running executable. The
//! external updater and the crash log writer both rely on the same layout, so
//! every path is derived here rather than at the call sites.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::defaults::{UPDATE_ARCHIVE_NAME, UPDATER_BINARY_NAME};
use crate::{Config, StartupOptions};

const APPLICATION_DIR: &str = "warden";

/// Canonical directory layout for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationPaths {
    executable_path: PathBuf,
    resource_dir: PathBuf,
    program_data_dir: PathBuf,
    temp_update_dir: PathBuf,
    log_dir: PathBuf,
    dependency_dir: PathBuf,
    status_path: PathBuf,
    updater_path: PathBuf,
}

impl ApplicationPaths {
    /// Resolves the layout for the running executable.
    pub fn for_current_executable(
        options: &StartupOptions,
        config: &Config,
    ) -> Result<Self, PathsError> {
        let executable =
            env::current_exe().map_err(|source| PathsError::CurrentExecutable { source })?;
        Self::resolve(options, config, &executable)
    }

    /// Resolves the layout for an explicit executable path and creates the
    /// writable directories.
    pub fn resolve(
        options: &StartupOptions,
        config: &Config,
        executable: &Path,
    ) -> Result<Self, PathsError> {
        let resource_dir = parent_of(executable)?;
        let program_data_dir = match config.program_data_dir.as_ref() {
            Some(dir) => dir.as_std_path().to_path_buf(),
            None if options.run_as_service() => parent_of(&resource_dir)?,
            None => default_program_data_dir(&resource_dir),
        };
        let updater_path = config.updater_path.as_ref().map_or_else(
            || resource_dir.join(UPDATER_BINARY_NAME),
            |path| path.as_std_path().to_path_buf(),
        );
        let paths = Self {
            executable_path: executable.to_path_buf(),
            temp_update_dir: program_data_dir.join("updates"),
            log_dir: program_data_dir.join("logs"),
            dependency_dir: program_data_dir.join("dependencies"),
            status_path: program_data_dir.join("wardend.status"),
            updater_path,
            resource_dir,
            program_data_dir,
        };
        for dir in [
            paths.program_data_dir(),
            paths.log_dir(),
            paths.temp_update_dir(),
        ] {
            fs::create_dir_all(dir).map_err(|source| PathsError::CreateDirectory {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        Ok(paths)
    }

    /// Path of the running executable; self-restart relaunches this.
    pub fn executable_path(&self) -> &Path {
        self.executable_path.as_path()
    }

    /// Directory holding the executable and bundled resources.
    pub fn resource_dir(&self) -> &Path {
        self.resource_dir.as_path()
    }

    /// Root of all writable application data.
    pub fn program_data_dir(&self) -> &Path {
        self.program_data_dir.as_path()
    }

    /// Directory where update archives are staged.
    pub fn temp_update_dir(&self) -> &Path {
        self.temp_update_dir.as_path()
    }

    /// Well-known location of the staged update archive.
    pub fn update_archive_path(&self) -> PathBuf {
        self.temp_update_dir.join(UPDATE_ARCHIVE_NAME)
    }

    /// Directory receiving crash logs.
    pub fn log_dir(&self) -> &Path {
        self.log_dir.as_path()
    }

    /// Key/value directory recording installed dependency versions.
    pub fn dependency_dir(&self) -> &Path {
        self.dependency_dir.as_path()
    }

    /// Lifecycle status snapshot written by the supervisor.
    pub fn status_path(&self) -> &Path {
        self.status_path.as_path()
    }

    /// External updater executable.
    pub fn updater_path(&self) -> &Path {
        self.updater_path.as_path()
    }
}

fn parent_of(path: &Path) -> Result<PathBuf, PathsError> {
    path.parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .ok_or_else(|| PathsError::MissingParent {
            path: path.to_path_buf(),
        })
}

fn default_program_data_dir(resource_dir: &Path) -> PathBuf {
    dirs::data_dir().map_or_else(
        || resource_dir.join("programdata"),
        |mut dir| {
            dir.push(APPLICATION_DIR);
            dir
        },
    )
}

/// Errors raised while resolving the application layout.
#[derive(Debug, Error)]
pub enum PathsError {
    /// The running executable could not be located.
    #[error("failed to locate the running executable: {source}")]
    CurrentExecutable {
        #[source]
        source: io::Error,
    },
    /// A path that must have a parent directory did not.
    #[error("path '{path}' has no parent directory")]
    MissingParent { path: PathBuf },
    /// Creating a writable directory failed.
    #[error("failed to prepare directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
