//! Single-instance enforcement.
//!
//! Another process running the same executable is a duplicate. Rather than
//! killing it, the guard gives it a bounded window to exit: a duplicate is
//! commonly an older instance finishing its own shutdown (for example while an
//! update is being applied). If it is still alive when the window closes the
//! caller aborts startup.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tracing::{debug, info};

use crate::reporter::LifecycleReporter;

const INSTANCE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::instance");

/// How long a duplicate is given to exit on its own.
pub const DUPLICATE_EXIT_TIMEOUT: Duration = Duration::from_secs(30);

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Executable path and process id of a running process.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessIdentity {
    executable_path: PathBuf,
    process_id: u32,
}

impl ProcessIdentity {
    /// Builds an identity from its parts.
    pub fn new(executable_path: impl Into<PathBuf>, process_id: u32) -> Self {
        Self {
            executable_path: executable_path.into(),
            process_id,
        }
    }

    /// Identity of the calling process for the given executable path.
    pub fn current(executable_path: &Path) -> Self {
        Self::new(executable_path, std::process::id())
    }

    /// Executable the process was started from.
    pub fn executable_path(&self) -> &Path {
        &self.executable_path
    }

    /// Operating-system process id.
    #[must_use]
    pub const fn process_id(&self) -> u32 {
        self.process_id
    }
}

/// View over the operating system's process table.
pub trait ProcessTable: Send + Sync {
    /// Running processes whose executable path could be read. Processes that
    /// deny access or have already exited are omitted.
    fn snapshot(&self) -> Vec<ProcessIdentity>;

    /// Whether the process with `pid` is still alive.
    fn is_running(&self, pid: u32) -> bool;
}

/// Finds a process other than `this` running the same executable.
///
/// Paths are compared case-insensitively after resolving symlinks where the
/// path still exists.
pub fn detect_duplicate(
    table: &dyn ProcessTable,
    this: &ProcessIdentity,
) -> Option<ProcessIdentity> {
    let own_path = comparable_path(this.executable_path());
    table.snapshot().into_iter().find(|candidate| {
        candidate.process_id() != this.process_id()
            && comparable_path(candidate.executable_path()) == own_path
    })
}

fn comparable_path(path: &Path) -> String {
    fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .to_lowercase()
}

/// Result of resolving a potential duplicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceResolution {
    /// No other instance was running.
    Clear,
    /// A duplicate was found and exited within the timeout.
    DuplicateExited(ProcessIdentity),
    /// A duplicate outlived the timeout; startup must abort.
    StillRunning(ProcessIdentity),
}

impl InstanceResolution {
    /// Whether startup may proceed.
    #[must_use]
    pub const fn may_proceed(&self) -> bool {
        !matches!(self, Self::StillRunning(_))
    }
}

/// Detects a duplicate instance and waits a bounded time for it to exit.
pub struct SingleInstanceGuard {
    table: Box<dyn ProcessTable>,
    timeout: Duration,
    poll_interval: Duration,
}

impl SingleInstanceGuard {
    /// Builds a guard with the standard 30 second exit window.
    pub fn new(table: Box<dyn ProcessTable>) -> Self {
        Self::with_timing(table, DUPLICATE_EXIT_TIMEOUT, POLL_INTERVAL)
    }

    pub(crate) fn with_timing(
        table: Box<dyn ProcessTable>,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            table,
            timeout,
            poll_interval,
        }
    }

    /// Resolves any duplicate of `this`. Never terminates the other process.
    pub fn resolve(
        &self,
        this: &ProcessIdentity,
        reporter: &dyn LifecycleReporter,
    ) -> InstanceResolution {
        let Some(duplicate) = detect_duplicate(self.table.as_ref(), this) else {
            debug!(target: INSTANCE_TARGET, "no duplicate instance found");
            return InstanceResolution::Clear;
        };
        reporter.duplicate_detected(&duplicate);
        if self.wait_for_exit(duplicate.process_id()) {
            info!(
                target: INSTANCE_TARGET,
                pid = duplicate.process_id(),
                "duplicate instance exited"
            );
            InstanceResolution::DuplicateExited(duplicate)
        } else {
            info!(
                target: INSTANCE_TARGET,
                pid = duplicate.process_id(),
                timeout_ms = self.timeout.as_millis(),
                "duplicate instance did not exit"
            );
            InstanceResolution::StillRunning(duplicate)
        }
    }

    fn wait_for_exit(&self, pid: u32) -> bool {
        let deadline = Instant::now() + self.timeout;
        loop {
            if !self.table.is_running(pid) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep(self.poll_interval.min(deadline - now));
        }
    }
}

/// Process table backed by `sysinfo` enumeration.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessTable;

impl ProcessTable for SystemProcessTable {
    fn snapshot(&self) -> Vec<ProcessIdentity> {
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_exe(UpdateKind::Always),
        );
        system
            .processes()
            .iter()
            .filter(|(_, process)| process.thread_kind().is_none())
            .filter_map(|(pid, process)| {
                process
                    .exe()
                    .map(|exe| ProcessIdentity::new(exe, pid.as_u32()))
            })
            .collect()
    }

    #[cfg(unix)]
    fn is_running(&self, pid: u32) -> bool {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        match kill(Pid::from_raw(raw), None) {
            Ok(()) | Err(Errno::EPERM) => true,
            Err(Errno::ESRCH | Errno::ECHILD) => false,
            Err(errno) => {
                debug!(
                    target: INSTANCE_TARGET,
                    pid,
                    error = %errno,
                    "process probe failed; assuming still running"
                );
                true
            }
        }
    }

    #[cfg(not(unix))]
    fn is_running(&self, pid: u32) -> bool {
        let pid = sysinfo::Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system.process(pid).is_some()
    }
}
