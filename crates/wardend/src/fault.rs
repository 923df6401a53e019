//! Process-wide last-resort fault handling.
//!
//! Panics (through the installed panic hook) and errors escaping
//! [`Supervisor::run`](crate::Supervisor::run) both end up in
//! [`FaultHandler::handle`]. The handler writes a crash log, lets the mode
//! surface the fault, disposes the host if it can do so without blocking, and
//! terminates the process unless a debugger is attached.

use std::backtrace::Backtrace;
use std::error::Error;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::panic::{self, PanicHookInfo};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::thread;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{error, warn};

use crate::supervisor::Supervisor;

const FAULT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::fault");

/// Suffixed names tried when a crash log name is already taken.
const CRASH_LOG_ATTEMPTS: u32 = 64;

/// Exit code used after a panic.
pub const PANIC_EXIT_CODE: i32 = 101;

/// Exit code used after an error escaped the supervisor (`EX_SOFTWARE`).
pub const SOFTWARE_EXIT_CODE: i32 = 70;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FaultKind {
    Panic,
    Error,
}

/// Everything recorded about a fatal fault.
#[derive(Debug, Clone)]
pub struct FaultReport {
    kind: FaultKind,
    message: String,
    causes: Vec<String>,
    location: Option<String>,
    thread: Option<String>,
    backtrace: String,
}

impl FaultReport {
    /// Captures a panic from inside the panic hook.
    pub fn from_panic(info: &PanicHookInfo<'_>) -> Self {
        let payload = info.payload();
        let message = payload
            .downcast_ref::<&str>()
            .map(|text| (*text).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        Self {
            kind: FaultKind::Panic,
            message,
            causes: Vec::new(),
            location: info.location().map(ToString::to_string),
            thread: thread::current().name().map(str::to_owned),
            backtrace: Backtrace::force_capture().to_string(),
        }
    }

    /// Captures an error that escaped the supervisor.
    pub fn from_error(error: &(dyn Error + 'static)) -> Self {
        let causes = std::iter::successors(error.source(), |&source| source.source())
            .map(ToString::to_string)
            .collect();
        Self {
            kind: FaultKind::Error,
            message: error.to_string(),
            causes,
            location: None,
            thread: thread::current().name().map(str::to_owned),
            backtrace: Backtrace::force_capture().to_string(),
        }
    }

    /// `panic` or `error`.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self.kind {
            FaultKind::Panic => "panic",
            FaultKind::Error => "error",
        }
    }

    /// Human-readable description of the fault.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Source location of a panic.
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// Exit code the process terminates with.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self.kind {
            FaultKind::Panic => PANIC_EXIT_CODE,
            FaultKind::Error => SOFTWARE_EXIT_CODE,
        }
    }

    fn render(&self, timestamp: &str) -> String {
        let mut text = format!(
            "{} {} fault\nprocess: {}\nthread: {}\nmessage: {}\n",
            timestamp,
            self.kind(),
            std::process::id(),
            self.thread.as_deref().unwrap_or("<unnamed>"),
            self.message,
        );
        if let Some(location) = &self.location {
            text.push_str(&format!("location: {location}\n"));
        }
        for cause in &self.causes {
            text.push_str(&format!("caused by: {cause}\n"));
        }
        text.push_str("backtrace:\n");
        text.push_str(&self.backtrace);
        text.push('\n');
        text
    }
}

/// Terminates the process.
pub trait ProcessExit: Send + Sync {
    /// Exits with `code`. Test doubles may return.
    fn exit(&self, code: i32);
}

/// Exits through [`std::process::exit`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExit;

impl ProcessExit for SystemExit {
    fn exit(&self, code: i32) {
        std::process::exit(code);
    }
}

/// Detects an attached debugger.
pub trait DebuggerProbe: Send + Sync {
    /// Whether a debugger is tracing this process.
    fn is_attached(&self) -> bool;
}

/// Reads `TracerPid` from `/proc/self/status`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcStatusDebuggerProbe;

impl DebuggerProbe for ProcStatusDebuggerProbe {
    fn is_attached(&self) -> bool {
        fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|status| tracer_pid(&status))
            .is_some_and(|pid| pid != 0)
    }
}

fn tracer_pid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("TracerPid:"))
        .and_then(|value| value.trim().parse().ok())
}

/// What the handler did with a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultDisposition {
    /// The process was asked to exit with this code.
    Terminated(i32),
    /// A debugger is attached; the process was left running.
    LeftAlive,
}

/// Fallback crash-log directory used when no host is alive.
#[must_use]
pub fn fallback_log_dir() -> PathBuf {
    std::env::temp_dir().join("warden").join("logs")
}

/// Process-wide fault handler.
pub struct FaultHandler {
    supervisor: Weak<Supervisor>,
    fallback_log_dir: PathBuf,
    debugger: Box<dyn DebuggerProbe>,
    exit: Box<dyn ProcessExit>,
}

impl FaultHandler {
    /// Builds a handler for `supervisor`.
    pub fn new(
        supervisor: &Arc<Supervisor>,
        fallback_log_dir: impl Into<PathBuf>,
        debugger: Box<dyn DebuggerProbe>,
        exit: Box<dyn ProcessExit>,
    ) -> Self {
        Self {
            supervisor: Arc::downgrade(supervisor),
            fallback_log_dir: fallback_log_dir.into(),
            debugger,
            exit,
        }
    }

    /// Handles a fatal fault.
    pub fn handle(&self, report: &FaultReport) -> FaultDisposition {
        let supervisor = self.supervisor.upgrade();
        let log_dir = supervisor
            .as_ref()
            .and_then(|supervisor| supervisor.host_paths())
            .map_or_else(|| self.fallback_log_dir.clone(), |paths| paths.log_dir().to_path_buf());
        let crash_log = match write_crash_log(&log_dir, report) {
            Ok(path) => Some(path),
            Err(error) => {
                error!(
                    target: FAULT_TARGET,
                    dir = %log_dir.display(),
                    error = %error,
                    "failed to write crash log"
                );
                None
            }
        };
        if let Some(supervisor) = supervisor {
            supervisor.notify_fault(report, crash_log.as_deref());
            if !supervisor.dispose_for_fault() {
                warn!(target: FAULT_TARGET, "lifecycle busy; host left undisposed");
            }
        }
        if self.debugger.is_attached() {
            warn!(
                target: FAULT_TARGET,
                "debugger attached; leaving process alive for inspection"
            );
            return FaultDisposition::LeftAlive;
        }
        let code = report.exit_code();
        self.exit.exit(code);
        FaultDisposition::Terminated(code)
    }

    /// Installs the handler as the process panic hook.
    pub fn install(self: Arc<Self>) {
        panic::set_hook(Box::new(move |info: &PanicHookInfo<'_>| {
            tracing_panic::panic_hook(info);
            let report = FaultReport::from_panic(info);
            self.handle(&report);
        }));
    }
}

fn write_crash_log(dir: &Path, report: &FaultReport) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let now = OffsetDateTime::now_utc();
    let stamp = format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}.{:03}Z",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second(),
        now.millisecond()
    );
    let stem = format!("crash-{stamp}-{}", std::process::id());
    let (path, mut file) = create_crash_file(dir, &stem)?;
    let timestamp = now.format(&Rfc3339).unwrap_or_else(|_| stamp.clone());
    file.write_all(report.render(&timestamp).as_bytes())?;
    file.sync_all()?;
    Ok(path)
}

/// Creates `<stem>.log`, or `<stem>-<n>.log` when earlier faults took the
/// name. Never truncates an existing log.
fn create_crash_file(dir: &Path, stem: &str) -> io::Result<(PathBuf, File)> {
    let mut attempt = 0;
    loop {
        let path = if attempt == 0 {
            dir.join(format!("{stem}.log"))
        } else {
            dir.join(format!("{stem}-{attempt}.log"))
        };
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(error)
                if error.kind() == io::ErrorKind::AlreadyExists
                    && attempt < CRASH_LOG_ATTEMPTS =>
            {
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
