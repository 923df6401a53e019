//! Execution mode strategies.
//!
//! The supervisor never branches on how it was started. Everything that
//! differs between an interactive run and a service run lives behind
//! [`ExecutionMode`]: how the run loop blocks, what a shutdown request does,
//! whether the process can relaunch itself, and how a fatal fault is surfaced.

use std::fmt;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;
use warden_config::StartupOptions;

use crate::fault::FaultReport;
use crate::process::{
    ServiceControl, SessionEvent, SessionEvents, SignalServiceControl, SignalSessionEvents,
};
use crate::supervisor::{ExitRequest, Supervisor};

const MODE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::mode");

/// Whether service mode may relaunch itself.
///
/// Service restarts are owned by the service manager; self-restart from
/// inside a service is not supported and restart requests shut down instead.
pub const SERVICE_RESTART_SUPPORTED: bool = false;

/// Errors raised by the mode-specific run loops.
#[derive(Debug, Error)]
pub enum ModeError {
    /// Signal handlers could not be installed.
    #[error("failed to install signal handlers: {source}")]
    SignalInstall {
        #[source]
        source: io::Error,
    },
}

/// Identifies the selected strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeKind {
    /// Foreground process attached to a user session.
    Interactive,
    /// Process run under a service manager.
    Service,
}

impl ModeKind {
    /// Stable lowercase name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Interactive => "interactive",
            Self::Service => "service",
        }
    }
}

impl fmt::Display for ModeKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Mode-specific startup and shutdown behaviour.
pub trait ExecutionMode: Send + Sync {
    /// Which strategy this is.
    fn kind(&self) -> ModeKind;

    /// Blocks until the supervisor's completion signal resolves.
    fn run_until_shutdown(&self, supervisor: &Arc<Supervisor>) -> Result<ExitRequest, ModeError>;

    /// Carries out a shutdown request.
    fn shutdown(&self, supervisor: &Supervisor);

    /// Whether a restart may relaunch the executable.
    fn can_self_restart(&self) -> bool;

    /// Surfaces a fatal fault to the user, if the mode has one.
    fn notify_fault(&self, report: &FaultReport, crash_log: Option<&Path>);
}

/// Interactive strategy: session hooks plus a blocking completion wait.
pub struct InteractiveMode {
    events: Box<dyn SessionEvents>,
}

impl InteractiveMode {
    /// Builds the strategy over a session event source.
    pub fn new(events: Box<dyn SessionEvents>) -> Self {
        Self { events }
    }
}

impl ExecutionMode for InteractiveMode {
    fn kind(&self) -> ModeKind {
        ModeKind::Interactive
    }

    fn run_until_shutdown(&self, supervisor: &Arc<Supervisor>) -> Result<ExitRequest, ModeError> {
        let weak = Arc::downgrade(supervisor);
        let subscription = self.events.subscribe(Box::new(move |event| {
            let Some(supervisor) = weak.upgrade() else {
                return;
            };
            match event {
                SessionEvent::Ending => supervisor.shutdown(),
                SessionEvent::Logon => supervisor.session_logon(),
            }
        }))?;
        let request = supervisor.wait_for_exit();
        drop(subscription);
        Ok(request)
    }

    fn shutdown(&self, supervisor: &Supervisor) {
        supervisor.dispose_host();
        supervisor.complete(ExitRequest::Shutdown);
    }

    fn can_self_restart(&self) -> bool {
        true
    }

    fn notify_fault(&self, report: &FaultReport, crash_log: Option<&Path>) {
        let mut stderr = io::stderr().lock();
        let written = match crash_log {
            Some(path) => writeln!(
                stderr,
                "{} stopped after a fatal error: {}. Details were written to {}.",
                env!("CARGO_PKG_NAME"),
                report.message(),
                path.display()
            ),
            None => writeln!(
                stderr,
                "{} stopped after a fatal error: {}.",
                env!("CARGO_PKG_NAME"),
                report.message()
            ),
        };
        if let Err(error) = written {
            debug!(target: MODE_TARGET, error = %error, "failed to write fault notice");
        }
    }
}

/// Service strategy: blocks on the service-control run loop.
pub struct ServiceMode {
    control: Box<dyn ServiceControl>,
    restart_supported: bool,
}

impl ServiceMode {
    /// Builds the strategy over a service-control registration.
    pub fn new(control: Box<dyn ServiceControl>, restart_supported: bool) -> Self {
        Self {
            control,
            restart_supported,
        }
    }
}

impl ExecutionMode for ServiceMode {
    fn kind(&self) -> ModeKind {
        ModeKind::Service
    }

    fn run_until_shutdown(&self, supervisor: &Arc<Supervisor>) -> Result<ExitRequest, ModeError> {
        self.control.run(&|| {
            supervisor.dispose_host();
            supervisor.complete(ExitRequest::Shutdown);
        })?;
        // Resolves even if the stop callback never fired.
        supervisor.complete(ExitRequest::Shutdown);
        Ok(supervisor.wait_for_exit())
    }

    fn shutdown(&self, _supervisor: &Supervisor) {
        self.control.request_stop();
    }

    fn can_self_restart(&self) -> bool {
        self.restart_supported
    }

    fn notify_fault(&self, _report: &FaultReport, _crash_log: Option<&Path>) {}
}

/// Picks the strategy requested by the startup switches.
pub fn select_mode(options: &StartupOptions) -> Box<dyn ExecutionMode> {
    let mode: Box<dyn ExecutionMode> = if options.run_as_service() {
        Box::new(ServiceMode::new(
            Box::new(SignalServiceControl::new()),
            SERVICE_RESTART_SUPPORTED,
        ))
    } else {
        Box::new(InteractiveMode::new(Box::new(SignalSessionEvents)))
    };
    debug!(target: MODE_TARGET, mode = %mode.kind(), "execution mode selected");
    mode
}
