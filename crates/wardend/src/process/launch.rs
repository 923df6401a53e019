//! Production entry point wiring the supervisor to its collaborators.

use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use tracing::{debug, error, info};
use warden_config::{ApplicationPaths, Config, StartupOptions};

use super::PROCESS_TARGET;
use super::daemonizer::{SystemDaemonizer, detach_if_requested};
use super::relaunch::SpawnRelauncher;
use crate::fault::{
    FaultDisposition, FaultHandler, FaultReport, ProcStatusDebuggerProbe, SystemExit,
    fallback_log_dir,
};
use crate::mode::select_mode;
use crate::placeholder_host::PlaceholderHostFactory;
use crate::reporter::{LifecycleReporter, StructuredLifecycleReporter};
use crate::supervisor::{StartupPlan, Supervisor, SupervisorParts};
use crate::telemetry;

/// Runs the supervisor for the current process and maps the outcome to an
/// exit code.
///
/// A detached service forks here, before the supervisor or any of its threads
/// exist. Duplicate instances, update hand-offs, shutdowns and restarts all
/// exit with success. Errors escaping the supervisor go through the fault
/// handler.
pub fn run_supervisor() -> ExitCode {
    let options = StartupOptions::from_env();
    let config = match Config::load_for(&options) {
        Ok(config) => config,
        Err(error) => return early_failure(&format!("failed to load configuration: {error}")),
    };
    if let Err(error) = telemetry::initialise(&config) {
        return early_failure(&error.to_string());
    }
    let paths = match ApplicationPaths::for_current_executable(&options, &config) {
        Ok(paths) => paths,
        Err(error) => {
            error!(target: PROCESS_TARGET, error = %error, "failed to resolve application paths");
            return ExitCode::FAILURE;
        }
    };
    if let Err(error) = detach_if_requested(&options, &config, &paths, &SystemDaemonizer) {
        error!(target: PROCESS_TARGET, error = %error, "failed to detach service");
        return ExitCode::FAILURE;
    }

    let reporter: Arc<dyn LifecycleReporter> = Arc::new(StructuredLifecycleReporter::new());
    let mode = select_mode(&options);
    let plan = StartupPlan::production(&config, &paths);
    let supervisor = Supervisor::new(SupervisorParts {
        options,
        paths,
        mode,
        host_factory: Box::new(PlaceholderHostFactory),
        reporter,
        relauncher: Box::new(SpawnRelauncher),
    });
    let fault = Arc::new(FaultHandler::new(
        &supervisor,
        fallback_log_dir(),
        Box::new(ProcStatusDebuggerProbe),
        Box::new(SystemExit),
    ));
    Arc::clone(&fault).install();

    match supervisor.run(plan) {
        Ok(outcome) => {
            info!(target: PROCESS_TARGET, ?outcome, "supervisor exited");
            ExitCode::SUCCESS
        }
        Err(error) => match fault.handle(&FaultReport::from_error(&error)) {
            FaultDisposition::Terminated(code) => {
                ExitCode::from(u8::try_from(code).unwrap_or(u8::MAX))
            }
            FaultDisposition::LeftAlive => loop {
                thread::park();
            },
        },
    }
}

fn early_failure(message: &str) -> ExitCode {
    // Telemetry may not be installed yet, so stderr is the only sink.
    if let Err(error) = write_early_failure(&mut io::stderr().lock(), message) {
        debug!(target: PROCESS_TARGET, error = %error, "failed to write startup failure");
    }
    ExitCode::FAILURE
}

pub(crate) fn write_early_failure(out: &mut impl Write, message: &str) -> io::Result<()> {
    writeln!(out, "{}: {message}", env!("CARGO_PKG_NAME"))
}
