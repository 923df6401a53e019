//! Application lifecycle supervisor.
//!
//! `wardend` owns the lifetime of a single application host for a process
//! that runs either interactively or under a service manager. Startup is
//! sequenced so that nothing is constructed until the process knows it should
//! run:
//!
//! 1. [`SingleInstanceGuard`] waits a bounded time for any other instance of
//!    the same executable to exit, and aborts startup if it does not.
//! 2. [`UpdateApplier`] hands a staged update archive to the external updater
//!    and exits so the updater can replace the binaries.
//! 3. The [`ApplicationHost`] is constructed and initialised; its startup
//!    tasks and the [`DependencyInstaller`] run in the background.
//! 4. The selected [`ExecutionMode`] blocks until a shutdown or restart is
//!    requested by the user session, the service manager, or the host.
//!
//! Host disposal happens at most once regardless of how many shutdown paths
//! race, including the process-wide [`FaultHandler`].

mod completion;
mod dependency;
mod fault;
mod host;
mod instance;
mod mode;
mod placeholder_host;
mod process;
mod reporter;
mod state;
mod supervisor;
mod telemetry;
mod update;

pub use dependency::{
    DependencyError, DependencyInstaller, DependencyTask, ElevatedLauncher, FileVersionStore,
    HttpInstallerSource, InstallOutcome, InstallerLauncher, InstallerSource, VersionStore,
    is_compatible, parse_version,
};
pub use fault::{
    DebuggerProbe, FaultDisposition, FaultHandler, FaultReport, PANIC_EXIT_CODE,
    ProcStatusDebuggerProbe, ProcessExit, SOFTWARE_EXIT_CODE, SystemExit, fallback_log_dir,
};
pub use host::{ApplicationHost, HostError, HostFactory, LoggingProgress, ProgressSink};
pub use instance::{
    DUPLICATE_EXIT_TIMEOUT, InstanceResolution, ProcessIdentity, ProcessTable,
    SingleInstanceGuard, SystemProcessTable, detect_duplicate,
};
pub use mode::{
    ExecutionMode, InteractiveMode, ModeError, ModeKind, SERVICE_RESTART_SUPPORTED, ServiceMode,
    select_mode,
};
pub use process::{
    DaemonizeError, Daemonizer, RelaunchError, Relauncher, ServiceControl, SessionEvent,
    SessionEvents, SessionHandler, SessionSubscription, SignalServiceControl, SignalSessionEvents,
    SpawnRelauncher, SystemDaemonizer, detach_if_requested, run_supervisor,
};
pub use reporter::{LifecycleReporter, StructuredLifecycleReporter};
pub use state::LifecycleState;
pub use supervisor::{
    ExitRequest, RunOutcome, StartupPlan, Supervisor, SupervisorError, SupervisorParts,
};
pub use telemetry::{TelemetryError, TelemetryHandle, initialise as initialise_telemetry};
pub use update::{
    ExternalUpdater, UpdateApplier, UpdateArtifact, UpdateError, UpdateOutcome, Updater,
};

#[cfg(test)]
mod tests;
