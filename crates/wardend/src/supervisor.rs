//! Owns the application host and sequences the process lifecycle.
//!
//! Startup runs strictly in order: duplicate-instance resolution, staged
//! update hand-off, host construction, host `init`, then the mode's blocking
//! run loop. Startup tasks and the dependency check run in the background and
//! never gate readiness.
//!
//! Shutdown, restart, the service stop callback and the fault handler may all
//! race to tear the host down. Disposal is a one-shot transition guarded by
//! the lifecycle lock; the host's `dispose` runs outside the lock so a fault
//! raised while disposing cannot deadlock the fault handler.

use std::path::Path;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread;

use thiserror::Error;
use tracing::{debug, error, info, warn};
use warden_config::{ApplicationPaths, Config, StartupOptions};

use crate::completion::Completion;
use crate::dependency::{
    DependencyInstaller, DependencyTask, ElevatedLauncher, FileVersionStore, HttpInstallerSource,
    InstallerSource, parse_version,
};
use crate::fault::FaultReport;
use crate::host::{ApplicationHost, HostError, HostFactory, LoggingProgress};
use crate::instance::{
    InstanceResolution, ProcessIdentity, SingleInstanceGuard, SystemProcessTable,
};
use crate::mode::{ExecutionMode, ModeError, ModeKind};
use crate::process::{Relauncher, StatusFile};
use crate::reporter::LifecycleReporter;
use crate::state::LifecycleState;
use crate::update::{ExternalUpdater, UpdateApplier, UpdateOutcome};

const SUPERVISOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::supervisor");

/// Why the run loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitRequest {
    /// Normal shutdown.
    Shutdown,
    /// Shutdown after a new instance was started.
    Restart,
}

/// Result of [`Supervisor::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Another instance kept running; nothing was started.
    DuplicateInstance,
    /// A staged update was handed to the updater; nothing was started.
    UpdateStarted,
    /// The host ran and was shut down.
    Stopped(ExitRequest),
}

/// Errors that escape the running-state boundary.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The application host failed.
    #[error(transparent)]
    Host(#[from] HostError),
    /// The mode's run loop failed.
    #[error("execution mode failed: {source}")]
    Mode {
        #[from]
        source: ModeError,
    },
}

/// Collaborators consulted once during startup.
pub struct StartupPlan {
    instance: SingleInstanceGuard,
    update: UpdateApplier,
    dependency: Option<DependencyTask>,
}

impl StartupPlan {
    /// Bundles the startup collaborators.
    pub fn new(
        instance: SingleInstanceGuard,
        update: UpdateApplier,
        dependency: Option<DependencyTask>,
    ) -> Self {
        Self {
            instance,
            update,
            dependency,
        }
    }

    /// Production collaborators for `config` and `paths`.
    pub fn production(config: &Config, paths: &ApplicationPaths) -> Self {
        Self::new(
            SingleInstanceGuard::new(Box::new(SystemProcessTable)),
            UpdateApplier::new(Box::new(ExternalUpdater), config.service_name.clone()),
            dependency_task(config, paths),
        )
    }
}

fn dependency_task(config: &Config, paths: &ApplicationPaths) -> Option<DependencyTask> {
    let minimum = match parse_version(&config.dependency_min_version) {
        Ok(minimum) => minimum,
        Err(error) => {
            warn!(
                target: SUPERVISOR_TARGET,
                error = %error,
                "invalid dependency version; skipping dependency check"
            );
            return None;
        }
    };
    let source = match config.dependency_url.as_deref().map(HttpInstallerSource::new) {
        None => None,
        Some(Ok(source)) => Some(Box::new(source) as Box<dyn InstallerSource>),
        Some(Err(error)) => {
            warn!(
                target: SUPERVISOR_TARGET,
                error = %error,
                "installer source unavailable; dependency check will only probe"
            );
            None
        }
    };
    let installer = DependencyInstaller::new(
        config.dependency_name.clone(),
        paths.temp_update_dir(),
        Box::new(FileVersionStore::new(paths.dependency_dir())),
        source,
        Box::new(ElevatedLauncher::new(config.elevate_command.clone())),
    );
    Some(DependencyTask::new(installer, minimum))
}

/// Long-lived collaborators owned by the supervisor.
pub struct SupervisorParts {
    /// Startup switches, retained for self-restart.
    pub options: StartupOptions,
    /// Resolved application layout.
    pub paths: ApplicationPaths,
    /// Interactive or service strategy.
    pub mode: Box<dyn ExecutionMode>,
    /// Builds the application host.
    pub host_factory: Box<dyn HostFactory>,
    /// Receives structured lifecycle events.
    pub reporter: Arc<dyn LifecycleReporter>,
    /// Starts a new instance on restart.
    pub relauncher: Box<dyn Relauncher>,
}

struct Lifecycle {
    state: LifecycleState,
    host: Option<Arc<dyn ApplicationHost>>,
    disposed: bool,
    exit_claimed: bool,
}

/// Process-wide owner of the application host.
pub struct Supervisor {
    options: StartupOptions,
    paths: ApplicationPaths,
    mode: Box<dyn ExecutionMode>,
    host_factory: Box<dyn HostFactory>,
    reporter: Arc<dyn LifecycleReporter>,
    relauncher: Box<dyn Relauncher>,
    status: StatusFile,
    lifecycle: Mutex<Lifecycle>,
    disposed: Condvar,
    completion: Completion,
}

impl Supervisor {
    /// Builds the single supervisor for this process.
    pub fn new(parts: SupervisorParts) -> Arc<Self> {
        let SupervisorParts {
            options,
            paths,
            mode,
            host_factory,
            reporter,
            relauncher,
        } = parts;
        Arc::new(Self {
            status: StatusFile::new(paths.status_path()),
            options,
            paths,
            mode,
            host_factory,
            reporter,
            relauncher,
            lifecycle: Mutex::new(Lifecycle {
                state: LifecycleState::Starting,
                host: None,
                disposed: false,
                exit_claimed: false,
            }),
            disposed: Condvar::new(),
            completion: Completion::default(),
        })
    }

    /// Runs startup, blocks in the mode's run loop, and tears down.
    pub fn run(self: &Arc<Self>, plan: StartupPlan) -> Result<RunOutcome, SupervisorError> {
        let StartupPlan {
            instance,
            update,
            dependency,
        } = plan;
        self.reporter.startup_begun(&self.paths, self.mode.kind());

        let identity = ProcessIdentity::current(self.paths.executable_path());
        if let InstanceResolution::StillRunning(duplicate) =
            instance.resolve(&identity, self.reporter.as_ref())
        {
            self.reporter.duplicate_unresolved(&duplicate);
            return Ok(RunOutcome::DuplicateInstance);
        }

        match update.check_and_apply(&self.paths, self.mode.kind() == ModeKind::Service) {
            UpdateOutcome::NoUpdate => {}
            UpdateOutcome::UpdateStarted(artifact) => {
                self.reporter.update_started(&artifact);
                return Ok(RunOutcome::UpdateStarted);
            }
            UpdateOutcome::UpdateFailed(error) => self.reporter.update_failed(&error),
        }

        self.status.record(LifecycleState::Starting);
        let host = self.host_factory.create(&self.paths)?;
        if !self.install_host(&host) {
            debug!(target: SUPERVISOR_TARGET, "shutdown requested before host started");
            host.dispose();
            return Ok(self.finish(self.completion.wait()));
        }
        host.init(&LoggingProgress)?;
        self.reporter.host_initialised();
        self.spawn_startup_tasks(host);
        self.advance(LifecycleState::Running);

        if let Some(task) = dependency {
            task.spawn(Arc::clone(&self.reporter));
        }

        let request = self.mode.run_until_shutdown(self)?;
        Ok(self.finish(request))
    }

    fn install_host(&self, host: &Arc<dyn ApplicationHost>) -> bool {
        let mut lifecycle = self.lock();
        if lifecycle.disposed {
            return false;
        }
        lifecycle.host = Some(Arc::clone(host));
        true
    }

    fn spawn_startup_tasks(&self, host: Arc<dyn ApplicationHost>) {
        let reporter = Arc::clone(&self.reporter);
        let spawned = thread::Builder::new()
            .name("startup-tasks".to_owned())
            .spawn(move || {
                if let Err(error) = host.run_startup_tasks() {
                    reporter.background_failed("startup_tasks", &error.to_string());
                }
            });
        if let Err(error) = spawned {
            self.reporter
                .background_failed("startup_tasks", &error.to_string());
        }
    }

    fn finish(&self, request: ExitRequest) -> RunOutcome {
        self.dispose_host();
        self.status.remove();
        info!(target: SUPERVISOR_TARGET, ?request, "supervisor stopped");
        RunOutcome::Stopped(request)
    }

    /// Requests a normal shutdown. Repeated calls are no-ops.
    pub fn shutdown(&self) {
        info!(target: SUPERVISOR_TARGET, mode = %self.mode.kind(), "shutdown requested");
        self.mode.shutdown(self);
    }

    /// Requests a restart, falling back to shutdown when the mode cannot
    /// relaunch itself.
    pub fn restart(&self) {
        let self_restart = self.mode.can_self_restart();
        self.reporter.restart_requested(self_restart);
        if !self_restart {
            self.shutdown();
            return;
        }
        if !self.claim_exit() {
            debug!(target: SUPERVISOR_TARGET, "exit already requested; ignoring restart");
            return;
        }
        self.dispose_host();
        if let Err(error) = self
            .relauncher
            .relaunch(self.paths.executable_path(), self.options.arguments())
        {
            error!(target: SUPERVISOR_TARGET, error = %error, "failed to start new instance");
        }
        self.completion.resolve(ExitRequest::Restart);
        self.mode.shutdown(self);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.lock().state
    }

    /// Whether [`Supervisor::restart`] relaunches the executable.
    pub fn can_self_restart(&self) -> bool {
        self.mode.can_self_restart()
    }

    /// Whether a staged update may be applied by this process.
    ///
    /// Applying an update ends with the updater relaunching the executable,
    /// so it is gated exactly like a self-restart.
    pub fn can_self_update(&self) -> bool {
        self.mode.can_self_restart()
    }

    /// Strategy the supervisor runs under.
    pub fn mode(&self) -> ModeKind {
        self.mode.kind()
    }

    /// Resolves the completion signal if no exit has been claimed yet.
    pub(crate) fn complete(&self, request: ExitRequest) {
        if self.claim_exit() {
            self.completion.resolve(request);
        }
    }

    pub(crate) fn wait_for_exit(&self) -> ExitRequest {
        self.completion.wait()
    }

    pub(crate) fn session_logon(&self) {
        self.reporter.session_logon();
    }

    /// Disposes the host at most once. Returns after disposal has finished,
    /// even when another caller is the one disposing.
    pub(crate) fn dispose_host(&self) {
        self.dispose_locked(self.lock(), true);
    }

    /// Fault-path disposal. Gives up rather than blocking when the lifecycle
    /// lock is held elsewhere.
    pub(crate) fn dispose_for_fault(&self) -> bool {
        match self.lifecycle.try_lock() {
            Ok(lifecycle) => {
                self.dispose_locked(lifecycle, false);
                true
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                self.dispose_locked(poisoned.into_inner(), false);
                true
            }
            Err(TryLockError::WouldBlock) => false,
        }
    }

    /// Paths of the live host, if any. Never blocks.
    pub(crate) fn host_paths(&self) -> Option<ApplicationPaths> {
        let lifecycle = match self.lifecycle.try_lock() {
            Ok(lifecycle) => lifecycle,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        lifecycle.host.as_ref().map(|host| host.paths().clone())
    }

    pub(crate) fn notify_fault(&self, report: &FaultReport, crash_log: Option<&Path>) {
        self.reporter.fault(report);
        self.mode.notify_fault(report, crash_log);
    }

    fn dispose_locked(&self, mut lifecycle: MutexGuard<'_, Lifecycle>, wait: bool) {
        if lifecycle.disposed {
            // The fault path never waits: the fault may have been raised by
            // the thread that is disposing.
            while wait && lifecycle.state != LifecycleState::Disposed {
                lifecycle = self
                    .disposed
                    .wait(lifecycle)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            return;
        }
        lifecycle.disposed = true;
        self.advance_locked(&mut lifecycle, LifecycleState::ShuttingDown);
        let host = lifecycle.host.take();
        drop(lifecycle);

        if let Some(host) = host {
            host.dispose();
            self.reporter.host_disposed();
        }
        self.advance(LifecycleState::Disposed);
        self.disposed.notify_all();
    }

    fn claim_exit(&self) -> bool {
        let mut lifecycle = self.lock();
        !std::mem::replace(&mut lifecycle.exit_claimed, true)
    }

    fn advance(&self, next: LifecycleState) {
        let mut lifecycle = self.lock();
        self.advance_locked(&mut lifecycle, next);
    }

    fn advance_locked(&self, lifecycle: &mut Lifecycle, next: LifecycleState) {
        let current = lifecycle.state;
        if !current.can_advance_to(next) {
            return;
        }
        lifecycle.state = next;
        self.status.record(next);
        self.reporter.state_changed(current, next);
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
