//! Builds supervisors wired to test doubles.

use std::fs;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use tempfile::TempDir;
use warden_config::{ApplicationPaths, Config, StartupOptions};

use super::doubles::{
    DuplicateBehaviour, FakeProcessTable, ManualServiceControl, ManualSessionEvents,
    RecordingRelauncher, StubUpdater,
};
use super::host::{RecordingHost, RecordingHostFactory};
use super::reporter::RecordingReporter;
use crate::instance::SingleInstanceGuard;
use crate::mode::{ExecutionMode, InteractiveMode, ModeKind, ServiceMode};
use crate::reporter::LifecycleReporter;
use crate::state::LifecycleState;
use crate::supervisor::{RunOutcome, StartupPlan, Supervisor, SupervisorError, SupervisorParts};
use crate::update::UpdateApplier;

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
pub const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Polls `condition` until it holds or [`WAIT_TIMEOUT`] elapses.
pub fn wait_until(description: &str, condition: impl Fn() -> bool) -> Result<(), String> {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return Ok(());
        }
        thread::sleep(POLL_INTERVAL);
    }
    Err(format!("timed out waiting for {description}"))
}

/// Supervisor collaborators plus the handles used to observe them.
pub struct SupervisorHarness {
    _root: TempDir,
    pub paths: ApplicationPaths,
    pub options: StartupOptions,
    pub host: Arc<RecordingHost>,
    pub factory: RecordingHostFactory,
    pub reporter: Arc<RecordingReporter>,
    pub session: ManualSessionEvents,
    pub service: ManualServiceControl,
    pub relauncher: RecordingRelauncher,
    pub updater: StubUpdater,
    pub table: FakeProcessTable,
    mode: ModeKind,
    duplicate_timeout: Duration,
}

impl SupervisorHarness {
    pub fn new(mode: ModeKind) -> Self {
        Self::with_dispose_delay(mode, Duration::ZERO)
    }

    pub fn with_dispose_delay(mode: ModeKind, dispose_delay: Duration) -> Self {
        let root = TempDir::new().expect("temp dir");
        let bin = root.path().join("bin");
        fs::create_dir_all(&bin).expect("bin dir");
        let mut args = vec!["wardend", "--log-format", "compact"];
        if mode == ModeKind::Service {
            args.push("-service");
        }
        let options = StartupOptions::from_args(args);
        let config = Config {
            program_data_dir: Some(
                Utf8PathBuf::from_path_buf(root.path().join("data")).expect("utf-8 temp path"),
            ),
            ..Config::default()
        };
        let paths = ApplicationPaths::resolve(&options, &config, &bin.join("wardend"))
            .expect("paths resolve");
        let host = Arc::new(RecordingHost::with_dispose_delay(
            paths.clone(),
            dispose_delay,
        ));
        Self {
            _root: root,
            factory: RecordingHostFactory::new(Arc::clone(&host)),
            host,
            paths,
            options,
            reporter: Arc::new(RecordingReporter::default()),
            session: ManualSessionEvents::default(),
            service: ManualServiceControl::default(),
            relauncher: RecordingRelauncher::default(),
            updater: StubUpdater::default(),
            table: FakeProcessTable::default(),
            mode,
            duplicate_timeout: Duration::from_secs(30),
        }
    }

    /// Registers a duplicate instance of this executable.
    pub fn add_duplicate(&mut self, behaviour: DuplicateBehaviour) -> u32 {
        if behaviour == DuplicateBehaviour::NeverExits {
            self.duplicate_timeout = Duration::from_millis(100);
        }
        self.table
            .add_duplicate(self.paths.executable_path(), behaviour)
    }

    pub fn stage_update(&self) {
        fs::write(self.paths.update_archive_path(), b"staged").expect("stage update");
    }

    pub fn build(&self) -> (Arc<Supervisor>, StartupPlan) {
        let mode: Box<dyn ExecutionMode> = match self.mode {
            ModeKind::Interactive => Box::new(InteractiveMode::new(Box::new(self.session.clone()))),
            ModeKind::Service => Box::new(ServiceMode::new(Box::new(self.service.clone()), false)),
        };
        let supervisor = Supervisor::new(SupervisorParts {
            options: self.options.clone(),
            paths: self.paths.clone(),
            mode,
            host_factory: Box::new(self.factory.clone()),
            reporter: Arc::clone(&self.reporter) as Arc<dyn LifecycleReporter>,
            relauncher: Box::new(self.relauncher.clone()),
        });
        let plan = StartupPlan::new(
            SingleInstanceGuard::with_timing(
                Box::new(self.table.clone()),
                self.duplicate_timeout,
                Duration::from_millis(2),
            ),
            UpdateApplier::new(Box::new(self.updater.clone()), "wardend"),
            None,
        );
        (supervisor, plan)
    }

    /// Runs the supervisor on a background thread.
    pub fn start(&self) -> RunningSupervisor {
        let (supervisor, plan) = self.build();
        let runner = Arc::clone(&supervisor);
        let handle = thread::Builder::new()
            .name("supervisor-under-test".to_owned())
            .spawn(move || runner.run(plan))
            .expect("spawn supervisor thread");
        RunningSupervisor {
            supervisor,
            handle: Some(handle),
        }
    }
}

/// A supervisor running on a background thread.
pub struct RunningSupervisor {
    pub supervisor: Arc<Supervisor>,
    handle: Option<JoinHandle<Result<RunOutcome, SupervisorError>>>,
}

impl RunningSupervisor {
    pub fn wait_for_state(&self, state: LifecycleState) -> Result<(), String> {
        wait_until(&format!("state {state}"), || self.supervisor.state() >= state)
    }

    pub fn join(&mut self) -> Result<Result<RunOutcome, SupervisorError>, String> {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| "supervisor already joined".to_owned())?;
        handle
            .join()
            .map_err(|_| "supervisor thread panicked".to_owned())
    }
}
