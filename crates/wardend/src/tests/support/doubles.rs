//! Test doubles for the process-level collaborators.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use warden_config::ApplicationPaths;

use crate::fault::{DebuggerProbe, ProcessExit};
use crate::instance::{ProcessIdentity, ProcessTable};
use crate::mode::ModeError;
use crate::process::{
    DaemonizeError, Daemonizer, RelaunchError, Relauncher, ServiceControl, SessionEvent, SessionEvents, SessionHandler,
    SessionSubscription,
};
use crate::update::{UpdateArtifact, UpdateError, Updater};

/// How a fake duplicate instance behaves while the guard waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateBehaviour {
    /// Reported dead after this many liveness probes.
    ExitsAfter(usize),
    /// Never exits.
    NeverExits,
}

/// In-memory process table.
#[derive(Debug, Clone, Default)]
pub struct FakeProcessTable {
    processes: Arc<Mutex<Vec<ProcessIdentity>>>,
    behaviour: Arc<Mutex<Option<DuplicateBehaviour>>>,
    probes: Arc<AtomicUsize>,
}

impl FakeProcessTable {
    pub fn with_processes(processes: Vec<ProcessIdentity>) -> Self {
        let table = Self::default();
        *table.processes.lock().expect("table mutex") = processes;
        table
    }

    /// Adds a duplicate of `executable` with a distinct pid.
    pub fn add_duplicate(&self, executable: &Path, behaviour: DuplicateBehaviour) -> u32 {
        let pid = std::process::id().wrapping_add(1);
        self.processes
            .lock()
            .expect("table mutex")
            .push(ProcessIdentity::new(executable, pid));
        *self.behaviour.lock().expect("table mutex") = Some(behaviour);
        pid
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

impl ProcessTable for FakeProcessTable {
    fn snapshot(&self) -> Vec<ProcessIdentity> {
        self.processes.lock().expect("table mutex").clone()
    }

    fn is_running(&self, _pid: u32) -> bool {
        let probes = self.probes.fetch_add(1, Ordering::SeqCst) + 1;
        match *self.behaviour.lock().expect("table mutex") {
            Some(DuplicateBehaviour::ExitsAfter(limit)) => probes < limit,
            Some(DuplicateBehaviour::NeverExits) => true,
            None => false,
        }
    }
}

/// Session event source driven by the test.
#[derive(Clone, Default)]
pub struct ManualSessionEvents {
    handler: Arc<Mutex<Option<SessionHandler>>>,
    subscriptions: Arc<AtomicUsize>,
}

impl ManualSessionEvents {
    pub fn is_subscribed(&self) -> bool {
        self.handler.lock().expect("session mutex").is_some()
    }

    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    /// Delivers `event`. Returns `false` when nobody is subscribed.
    pub fn emit(&self, event: SessionEvent) -> bool {
        let handler = self.handler.lock().expect("session mutex");
        match handler.as_ref() {
            Some(handler) => {
                handler(event);
                true
            }
            None => false,
        }
    }
}

impl SessionEvents for ManualSessionEvents {
    fn subscribe(&self, handler: SessionHandler) -> Result<SessionSubscription, ModeError> {
        *self.handler.lock().expect("session mutex") = Some(handler);
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        let slot = Arc::clone(&self.handler);
        Ok(SessionSubscription::new(move || {
            slot.lock().expect("session mutex").take();
        }))
    }
}

#[derive(Debug, Default)]
struct ServiceState {
    running: bool,
    stopped: bool,
    stop_requests: usize,
}

/// Service control whose run loop blocks until the test (or a stop request)
/// ends it.
#[derive(Debug, Clone, Default)]
pub struct ManualServiceControl {
    inner: Arc<(Mutex<ServiceState>, Condvar)>,
}

impl ManualServiceControl {
    /// Stops the service as the service manager would.
    pub fn stop_from_manager(&self) {
        let (lock, cvar) = &*self.inner;
        lock.lock().expect("service mutex").stopped = true;
        cvar.notify_all();
    }

    pub fn is_running(&self) -> bool {
        self.inner.0.lock().expect("service mutex").running
    }

    pub fn stop_requests(&self) -> usize {
        self.inner.0.lock().expect("service mutex").stop_requests
    }
}

impl ServiceControl for ManualServiceControl {
    fn run(&self, on_stop: &dyn Fn()) -> Result<(), ModeError> {
        let (lock, cvar) = &*self.inner;
        {
            let mut state = lock.lock().expect("service mutex");
            state.running = true;
            while !state.stopped {
                state = cvar.wait(state).expect("service mutex");
            }
            state.running = false;
        }
        on_stop();
        Ok(())
    }

    fn request_stop(&self) {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock().expect("service mutex");
        state.stop_requests += 1;
        state.stopped = true;
        cvar.notify_all();
    }
}

/// Relauncher that records instead of spawning.
#[derive(Debug, Clone, Default)]
pub struct RecordingRelauncher {
    launches: Arc<Mutex<Vec<(PathBuf, Vec<OsString>)>>>,
}

impl RecordingRelauncher {
    pub fn launches(&self) -> Vec<(PathBuf, Vec<OsString>)> {
        self.launches.lock().expect("relauncher mutex").clone()
    }
}

impl Relauncher for RecordingRelauncher {
    fn relaunch(&self, executable: &Path, arguments: &[OsString]) -> Result<(), RelaunchError> {
        self.launches
            .lock()
            .expect("relauncher mutex")
            .push((executable.to_path_buf(), arguments.to_vec()));
        Ok(())
    }
}

/// Daemonizer that records the directories it was asked to detach into.
#[derive(Debug, Clone, Default)]
pub struct RecordingDaemonizer {
    work_dirs: Arc<Mutex<Vec<PathBuf>>>,
}

impl RecordingDaemonizer {
    pub fn work_dirs(&self) -> Vec<PathBuf> {
        self.work_dirs.lock().expect("daemonizer mutex").clone()
    }
}

impl Daemonizer for RecordingDaemonizer {
    fn daemonize(&self, paths: &ApplicationPaths) -> Result<(), DaemonizeError> {
        self.work_dirs
            .lock()
            .expect("daemonizer mutex")
            .push(paths.program_data_dir().to_path_buf());
        Ok(())
    }
}

/// Updater that records calls and can be told to fail.
#[derive(Debug, Clone, Default)]
pub struct StubUpdater {
    fail: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl StubUpdater {
    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Updater for StubUpdater {
    fn launch(
        &self,
        paths: &ApplicationPaths,
        _artifact: &UpdateArtifact,
    ) -> Result<(), UpdateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(UpdateError::MissingUpdater {
                path: paths.updater_path().to_path_buf(),
            });
        }
        Ok(())
    }
}

/// Process exit that records the requested code.
#[derive(Debug, Clone, Default)]
pub struct RecordingExit {
    codes: Arc<Mutex<Vec<i32>>>,
}

impl RecordingExit {
    pub fn codes(&self) -> Vec<i32> {
        self.codes.lock().expect("exit mutex").clone()
    }
}

impl ProcessExit for RecordingExit {
    fn exit(&self, code: i32) {
        self.codes.lock().expect("exit mutex").push(code);
    }
}

/// Debugger probe with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct FixedDebugger(pub bool);

impl DebuggerProbe for FixedDebugger {
    fn is_attached(&self) -> bool {
        self.0
    }
}
