//! Shared fixtures for the supervisor test suites.

mod doubles;
mod harness;
mod host;
mod reporter;

pub use doubles::{
    DuplicateBehaviour, FakeProcessTable, FixedDebugger, ManualServiceControl,
    ManualSessionEvents, RecordingDaemonizer, RecordingExit, RecordingRelauncher, StubUpdater,
};
pub use harness::{RunningSupervisor, SupervisorHarness, WAIT_TIMEOUT, wait_until};
pub use host::{RecordingHost, RecordingHostFactory};
pub use reporter::{LifecycleEvent, RecordingReporter};
