//! Test double for [`LifecycleReporter`] that records structured events.

use std::sync::Mutex;

use warden_config::ApplicationPaths;

use crate::dependency::DependencyError;
use crate::fault::FaultReport;
use crate::instance::ProcessIdentity;
use crate::mode::ModeKind;
use crate::reporter::LifecycleReporter;
use crate::state::LifecycleState;
use crate::update::{UpdateArtifact, UpdateError};

/// Lifecycle events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    StartupBegun(ModeKind),
    DuplicateDetected(u32),
    DuplicateUnresolved(u32),
    UpdateStarted,
    UpdateFailed(String),
    HostInitialised,
    StateChanged(LifecycleState, LifecycleState),
    HostDisposed,
    BackgroundFailed(&'static str),
    DependencyInstalled(String),
    DependencyFailed(String),
    SessionLogon,
    RestartRequested(bool),
    Fault(i32),
}

/// Records lifecycle events for assertions.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .expect("reporter mutex poisoned")
            .clone()
    }

    pub fn contains(&self, event: &LifecycleEvent) -> bool {
        self.events().contains(event)
    }

    /// States entered, in order.
    pub fn transitions(&self) -> Vec<LifecycleState> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                LifecycleEvent::StateChanged(_, to) => Some(to),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: LifecycleEvent) {
        self.events
            .lock()
            .expect("reporter mutex poisoned")
            .push(event);
    }
}

impl LifecycleReporter for RecordingReporter {
    fn startup_begun(&self, _paths: &ApplicationPaths, mode: ModeKind) {
        self.record(LifecycleEvent::StartupBegun(mode));
    }

    fn duplicate_detected(&self, duplicate: &ProcessIdentity) {
        self.record(LifecycleEvent::DuplicateDetected(duplicate.process_id()));
    }

    fn duplicate_unresolved(&self, duplicate: &ProcessIdentity) {
        self.record(LifecycleEvent::DuplicateUnresolved(duplicate.process_id()));
    }

    fn update_started(&self, _artifact: &UpdateArtifact) {
        self.record(LifecycleEvent::UpdateStarted);
    }

    fn update_failed(&self, error: &UpdateError) {
        self.record(LifecycleEvent::UpdateFailed(error.to_string()));
    }

    fn host_initialised(&self) {
        self.record(LifecycleEvent::HostInitialised);
    }

    fn state_changed(&self, from: LifecycleState, to: LifecycleState) {
        self.record(LifecycleEvent::StateChanged(from, to));
    }

    fn host_disposed(&self) {
        self.record(LifecycleEvent::HostDisposed);
    }

    fn background_failed(&self, task: &'static str, _message: &str) {
        self.record(LifecycleEvent::BackgroundFailed(task));
    }

    fn dependency_installed(&self, name: &str) {
        self.record(LifecycleEvent::DependencyInstalled(name.to_owned()));
    }

    fn dependency_failed(&self, error: &DependencyError) {
        self.record(LifecycleEvent::DependencyFailed(error.to_string()));
    }

    fn session_logon(&self) {
        self.record(LifecycleEvent::SessionLogon);
    }

    fn restart_requested(&self, self_restart: bool) {
        self.record(LifecycleEvent::RestartRequested(self_restart));
    }

    fn fault(&self, report: &FaultReport) {
        self.record(LifecycleEvent::Fault(report.exit_code()));
    }
}
