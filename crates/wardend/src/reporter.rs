//! Structured lifecycle reporting for supervisor events.

use std::sync::Arc;

use warden_config::ApplicationPaths;

use crate::dependency::DependencyError;
use crate::fault::FaultReport;
use crate::instance::ProcessIdentity;
use crate::mode::ModeKind;
use crate::state::LifecycleState;
use crate::update::{UpdateArtifact, UpdateError};

const LIFECYCLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lifecycle");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait LifecycleReporter: Send + Sync {
    /// Invoked when the supervisor begins startup.
    fn startup_begun(&self, paths: &ApplicationPaths, mode: ModeKind);

    /// Invoked when another instance of the executable is running.
    fn duplicate_detected(&self, duplicate: &ProcessIdentity);

    /// Invoked when startup stops because a duplicate did not exit.
    fn duplicate_unresolved(&self, duplicate: &ProcessIdentity);

    /// Invoked when a staged update was handed to the updater.
    fn update_started(&self, artifact: &UpdateArtifact);

    /// Invoked when applying a staged update failed.
    fn update_failed(&self, error: &UpdateError);

    /// Invoked once host `init` has completed.
    fn host_initialised(&self);

    /// Invoked on every lifecycle transition.
    fn state_changed(&self, from: LifecycleState, to: LifecycleState);

    /// Invoked after the host has been disposed.
    fn host_disposed(&self);

    /// Invoked when best-effort background work fails.
    fn background_failed(&self, task: &'static str, message: &str);

    /// Invoked when the dependency check installed a new version.
    fn dependency_installed(&self, name: &str);

    /// Invoked when the dependency check failed.
    fn dependency_failed(&self, error: &DependencyError);

    /// Invoked when a user session logon is observed.
    fn session_logon(&self);

    /// Invoked when a restart is requested.
    fn restart_requested(&self, self_restart: bool);

    /// Invoked when the fault handler intercepts a fatal fault.
    fn fault(&self, report: &FaultReport);
}

impl<T> LifecycleReporter for Arc<T>
where
    T: LifecycleReporter,
{
    fn startup_begun(&self, paths: &ApplicationPaths, mode: ModeKind) {
        (**self).startup_begun(paths, mode);
    }

    fn duplicate_detected(&self, duplicate: &ProcessIdentity) {
        (**self).duplicate_detected(duplicate);
    }

    fn duplicate_unresolved(&self, duplicate: &ProcessIdentity) {
        (**self).duplicate_unresolved(duplicate);
    }

    fn update_started(&self, artifact: &UpdateArtifact) {
        (**self).update_started(artifact);
    }

    fn update_failed(&self, error: &UpdateError) {
        (**self).update_failed(error);
    }

    fn host_initialised(&self) {
        (**self).host_initialised();
    }

    fn state_changed(&self, from: LifecycleState, to: LifecycleState) {
        (**self).state_changed(from, to);
    }

    fn host_disposed(&self) {
        (**self).host_disposed();
    }

    fn background_failed(&self, task: &'static str, message: &str) {
        (**self).background_failed(task, message);
    }

    fn dependency_installed(&self, name: &str) {
        (**self).dependency_installed(name);
    }

    fn dependency_failed(&self, error: &DependencyError) {
        (**self).dependency_failed(error);
    }

    fn session_logon(&self) {
        (**self).session_logon();
    }

    fn restart_requested(&self, self_restart: bool) {
        (**self).restart_requested(self_restart);
    }

    fn fault(&self, report: &FaultReport) {
        (**self).fault(report);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredLifecycleReporter;

impl StructuredLifecycleReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl LifecycleReporter for StructuredLifecycleReporter {
    fn startup_begun(&self, paths: &ApplicationPaths, mode: ModeKind) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "startup_begun",
            mode = %mode,
            pid = std::process::id(),
            executable = %paths.executable_path().display(),
            program_data = %paths.program_data_dir().display(),
            "starting supervisor"
        );
    }

    fn duplicate_detected(&self, duplicate: &ProcessIdentity) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "duplicate_detected",
            pid = duplicate.process_id(),
            executable = %duplicate.executable_path().display(),
            "another instance is running; waiting for it to exit"
        );
    }

    fn duplicate_unresolved(&self, duplicate: &ProcessIdentity) {
        tracing::warn!(
            target: LIFECYCLE_TARGET,
            event = "duplicate_unresolved",
            pid = duplicate.process_id(),
            "another instance is still running; startup aborted"
        );
    }

    fn update_started(&self, artifact: &UpdateArtifact) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "update_started",
            archive = %artifact.archive_path().display(),
            service = artifact.target_service_name(),
            "staged update handed to updater; exiting"
        );
    }

    fn update_failed(&self, error: &UpdateError) {
        tracing::error!(
            target: LIFECYCLE_TARGET,
            event = "update_failed",
            error = %error,
            "failed to apply staged update; continuing startup"
        );
    }

    fn host_initialised(&self) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "host_initialised",
            "application host initialised"
        );
    }

    fn state_changed(&self, from: LifecycleState, to: LifecycleState) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "state_changed",
            from = %from,
            to = %to,
            "lifecycle state changed"
        );
    }

    fn host_disposed(&self) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "host_disposed",
            "application host disposed"
        );
    }

    fn background_failed(&self, task: &'static str, message: &str) {
        tracing::warn!(
            target: LIFECYCLE_TARGET,
            event = "background_failed",
            task,
            message,
            "background task failed"
        );
    }

    fn dependency_installed(&self, name: &str) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "dependency_installed",
            dependency = name,
            "runtime dependency installed"
        );
    }

    fn dependency_failed(&self, error: &DependencyError) {
        tracing::warn!(
            target: LIFECYCLE_TARGET,
            event = "dependency_failed",
            error = %error,
            "runtime dependency check failed"
        );
    }

    fn session_logon(&self) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "session_logon",
            "user session logon observed"
        );
    }

    fn restart_requested(&self, self_restart: bool) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "restart_requested",
            self_restart,
            "restart requested"
        );
    }

    fn fault(&self, report: &FaultReport) {
        tracing::error!(
            target: LIFECYCLE_TARGET,
            event = "fault",
            kind = report.kind(),
            message = report.message(),
            location = report.location(),
            exit_code = report.exit_code(),
            "fatal fault intercepted"
        );
    }
}
