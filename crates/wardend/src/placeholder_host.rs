//! Placeholder application host used until a real host is linked in.

use std::sync::Arc;

use warden_config::ApplicationPaths;

use crate::host::{ApplicationHost, HostError, HostFactory, ProgressSink};

const HOST_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::host::placeholder");

/// Host that logs each lifecycle call without starting real services.
#[derive(Debug)]
pub(crate) struct PlaceholderHost {
    paths: ApplicationPaths,
}

impl ApplicationHost for PlaceholderHost {
    fn init(&self, progress: &dyn ProgressSink) -> Result<(), HostError> {
        progress.report(0.0);
        tracing::warn!(
            target: HOST_TARGET,
            program_data = %self.paths.program_data_dir().display(),
            "host initialisation requested but no application host is linked"
        );
        progress.report(100.0);
        Ok(())
    }

    fn run_startup_tasks(&self) -> Result<(), HostError> {
        tracing::info!(target: HOST_TARGET, "no startup tasks registered");
        Ok(())
    }

    fn dispose(&self) {
        tracing::info!(target: HOST_TARGET, "placeholder host disposed");
    }

    fn paths(&self) -> &ApplicationPaths {
        &self.paths
    }
}

/// Factory producing [`PlaceholderHost`] instances.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct PlaceholderHostFactory;

impl HostFactory for PlaceholderHostFactory {
    fn create(&self, paths: &ApplicationPaths) -> Result<Arc<dyn ApplicationHost>, HostError> {
        Ok(Arc::new(PlaceholderHost {
            paths: paths.clone(),
        }))
    }
}
