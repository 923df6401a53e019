//! Recording application host for lifecycle assertions.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use warden_config::ApplicationPaths;

use crate::host::{ApplicationHost, HostError, HostFactory, ProgressSink};

/// Host that counts lifecycle calls and can be told to fail.
#[derive(Debug)]
pub struct RecordingHost {
    paths: ApplicationPaths,
    fail_init: AtomicBool,
    fail_startup_tasks: AtomicBool,
    dispose_delay: Duration,
    init_calls: AtomicUsize,
    startup_task_calls: AtomicUsize,
    dispose_calls: AtomicUsize,
}

impl RecordingHost {
    pub fn new(paths: ApplicationPaths) -> Self {
        Self::with_dispose_delay(paths, Duration::ZERO)
    }

    /// Host whose `dispose` sleeps, widening race windows.
    pub fn with_dispose_delay(paths: ApplicationPaths, dispose_delay: Duration) -> Self {
        Self {
            paths,
            fail_init: AtomicBool::new(false),
            fail_startup_tasks: AtomicBool::new(false),
            dispose_delay,
            init_calls: AtomicUsize::new(0),
            startup_task_calls: AtomicUsize::new(0),
            dispose_calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_init(&self) {
        self.fail_init.store(true, Ordering::SeqCst);
    }

    pub fn fail_startup_tasks(&self) {
        self.fail_startup_tasks.store(true, Ordering::SeqCst);
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn startup_task_calls(&self) -> usize {
        self.startup_task_calls.load(Ordering::SeqCst)
    }

    pub fn dispose_calls(&self) -> usize {
        self.dispose_calls.load(Ordering::SeqCst)
    }
}

impl ApplicationHost for RecordingHost {
    fn init(&self, progress: &dyn ProgressSink) -> Result<(), HostError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        progress.report(50.0);
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(HostError::Init {
                message: "database locked".to_owned(),
            });
        }
        progress.report(100.0);
        Ok(())
    }

    fn run_startup_tasks(&self) -> Result<(), HostError> {
        self.startup_task_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_startup_tasks.load(Ordering::SeqCst) {
            return Err(HostError::StartupTasks {
                message: "library scan failed".to_owned(),
            });
        }
        Ok(())
    }

    fn dispose(&self) {
        if !self.dispose_delay.is_zero() {
            thread::sleep(self.dispose_delay);
        }
        self.dispose_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn paths(&self) -> &ApplicationPaths {
        &self.paths
    }
}

/// Factory handing out a shared [`RecordingHost`].
#[derive(Debug, Clone)]
pub struct RecordingHostFactory {
    host: Arc<RecordingHost>,
    created: Arc<AtomicUsize>,
}

impl RecordingHostFactory {
    pub fn new(host: Arc<RecordingHost>) -> Self {
        Self {
            host,
            created: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl HostFactory for RecordingHostFactory {
    fn create(&self, _paths: &ApplicationPaths) -> Result<Arc<dyn ApplicationHost>, HostError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.host) as Arc<dyn ApplicationHost>)
    }
}
