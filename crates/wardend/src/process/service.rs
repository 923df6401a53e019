//! Service-manager integration for service mode.
//!
//! The service manager controls the process through termination signals. The
//! run loop blocks until one arrives (or a stop is requested from inside the
//! process) and then invokes the stop callback exactly once.

use std::sync::{Mutex, PoisonError};

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use tracing::info;

use super::PROCESS_TARGET;
use crate::mode::ModeError;

/// Registration with the OS service-control mechanism.
pub trait ServiceControl: Send + Sync {
    /// Registers the process and blocks on the service run loop. `on_stop` is
    /// invoked once when the service is told to stop.
    fn run(&self, on_stop: &dyn Fn()) -> Result<(), ModeError>;

    /// Asks the run loop to stop, as if the service manager had.
    fn request_stop(&self);
}

#[derive(Default)]
struct StopSlot {
    handle: Option<Handle>,
    stop_requested: bool,
}

/// Service control driven by termination signals.
///
/// Detaching happens at process entry, before any thread exists; this type
/// only registers for the stop signals.
#[derive(Default)]
pub struct SignalServiceControl {
    slot: Mutex<StopSlot>,
}

impl SignalServiceControl {
    /// Builds a control with no stop requested.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ServiceControl for SignalServiceControl {
    fn run(&self, on_stop: &dyn Fn()) -> Result<(), ModeError> {
        let mut signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP])
            .map_err(|source| ModeError::SignalInstall { source })?;
        {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            let handle = signals.handle();
            if slot.stop_requested {
                handle.close();
            }
            slot.handle = Some(handle);
        }
        info!(target: PROCESS_TARGET, "service registered; awaiting stop");
        match signals.forever().next() {
            Some(signal) => info!(target: PROCESS_TARGET, signal, "service stop signal received"),
            None => info!(target: PROCESS_TARGET, "service stop requested"),
        }
        on_stop();
        Ok(())
    }

    fn request_stop(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.stop_requested = true;
        if let Some(handle) = slot.handle.as_ref() {
            handle.close();
        }
    }
}
