//! Session notifications for interactive runs.
//!
//! Terminal hang-up and termination signals stand in for the desktop session
//! ending; `SIGUSR1` is delivered by the session manager when a user logs on.

use std::thread::{self, JoinHandle};

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM, SIGUSR1};
use signal_hook::iterator::{Handle, Signals};
use tracing::{info, warn};

use super::PROCESS_TARGET;
use crate::mode::ModeError;

/// Session changes the interactive mode reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The user session is ending; the process should shut down.
    Ending,
    /// A user logged on; a UI hint may be raised.
    Logon,
}

/// Callback invoked for each session event.
pub type SessionHandler = Box<dyn Fn(SessionEvent) + Send + Sync>;

/// Source of session notifications.
pub trait SessionEvents: Send + Sync {
    /// Installs the hooks. Events are delivered until the subscription drops.
    fn subscribe(&self, handler: SessionHandler) -> Result<SessionSubscription, ModeError>;
}

/// Keeps session hooks installed for as long as it lives.
pub struct SessionSubscription {
    close: Option<Box<dyn FnOnce() + Send>>,
    listener: Option<JoinHandle<()>>,
}

impl SessionSubscription {
    /// Builds a subscription that runs `close` when dropped.
    pub fn new(close: impl FnOnce() + Send + 'static) -> Self {
        Self {
            close: Some(Box::new(close)),
            listener: None,
        }
    }

    fn with_listener(mut self, listener: JoinHandle<()>) -> Self {
        self.listener = Some(listener);
        self
    }
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        if let Some(close) = self.close.take() {
            close();
        }
        if let Some(listener) = self.listener.take()
            && listener.join().is_err()
        {
            warn!(target: PROCESS_TARGET, "session listener panicked");
        }
    }
}

/// Session events derived from POSIX signals.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalSessionEvents;

impl SessionEvents for SignalSessionEvents {
    fn subscribe(&self, handler: SessionHandler) -> Result<SessionSubscription, ModeError> {
        let mut signals = Signals::new([SIGHUP, SIGINT, SIGQUIT, SIGTERM, SIGUSR1])
            .map_err(|source| ModeError::SignalInstall { source })?;
        let handle: Handle = signals.handle();
        let listener = thread::Builder::new()
            .name("session-events".to_owned())
            .spawn(move || {
                for signal in signals.forever() {
                    let event = if signal == SIGUSR1 {
                        SessionEvent::Logon
                    } else {
                        SessionEvent::Ending
                    };
                    info!(
                        target: PROCESS_TARGET,
                        signal,
                        event = ?event,
                        "session event received"
                    );
                    handler(event);
                }
            })
            .map_err(|source| ModeError::SignalInstall { source })?;
        Ok(SessionSubscription::new(move || handle.close()).with_listener(listener))
    }
}
