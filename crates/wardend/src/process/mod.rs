//! Operating-system plumbing: signals, detaching, relaunching and lifecycle
//! files.

mod daemonizer;
mod launch;
mod relaunch;
mod service;
mod session;
mod status;

pub use daemonizer::{DaemonizeError, Daemonizer, SystemDaemonizer, detach_if_requested};
pub use launch::run_supervisor;
pub(crate) use launch::write_early_failure;
pub use relaunch::{RelaunchError, Relauncher, SpawnRelauncher};
pub use service::{ServiceControl, SignalServiceControl};
pub use session::{
    SessionEvent, SessionEvents, SessionHandler, SessionSubscription, SignalSessionEvents,
};
pub(crate) use status::StatusFile;

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
