//! Lifecycle states owned by the supervisor.

use std::fmt;

/// Monotonic lifecycle of the supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleState {
    /// Startup checks and host initialisation are in progress.
    Starting,
    /// The host is initialised and the mode strategy is blocking.
    Running,
    /// Host disposal has begun.
    ShuttingDown,
    /// The host has been disposed. Terminal.
    Disposed,
}

impl LifecycleState {
    /// Stable lowercase name used in status snapshots and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::ShuttingDown => "shutting_down",
            Self::Disposed => "disposed",
        }
    }

    /// Whether moving to `next` is a forward transition.
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        next > self
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}
