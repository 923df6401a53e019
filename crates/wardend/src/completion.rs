//! One-shot completion signal shared by every shutdown path.

use std::sync::{Condvar, Mutex, PoisonError};

use crate::supervisor::ExitRequest;

/// Set-once slot that the blocking run loop waits on.
///
/// The first resolution wins; later resolutions are ignored so that racing
/// shutdown triggers cannot change the recorded outcome.
#[derive(Debug, Default)]
pub(crate) struct Completion {
    slot: Mutex<Option<ExitRequest>>,
    resolved: Condvar,
}

impl Completion {
    /// Records `request` if nothing has been recorded yet. Returns whether
    /// this call resolved the signal.
    pub(crate) fn resolve(&self, request: ExitRequest) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return false;
        }
        *slot = Some(request);
        self.resolved.notify_all();
        true
    }

    /// Blocks until the signal is resolved.
    pub(crate) fn wait(&self) -> ExitRequest {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(request) = *slot {
                return request;
            }
            slot = self
                .resolved
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    #[cfg(test)]
    pub(crate) fn peek(&self) -> Option<ExitRequest> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
