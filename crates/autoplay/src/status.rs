//! Lock-guarded agent status shared between the loop worker and pollers.

use crate::model::AgentStatus;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared handle to the live [`AgentStatus`].
///
/// Clones of the store point at the same status. Readers only ever get
/// [`StatusStore::snapshot`] copies, never the live value.
#[derive(Clone, Debug, Default)]
pub struct StatusStore {
    inner: Arc<Mutex<AgentStatus>>,
}

impl StatusStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn snapshot(&self) -> AgentStatus {
        self.lock().clone()
    }

    /// Mutate the live status under the lock.
    pub fn update<R>(&self, f: impl FnOnce(&mut AgentStatus) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|status| status.last_error = Some(message));
    }

    pub fn set_flags(&self, running: bool, paused: bool) {
        self.update(|status| {
            status.running = running;
            status.paused = paused;
        });
    }

    fn lock(&self) -> MutexGuard<'_, AgentStatus> {
        // A panic while holding the lock leaves plain data behind; keep serving it.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
