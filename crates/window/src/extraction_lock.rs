//! Enforces the at-most-one-extraction-in-flight invariant (§3, §4.8).
//!
//! Deliberately non-blocking: a second turn arriving while extraction is in
//! flight for this session must only enqueue onto the window, never wait for
//! the permit. `DelayedUpdateCoordinator` owns one `ExtractionLock` per
//! session, so a single `Semaphore(1)` suffices without a `HashMap` layer.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct ExtractionLock {
    sem: Arc<Semaphore>,
}

impl Default for ExtractionLock {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionLock {
    pub fn new() -> Self {
        Self {
            sem: Arc::new(Semaphore::new(1)),
        }
    }

    /// Returns `Some(permit)` if no extraction is currently in flight for
    /// this session, `None` otherwise. Never waits.
    pub fn try_acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.sem.clone().try_acquire_owned().ok()
    }

    pub fn in_flight(&self) -> bool {
        self.sem.available_permits() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_try_acquire_fails_while_first_held() {
        let lock = ExtractionLock::new();
        let permit = lock.try_acquire();
        assert!(permit.is_some());
        assert!(lock.in_flight());
        assert!(lock.try_acquire().is_none());
    }

    #[test]
    fn releases_on_drop() {
        let lock = ExtractionLock::new();
        {
            let _permit = lock.try_acquire().unwrap();
            assert!(lock.in_flight());
        }
        assert!(!lock.in_flight());
        assert!(lock.try_acquire().is_some());
    }
}
