//! Counting completion barrier.
//!
//! A batch's completion depends on every one of its units. The barrier starts
//! at the unit count; each unit arrives exactly once when it reaches a
//! terminal state, and the arrival that brings the count to zero runs the
//! completion action. The action runs at most once.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::error;

type CompletionAction = Box<dyn FnOnce() + Send + 'static>;

pub struct CompletionBarrier {
    remaining: AtomicUsize,
    action: Mutex<Option<CompletionAction>>,
}

impl CompletionBarrier {
    pub fn new<F>(count: usize, action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            remaining: AtomicUsize::new(count),
            action: Mutex::new(Some(Box::new(action))),
        }
    }

    /// Record one dependency reaching a terminal state
    pub fn arrive(&self) {
        let previous = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));

        match previous {
            Ok(1) => self.fire(),
            Ok(_) => {}
            Err(_) => error!("Completion barrier received more arrivals than dependencies"),
        }
    }

    /// Fire immediately when there was nothing to wait for
    pub fn release_if_empty(&self) {
        if self.remaining.load(Ordering::Acquire) == 0 {
            self.fire();
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn is_released(&self) -> bool {
        self.action.lock().is_none()
    }

    fn fire(&self) {
        let action = self.action.lock().take();
        if let Some(action) = action {
            action();
        }
    }
}

impl fmt::Debug for CompletionBarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionBarrier")
            .field("remaining", &self.remaining())
            .field("released", &self.is_released())
            .finish()
    }
}
