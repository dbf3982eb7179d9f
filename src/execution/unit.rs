//! # Retrying Upload Unit
//!
//! Wraps one [`UploadTask`] with attempt-count state and drives it to a
//! terminal state:
//!
//! ```text
//! Ready ──run──▶ Executing ──success / attempts exhausted──▶ Finished
//!   │                │
//!   └────cancel──────┴──────────────────────────────────────▶ Cancelled
//! ```
//!
//! Failed attempts loop in place while attempts remain; the unit stays
//! `Executing` and keeps its worker slot. The loop is bounded by the
//! configured attempt count.
//!
//! Cancellation is cooperative. An attempt already handed to the transport
//! cannot be recalled, but its late answer is discarded and no further
//! attempt starts.

use parking_lot::Mutex;
use std::fmt;
use std::num::NonZeroU32;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config;
use crate::constants::operations;
use crate::error::Result;
use crate::execution::task::{UploadCompletion, UploadTask};
use crate::state_machine::{AttemptResponse, UnitOutcome, UnitState};

#[derive(Debug)]
struct UnitInner {
    state: UnitState,
    remaining_attempts: u32,
    attempts_made: u32,
    resolution: Option<UnitOutcome>,
}

impl UnitInner {
    fn resolve(&mut self, outcome: UnitOutcome) {
        self.state = outcome.terminal_state();
        self.resolution = Some(outcome);
    }
}

/// Stateful driver of one item through its retry attempts
pub struct RetryingUnit<T> {
    id: Uuid,
    index: usize,
    task: UploadTask<T>,
    attempt_timeout: Option<Duration>,
    inner: Mutex<UnitInner>,
    cancel_signal: Notify,
}

impl<T> RetryingUnit<T> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> UnitState {
        self.inner.lock().state
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn remaining_attempts(&self) -> u32 {
        self.inner.lock().remaining_attempts
    }

    pub fn attempts_made(&self) -> u32 {
        self.inner.lock().attempts_made
    }

    /// How the unit ended; `None` until it is terminal
    pub fn resolution(&self) -> Option<UnitOutcome> {
        self.inner.lock().resolution
    }

    /// Boolean outcome; `None` until terminal, `Some(false)` when cancelled
    pub fn outcome(&self) -> Option<bool> {
        self.resolution().map(|outcome| outcome.is_success())
    }

    /// Stop the unit. Returns `false` if it had already reached a terminal
    /// state, in which case nothing changes.
    pub fn cancel(&self) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.state.is_terminal() {
                return false;
            }
            inner.resolve(UnitOutcome::Cancelled);
        }

        // Stores a permit if the worker is not waiting yet
        self.cancel_signal.notify_one();
        debug!(
            unit_id = %self.id,
            index = self.index,
            "Unit cancelled"
        );
        true
    }
}

impl<T> RetryingUnit<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Build a unit allowing up to `retry_attempts` upload invocations.
    ///
    /// Zero attempts is rejected as invalid configuration.
    pub fn new(task: UploadTask<T>, retry_attempts: u32) -> Result<Self> {
        let attempt_limit = config::attempt_limit(retry_attempts)?;
        Ok(Self::with_attempt_limit(task, attempt_limit))
    }

    pub fn with_attempt_limit(task: UploadTask<T>, attempt_limit: NonZeroU32) -> Self {
        Self {
            id: Uuid::new_v4(),
            index: 0,
            task,
            attempt_timeout: None,
            inner: Mutex::new(UnitInner {
                state: UnitState::Ready,
                remaining_attempts: attempt_limit.get(),
                attempts_made: 0,
                resolution: None,
            }),
            cancel_signal: Notify::new(),
        }
    }

    /// Position of the item within its batch
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Drive the unit from `Ready` to a terminal state.
    ///
    /// Returns immediately if the unit is not `Ready` (already run, or
    /// cancelled before admission).
    pub async fn run(&self) {
        {
            let mut inner = self.inner.lock();
            if !inner.state.can_transition_to(UnitState::Executing) {
                debug!(
                    unit_id = %self.id,
                    state = %inner.state,
                    "Unit not runnable, skipping"
                );
                return;
            }
            inner.state = UnitState::Executing;
        }

        loop {
            let (completion, receiver) = UploadCompletion::channel();
            let Some(attempt) = self.begin_attempt() else {
                return;
            };

            // Counted attempts are in flight: a cancel landing from here on
            // cannot recall the upload call, it only discards the answer
            let response = match catch_unwind(AssertUnwindSafe(|| self.task.attempt(completion)))
            {
                Ok(()) => {
                    tokio::select! {
                        biased;
                        _ = self.cancel_signal.notified() => {
                            debug!(
                                unit_id = %self.id,
                                attempt = attempt,
                                "Stopped waiting for in-flight attempt after cancellation"
                            );
                            return;
                        }
                        response = self.await_response(receiver) => response,
                    }
                }
                Err(_) => {
                    warn!(
                        unit_id = %self.id,
                        attempt = attempt,
                        "Upload function panicked, counting attempt as failed"
                    );
                    AttemptResponse::Panicked
                }
            };

            if self.complete_attempt(attempt, response) {
                return;
            }
        }
    }

    /// Consume one attempt; `None` if the unit is no longer executing.
    ///
    /// The state check and the count happen under one lock acquisition, so
    /// an attempt is only started for a unit that was still executing.
    fn begin_attempt(&self) -> Option<u32> {
        let (attempt, remaining) = {
            let mut inner = self.inner.lock();
            if inner.state != UnitState::Executing || inner.remaining_attempts == 0 {
                return None;
            }
            inner.remaining_attempts -= 1;
            inner.attempts_made += 1;
            (inner.attempts_made, inner.remaining_attempts)
        };

        debug!(
            operation = operations::UNIT_ATTEMPT_STARTED,
            unit_id = %self.id,
            index = self.index,
            attempt = attempt,
            remaining_attempts = remaining,
            "Starting upload attempt"
        );
        Some(attempt)
    }

    async fn await_response(&self, receiver: oneshot::Receiver<bool>) -> AttemptResponse {
        let received = match self.attempt_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, receiver).await {
                Ok(received) => received,
                Err(_) => return AttemptResponse::TimedOut,
            },
            None => receiver.await,
        };

        match received {
            Ok(true) => AttemptResponse::Succeeded,
            Ok(false) => AttemptResponse::Failed,
            Err(_) => AttemptResponse::Abandoned,
        }
    }

    /// Apply an attempt's response; returns `true` once the unit is terminal
    fn complete_attempt(&self, attempt: u32, response: AttemptResponse) -> bool {
        let mut inner = self.inner.lock();

        if inner.state != UnitState::Executing {
            debug!(
                unit_id = %self.id,
                attempt = attempt,
                response = %response,
                "Discarding response for cancelled unit"
            );
            return true;
        }

        if matches!(response, AttemptResponse::Abandoned | AttemptResponse::TimedOut) {
            warn!(
                unit_id = %self.id,
                attempt = attempt,
                response = %response,
                "Upload attempt produced no answer, counting it as failed"
            );
        }

        if response.is_success() {
            inner.resolve(UnitOutcome::Succeeded);
            debug!(
                unit_id = %self.id,
                index = self.index,
                attempts = inner.attempts_made,
                "Upload succeeded"
            );
            return true;
        }

        if inner.remaining_attempts == 0 {
            inner.resolve(UnitOutcome::RetriesExhausted);
            warn!(
                unit_id = %self.id,
                index = self.index,
                attempts = inner.attempts_made,
                "Upload failed, retries exhausted"
            );
            return true;
        }

        debug!(
            operation = operations::UNIT_RETRY_SCHEDULED,
            unit_id = %self.id,
            attempt = attempt,
            remaining_attempts = inner.remaining_attempts,
            "Upload attempt failed, retrying"
        );
        false
    }
}

impl<T> fmt::Debug for RetryingUnit<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("RetryingUnit")
            .field("id", &self.id)
            .field("index", &self.index)
            .field("state", &inner.state)
            .field("remaining_attempts", &inner.remaining_attempts)
            .field("resolution", &inner.resolution)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UploadError;
    use crate::execution::task::Uploader;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Answers synchronously from a script; an exhausted script fails
    fn scripted(script: Vec<bool>) -> (Arc<dyn Uploader<&'static str>>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let script = Arc::new(Mutex::new(VecDeque::from(script)));
        let uploader = move |_item: &'static str, completion: UploadCompletion| {
            counter.fetch_add(1, Ordering::SeqCst);
            let success = script.lock().pop_front().unwrap_or(false);
            completion.complete(success);
        };
        (Arc::new(uploader), calls)
    }

    /// Holds on to every completion it receives without answering
    fn stalling() -> (
        Arc<dyn Uploader<&'static str>>,
        Arc<Mutex<Vec<UploadCompletion>>>,
    ) {
        let held = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&held);
        let uploader = move |_item: &'static str, completion: UploadCompletion| {
            sink.lock().push(completion);
        };
        (Arc::new(uploader), held)
    }

    fn unit(uploader: Arc<dyn Uploader<&'static str>>, attempts: u32) -> RetryingUnit<&'static str> {
        RetryingUnit::new(UploadTask::new("item", uploader), attempts).unwrap()
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let (uploader, _) = scripted(vec![]);
        let result = RetryingUnit::new(UploadTask::new("item", uploader), 0);
        assert!(matches!(result, Err(UploadError::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn test_always_failing_uses_every_attempt() {
        let (uploader, calls) = scripted(vec![false, false, false, false]);
        let unit = unit(uploader, 3);

        unit.run().await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(unit.state(), UnitState::Finished);
        assert_eq!(unit.resolution(), Some(UnitOutcome::RetriesExhausted));
        assert_eq!(unit.outcome(), Some(false));
        assert_eq!(unit.remaining_attempts(), 0);
    }

    #[tokio::test]
    async fn test_success_stops_retrying() {
        let (uploader, calls) = scripted(vec![false, true, true]);
        let unit = unit(uploader, 4);

        unit.run().await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(unit.outcome(), Some(true));
        assert_eq!(unit.attempts_made(), 2);
        assert_eq!(unit.remaining_attempts(), 2);
    }

    #[tokio::test]
    async fn test_outcome_absent_until_terminal() {
        let (uploader, _) = scripted(vec![true]);
        let unit = unit(uploader, 1);
        assert_eq!(unit.state(), UnitState::Ready);
        assert_eq!(unit.outcome(), None);

        unit.run().await;
        assert_eq!(unit.outcome(), Some(true));
    }

    #[tokio::test]
    async fn test_cancel_before_run_never_uploads() {
        let (uploader, calls) = scripted(vec![true]);
        let unit = unit(uploader, 2);

        assert!(unit.cancel());
        unit.run().await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(unit.state(), UnitState::Cancelled);
        assert_eq!(unit.outcome(), Some(false));
        assert!(!unit.cancel());
    }

    #[tokio::test]
    async fn test_cancel_mid_flight_discards_late_answer() {
        let (uploader, held) = stalling();
        let unit = Arc::new(unit(uploader, 3));

        let runner = {
            let unit = Arc::clone(&unit);
            tokio::spawn(async move { unit.run().await })
        };

        while held.lock().is_empty() {
            tokio::task::yield_now().await;
        }
        assert_eq!(unit.state(), UnitState::Executing);

        assert!(unit.cancel());
        runner.await.unwrap();

        let late = held.lock().pop().unwrap();
        assert!(!late.is_awaited());
        late.succeed();

        assert_eq!(unit.state(), UnitState::Cancelled);
        assert_eq!(unit.resolution(), Some(UnitOutcome::Cancelled));
        assert_eq!(unit.attempts_made(), 1);
    }

    #[tokio::test]
    async fn test_cancel_during_upload_call_stops_retries() {
        let calls = Arc::new(AtomicUsize::new(0));
        let slot: Arc<std::sync::OnceLock<Arc<RetryingUnit<&'static str>>>> =
            Arc::new(std::sync::OnceLock::new());

        let uploader = {
            let calls = Arc::clone(&calls);
            let slot = Arc::clone(&slot);
            move |_item: &'static str, completion: UploadCompletion| {
                calls.fetch_add(1, Ordering::SeqCst);
                if let Some(unit) = slot.get() {
                    assert!(unit.cancel());
                }
                completion.fail();
            }
        };
        let unit = Arc::new(unit(Arc::new(uploader), 3));
        let _ = slot.set(Arc::clone(&unit));

        unit.run().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(unit.attempts_made(), 1);
        assert_eq!(unit.remaining_attempts(), 2);
        assert_eq!(unit.resolution(), Some(UnitOutcome::Cancelled));
    }

    #[tokio::test]
    async fn test_cancel_between_attempts_prevents_next_upload() {
        let (uploader, held) = stalling();
        let unit = Arc::new(unit(uploader, 3));

        let runner = {
            let unit = Arc::clone(&unit);
            tokio::spawn(async move { unit.run().await })
        };
        while held.lock().is_empty() {
            tokio::task::yield_now().await;
        }

        // Answer the first attempt and cancel before the worker resumes
        let first = held.lock().pop().unwrap();
        first.fail();
        assert!(unit.cancel());
        runner.await.unwrap();

        assert!(held.lock().is_empty());
        assert_eq!(unit.attempts_made(), 1);
        assert_eq!(unit.state(), UnitState::Cancelled);
    }

    #[tokio::test]
    async fn test_finished_unit_ignores_cancel() {
        let (uploader, _) = scripted(vec![true]);
        let unit = unit(uploader, 1);
        unit.run().await;

        assert!(!unit.cancel());
        assert_eq!(unit.resolution(), Some(UnitOutcome::Succeeded));
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let (uploader, calls) = scripted(vec![true, true]);
        let unit = unit(uploader, 2);
        unit.run().await;
        unit.run().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropped_completion_counts_as_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let uploader = move |_item: &'static str, completion: UploadCompletion| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                drop(completion);
            } else {
                completion.succeed();
            }
        };
        let unit = unit(Arc::new(uploader), 2);

        unit.run().await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(unit.outcome(), Some(true));
    }

    #[tokio::test]
    async fn test_attempt_timeout_counts_as_failure() {
        let (uploader, held) = stalling();
        let unit = unit(uploader, 2).with_attempt_timeout(Some(Duration::from_millis(10)));

        unit.run().await;

        assert_eq!(held.lock().len(), 2);
        assert_eq!(unit.resolution(), Some(UnitOutcome::RetriesExhausted));
    }

    #[tokio::test]
    async fn test_panicking_upload_counts_as_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let uploader = move |_item: &'static str, completion: UploadCompletion| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("transport exploded");
            }
            completion.succeed();
        };
        let unit = unit(Arc::new(uploader), 2);

        unit.run().await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(unit.outcome(), Some(true));
    }
}
