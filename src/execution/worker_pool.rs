//! # Bounded Worker Pool
//!
//! Runs [`RetryingUnit`]s with at most `max_concurrency` of them holding a
//! worker slot at once. Units are admitted strictly in submission order; a
//! unit keeps its slot across all of its retries and releases it only on
//! reaching a terminal state, at which point the next pending unit is
//! admitted. Completion order is whatever the transport makes it.
//!
//! The pending queue, the running set and the cancelled flag live behind a
//! single lock, and both admission and [`WorkerPool::cancel_all`] happen under
//! it, so no unit is admitted once cancellation has begun. Cancellation is
//! sticky for the lifetime of the pool: later submissions are cancelled
//! without running.
//!
//! Every submitted unit arrives at its batch's [`CompletionBarrier`] exactly
//! once: when its worker releases the slot, or when it is cancelled straight
//! out of the pending queue.

use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::ConfigurationError;
use crate::constants::operations;
use crate::error::{Result, UploadError};
use crate::execution::barrier::CompletionBarrier;
use crate::execution::unit::RetryingUnit;

/// Point-in-time view of the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerPoolStats {
    pub max_concurrency: usize,
    /// Units currently holding a worker slot
    pub active: usize,
    /// Units waiting for admission
    pub pending: usize,
    pub cancelled: bool,
}

struct PoolEntry<T> {
    unit: Arc<RetryingUnit<T>>,
    barrier: Arc<CompletionBarrier>,
}

impl<T> Clone for PoolEntry<T> {
    fn clone(&self) -> Self {
        Self {
            unit: Arc::clone(&self.unit),
            barrier: Arc::clone(&self.barrier),
        }
    }
}

struct PoolState<T> {
    pending: VecDeque<PoolEntry<T>>,
    running: HashMap<Uuid, PoolEntry<T>>,
    cancelled: bool,
}

struct PoolShared<T> {
    max_concurrency: usize,
    runtime: Handle,
    state: Mutex<PoolState<T>>,
}

/// Bounded-concurrency executor for retrying upload units
pub struct WorkerPool<T> {
    shared: Arc<PoolShared<T>>,
}

impl<T> Clone for WorkerPool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> WorkerPool<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a pool running its units on `runtime`.
    ///
    /// A width of zero is rejected as invalid configuration.
    pub fn new(max_concurrency: usize, runtime: Handle) -> Result<Self> {
        if max_concurrency == 0 {
            return Err(UploadError::InvalidConfiguration(
                ConfigurationError::invalid_value(
                    "max_concurrent_tasks",
                    max_concurrency,
                    "worker pool width must be greater than 0",
                ),
            ));
        }

        debug!(max_concurrency = max_concurrency, "Worker pool created");

        Ok(Self {
            shared: Arc::new(PoolShared {
                max_concurrency,
                runtime,
                state: Mutex::new(PoolState {
                    pending: VecDeque::new(),
                    running: HashMap::new(),
                    cancelled: false,
                }),
            }),
        })
    }

    /// Queue `units` behind everything already submitted.
    ///
    /// `barrier` must have been created with a count of `units.len()`. An
    /// empty submission releases it straight away.
    pub fn submit(&self, units: Vec<Arc<RetryingUnit<T>>>, barrier: Arc<CompletionBarrier>) {
        if units.is_empty() {
            barrier.release_if_empty();
            return;
        }

        let entries = units.into_iter().map(|unit| PoolEntry {
            unit,
            barrier: Arc::clone(&barrier),
        });

        let rejected: Vec<PoolEntry<T>> = {
            let mut state = self.shared.state.lock();
            if state.cancelled {
                entries.collect()
            } else {
                state.pending.extend(entries);
                self.shared.admit_pending(&mut state);
                Vec::new()
            }
        };

        if !rejected.is_empty() {
            debug!(
                count = rejected.len(),
                "Pool already cancelled, rejecting submitted units"
            );
        }
        for entry in rejected {
            entry.unit.cancel();
            entry.barrier.arrive();
        }
    }
}

impl<T> WorkerPool<T> {
    /// Cancel everything: pending units are dropped from the queue without
    /// ever starting, running units are told to stop. Idempotent.
    pub fn cancel_all(&self) {
        let (pending, running, first_request) = {
            let mut state = self.shared.state.lock();
            let first_request = !state.cancelled;
            state.cancelled = true;
            let pending: Vec<PoolEntry<T>> = state.pending.drain(..).collect();
            let running: Vec<Arc<RetryingUnit<T>>> = state
                .running
                .values()
                .map(|entry| Arc::clone(&entry.unit))
                .collect();
            (pending, running, first_request)
        };

        if first_request {
            info!(
                pending = pending.len(),
                running = running.len(),
                "Cancelling worker pool"
            );
        }

        for entry in pending {
            entry.unit.cancel();
            entry.barrier.arrive();
        }

        // Their workers observe the cancellation and release the slots
        for unit in running {
            unit.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.state.lock().cancelled
    }

    pub fn stats(&self) -> WorkerPoolStats {
        let state = self.shared.state.lock();
        WorkerPoolStats {
            max_concurrency: self.shared.max_concurrency,
            active: state.running.len(),
            pending: state.pending.len(),
            cancelled: state.cancelled,
        }
    }
}

impl<T> PoolShared<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Fill free slots from the front of the queue. Caller holds the lock.
    fn admit_pending(self: &Arc<Self>, state: &mut PoolState<T>) {
        while !state.cancelled && state.running.len() < self.max_concurrency {
            let Some(entry) = state.pending.pop_front() else {
                break;
            };

            state.running.insert(entry.unit.id(), entry.clone());
            debug!(
                operation = operations::UNIT_ADMITTED,
                unit_id = %entry.unit.id(),
                index = entry.unit.index(),
                active = state.running.len(),
                pending = state.pending.len(),
                "Unit admitted"
            );

            let shared = Arc::clone(self);
            self.runtime.spawn(async move {
                let unit = Arc::clone(&entry.unit);
                if AssertUnwindSafe(unit.run()).catch_unwind().await.is_err() {
                    error!(
                        unit_id = %unit.id(),
                        "Unit worker panicked, cancelling unit to release its slot"
                    );
                    unit.cancel();
                }
                shared.release(entry);
            });
        }
    }

    /// Free a terminal unit's slot, admit the next one, then report the unit
    /// to its batch
    fn release(self: &Arc<Self>, entry: PoolEntry<T>) {
        {
            let mut state = self.state.lock();
            state.running.remove(&entry.unit.id());
            self.admit_pending(&mut state);
            debug!(
                unit_id = %entry.unit.id(),
                active = state.running.len(),
                pending = state.pending.len(),
                "Worker slot released"
            );
        }
        entry.barrier.arrive();
    }
}

impl<T> fmt::Debug for WorkerPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("WorkerPool")
            .field("max_concurrency", &self.shared.max_concurrency)
            .field("active", &state.running.len())
            .field("pending", &state.pending.len())
            .field("cancelled", &state.cancelled)
            .finish()
    }
}
