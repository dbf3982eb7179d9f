//! # Completion Contexts
//!
//! A batch result is always delivered through a [`CompletionContext`], never
//! inline on the stack that submitted the batch or on the worker that
//! finished the last unit.
//!
//! - [`RuntimeContext`] runs the callback as a task on a tokio runtime. This is
//!   the service default.
//! - [`SerialQueue`] is a caller-owned serial queue: callbacks pile up until
//!   the owner drains them through its [`SerialQueueReceiver`], one at a time
//!   and in dispatch order, on whatever thread the owner chooses. Use it where
//!   results must land on one specific "main" loop.

use std::fmt;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::{Result, UploadError};

/// Deferred callback carried to a completion context
pub type CompletionJob = Box<dyn FnOnce() + Send + 'static>;

/// Where batch results are delivered
pub trait CompletionContext: Send + Sync + 'static {
    /// Schedule `job` to run later on this context.
    ///
    /// Implementations must not run `job` before returning.
    fn dispatch(&self, job: CompletionJob);
}

/// Delivers completions as tasks on a tokio runtime
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    handle: Handle,
}

impl RuntimeContext {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Context bound to the runtime of the calling thread
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| UploadError::RuntimeUnavailable(e.to_string()))
    }
}

impl CompletionContext for RuntimeContext {
    fn dispatch(&self, job: CompletionJob) {
        self.handle.spawn(async move { job() });
    }
}

/// Sending half of a caller-drained serial completion queue
#[derive(Clone)]
pub struct SerialQueue {
    sender: mpsc::UnboundedSender<CompletionJob>,
}

/// Draining half of a [`SerialQueue`]
pub struct SerialQueueReceiver {
    receiver: mpsc::UnboundedReceiver<CompletionJob>,
}

impl SerialQueue {
    pub fn new() -> (Self, SerialQueueReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, SerialQueueReceiver { receiver })
    }
}

impl CompletionContext for SerialQueue {
    fn dispatch(&self, job: CompletionJob) {
        if self.sender.send(job).is_err() {
            warn!("Serial completion queue receiver dropped, completion discarded");
        }
    }
}

impl fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialQueue")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

impl SerialQueueReceiver {
    /// Wait for the next completion and run it.
    ///
    /// Returns `false` once every [`SerialQueue`] handle is gone and the queue
    /// is drained.
    pub async fn run_next(&mut self) -> bool {
        match self.receiver.recv().await {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Run every completion already queued, without waiting; returns how many
    /// ran
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.receiver.try_recv() {
            job();
            ran += 1;
        }
        ran
    }
}

impl fmt::Debug for SerialQueueReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialQueueReceiver").finish_non_exhaustive()
    }
}
