//! # Batch Upload Service
//!
//! Public entry point of the engine. Each call turns its items into
//! [`RetryingUnit`]s sharing the service's retry policy and transport, submits
//! them to the service's [`WorkerPool`] behind a [`CompletionBarrier`], and
//! delivers exactly one aggregate result once every unit is terminal.
//!
//! ## Aggregation rules
//!
//! - The aggregate is the logical AND of every unit's outcome.
//! - A cancelled unit counts as a failure.
//! - An empty batch succeeds (vacuous truth).
//! - The result is always dispatched onto a [`CompletionContext`], never
//!   invoked inline by the submitting call.
//!
//! ## Example
//!
//! ```rust,no_run
//! use batch_uploader::{UploadCompletion, UploadService, UploaderConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = UploadService::new(
//!     UploaderConfig::new(2, 4),
//!     |item: String, completion: UploadCompletion| {
//!         // hand `item` to the network layer, answer when it responds
//!         completion.complete(!item.is_empty());
//!     },
//! )?;
//!
//! service.upload_many(vec!["a".to_string(), "b".to_string()], |success| {
//!     println!("batch uploaded: {success}");
//! });
//!
//! let all_ok = service.upload_many_async(vec!["c".to_string()]).await;
//! # let _ = all_ok;
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

use crate::config::UploaderConfig;
use crate::constants::operations;
use crate::error::{Result, UploadError};
use crate::execution::{
    CompletionBarrier, CompletionContext, RetryingUnit, RuntimeContext, UploadTask, Uploader,
    WorkerPool, WorkerPoolStats,
};
use crate::logging::{log_batch_operation, log_unit_operation};
use crate::state_machine::UnitOutcome;

/// Final state of one item in a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemReport {
    /// Position of the item in the submitted sequence
    pub index: usize,
    /// `None` only if the unit never reached a terminal state
    pub outcome: Option<UnitOutcome>,
    /// Upload invocations made for the item
    pub attempts: u32,
}

impl ItemReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_some_and(|outcome| outcome.is_success())
    }
}

/// Per-item detail of a finished batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    /// The boolean aggregate: every item succeeded
    pub success: bool,
    pub items: Vec<ItemReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchReport {
    fn collect<T>(batch_id: Uuid, started_at: DateTime<Utc>, units: &[Arc<RetryingUnit<T>>]) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        let items: Vec<ItemReport> = units
            .iter()
            .map(|unit| ItemReport {
                index: unit.index(),
                outcome: unit.resolution(),
                attempts: unit.attempts_made(),
            })
            .collect();

        Self {
            batch_id,
            success: items.iter().all(ItemReport::is_success),
            items,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|item| item.is_success()).count()
    }

    /// Items that used up every attempt; cancelled items are not included
    pub fn failed(&self) -> usize {
        self.items
            .iter()
            .filter(|item| item.outcome == Some(UnitOutcome::RetriesExhausted))
            .count()
    }

    pub fn cancelled(&self) -> usize {
        self.items
            .iter()
            .filter(|item| item.outcome == Some(UnitOutcome::Cancelled))
            .count()
    }

    pub fn total_attempts(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.attempts)).sum()
    }
}

/// Bounded-concurrency batch uploader with per-item retry
pub struct UploadService<T> {
    config: UploaderConfig,
    attempt_limit: NonZeroU32,
    uploader: Arc<dyn Uploader<T>>,
    pool: WorkerPool<T>,
    runtime: Handle,
    default_context: Arc<dyn CompletionContext>,
}

impl<T> UploadService<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a service on the tokio runtime of the calling thread.
    ///
    /// Results are delivered on that runtime unless another context is given.
    pub fn new<U>(config: UploaderConfig, uploader: U) -> Result<Self>
    where
        U: Uploader<T>,
    {
        let runtime =
            Handle::try_current().map_err(|e| UploadError::RuntimeUnavailable(e.to_string()))?;
        Self::with_runtime(config, uploader, runtime)
    }

    /// Create a service whose workers run on `runtime`
    pub fn with_runtime<U>(config: UploaderConfig, uploader: U, runtime: Handle) -> Result<Self>
    where
        U: Uploader<T>,
    {
        Self::from_shared(config, Arc::new(uploader), runtime)
    }

    pub fn from_shared(
        config: UploaderConfig,
        uploader: Arc<dyn Uploader<T>>,
        runtime: Handle,
    ) -> Result<Self> {
        config.validate()?;
        let attempt_limit = config.attempt_limit()?;
        let pool = WorkerPool::new(config.max_concurrent_tasks, runtime.clone())?;

        debug!(
            retry_attempts = config.retry_attempts,
            max_concurrent_tasks = config.max_concurrent_tasks,
            attempt_timeout_ms = config.attempt_timeout_ms,
            "Upload service created"
        );

        Ok(Self {
            config,
            attempt_limit,
            uploader,
            pool,
            default_context: Arc::new(RuntimeContext::new(runtime.clone())),
            runtime,
        })
    }

    /// Replace the context used by the calls that do not name one
    pub fn with_completion_context(mut self, context: Arc<dyn CompletionContext>) -> Self {
        self.default_context = context;
        self
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    /// Upload one item; `callback` receives whether it was uploaded
    pub fn upload_one<F>(&self, item: T, callback: F) -> Uuid
    where
        F: FnOnce(bool) + Send + 'static,
    {
        self.upload_many(std::iter::once(item), callback)
    }

    pub fn upload_one_on<F>(&self, item: T, context: Arc<dyn CompletionContext>, callback: F) -> Uuid
    where
        F: FnOnce(bool) + Send + 'static,
    {
        self.upload_many_on(std::iter::once(item), context, callback)
    }

    /// Upload a batch; `callback` receives whether every item was uploaded.
    ///
    /// Returns the batch id used in log records.
    pub fn upload_many<I, F>(&self, items: I, callback: F) -> Uuid
    where
        I: IntoIterator<Item = T>,
        F: FnOnce(bool) + Send + 'static,
    {
        self.upload_many_on(items, Arc::clone(&self.default_context), callback)
    }

    /// Upload a batch, delivering the aggregate on `context`
    pub fn upload_many_on<I, F>(
        &self,
        items: I,
        context: Arc<dyn CompletionContext>,
        callback: F,
    ) -> Uuid
    where
        I: IntoIterator<Item = T>,
        F: FnOnce(bool) + Send + 'static,
    {
        self.submit_batch(items, context, move |report| callback(report.success))
    }

    /// Upload a batch, delivering per-item detail on `context`
    pub fn upload_many_detailed<I, F>(
        &self,
        items: I,
        context: Arc<dyn CompletionContext>,
        callback: F,
    ) -> Uuid
    where
        I: IntoIterator<Item = T>,
        F: FnOnce(BatchReport) + Send + 'static,
    {
        self.submit_batch(items, context, callback)
    }

    /// Upload a batch and wait for the aggregate.
    ///
    /// The awaiting task is the caller-facing context here, so the result is
    /// handed over on the service runtime rather than the default context.
    pub async fn upload_many_async<I>(&self, items: I) -> bool
    where
        I: IntoIterator<Item = T>,
    {
        let (sender, receiver) = oneshot::channel();
        let context = Arc::new(RuntimeContext::new(self.runtime.clone()));
        self.upload_many_on(items, context, move |success| {
            let _ = sender.send(success);
        });
        receiver.await.unwrap_or(false)
    }

    pub async fn upload_one_async(&self, item: T) -> bool {
        self.upload_many_async(std::iter::once(item)).await
    }

    /// Cancel every pending and running unit of every batch.
    ///
    /// Outstanding batches still deliver their result, which is `false`. The
    /// service accepts no new work afterwards: later batches resolve to
    /// `false` without uploading (an empty batch still resolves to `true`).
    pub fn cancel(&self) {
        debug!(
            operation = operations::BATCH_CANCEL_REQUESTED,
            "Upload service cancellation requested"
        );
        self.pool.cancel_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.pool.is_cancelled()
    }

    pub fn stats(&self) -> WorkerPoolStats {
        self.pool.stats()
    }

    fn submit_batch<I, F>(&self, items: I, context: Arc<dyn CompletionContext>, deliver: F) -> Uuid
    where
        I: IntoIterator<Item = T>,
        F: FnOnce(BatchReport) + Send + 'static,
    {
        let batch_id = Uuid::new_v4();
        let started_at = Utc::now();
        let attempt_timeout = self.config.attempt_timeout();

        let units: Vec<Arc<RetryingUnit<T>>> = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                let task = UploadTask::new(item, Arc::clone(&self.uploader));
                Arc::new(
                    RetryingUnit::with_attempt_limit(task, self.attempt_limit)
                        .with_index(index)
                        .with_attempt_timeout(attempt_timeout),
                )
            })
            .collect();

        log_batch_operation(
            operations::BATCH_SUBMITTED,
            batch_id,
            units.len(),
            "submitted",
            None,
        );

        let observed = units.clone();
        let barrier = Arc::new(CompletionBarrier::new(units.len(), move || {
            let report = BatchReport::collect(batch_id, started_at, &observed);

            for unit in &observed {
                let operation = match unit.resolution() {
                    Some(UnitOutcome::Cancelled) => operations::UNIT_CANCELLED,
                    _ => operations::UNIT_FINISHED,
                };
                let status = unit
                    .resolution()
                    .map(|outcome| outcome.to_string())
                    .unwrap_or_else(|| "unresolved".to_string());
                log_unit_operation(
                    operation,
                    batch_id,
                    unit.id(),
                    unit.index(),
                    unit.attempts_made(),
                    &status,
                );
            }

            let details = format!(
                "{} succeeded, {} failed, {} cancelled",
                report.succeeded(),
                report.failed(),
                report.cancelled()
            );
            log_batch_operation(
                operations::BATCH_COMPLETED,
                batch_id,
                report.items.len(),
                if report.success { "success" } else { "failure" },
                Some(&details),
            );

            context.dispatch(Box::new(move || deliver(report)));
        }));

        self.pool.submit(units, barrier);
        batch_id
    }
}

impl<T> Drop for UploadService<T> {
    fn drop(&mut self) {
        // Resolve outstanding batches instead of leaving them running unowned
        self.pool.cancel_all();
    }
}

impl<T> fmt::Debug for UploadService<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadService")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}
