//! # Execution Engine
//!
//! Tasks, the retrying unit state machine, the bounded worker pool, the
//! completion barrier and completion contexts.

pub mod barrier;
pub mod context;
pub mod task;
pub mod unit;
pub mod worker_pool;

pub use barrier::CompletionBarrier;
pub use context::{
    CompletionContext, CompletionJob, RuntimeContext, SerialQueue, SerialQueueReceiver,
};
pub use task::{AsyncUploadAdapter, AsyncUploader, UploadCompletion, UploadTask, Uploader};
pub use unit::RetryingUnit;
pub use worker_pool::{WorkerPool, WorkerPoolStats};
