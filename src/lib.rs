#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Batch Uploader
//!
//! Bounded-concurrency execution engine for batches of independent uploads
//! against a callback-based transport.
//!
//! ## Overview
//!
//! The caller supplies the transport: a function that starts uploading one
//! item and later reports success or failure through a one-shot
//! [`UploadCompletion`]. The engine wraps every item in a retrying unit, runs
//! units on a fixed-width worker pool in submission order, retries failed
//! items in place up to the configured attempt count, and reduces the batch to
//! one boolean: did every item upload.
//!
//! ## Key Features
//!
//! - **Bounded concurrency**: at most `max_concurrent_tasks` items hold a
//!   worker slot; an item keeps its slot across its retries
//! - **Immediate fixed-attempt retry**: no backoff, no jitter
//! - **Exactly-once results**: a counting barrier fires once every unit is
//!   terminal, and the result is dispatched onto a completion context
//! - **Cooperative cancellation**: pending items never start, in-flight items
//!   stop retrying and their late answers are discarded
//!
//! ## Module Organization
//!
//! - [`services`] - The public [`UploadService`] and batch reports
//! - [`execution`] - Units, worker pool, barrier and completion contexts
//! - [`state_machine`] - Unit lifecycle states and outcomes
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use batch_uploader::{UploadCompletion, UploadService, UploaderConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     batch_uploader::logging::init_structured_logging();
//!
//!     let service = UploadService::new(
//!         UploaderConfig::new(3, 2),
//!         |item: u64, completion: UploadCompletion| {
//!             tokio::spawn(async move {
//!                 // talk to the server here
//!                 completion.complete(item % 7 != 0);
//!             });
//!         },
//!     )?;
//!
//!     let uploaded = service.upload_many_async(1..=10).await;
//!     println!("all uploaded: {uploaded}");
//!     Ok(())
//! }
//! ```
//!
//! ## Known Limitation
//!
//! Without an `attempt_timeout_ms`, a transport that holds on to its
//! completion forever occupies its worker slot forever. A transport that
//! drops its completion unanswered is detected and counted as a failed
//! attempt.

pub mod config;
pub mod constants;
pub mod error;
pub mod execution;
pub mod logging;
pub mod services;
pub mod state_machine;

pub use config::{ConfigLoader, ConfigurationError, UploaderConfig};
pub use error::{Result, UploadError};
pub use execution::{
    AsyncUploadAdapter, AsyncUploader, CompletionContext, RuntimeContext, SerialQueue,
    SerialQueueReceiver, UploadCompletion, Uploader, WorkerPoolStats,
};
pub use services::{BatchReport, ItemReport, UploadService};
pub use state_machine::{UnitOutcome, UnitState};
