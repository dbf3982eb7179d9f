//! # System Constants
//!
//! Defaults, environment variable names and operation names that define the
//! operational boundaries of the batch upload engine.

/// Default configuration values
pub mod defaults {
    /// One attempt per item: a failed upload is not retried
    pub const RETRY_ATTEMPTS: u32 = 1;

    /// One worker slot: items upload strictly one after another
    pub const MAX_CONCURRENT_TASKS: usize = 1;
}

/// Environment variables recognised by the configuration and logging layers
pub mod env {
    /// Prefix for configuration overrides, e.g. `UPLOADER_RETRY_ATTEMPTS`
    pub const CONFIG_PREFIX: &str = "UPLOADER";
    pub const CONFIG_PATH: &str = "UPLOADER_CONFIG_PATH";

    pub const ENVIRONMENT: &str = "UPLOADER_ENV";
    pub const APP_ENVIRONMENT: &str = "APP_ENV";
    pub const LOG_FORMAT: &str = "UPLOADER_LOG_FORMAT";
}

/// Operation names used in structured log records
pub mod operations {
    pub const BATCH_SUBMITTED: &str = "batch.submitted";
    pub const BATCH_COMPLETED: &str = "batch.completed";
    pub const BATCH_CANCEL_REQUESTED: &str = "batch.cancel_requested";

    pub const UNIT_ADMITTED: &str = "unit.admitted";
    pub const UNIT_ATTEMPT_STARTED: &str = "unit.attempt_started";
    pub const UNIT_RETRY_SCHEDULED: &str = "unit.retry_scheduled";
    pub const UNIT_FINISHED: &str = "unit.finished";
    pub const UNIT_CANCELLED: &str = "unit.cancelled";
}
