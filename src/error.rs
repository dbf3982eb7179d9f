//! Error types for the batch upload engine.
//!
//! Upload failures are never errors: a failed attempt is an
//! [`AttemptResponse`](crate::state_machine::AttemptResponse) and a failed item
//! is an [`UnitOutcome`](crate::state_machine::UnitOutcome). The variants here
//! only cover construction-time problems, which are reported loudly instead of
//! being coerced into a working setup.

use crate::config::ConfigurationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigurationError),
    #[error("No tokio runtime available: {0}")]
    RuntimeUnavailable(String),
}

pub type Result<T> = std::result::Result<T, UploadError>;
