//! # Uploader Configuration
//!
//! The recognised options are the retry policy, the worker pool width and an
//! optional per-attempt timeout. Values come from [`UploaderConfig::default`],
//! a TOML file, or `UPLOADER_*` environment variables (see [`ConfigLoader`]),
//! and are always validated before a service is built from them.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use batch_uploader::config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::from_env()?;
//! println!("{} attempts per item", config.retry_attempts);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;

use crate::constants::defaults;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

/// Upload engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct UploaderConfig {
    /// Maximum number of upload invocations per item before giving up
    pub retry_attempts: u32,

    /// Worker pool width
    pub max_concurrent_tasks: usize,

    /// Per-attempt response deadline in milliseconds; unset waits forever
    pub attempt_timeout_ms: Option<u64>,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            retry_attempts: defaults::RETRY_ATTEMPTS,
            max_concurrent_tasks: defaults::MAX_CONCURRENT_TASKS,
            attempt_timeout_ms: None,
        }
    }
}

impl UploaderConfig {
    pub fn new(retry_attempts: u32, max_concurrent_tasks: usize) -> Self {
        Self {
            retry_attempts,
            max_concurrent_tasks,
            ..Self::default()
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout_ms.map(Duration::from_millis)
    }

    /// Per-item attempt limit; zero attempts is rejected
    pub fn attempt_limit(&self) -> ConfigResult<NonZeroU32> {
        attempt_limit(self.retry_attempts)
    }

    /// Validate configuration for consistency
    pub fn validate(&self) -> ConfigResult<()> {
        self.attempt_limit()?;

        if self.max_concurrent_tasks == 0 {
            return Err(ConfigurationError::invalid_value(
                "max_concurrent_tasks",
                self.max_concurrent_tasks,
                "worker pool width must be greater than 0",
            ));
        }

        if self.attempt_timeout_ms == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "attempt_timeout_ms",
                0,
                "attempt timeout must be greater than 0 when set",
            ));
        }

        Ok(())
    }
}

/// Convert a configured attempt count into a non-zero limit
pub(crate) fn attempt_limit(retry_attempts: u32) -> ConfigResult<NonZeroU32> {
    NonZeroU32::new(retry_attempts).ok_or_else(|| {
        ConfigurationError::invalid_value(
            "retry_attempts",
            retry_attempts,
            "every item needs at least one upload attempt",
        )
    })
}
