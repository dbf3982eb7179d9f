//! # Structured Logging Module
//!
//! Environment-aware structured logging for the upload engine. The library
//! itself only emits `tracing` events; binaries and test harnesses call
//! [`init_structured_logging`] once to install a subscriber.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use uuid::Uuid;

use crate::constants::env;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// Console output is human readable unless `UPLOADER_LOG_FORMAT=json`.
/// `RUST_LOG` overrides the environment's default level.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level =
            std::env::var("RUST_LOG").unwrap_or_else(|_| get_log_level(&environment).to_string());
        let json = wants_json(std::env::var(env::LOG_FORMAT).ok().as_deref());

        let console_layer = (!json).then(|| {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true)
                .with_filter(EnvFilter::new(&log_level))
        });

        let json_layer = json.then(|| {
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_filter(EnvFilter::new(&log_level))
        });

        let subscriber = tracing_subscriber::registry()
            .with(console_layer)
            .with(json_layer);

        // Another component may already own the global subscriber
        if subscriber.try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            environment = %environment,
            log_level = %log_level,
            json = json,
            "Structured logging initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var(env::ENVIRONMENT)
        .or_else(|_| std::env::var(env::APP_ENVIRONMENT))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

fn wants_json(format: Option<&str>) -> bool {
    format.is_some_and(|f| f.eq_ignore_ascii_case("json"))
}

/// Log structured data for batch-level operations
pub fn log_batch_operation(
    operation: &str,
    batch_id: Uuid,
    item_count: usize,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        batch_id = %batch_id,
        item_count = item_count,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "BATCH_OPERATION"
    );
}

/// Log structured data for unit-level operations
pub fn log_unit_operation(
    operation: &str,
    batch_id: Uuid,
    unit_id: Uuid,
    index: usize,
    attempts: u32,
    status: &str,
) {
    tracing::debug!(
        operation = %operation,
        batch_id = %batch_id,
        unit_id = %unit_id,
        index = index,
        attempts = attempts,
        status = %status,
        timestamp = %Utc::now().to_rfc3339(),
        "UNIT_OPERATION"
    );
}
