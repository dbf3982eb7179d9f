#![allow(dead_code)]

pub mod strategies;
pub mod uploaders;

pub use uploaders::*;

use std::sync::Once;

static INIT: Once = Once::new();

/// Install the structured logger once per test binary
pub fn init_test_logging() {
    INIT.call_once(|| {
        std::env::set_var("UPLOADER_ENV", "test");
        batch_uploader::logging::init_structured_logging();
    });
}
