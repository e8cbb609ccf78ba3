#![doc(test(attr(deny(warnings))))]

//! Coop Wizard drives the multi-step signup, loan and investment forms of a
//! cooperative financial-services app: per-step validation, conditional
//! fields, remote checks and the final submission.

pub mod cli;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod errors;
pub mod flows;
pub mod utils;
pub mod wizard;

use std::sync::Once;

static INIT_TRACING: Once = Once::new();

/// Initializes global tracing and emits a startup info log.
pub fn init() {
    INIT_TRACING.call_once(|| {
        utils::init_tracing();
        tracing::info!("Coop wizard tracing initialized.");
    });
}
