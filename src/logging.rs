//! Logging setup and per-operation tracing
//!
//! Logs go to stderr so stdout stays free for the plugin handshake. Every
//! engine operation emits one INFO event at completion carrying the method
//! name and elapsed milliseconds; failures additionally log the error at
//! ERROR.

use std::future::Future;
use std::time::Instant;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

/// Install the default subscriber: stderr writer, `RUST_LOG` filtering,
/// `info` fallback, compact format. Panics if a global subscriber is
/// already set; use [`try_init`] from tests.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_file(false)
                .with_line_number(false),
        )
        .init();
}

/// Like [`init`], but returns `false` instead of panicking when a
/// subscriber is already installed.
pub fn try_init() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_file(false)
                .with_line_number(false),
        )
        .try_init()
        .is_ok()
}

/// Run one engine operation under completion logging.
pub(crate) async fn traced<T, F>(method: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let start = Instant::now();
    let result = fut.await;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    tracing::info!(method, elapsed_ms, "rpc completed");
    if let Err(err) = &result {
        tracing::error!(method, error = %err, chain = ?err, "rpc failed");
    }
    result
}
