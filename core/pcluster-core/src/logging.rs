//! Shared `tracing` bootstrap for every daemon in this workspace (§6 "Log
//! files"): one rolling daily log file per binary, `RUST_LOG`-overridable
//! filtering, no stdout layer in production (the log file is the contract
//! an external watchdog reads).

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initializes the global subscriber writing to `{log_dir}/{component}.log`,
/// rolled daily. The returned guard must be held for the process lifetime —
/// dropping it stops the background flush thread and silently truncates
/// buffered log lines.
pub fn init(log_dir: &Path, component: &str, default_level: &str) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(log_dir, format!("{component}.log"));
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true),
        )
        .init();

    guard
}
