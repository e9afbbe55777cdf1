//! Logging and tracing configuration
//!
//! Console logging for interactive runs, plus an optional full-detail log
//! file so a failed suite can be inspected after the fact.

use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// File name of the harness log inside the log directory
const LOG_FILE: &str = "harness.log";

fn default_filter(directives: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives))
}

/// Initialize tracing for the CLI (stderr logging)
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate, WARN for dependencies.
pub fn init_cli() {
    tracing_subscriber::registry()
        .with(default_filter("harness=info,warn"))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

/// Initialize tracing with a log file in `dir` in addition to stderr
///
/// The file gets DEBUG level for this crate with span enter/exit events.
/// The returned guard must be kept alive until the process exits, otherwise
/// buffered lines are lost.
pub fn init_file(dir: &Path) -> std::io::Result<(PathBuf, WorkerGuard)> {
    std::fs::create_dir_all(dir)?;

    let appender = tracing_appender::rolling::never(dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::ENTER | FmtSpan::EXIT);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .compact();

    tracing_subscriber::registry()
        .with(default_filter("harness=debug,info"))
        .with(file_layer)
        .with(stderr_layer)
        .init();

    Ok((dir.join(LOG_FILE), guard))
}
