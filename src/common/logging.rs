//! Logging and tracing configuration
//!
//! Human-facing results go to stdout; diagnostics go through tracing to
//! stderr and, when requested, to a log file.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter from `RUST_LOG`, falling back to our defaults
fn filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("plancheck=debug,warn")
        } else {
            EnvFilter::new("plancheck=info,warn")
        }
    })
}

/// Initialize tracing for the CLI (stderr logging)
///
/// Default level is INFO for this crate, WARN for dependencies. `verbose`
/// raises this crate to DEBUG, which includes every line of tool output.
pub fn init_cli(verbose: bool) {
    tracing_subscriber::registry()
        .with(filter(verbose))
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

/// Initialize tracing to stderr plus a log file
///
/// The file layer records everything at full detail without ANSI colors.
/// The returned guard must be held until exit so buffered lines are flushed.
pub fn init_with_file(verbose: bool, log_file: &Path) -> std::io::Result<WorkerGuard> {
    let dir = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)?;
    let file_name = log_file.file_name().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "log file path has no file name")
    })?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy().into_owned())
        .build(dir)
        .map_err(std::io::Error::other)?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .compact();

    tracing_subscriber::registry()
        .with(filter(verbose))
        .with(file_layer)
        .with(stderr_layer)
        .init();

    Ok(guard)
}
