//! Logging and tracing configuration
//!
//! Logs go to stderr so they never mix with the runner's report on stdout.
//! A log file can be added for long runs; it is written through a
//! non-blocking appender, so the returned guard must be held until exit.

use std::path::Path;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt, EnvFilter, Layer,
};

/// Default filter when `RUST_LOG` is unset
const DEFAULT_FILTER: &str = "terraprobe=info,warn";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn stderr_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
}

/// Initialize tracing for the CLI
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate, WARN for dependencies.
pub fn init(log_file: Option<&Path>) -> Option<WorkerGuard> {
    let Some(path) = log_file else {
        tracing_subscriber::registry()
            .with(env_filter())
            .with(stderr_layer())
            .init();
        return None;
    };

    let file = path
        .parent()
        .map(std::fs::create_dir_all)
        .transpose()
        .and_then(|_| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
        });

    match file {
        Ok(file) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);

            tracing_subscriber::registry()
                .with(env_filter())
                .with(file_layer)
                .with(stderr_layer())
                .init();

            Some(guard)
        }
        Err(e) => {
            eprintln!("Warning: Could not open log file '{}': {}", path.display(), e);
            tracing_subscriber::registry()
                .with(env_filter())
                .with(stderr_layer())
                .init();
            None
        }
    }
}
