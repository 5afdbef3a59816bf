use crate::error::{Error, Result};
use std::fs;
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_FILE: &str = "chatdesk.log";

/// Initialize tracing with a file logger; the terminal belongs to the UI.
/// The filter comes from `RUST_LOG` and defaults to `info`.
///
/// Keep the returned guard alive until exit so buffered lines are flushed.
pub fn init_tracing(log_dir: &Path) -> Result<WorkerGuard> {
    fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            fmt::Layer::new()
                .with_writer(writer)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true),
        )
        .with(filter)
        .try_init()
        .map_err(|err| Error::Io(io::Error::other(err)))?;

    tracing::debug!(
        path = %log_dir.join(LOG_FILE).display(),
        "Tracing initialized with file output. Filter configured via RUST_LOG env var."
    );

    Ok(guard)
}
