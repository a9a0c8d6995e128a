//! Tracing subscriber setup
//!
//! `RUST_LOG` overrides the configured level. Output goes to stderr, or to a
//! non-blocking file writer whose guard must live as long as the process.

use crate::config::{LogFormat, LoggingConfig};
use crate::{Error, Result};
use tracing::{field, Span};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let (writer, guard) = match &config.file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| Error::config(format!("Invalid log file: {}", path.display())))?;
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init(),
        LogFormat::Plain => registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_target(false)
                    .with_ansi(config.file.is_none()),
            )
            .try_init(),
    };

    installed.map_err(|e| Error::config(format!("Failed to initialize logging: {}", e)))?;
    Ok(guard)
}

/// Span wrapping one peer connection's read loop
pub fn connection_span(peer: &str, connection_id: &uuid::Uuid, direction: &'static str) -> Span {
    tracing::info_span!(
        "peer",
        peer = %peer,
        connection_id = %connection_id,
        direction = direction,
        identity = field::Empty,
    )
}
