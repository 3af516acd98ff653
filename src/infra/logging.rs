use std::fs::OpenOptions;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::infra::{config::LogConfig, error::AppError};

/// Keeps the background log writer alive; drop it last to flush file logs.
#[derive(Debug)]
pub struct LoggingGuard {
    _file_writer: Option<WorkerGuard>,
}

pub fn init(config: &LogConfig) -> Result<LoggingGuard, AppError> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
    };

    let Some(path) = config.file.as_ref() else {
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_target(true)
            .try_init()
            .map_err(AppError::LoggingInit)?;

        return Ok(LoggingGuard { _file_writer: None });
    };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| AppError::LogFileOpen {
            path: path.clone(),
            source,
        })?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_target(true)
        .with_ansi(false)
        .with_writer(writer)
        .try_init()
        .map_err(AppError::LoggingInit)?;

    Ok(LoggingGuard {
        _file_writer: Some(guard),
    })
}
