use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const LOG_FILE_NAME: &str = "autocounsel_log.txt";

fn log_level() -> Level {
    env::var("LOG_LEVEL")
        .map(|level| match level.to_lowercase().as_str() {
            "error" => Level::ERROR,
            "warn" => Level::WARN,
            "info" => Level::INFO,
            "debug" => Level::DEBUG,
            "trace" => Level::TRACE,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO)
}

pub fn log_dir() -> PathBuf {
    if let Ok(custom_dir) = env::var("AUTOCOUNSEL_LOG_DIR") {
        PathBuf::from(custom_dir)
    } else {
        dirs::data_local_dir()
            .unwrap_or_else(env::temp_dir)
            .join("autocounsel")
            .join("logs")
    }
}

fn filter(level: Level) -> Result<EnvFilter> {
    Ok(EnvFilter::from_default_env()
        .add_directive(level.into())
        // CDP transport chatter
        .add_directive("chromiumoxide=warn".parse().context("invalid log directive")?)
        .add_directive("tungstenite=warn".parse().context("invalid log directive")?))
}

/// Stderr plus an appending `autocounsel_log.txt`. Keep the guard alive for
/// the life of the process or buffered file output is lost.
pub fn init_logging() -> Result<WorkerGuard> {
    let level = log_level();
    let dir = log_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(&dir, LOG_FILE_NAME));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(filter(level)?),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(filter(level)?),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
