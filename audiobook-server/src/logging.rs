//! Tracing setup: env-filtered console output plus a daily rolling file
//! next to the binary (§6 "Persistent state layout": `logs/audiobook-
//! organizer-YYYY-MM-DD.log`), grounded on the teacher's
//! `tracing-subscriber`/`tracing-appender` combination.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_FILE_PREFIX: &str = "audiobook-organizer";

fn logs_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("logs")
}

pub fn today_log_path() -> PathBuf {
    let today = chrono::Utc::now().format("%Y-%m-%d");
    logs_dir().join(format!("{LOG_FILE_PREFIX}-{today}.log"))
}

/// Installs the global subscriber. The returned [`WorkerGuard`] must be held
/// for the process lifetime or buffered file lines are lost on exit.
pub fn init() -> anyhow::Result<WorkerGuard> {
    let dir = logs_dir();
    std::fs::create_dir_all(&dir)?;
    let file_appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(filter)
        .init();

    Ok(guard)
}
