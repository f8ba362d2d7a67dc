// SPDX-License-Identifier: Apache-2.0

//! Logging setup

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILE_PREFIX: &str = "datagate.log";
const DEFAULT_RETENTION_DAYS: u64 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level for the datagate crates. `RUST_LOG` overrides it.
    pub level: String,
    pub format: LogFormat,
    /// When set, logs go to a daily rolling JSON file in this directory.
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
    pub retention_days: u64,
    /// ANSI styling of query lines. Ignored for JSON and file output.
    pub styled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            directory: None,
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            retention_days: DEFAULT_RETENTION_DAYS,
            styled: true,
        }
    }
}

impl LoggingConfig {
    /// Whether query lines should carry ANSI styling under this config.
    pub fn styled_output(&self) -> bool {
        self.styled && self.directory.is_none() && self.format == LogFormat::Pretty
    }

    fn default_filter(&self) -> String {
        let level = &self.level;
        format!(
            "datagate={level},datagate_core={level},datagate_sql={level},datagate_drivers={level},sqlx=warn"
        )
    }
}

/// Installs the global subscriber. A second call is a no-op.
pub fn init_tracing(config: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_filter()));

    match &config.directory {
        Some(dir) => {
            let _ = fs::create_dir_all(dir);
            if let Err(e) = cleanup_old_logs(dir, &config.file_prefix, config.retention_days) {
                eprintln!("Failed to clean up old logs: {}", e);
            }

            let file_appender: RollingFileAppender =
                tracing_appender::rolling::daily(dir, &config.file_prefix);
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(file_appender)
                .json()
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_current_span(true)
                .with_span_list(true)
                .with_ansi(false)
                .with_span_events(FmtSpan::CLOSE)
                .try_init();
        }
        None if config.format == LogFormat::Json => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .json()
                .with_current_span(true)
                .with_ansi(false)
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .try_init();
        }
    }

    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let payload = panic_info.payload();
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            format!("PANIC: {}", s)
        } else if let Some(s) = payload.downcast_ref::<String>() {
            format!("PANIC: {}", s)
        } else {
            "PANIC: unknown cause".to_string()
        };

        tracing::error!(target: "panic", location = %location, message = %msg, "panicked");
        previous_hook(panic_info);
    }));

    tracing::debug!(directory = ?config.directory, "tracing initialized");
}

/// Removes rolled log files older than the retention window. Returns how
/// many files were removed.
pub fn cleanup_old_logs(log_dir: &Path, prefix: &str, retention_days: u64) -> std::io::Result<usize> {
    let now = SystemTime::now();
    let retention = Duration::from_secs(retention_days.saturating_mul(24 * 60 * 60));
    let mut removed = 0;

    for entry in fs::read_dir(log_dir)? {
        let path = entry?.path();
        let is_log = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(prefix));
        if !is_log {
            continue;
        }

        let age = fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if age.is_some_and(|age| age > retention) {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => eprintln!("Failed to remove old log file {:?}: {}", path, e),
            }
        }
    }
    Ok(removed)
}
