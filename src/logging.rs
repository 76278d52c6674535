//! Logging System
//!
//! Structured logging built on the `tracing` crate. Level, format and output
//! come from configuration with `CADENCE_LOG*` environment overrides.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::error::OrchestratorError;

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: json, text
    #[serde(default = "default_format")]
    pub format: String,

    /// Output destination: stdout, file
    #[serde(default = "default_output")]
    pub output: String,

    /// Log file path (if output is "file")
    #[serde(default = "default_log_file")]
    pub file: PathBuf,

    /// Enable colored output (text format, stdout only)
    #[serde(default = "default_true")]
    pub color: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_output() -> String {
    "stdout".to_string()
}

fn default_log_file() -> PathBuf {
    PathBuf::from("cadence.log")
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_format(),
            output: default_output(),
            file: default_log_file(),
            color: default_true(),
        }
    }
}

/// Initialize the logging system.
///
/// Priority order (highest to lowest): environment variables (`CADENCE_LOG`,
/// `CADENCE_LOG_FORMAT`, `CADENCE_LOG_OUTPUT`), configuration file, defaults.
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), OrchestratorError> {
    let filter = build_env_filter(config);
    let format = determine(config, "CADENCE_LOG_FORMAT", |c| c.format.clone(), "text");
    let output = determine(config, "CADENCE_LOG_OUTPUT", |c| c.output.clone(), "stdout");

    if format != "json" && format != "text" {
        return Err(OrchestratorError::ConfigError(format!(
            "Invalid log format: {} (must be 'json' or 'text')",
            format
        )));
    }

    let base = Registry::default().with(filter);
    let use_color = config.map(|c| c.color).unwrap_or(true);

    match (format.as_str(), output.as_str()) {
        ("json", "file") => {
            let writer = open_log_file(config)?;
            base.with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(writer),
            )
            .init();
        }
        ("json", _) => {
            base.with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(std::io::stdout),
            )
            .init();
        }
        (_, "file") => {
            let writer = open_log_file(config)?;
            base.with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false)
                    .with_writer(writer),
            )
            .init();
        }
        _ => {
            base.with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(use_color)
                    .with_writer(std::io::stdout),
            )
            .init();
        }
    }

    Ok(())
}

fn build_env_filter(config: Option<&LoggingConfig>) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_env("CADENCE_LOG") {
        return filter;
    }
    let level = config.map(|c| c.level.as_str()).unwrap_or("info");
    EnvFilter::new(level)
}

fn determine(
    config: Option<&LoggingConfig>,
    env_var: &str,
    pick: impl Fn(&LoggingConfig) -> String,
    fallback: &str,
) -> String {
    if let Ok(value) = std::env::var(env_var) {
        return value;
    }
    config.map(pick).unwrap_or_else(|| fallback.to_string())
}

fn open_log_file(config: Option<&LoggingConfig>) -> Result<std::fs::File, OrchestratorError> {
    let path = config
        .map(|c| c.file.clone())
        .unwrap_or_else(default_log_file);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                OrchestratorError::ConfigError(format!("Failed to create log directory: {}", e))
            })?;
        }
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| {
            OrchestratorError::ConfigError(format!("Failed to open log file {:?}: {}", path, e))
        })
}
