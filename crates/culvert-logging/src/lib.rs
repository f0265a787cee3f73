//! ---
//! culvert_section: "04-observability"
//! culvert_subsection: "module"
//! culvert_type: "source"
//! culvert_scope: "code"
//! culvert_description: "Tracing subscriber setup for binaries, tests and the daemon."
//! culvert_version: "v0.1.0"
//! culvert_owner: "tbd"
//! ---
#![warn(missing_docs)]

use std::path::PathBuf;

use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{info, Level};
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Registry;

const LOG_ENV: &str = "CULVERT_LOG";

static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();
static STDOUT_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Initialize a baseline subscriber for tests and short-lived CLI runs.
/// Safe to call more than once.
pub fn init() {
    let _ = Registry::default()
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(fmt::layer())
        .try_init();
}

/// Stdout log formats for the daemon.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    /// JSON lines, one event per line.
    #[default]
    StructuredJson,
    /// Human-oriented text output.
    Pretty,
}

/// File/format settings for daemon logging, embedded in the agent settings
/// document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    /// Directory receiving the rolling daily log file.
    pub directory: PathBuf,
    /// Log file name prefix; defaults to the service name.
    pub file_prefix: Option<String>,
    /// Stdout format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            file_prefix: None,
            format: LogFormat::default(),
        }
    }
}

/// Initialize the daemon subscriber: env-filtered stdout plus a rolling
/// daily JSON file for post-mortem analysis.
///
/// `CULVERT_LOG` overrides the filter; otherwise `RUST_LOG` is honoured,
/// finally defaulting to `info`.
pub fn init_daemon(service_name: &str, settings: &LoggingSettings) -> Result<()> {
    std::fs::create_dir_all(&settings.directory)?;
    let prefix = settings
        .file_prefix
        .clone()
        .unwrap_or_else(|| service_name.to_owned());

    let file_appender = daily(&settings.directory, format!("{prefix}.log"));
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let _ = FILE_GUARD.set(file_guard);
    let _ = STDOUT_GUARD.set(stdout_guard);

    let filter = match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(directive).unwrap_or_else(|err| {
            eprintln!("invalid {LOG_ENV} directive ({err}); defaulting to info logging");
            EnvFilter::new("info")
        }),
        Err(_) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let fmt_layer = match settings.format {
        LogFormat::StructuredJson => fmt::layer()
            .with_target(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .json()
            .with_writer(stdout_writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(stdout_writer)
            .boxed(),
    };

    let file_layer = fmt::layer()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .json()
        .with_writer(file_writer)
        .boxed();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(file_layer)
        .try_init()
        .ok();

    info!(
        service = %service_name,
        log_dir = %settings.directory.display(),
        format = ?settings.format,
        "tracing initialised"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init();
        init();
    }

    #[test]
    fn settings_default_to_json_in_logs_dir() {
        let settings = LoggingSettings::default();
        assert_eq!(settings.directory, PathBuf::from("logs"));
        assert_eq!(settings.format, LogFormat::StructuredJson);
        assert!(settings.file_prefix.is_none());
    }

    #[test]
    fn format_uses_kebab_case_names() {
        let json: LogFormat = serde_json::from_str("\"structured-json\"").expect("decode");
        assert_eq!(json, LogFormat::StructuredJson);
        let pretty: LogFormat = serde_json::from_str("\"pretty\"").expect("decode");
        assert_eq!(pretty, LogFormat::Pretty);
    }

    #[test]
    fn daemon_init_creates_the_log_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = LoggingSettings {
            directory: dir.path().join("nested"),
            file_prefix: Some("test".to_string()),
            format: LogFormat::Pretty,
        };
        init_daemon("culvert-test", &settings).expect("init");
        assert!(settings.directory.is_dir());
    }
}
