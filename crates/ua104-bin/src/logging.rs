// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Logging and tracing initialization.
//!
//! Level precedence: `RUST_LOG`, then `--log-level`, then `logging.level`
//! from the configuration file. Console output goes to stderr so command
//! output on stdout stays machine readable.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::layer::{Layer, Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use ua104_config::LoggingConfig;

use crate::cli::{Cli, LogFormat};
use crate::error::{BinError, BinResult};

/// Directives appended to the level so the OPC UA stack stays quiet.
const NOISY_TARGETS: &str = "opcua=warn,hyper=warn,reqwest=warn";

type Base = Layered<EnvFilter, Registry>;

// =============================================================================
// LogSettings
// =============================================================================

/// Resolved logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// Level directive.
    pub level: String,
    /// Console format.
    pub format: LogFormat,
    /// Optional log file, written without ANSI colours.
    pub file: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            file: None,
        }
    }
}

impl LogSettings {
    /// Merges the command line flags over the configuration file section.
    pub fn resolve(cli: &Cli, config: Option<&LoggingConfig>) -> Self {
        let level = cli
            .log_level
            .clone()
            .or_else(|| config.map(|c| c.level.as_str().to_string()))
            .unwrap_or_else(|| "info".to_string());
        let format = cli
            .log_format
            .or_else(|| config.map(|c| c.format.into()))
            .unwrap_or_default();

        Self {
            level,
            format,
            file: config.and_then(|c| c.file.clone()),
        }
    }
}

// =============================================================================
// Logging Initialization
// =============================================================================

/// Initializes the global subscriber.
///
/// # Errors
///
/// Fails if the level directive does not parse, the log file cannot be
/// opened, or a subscriber is already installed.
pub fn init_logging(settings: &LogSettings) -> BinResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!("{},{}", settings.level, NOISY_TARGETS))
            .map_err(|e| BinError::init(format!("invalid log level '{}': {}", settings.level, e)))?,
    };

    let file_layer = match &settings.file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| BinError::io(format!("cannot open log file {}: {}", path.display(), e)))?;
            Some(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer(settings.format))
        .with(file_layer)
        .try_init()
        .map_err(|e| BinError::init(format!("logging already initialized: {}", e)))
}

fn console_layer(format: LogFormat) -> Box<dyn Layer<Base> + Send + Sync> {
    let is_terminal = std::io::IsTerminal::is_terminal(&std::io::stderr());

    match format {
        LogFormat::Text => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(true)
            .with_ansi(is_terminal)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_ansi(is_terminal)
            .boxed(),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use ua104_config::{LogFormat as ConfigLogFormat, LogLevel};

    #[test]
    fn test_cli_wins_over_config() {
        let config = LoggingConfig {
            level: LogLevel::Warn,
            format: ConfigLogFormat::Json,
            file: Some(PathBuf::from("/var/log/ua104.log")),
        };

        let cli = Cli::parse_from(["ua104", "--log-level", "trace"]);
        let settings = LogSettings::resolve(&cli, Some(&config));
        assert_eq!(settings.level, "trace");
        assert_eq!(settings.format, LogFormat::Json);
        assert_eq!(settings.file, Some(PathBuf::from("/var/log/ua104.log")));

        let cli = Cli::parse_from(["ua104", "--log-format", "compact"]);
        let settings = LogSettings::resolve(&cli, Some(&config));
        assert_eq!(settings.level, "warn");
        assert_eq!(settings.format, LogFormat::Compact);
    }

    #[test]
    fn test_defaults_without_config() {
        let cli = Cli::parse_from(["ua104"]);
        assert_eq!(LogSettings::resolve(&cli, None), LogSettings::default());
    }
}
