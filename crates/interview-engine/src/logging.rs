//! Tracing subscriber setup for the engine binary and embedding services.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingSettings;
use crate::error::{QueueError, Result};

/// Configuration for the logging system
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// The log level to use
    pub level: Level,
    /// Whether to enable JSON formatting
    pub json: bool,
    /// Whether to include file and line information
    pub file_info: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: Level::INFO,
            json: false,
            file_info: false,
        }
    }
}

impl LoggingConfig {
    pub fn new(level: Level) -> Self {
        LoggingConfig {
            level,
            ..Default::default()
        }
    }

    /// Enable JSON formatting
    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    /// Enable file and line information in logs
    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }
}

impl TryFrom<&LoggingSettings> for LoggingConfig {
    type Error = QueueError;

    fn try_from(settings: &LoggingSettings) -> Result<Self> {
        let mut config = LoggingConfig::new(parse_log_level(&settings.level)?);
        if settings.json {
            config = config.with_json();
        }
        if settings.file_info {
            config = config.with_file_info();
        }
        Ok(config)
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` directives take precedence over the configured level. Fails if
/// a global subscriber is already installed.
pub fn setup_logging(config: LoggingConfig) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(config.level.into())
        .from_env_lossy();

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| QueueError::config(format!("failed to install logger: {}", e)))
}

/// Parse a log level from a string
pub fn parse_log_level(level: &str) -> Result<Level> {
    Level::from_str(level).map_err(|_| QueueError::config(format!("Invalid log level: {}", level)))
}
