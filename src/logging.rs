//! Structured logging setup
//!
//! All modules log through `tracing` macros. This module turns the
//! configuration into a `tracing-subscriber` pipeline writing to stderr:
//! - level from `--debug`/`--verbose`/`BFG_LOG_LEVEL`, overridden by `RUST_LOG`
//! - human-readable, compact or JSON output
//! - ANSI colors only when color output is enabled

use crate::error::{AppError, Result};
use crate::models::Config;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    /// Trace level - most detailed
    Trace = 0,
    /// Debug level - detailed information for debugging
    Debug = 1,
    /// Info level - general application information
    Info = 2,
    /// Warning level - potentially harmful situations
    Warn = 3,
    /// Error level - error events but application can continue
    Error = 4,
}

impl LogLevel {
    /// Get log level name as string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    /// Directive understood by `EnvFilter`
    pub fn directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            _ => Err(AppError::parse(format!("Invalid log level: {}", s))),
        }
    }
}

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogFormat {
    /// Human-readable console format
    Console,
    /// JSON format for structured logging
    Json,
    /// Compact single-line format
    Compact,
}

impl FromStr for LogFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "console" | "pretty" | "text" => Ok(LogFormat::Console),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(AppError::parse(format!("Invalid log format: {}", s))),
        }
    }
}

/// Resolved logging settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub use_color: bool,
    /// Include file and line of each event
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Warn,
            format: LogFormat::Console,
            use_color: true,
            include_location: false,
        }
    }
}

impl LoggingConfig {
    /// Derive logging settings from the application configuration
    ///
    /// An explicit level wins; otherwise `--debug` means debug, `--verbose`
    /// means info and the default is warn.
    pub fn from_config(config: &Config) -> Result<Self> {
        let level = match &config.log_level {
            Some(level) => level.parse()?,
            None if config.debug => LogLevel::Debug,
            None if config.verbose => LogLevel::Info,
            None => LogLevel::Warn,
        };
        let format = match &config.log_format {
            Some(format) => format.parse()?,
            None => LogFormat::Console,
        };

        Ok(Self {
            level,
            format,
            use_color: config.enable_color,
            include_location: config.debug,
        })
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.directive()))
    }
}

/// Install the global subscriber; fails if one is already installed
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.filter())
        .with_writer(std::io::stderr)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    let installed = match config.format {
        LogFormat::Console => builder.with_ansi(config.use_color).try_init(),
        LogFormat::Compact => builder.compact().with_ansi(config.use_color).try_init(),
        LogFormat::Json => builder.json().with_ansi(false).try_init(),
    };

    installed.map_err(|e| AppError::internal(format!("Failed to initialize logging: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert!("loud".parse::<LogLevel>().is_err());
        assert!(LogLevel::Trace < LogLevel::Error);
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_level_from_flags() {
        let mut config = Config::default();
        assert_eq!(LoggingConfig::from_config(&config).unwrap().level, LogLevel::Warn);

        config.verbose = true;
        assert_eq!(LoggingConfig::from_config(&config).unwrap().level, LogLevel::Info);

        config.debug = true;
        let logging = LoggingConfig::from_config(&config).unwrap();
        assert_eq!(logging.level, LogLevel::Debug);
        assert!(logging.include_location);

        config.log_level = Some("error".to_string());
        assert_eq!(LoggingConfig::from_config(&config).unwrap().level, LogLevel::Error);
    }

    #[test]
    fn test_invalid_format_rejected() {
        let mut config = Config::default();
        config.log_format = Some("yaml".to_string());
        assert!(LoggingConfig::from_config(&config).is_err());
    }
}
