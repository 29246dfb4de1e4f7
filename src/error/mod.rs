//! Error handling for the shooting core

use thiserror::Error;

/// Custom error types for the shooting core
#[derive(Error, Debug)]
pub enum AppError {
    /// Application configuration errors (CLI, environment, .env)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A gun option is missing or malformed
    #[error("Gun configuration error: {0}")]
    GunConfig(String),

    /// A gun extension could not be loaded
    #[error("Extension load error: {0}")]
    ExtensionLoad(String),

    /// A loaded extension failed while running
    #[error("Extension error: {0}")]
    Extension(String),

    /// Transport-level failures that could not be classified into codes
    #[error("Transport error: {0}")]
    Transport(String),

    /// Database driver failures
    #[error("Database error: {0}")]
    Database(String),

    /// The shared file lock could not be acquired within the retry budget
    #[error("Lock contention: {0}")]
    LockContention(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(String),

    /// Parsing errors (phout lines, numbers, URLs)
    #[error("Parsing error: {0}")]
    Parse(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new gun configuration error
    pub fn gun_config<S: Into<String>>(message: S) -> Self {
        Self::GunConfig(message.into())
    }

    /// Create a new extension load error
    pub fn extension_load<S: Into<String>>(message: S) -> Self {
        Self::ExtensionLoad(message.into())
    }

    /// Create a new extension runtime error
    pub fn extension<S: Into<String>>(message: S) -> Self {
        Self::Extension(message.into())
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    /// Create a new database error
    pub fn database<S: Into<String>>(message: S) -> Self {
        Self::Database(message.into())
    }

    /// Create a new lock contention error
    pub fn lock_contention<S: Into<String>>(message: S) -> Self {
        Self::LockContention(message.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io(message.into())
    }

    /// Create a new parsing error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Get error category for logging and reporting
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG",
            Self::GunConfig(_) => "GUN_CONFIG",
            Self::ExtensionLoad(_) => "EXTENSION_LOAD",
            Self::Extension(_) => "EXTENSION",
            Self::Transport(_) => "TRANSPORT",
            Self::Database(_) => "DATABASE",
            Self::LockContention(_) => "LOCK",
            Self::Validation(_) => "VALIDATION",
            Self::Io(_) => "IO",
            Self::Parse(_) => "PARSE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Shot-level errors are recorded and the run keeps going
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Database(_) | Self::Extension(_) => true,
            Self::Config(_) | Self::GunConfig(_) | Self::ExtensionLoad(_) | Self::Validation(_) => false,
            Self::LockContention(_) | Self::Io(_) | Self::Parse(_) | Self::Internal(_) => false,
        }
    }

    /// Get exit code for this error type
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::GunConfig(_) | Self::Validation(_) | Self::Parse(_) => 1,
            Self::ExtensionLoad(_) | Self::Extension(_) => 2,
            Self::Transport(_) | Self::Database(_) => 3,
            Self::LockContention(_) => 4,
            Self::Io(_) => 5,
            Self::Internal(_) => 99,
        }
    }

    /// Format error for console display with color coding
    pub fn format_for_console(&self, use_color: bool) -> String {
        let category = self.category();
        let message = self.to_string();

        if use_color {
            use colored::Colorize;
            match self {
                Self::Config(_) | Self::GunConfig(_) | Self::Validation(_) | Self::Parse(_) => {
                    format!("[{}] {}", category.red().bold(), message.red())
                }
                Self::ExtensionLoad(_) | Self::Extension(_) => {
                    format!("[{}] {}", category.magenta().bold(), message.magenta())
                }
                Self::Transport(_) | Self::Database(_) => {
                    format!("[{}] {}", category.yellow().bold(), message.yellow())
                }
                Self::LockContention(_) | Self::Io(_) => {
                    format!("[{}] {}", category.cyan().bold(), message.cyan())
                }
                Self::Internal(_) => {
                    format!("[{}] {}", category.bright_red().bold(), message.bright_red())
                }
            }
        } else {
            format!("[{}] {}", category, message)
        }
    }
}

// Standard library error conversions
impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

impl From<url::ParseError> for AppError {
    fn from(error: url::ParseError) -> Self {
        Self::parse(format!("URL parse error: {}", error))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::parse(format!("JSON parse error: {}", error))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        Self::transport(error.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> Self {
        Self::database(error.to_string())
    }
}

impl From<dotenv::Error> for AppError {
    fn from(error: dotenv::Error) -> Self {
        Self::config(format!("Environment file error: {}", error))
    }
}

impl From<std::num::ParseIntError> for AppError {
    fn from(error: std::num::ParseIntError) -> Self {
        Self::parse(format!("Integer parse error: {}", error))
    }
}

impl From<std::num::ParseFloatError> for AppError {
    fn from(error: std::num::ParseFloatError) -> Self {
        Self::parse(format!("Float parse error: {}", error))
    }
}

impl From<std::str::ParseBoolError> for AppError {
    fn from(error: std::str::ParseBoolError) -> Self {
        Self::parse(format!("Boolean parse error: {}", error))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::internal(error.to_string())
    }
}

/// Custom Result type for the application
pub type Result<T> = std::result::Result<T, AppError>;

/// Error reporter for user-facing rendering
pub struct ErrorReporter {
    pub use_color: bool,
    pub verbose: bool,
}

impl ErrorReporter {
    /// Create a new error reporter
    pub fn new(use_color: bool, verbose: bool) -> Self {
        Self { use_color, verbose }
    }

    /// Report an error to the user
    pub fn report_error(&self, error: &AppError) {
        eprintln!("{}", error.format_for_console(self.use_color));

        if self.verbose {
            if let Some(hint) = self.suggestion(error) {
                eprintln!();
                eprintln!("{}", hint);
            }
        }
    }

    /// Suggestion text for errors a user can fix themselves
    pub fn suggestion(&self, error: &AppError) -> Option<&'static str> {
        match error {
            AppError::Config(_) | AppError::GunConfig(_) => {
                Some("Check the gun options (-o key=value or BFG_OPT_<KEY>) and your .env file.")
            }
            AppError::ExtensionLoad(_) => {
                Some("Check module_path, module_name and class_name, and that the script evaluates on its own.")
            }
            AppError::LockContention(_) => {
                Some("Another reader is holding the results file; reduce the number of concurrent readers.")
            }
            _ => None,
        }
    }

    /// Get formatted error summary
    pub fn format_error_summary(&self, errors: &[AppError]) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        let mut summary = format!("Found {} error(s):", errors.len());

        let mut error_groups: std::collections::BTreeMap<&'static str, Vec<&AppError>> =
            std::collections::BTreeMap::new();
        for error in errors {
            error_groups.entry(error.category()).or_default().push(error);
        }

        for (category, group_errors) in error_groups {
            summary.push_str(&format!("\n  {}: {} error(s)", category, group_errors.len()));
            if self.verbose {
                for error in group_errors {
                    summary.push_str(&format!("\n    - {}", error));
                }
            }
        }

        summary
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let config_error = AppError::gun_config("Missing key: base_address");
        assert_eq!(config_error.category(), "GUN_CONFIG");
        assert!(!config_error.is_recoverable());
        assert_eq!(config_error.exit_code(), 1);

        let transport_error = AppError::transport("Connection reset");
        assert_eq!(transport_error.category(), "TRANSPORT");
        assert!(transport_error.is_recoverable());
        assert_eq!(transport_error.exit_code(), 3);
    }

    #[test]
    fn test_error_display() {
        let error = AppError::extension_load("Class definition for 'LoadTest' was not found in 'tank' module");
        let display = error.to_string();
        assert!(display.contains("Extension load error"));
        assert!(display.contains("LoadTest"));
    }

    #[test]
    fn test_lock_contention_is_hard_failure() {
        let error = AppError::lock_contention("results.phout is locked");
        assert!(!error.is_recoverable());
        assert_eq!(error.exit_code(), 4);
        assert_eq!(error.category(), "LOCK");
    }

    #[test]
    fn test_error_conversions() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let app_error: AppError = io_error.into();
        assert_eq!(app_error.category(), "IO");

        let parse_error = "not_a_number".parse::<i32>().unwrap_err();
        let app_error: AppError = parse_error.into();
        assert_eq!(app_error.category(), "PARSE");

        let sql_error: AppError = sqlx::Error::PoolTimedOut.into();
        assert_eq!(sql_error.category(), "DATABASE");
    }

    #[test]
    fn test_console_formatting() {
        let error = AppError::gun_config("Missing key: db");
        assert!(error.format_for_console(false).starts_with("[GUN_CONFIG]"));
        assert!(error.format_for_console(true).contains("Missing key: db"));
    }

    #[test]
    fn test_error_summary_groups_by_category() {
        let reporter = ErrorReporter::new(false, false);
        let errors = vec![
            AppError::gun_config("a"),
            AppError::transport("b"),
            AppError::gun_config("c"),
        ];

        let summary = reporter.format_error_summary(&errors);
        assert!(summary.contains("Found 3 error(s)"));
        assert!(summary.contains("GUN_CONFIG: 2 error(s)"));
        assert!(summary.contains("TRANSPORT: 1 error(s)"));
        assert_eq!(reporter.format_error_summary(&[]), "No errors");
    }

    #[test]
    fn test_suggestions() {
        let reporter = ErrorReporter::default();
        assert!(reporter.suggestion(&AppError::gun_config("x")).is_some());
        assert!(reporter.suggestion(&AppError::transport("x")).is_none());
    }
}
