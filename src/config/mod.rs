//! Configuration management module

pub mod env;
pub mod parser;
pub mod validation;

// Re-export main functionality
pub use env::EnvManager;
pub use parser::{display_config_summary, load_config, ConfigParser};
pub use validation::{validate_config, ConfigValidator, ValidationLevel, ValidationWarning};

// Re-export from models for convenience
pub use crate::models::Config;

/// Serializes tests that mutate process environment variables
#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
