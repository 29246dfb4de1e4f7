//! Configuration data model and validation

use crate::ammo::AmmoFormat;
use crate::types::{AppError, GunKind, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

/// Prefix of environment variables that become gun options
pub const GUN_OPTION_ENV_PREFIX: &str = "BFG_OPT_";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Gun variant to build (`log`, `http`, `sql`, `custom`, `scenario`, `ultimate`)
    #[serde(default = "default_gun_type")]
    pub gun_type: String,

    /// Ammunition file
    #[serde(default = "default_ammo_file")]
    pub ammo_file: PathBuf,

    /// Ammunition layout (`line` or `caseline`)
    #[serde(default = "default_ammo_format")]
    pub ammo_format: String,

    /// How many passes over the ammo file; `None` loops until interrupted
    #[serde(default = "default_loops")]
    pub loops: Option<u64>,

    /// Number of concurrent shooting workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Capacity of the result channel
    #[serde(default = "default_results_capacity")]
    pub results_capacity: usize,

    /// Where measurements are written
    #[serde(default = "default_phout_file")]
    pub phout_file: PathBuf,

    /// Free-form gun options (`base_address`, `db`, `module_path`, ...)
    #[serde(default)]
    pub gun_options: BTreeMap<String, String>,

    /// Log level name, overridden by `RUST_LOG`
    #[serde(default)]
    pub log_level: Option<String>,

    /// Log output format (`console`, `json`, `compact`)
    #[serde(default)]
    pub log_format: Option<String>,

    /// Enable colored terminal output
    #[serde(default = "default_enable_color")]
    pub enable_color: bool,

    /// Enable verbose output
    #[serde(default)]
    pub verbose: bool,

    /// Enable debug output
    #[serde(default)]
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gun_type: default_gun_type(),
            ammo_file: default_ammo_file(),
            ammo_format: default_ammo_format(),
            loops: default_loops(),
            workers: default_workers(),
            results_capacity: default_results_capacity(),
            phout_file: default_phout_file(),
            gun_options: BTreeMap::new(),
            log_level: None,
            log_format: None,
            enable_color: default_enable_color(),
            verbose: false,
            debug: false,
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parsed gun variant
    pub fn gun_kind(&self) -> Result<GunKind> {
        GunKind::from_str(&self.gun_type)
    }

    /// Parsed ammunition layout
    pub fn ammo_format(&self) -> Result<AmmoFormat> {
        AmmoFormat::from_str(&self.ammo_format)
    }

    /// Set a single gun option, replacing any previous value
    pub fn set_option<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.gun_options.insert(key.into(), value.into());
    }

    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Result<()> {
        let kind = self.gun_kind()?;
        self.ammo_format()?;

        if self.ammo_file.as_os_str().is_empty() {
            return Err(AppError::config("Ammo file cannot be empty"));
        }

        if self.phout_file.as_os_str().is_empty() {
            return Err(AppError::config("Phout file cannot be empty"));
        }

        if self.workers == 0 {
            return Err(AppError::config("Worker count must be greater than 0"));
        }

        if self.workers > 4096 {
            return Err(AppError::config("Worker count cannot exceed 4096"));
        }

        if self.results_capacity == 0 {
            return Err(AppError::config("Result channel capacity must be greater than 0"));
        }

        if self.loops == Some(0) {
            return Err(AppError::config("Loop count must be greater than 0"));
        }

        if kind == GunKind::Http {
            if let Some(base) = self.gun_options.get("base_address") {
                url::Url::parse(base).map_err(|e| {
                    AppError::config(format!("Invalid base_address '{}': {}", base, e))
                })?;
            }
        }

        Ok(())
    }

    /// Merge environment variables into this configuration
    pub fn merge_from_env(&mut self) -> Result<()> {
        if let Ok(gun_type) = std::env::var("BFG_GUN_TYPE") {
            self.gun_type = gun_type.trim().to_string();
        }

        if let Ok(ammo_file) = std::env::var("BFG_AMMO_FILE") {
            self.ammo_file = PathBuf::from(ammo_file.trim());
        }

        if let Ok(ammo_format) = std::env::var("BFG_AMMO_FORMAT") {
            self.ammo_format = ammo_format.trim().to_string();
        }

        if let Ok(loops) = std::env::var("BFG_LOOPS") {
            self.loops = parse_loops(&loops)
                .map_err(|e| AppError::config(format!("Invalid BFG_LOOPS value '{}': {}", loops, e)))?;
        }

        if let Ok(workers) = std::env::var("BFG_WORKERS") {
            self.workers = workers.trim().parse()
                .map_err(|e| AppError::config(format!("Invalid BFG_WORKERS value '{}': {}", workers, e)))?;
        }

        if let Ok(capacity) = std::env::var("BFG_RESULTS_CAPACITY") {
            self.results_capacity = capacity.trim().parse()
                .map_err(|e| AppError::config(format!("Invalid BFG_RESULTS_CAPACITY value '{}': {}", capacity, e)))?;
        }

        if let Ok(phout) = std::env::var("BFG_PHOUT_FILE") {
            self.phout_file = PathBuf::from(phout.trim());
        }

        if let Ok(level) = std::env::var("BFG_LOG_LEVEL") {
            self.log_level = Some(level.trim().to_string());
        }

        if let Ok(format) = std::env::var("BFG_LOG_FORMAT") {
            self.log_format = Some(format.trim().to_string());
        }

        if let Ok(enable_color) = std::env::var("BFG_ENABLE_COLOR") {
            self.enable_color = enable_color.trim().parse()
                .map_err(|e| AppError::config(format!("Invalid BFG_ENABLE_COLOR value '{}': {}", enable_color, e)))?;
        }

        for (name, value) in std::env::vars() {
            if let Some(key) = name.strip_prefix(GUN_OPTION_ENV_PREFIX) {
                if !key.is_empty() {
                    self.gun_options.insert(key.to_lowercase(), value);
                }
            }
        }

        Ok(())
    }
}

/// Parse a loop count where `0`, `inf` and `infinite` mean "until interrupted"
pub fn parse_loops(value: &str) -> std::result::Result<Option<u64>, std::num::ParseIntError> {
    match value.trim().to_lowercase().as_str() {
        "0" | "inf" | "infinite" => Ok(None),
        other => other.parse().map(Some),
    }
}

// Default value functions for serde
fn default_gun_type() -> String {
    crate::defaults::DEFAULT_GUN_TYPE.to_string()
}

fn default_ammo_file() -> PathBuf {
    PathBuf::from(crate::defaults::DEFAULT_AMMO_FILE)
}

fn default_ammo_format() -> String {
    AmmoFormat::Line.as_str().to_string()
}

fn default_loops() -> Option<u64> {
    Some(crate::defaults::DEFAULT_LOOPS)
}

fn default_workers() -> usize {
    crate::defaults::default_workers()
}

fn default_results_capacity() -> usize {
    crate::defaults::DEFAULT_RESULTS_CAPACITY
}

fn default_phout_file() -> PathBuf {
    PathBuf::from(crate::defaults::DEFAULT_PHOUT_FILE)
}

fn default_enable_color() -> bool {
    crate::defaults::DEFAULT_ENABLE_COLOR
}
