//! Configuration validation utilities and rules

use crate::{
    error::Result,
    models::Config,
    types::GunKind,
};

/// Options each gun cannot start without
fn required_options(kind: GunKind) -> &'static [&'static str] {
    match kind {
        GunKind::Log => &["param"],
        GunKind::Http => &["base_address"],
        GunKind::Sql => &["db"],
        GunKind::Custom | GunKind::Scenario => &["module_path", "module_name"],
        GunKind::Ultimate => &["module_path", "module_name", "class_name"],
    }
}

/// Configuration validator with advanced validation rules
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate configuration with comprehensive checks
    pub fn validate_comprehensive(config: &Config) -> Result<Vec<ValidationWarning>> {
        config.validate()?;

        let mut warnings = Vec::new();
        warnings.extend(Self::validate_gun_options(config)?);
        warnings.extend(Self::validate_performance_settings(config));
        Ok(warnings)
    }

    /// Report gun options that are missing or will be ignored
    fn validate_gun_options(config: &Config) -> Result<Vec<ValidationWarning>> {
        let kind = config.gun_kind()?;
        let mut warnings = Vec::new();

        for key in required_options(kind) {
            if !config.gun_options.contains_key(*key) {
                warnings.push(ValidationWarning::new(
                    ValidationLevel::Error,
                    format!("{} gun requires option '{}' (use -o {}=...)", kind, key, key),
                ));
            }
        }

        if kind == GunKind::Http {
            if let Some(base) = config.gun_options.get("base_address") {
                if base.starts_with("https://") {
                    warnings.push(ValidationWarning::new(
                        ValidationLevel::Info,
                        "TLS certificates are not verified by the http gun".to_string(),
                    ));
                }
            }
        }

        if kind == GunKind::Custom {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                "custom gun is deprecated, prefer the ultimate gun".to_string(),
            ));
        }

        if !kind.is_dynamic() && config.gun_options.contains_key("module_path") {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!("module_path is ignored by the {} gun", kind),
            ));
        }

        Ok(warnings)
    }

    /// Validate performance-related settings
    fn validate_performance_settings(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        let cpus = num_cpus::get().max(1);

        if config.workers > cpus * 64 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!("{} workers on {} CPUs may saturate the shooter itself", config.workers, cpus),
            ));
        }

        if config.results_capacity < config.workers {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "Result capacity {} is below the worker count {}; results will likely be dropped",
                    config.results_capacity, config.workers
                ),
            ));
        } else if config.results_capacity > 1_000_000 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!("Result capacity {} may use a lot of memory", config.results_capacity),
            ));
        }

        if config.loops.is_none() {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                "Ammo loops until interrupted (Ctrl+C to stop)".to_string(),
            ));
        }

        warnings
    }
}

/// Validation warning levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationLevel {
    Info,
    Warning,
    Error,
}

impl ValidationLevel {
    /// Get display string for level
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

/// Configuration validation warning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    pub level: ValidationLevel,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(level: ValidationLevel, message: String) -> Self {
        Self { level, message }
    }

    /// Format warning for display
    pub fn format(&self, use_color: bool) -> String {
        use colored::Colorize;

        let tag = format!("[{}]", self.level.as_str());
        let tag = if use_color {
            match self.level {
                ValidationLevel::Info => tag.blue().to_string(),
                ValidationLevel::Warning => tag.yellow().to_string(),
                ValidationLevel::Error => tag.red().bold().to_string(),
            }
        } else {
            tag
        };
        format!("{} {}", tag, self.message)
    }
}

/// Convenience function for comprehensive configuration validation
pub fn validate_config(config: &Config) -> Result<Vec<ValidationWarning>> {
    ConfigValidator::validate_comprehensive(config)
}
