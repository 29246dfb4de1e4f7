//! Configuration parsing from CLI arguments and environment variables

use crate::{
    cli::{Cli, LoopCount},
    config::env::EnvManager,
    error::Result,
    models::Config,
};

/// Configuration parser that combines CLI arguments with environment variables
pub struct ConfigParser {
    cli: Cli,
}

impl ConfigParser {
    /// Create a new configuration parser with CLI arguments
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Parse and build the complete configuration
    pub fn parse(&self) -> Result<Config> {
        let mut config = Config::default();

        EnvManager::load_env_file(self.cli.env_file.as_deref(), self.cli.debug)?;
        config.merge_from_env()?;
        self.apply_cli_overrides(&mut config);

        config.validate()?;
        Ok(config)
    }

    /// Apply CLI argument overrides to configuration
    fn apply_cli_overrides(&self, config: &mut Config) {
        let cli = &self.cli;

        if let Some(ref gun) = cli.gun {
            config.gun_type = gun.clone();
        }
        if let Some(ref ammo) = cli.ammo {
            config.ammo_file = ammo.clone();
        }
        if let Some(ref format) = cli.ammo_format {
            config.ammo_format = format.clone();
        }
        if let Some(LoopCount(loops)) = cli.loops {
            config.loops = loops;
        }
        if let Some(workers) = cli.workers {
            config.workers = workers;
        }
        if let Some(capacity) = cli.capacity {
            config.results_capacity = capacity;
        }
        if let Some(ref phout) = cli.phout {
            config.phout_file = phout.clone();
        }
        for (key, value) in &cli.options {
            config.set_option(key.as_str(), value.as_str());
        }
        if let Some(ref level) = cli.log_level {
            config.log_level = Some(level.clone());
        }
        if let Some(ref format) = cli.log_format {
            config.log_format = Some(format.clone());
        }

        if cli.no_color {
            config.enable_color = false;
        } else if cli.color {
            config.enable_color = true;
        }

        // CLI-only flags
        config.verbose = cli.verbose;
        config.debug = cli.debug;

        if config.debug {
            eprintln!("Applied CLI overrides to configuration");
            eprintln!(
                "Final config: gun={}, workers={}, capacity={}",
                config.gun_type, config.workers, config.results_capacity
            );
        }
    }
}

/// Convenience function to load complete configuration from CLI arguments
pub fn load_config(cli: Cli) -> Result<Config> {
    ConfigParser::new(cli).parse()
}

/// Display configuration summary for debug purposes
pub fn display_config_summary(config: &Config) -> String {
    let mut summary = Vec::new();

    summary.push(format!("Gun: {}", config.gun_type));
    summary.push(format!("Ammo: {} ({})", config.ammo_file.display(), config.ammo_format));
    summary.push(match config.loops {
        Some(loops) => format!("Loops: {}", loops),
        None => "Loops: until interrupted".to_string(),
    });
    summary.push(format!("Workers: {}", config.workers));
    summary.push(format!("Result Capacity: {}", config.results_capacity));
    summary.push(format!("Phout: {}", config.phout_file.display()));
    for (key, value) in &config.gun_options {
        summary.push(format!("Option {}: {}", key, value));
    }
    summary.push(format!("Color Output: {}", config.enable_color));
    summary.push(format!("Verbose: {}", config.verbose));
    summary.push(format!("Debug: {}", config.debug));

    summary.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ENV_LOCK;
    use clap::Parser;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    fn parse(args: &[&str]) -> Result<Config> {
        let mut argv = vec!["bfg"];
        argv.extend_from_slice(args);
        load_config(Cli::parse_from(argv))
    }

    #[test]
    fn test_cli_overrides() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        let config = parse(&[
            "--gun", "http",
            "--ammo", "uris.txt",
            "--loops", "inf",
            "--workers", "3",
            "--capacity", "64",
            "--phout", "out.phout",
            "-o", "base_address=http://localhost:1",
            "--no-color",
            "--verbose",
        ])
        .unwrap();

        assert_eq!(config.gun_type, "http");
        assert_eq!(config.ammo_file, PathBuf::from("uris.txt"));
        assert_eq!(config.loops, None);
        assert_eq!(config.workers, 3);
        assert_eq!(config.results_capacity, 64);
        assert_eq!(config.phout_file, PathBuf::from("out.phout"));
        assert_eq!(config.gun_options["base_address"], "http://localhost:1");
        assert!(!config.enable_color);
        assert!(config.verbose);
        assert!(!config.debug);
    }

    #[test]
    fn test_env_then_cli_priority() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::set_var("BFG_WORKERS", "7");
        std::env::set_var("BFG_GUN_TYPE", "sql");
        std::env::set_var("BFG_OPT_DB", "sqlite::memory:");

        let result = parse(&["--gun", "log"]);

        std::env::remove_var("BFG_WORKERS");
        std::env::remove_var("BFG_GUN_TYPE");
        std::env::remove_var("BFG_OPT_DB");

        let config = result.unwrap();
        assert_eq!(config.workers, 7);
        assert_eq!(config.gun_type, "log");
        assert_eq!(config.gun_options["db"], "sqlite::memory:");
    }

    #[test]
    fn test_env_file_values_are_loaded() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "BFG_RESULTS_CAPACITY=123").unwrap();
        writeln!(file, "BFG_OPT_PARAM=from-file").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let result = parse(&["--env-file", &path]);

        std::env::remove_var("BFG_RESULTS_CAPACITY");
        std::env::remove_var("BFG_OPT_PARAM");

        let config = result.unwrap();
        assert_eq!(config.results_capacity, 123);
        assert_eq!(config.gun_options["param"], "from-file");
    }

    #[test]
    fn test_invalid_override_rejected() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let err = parse(&["--gun", "railgun"]).unwrap_err();
        assert_eq!(err.category(), "CONFIG");
    }

    #[test]
    fn test_display_config_summary() {
        let mut config = Config::default();
        config.loops = None;
        config.set_option("param", "x");

        let summary = display_config_summary(&config);
        assert!(summary.contains("Gun: log"));
        assert!(summary.contains("Loops: until interrupted"));
        assert!(summary.contains("Option param: x"));
    }
}
