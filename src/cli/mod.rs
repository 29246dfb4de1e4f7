//! Command-line interface

use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// BFG - fire ammunition at a target through a pluggable gun and record phout results
#[derive(Parser, Debug, Clone)]
#[command(name = "bfg")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Gun type: log, http, sql, custom, scenario, ultimate
    #[arg(short, long)]
    pub gun: Option<String>,

    /// Ammunition file
    #[arg(short, long, value_name = "FILE")]
    pub ammo: Option<PathBuf>,

    /// Ammunition layout: line or caseline
    #[arg(long, value_name = "FORMAT")]
    pub ammo_format: Option<String>,

    /// Passes over the ammo file (0 or "inf" loops until interrupted)
    #[arg(short, long, value_parser = parse_loops_arg)]
    pub loops: Option<LoopCount>,

    /// Number of concurrent workers
    #[arg(short, long, value_parser = parse_workers)]
    pub workers: Option<usize>,

    /// Result channel capacity
    #[arg(long)]
    pub capacity: Option<usize>,

    /// Phout output file
    #[arg(short, long, value_name = "FILE")]
    pub phout: Option<PathBuf>,

    /// Gun option as key=value (can be used multiple times)
    #[arg(short = 'o', long = "option", value_name = "KEY=VALUE", value_parser = parse_key_value, action = ArgAction::Append)]
    pub options: Vec<(String, String)>,

    /// .env file to load before reading the environment
    #[arg(long, value_name = "FILE")]
    pub env_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (console, json, compact)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Force colored output
    #[arg(long)]
    pub color: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Enable verbose output
    #[arg(long)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(long)]
    pub debug: bool,
}

/// Parsed `--loops` value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopCount(pub Option<u64>);

impl Cli {
    /// Validate CLI arguments for conflicts and requirements
    pub fn validate(&self) -> Result<(), String> {
        if self.color && self.no_color {
            return Err("Cannot specify both --color and --no-color".to_string());
        }

        if let Some(capacity) = self.capacity {
            if capacity == 0 {
                return Err("--capacity must be greater than 0".to_string());
            }
        }

        Ok(())
    }

    /// Check if colors should be enabled
    pub fn use_colors(&self) -> bool {
        if self.color {
            true
        } else if self.no_color {
            false
        } else {
            supports_color()
        }
    }

    /// Get configuration summary for display
    pub fn get_config_summary(&self) -> String {
        let mut summary = String::new();

        summary.push_str("Command line overrides:\n");
        if let Some(ref gun) = self.gun {
            summary.push_str(&format!("  Gun: {}\n", gun));
        }
        if let Some(ref ammo) = self.ammo {
            summary.push_str(&format!("  Ammo: {}\n", ammo.display()));
        }
        if let Some(LoopCount(loops)) = self.loops {
            match loops {
                Some(loops) => summary.push_str(&format!("  Loops: {}\n", loops)),
                None => summary.push_str("  Loops: until interrupted\n"),
            }
        }
        if let Some(workers) = self.workers {
            summary.push_str(&format!("  Workers: {}\n", workers));
        }
        for (key, value) in &self.options {
            summary.push_str(&format!("  Option {}: {}\n", key, value));
        }
        summary.push_str(&format!("  Colored output: {}\n", self.use_colors()));
        summary.push_str(&format!("  Verbose mode: {}\n", self.verbose));
        summary.push_str(&format!("  Debug mode: {}\n", self.debug));

        summary
    }
}

fn parse_loops_arg(s: &str) -> Result<LoopCount, String> {
    crate::models::config::parse_loops(s)
        .map(LoopCount)
        .map_err(|_| format!("Invalid loop count: {}", s))
}

fn parse_workers(s: &str) -> Result<usize, String> {
    if s.starts_with('+') {
        return Err(format!("Invalid worker count: {}", s));
    }
    match s.parse::<usize>() {
        Ok(0) => Err("Worker count must be greater than 0".to_string()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("Invalid worker count: {}", s)),
    }
}

/// Parse `key=value`; the value may itself contain `=`
fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("Expected KEY=VALUE, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("Empty option key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Check if the terminal supports color output
fn supports_color() -> bool {
    if let Ok(term) = std::env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    if std::env::var("FORCE_COLOR").is_ok() {
        return true;
    }

    #[cfg(unix)]
    {
        true
    }
    #[cfg(not(unix))]
    {
        false
    }
}
