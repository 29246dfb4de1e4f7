//! Colored formatter implementation with terminal color support

use super::formatter::{report_rows, FormattingOptions, OutputFormatter};
use crate::{
    app::RunReport,
    error::{AppError, Result},
};
use colored::*;
use std::fmt::Write as _;

/// Overall health of a run, used for color coding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunHealth {
    /// Every measurement written, no failure codes
    Clean,
    /// Failure codes present but nothing lost
    Degraded,
    /// Measurements were dropped or shots errored
    Lossy,
}

impl RunHealth {
    pub fn of(report: &RunReport) -> Self {
        if report.lost() > 0 || report.execution.failed > 0 {
            Self::Lossy
        } else if report.writer.failed > 0 {
            Self::Degraded
        } else {
            Self::Clean
        }
    }

    pub fn color(&self) -> Color {
        match self {
            Self::Clean => Color::Green,
            Self::Degraded => Color::Yellow,
            Self::Lossy => Color::Red,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Degraded => "degraded",
            Self::Lossy => "lossy",
        }
    }
}

/// Formatter using ANSI colors
#[derive(Debug, Clone)]
pub struct ColoredFormatter {
    options: FormattingOptions,
}

impl ColoredFormatter {
    pub fn new(options: FormattingOptions) -> Self {
        Self { options }
    }

    fn value_color(label: &str, value: &str) -> ColoredString {
        let zero = value == "0";
        match label {
            "Lost" | "Errors" | "Dropped (full)" | "Dropped (closed)" if !zero => value.red().bold(),
            "Failed codes" | "Skipped" if !zero => value.yellow(),
            "Measured" | "Written" => value.green(),
            _ => value.normal(),
        }
    }
}

impl OutputFormatter for ColoredFormatter {
    fn format_header(&self, title: &str) -> Result<String> {
        let line = "━".repeat(title.chars().count().max(40));
        Ok(format!("{}\n{}\n{}", line.cyan(), title.bold(), line.cyan()))
    }

    fn format_run_report(&self, report: &RunReport) -> Result<String> {
        let health = RunHealth::of(report);
        let mut out = self.format_header("Shooting Summary")?;
        out.push('\n');

        for (label, value) in report_rows(report, self.options.verbose_mode) {
            writeln!(
                out,
                "  {:<18} {}",
                format!("{}:", label).as_str().dimmed(),
                Self::value_color(label, &value)
            )
            .map_err(|e| AppError::internal(format!("Formatting failed: {}", e)))?;
        }
        writeln!(out, "  {:<18} {}", "Health:".dimmed(), health.description().color(health.color()).bold())
            .map_err(|e| AppError::internal(format!("Formatting failed: {}", e)))?;

        if report.interrupted {
            out.push_str(&format!("  {}\n", "Run was interrupted before the ammo ran out".yellow()));
        }
        Ok(out)
    }

    fn format_error(&self, error: &str) -> Result<String> {
        Ok(format!("{} {}", "✗".red().bold(), error.red()))
    }

    fn format_warning(&self, warning: &str) -> Result<String> {
        Ok(format!("{} {}", "⚠".yellow().bold(), warning.yellow()))
    }

    fn format_success(&self, message: &str) -> Result<String> {
        Ok(format!("{} {}", "✓".green().bold(), message.green()))
    }
}
