//! Core formatting trait and the plain text implementation

use crate::{
    app::RunReport,
    error::{AppError, Result},
};
use std::fmt::Write as _;

/// Main trait for output formatting
pub trait OutputFormatter {
    /// Format a header section
    fn format_header(&self, title: &str) -> Result<String>;

    /// Format the end-of-run report
    fn format_run_report(&self, report: &RunReport) -> Result<String>;

    /// Format error messages
    fn format_error(&self, error: &str) -> Result<String>;

    /// Format warning messages
    fn format_warning(&self, warning: &str) -> Result<String>;

    /// Format success messages
    fn format_success(&self, message: &str) -> Result<String>;
}

/// Configuration options for formatting
#[derive(Debug, Clone, Default)]
pub struct FormattingOptions {
    /// Enable colored output
    pub enable_color: bool,
    /// Include channel and writer counters
    pub verbose_mode: bool,
}

/// Rows shared by both formatters: (label, value)
pub(super) fn report_rows(report: &RunReport, verbose: bool) -> Vec<(&'static str, String)> {
    let execution = &report.execution;
    let secs = execution.total_duration.as_secs_f64();
    let rate = if secs > 0.0 { execution.shots as f64 / secs } else { 0.0 };

    let mut rows = vec![
        ("Gun", report.gun.to_string()),
        ("Duration", format!("{:.2}s", secs)),
        ("Shots", execution.shots.to_string()),
        ("Rate", format!("{:.1}/s", rate)),
        ("Measured", execution.measured.to_string()),
        ("Skipped", execution.skipped.to_string()),
        ("Errors", execution.failed.to_string()),
        ("Written", report.writer.written.to_string()),
        ("Failed codes", report.writer.failed.to_string()),
        ("Lost", report.lost().to_string()),
        ("Phout", report.phout_file.display().to_string()),
    ];

    if verbose {
        rows.push(("Offered", report.channel.offered.to_string()));
        rows.push(("Dropped (full)", report.channel.dropped.to_string()));
        rows.push(("Dropped (closed)", report.channel.closed.to_string()));
    }
    rows
}

/// Plain text formatter, used when colors are off
#[derive(Debug, Clone)]
pub struct PlainFormatter {
    options: FormattingOptions,
}

impl PlainFormatter {
    pub fn new(options: FormattingOptions) -> Self {
        Self { options }
    }
}

impl OutputFormatter for PlainFormatter {
    fn format_header(&self, title: &str) -> Result<String> {
        let line = "=".repeat(title.len().max(40));
        Ok(format!("{}\n{}\n{}", line, title, line))
    }

    fn format_run_report(&self, report: &RunReport) -> Result<String> {
        let mut out = self.format_header("Shooting Summary")?;
        out.push('\n');

        for (label, value) in report_rows(report, self.options.verbose_mode) {
            writeln!(out, "  {:<18} {}", format!("{}:", label), value)
                .map_err(|e| AppError::internal(format!("Formatting failed: {}", e)))?;
        }
        if report.interrupted {
            out.push_str("  Run was interrupted before the ammo ran out\n");
        }
        Ok(out)
    }

    fn format_error(&self, error: &str) -> Result<String> {
        Ok(format!("ERROR: {}", error))
    }

    fn format_warning(&self, warning: &str) -> Result<String> {
        Ok(format!("WARNING: {}", warning))
    }

    fn format_success(&self, message: &str) -> Result<String> {
        Ok(format!("OK: {}", message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::tests::sample_report;

    #[test]
    fn test_plain_report() {
        let formatter = PlainFormatter::new(FormattingOptions::default());
        let out = formatter.format_run_report(&sample_report(0)).unwrap();

        assert!(out.contains("Shooting Summary"));
        assert!(out.contains("Gun:"));
        assert!(out.contains("http"));
        assert!(out.contains("40.0/s"));
        assert!(!out.contains("Offered"));
        assert!(!out.contains("interrupted"));
    }

    #[test]
    fn test_plain_verbose_report() {
        let formatter = PlainFormatter::new(FormattingOptions {
            enable_color: false,
            verbose_mode: true,
        });
        let mut report = sample_report(3);
        report.interrupted = true;
        let out = formatter.format_run_report(&report).unwrap();

        assert!(out.contains("Dropped (full):"));
        assert!(out.contains("interrupted"));
    }

    #[test]
    fn test_plain_messages() {
        let formatter = PlainFormatter::new(FormattingOptions::default());
        assert_eq!(formatter.format_error("boom").unwrap(), "ERROR: boom");
        assert_eq!(formatter.format_warning("hm").unwrap(), "WARNING: hm");
        assert_eq!(formatter.format_success("done").unwrap(), "OK: done");
    }
}
