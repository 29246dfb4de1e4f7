//! Output formatting for the end-of-run report
//!
//! Plain and colored renderings of the same report; the colored one is
//! picked when color output is enabled.

mod colored;
mod formatter;

pub use colored::{ColoredFormatter, RunHealth};
pub use formatter::{FormattingOptions, OutputFormatter, PlainFormatter};

/// Output formatting factory for creating appropriate formatters
pub struct OutputFormatterFactory;

impl OutputFormatterFactory {
    /// Create a formatter based on color support and preferences
    pub fn create_formatter(enable_color: bool, verbose: bool) -> Box<dyn OutputFormatter> {
        let options = FormattingOptions {
            enable_color,
            verbose_mode: verbose,
        };

        if enable_color {
            Box::new(ColoredFormatter::new(options))
        } else {
            Box::new(PlainFormatter::new(options))
        }
    }
}
