//! BFG - command-line shooter
//!
//! Loads the configuration, fires the ammunition through the selected gun
//! and prints a summary of the run.

use bfg_shooter::{
    app::App,
    cli::Cli,
    config::{display_config_summary, load_config, validate_config},
    error::{ErrorReporter, Result},
    logging::{init_logging, LoggingConfig},
    output::OutputFormatterFactory,
    build_info,
};
use clap::Parser;
use std::process;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(message) = cli.validate() {
        eprintln!("Error: {}", message);
        process::exit(2);
    }

    let reporter = ErrorReporter::new(cli.use_colors(), cli.verbose || cli.debug);
    if let Err(e) = run_application(cli).await {
        reporter.report_error(&e);
        process::exit(e.exit_code());
    }
}

/// Main application logic
async fn run_application(cli: Cli) -> Result<()> {
    if cli.debug {
        eprintln!("{}", build_info());
        eprintln!("Debug mode enabled");
    }

    let config = load_config(cli)?;
    colored::control::set_override(config.enable_color);
    init_logging(&LoggingConfig::from_config(&config)?)?;

    if config.debug {
        eprintln!("\nConfiguration Summary:\n{}\n", display_config_summary(&config));
    }

    let warnings = validate_config(&config)?;
    for warning in &warnings {
        eprintln!("{}", warning.format(config.enable_color));
    }

    let formatter = OutputFormatterFactory::create_formatter(config.enable_color, config.verbose || config.debug);
    let report = App::new(config).run().await?;

    println!("{}", formatter.format_run_report(&report)?);
    if report.lost() > 0 {
        eprintln!(
            "{}",
            formatter.format_warning(&format!(
                "{} measurement(s) were lost; raise --capacity",
                report.lost()
            ))?
        );
    }

    Ok(())
}
