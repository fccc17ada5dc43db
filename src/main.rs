//! pmctop - per-task hardware performance counter monitor
//!
//! This is the main entry point that resolves configuration, dispatches
//! subcommands and otherwise runs the batch refresh loop.

mod cli;
mod commands;
mod config;
mod startup_checks;

use anyhow::anyhow;
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing::{error, info};

use cli::{Args, Commands};
use commands::{
    command_batch, command_check_requirements, command_export, command_list_screens,
};
use config::{resolve_config, show_config, validate_effective_config, Config};

/// Maps a configured level name to a filter; unknown names fall back to warn.
fn parse_level(level: Option<&str>) -> LevelFilter {
    match level.map(str::to_ascii_lowercase).as_deref() {
        Some("off") => LevelFilter::OFF,
        Some("error") => LevelFilter::ERROR,
        Some("info") => LevelFilter::INFO,
        Some("debug") => LevelFilter::DEBUG,
        Some("trace") => LevelFilter::TRACE,
        _ => LevelFilter::WARN,
    }
}

/// Initializes tracing logging subsystem with configured log level.
/// Logs go to stderr; stdout carries the rows.
fn setup_logging(config: &Config) {
    let level = parse_level(config.log_level.as_deref());

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return;
    }

    info!("Logging initialized with level: {}", level);
}

/// Main application entry point.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = resolve_config(&args).map_err(|e| anyhow!("{}", e))?;
    setup_logging(&config);

    if args.show_config {
        return show_config(&config, args.config_format).map_err(|e| anyhow!("{}", e));
    }

    if let Some(Commands::CheckRequirements) = &args.command {
        return command_check_requirements(&config);
    }

    let catalog = config.catalog();

    if args.check_config {
        if let Err(e) = validate_effective_config(&config, &catalog) {
            eprintln!("❌ Configuration invalid: {}", e);
            std::process::exit(1);
        }
        for diagnostic in catalog.diagnostics() {
            println!("⚠️  {}", diagnostic);
        }
        println!("✅ Configuration is valid");
        return Ok(());
    }

    match &args.command {
        Some(Commands::ListScreens { verbose }) => {
            return command_list_screens(&catalog, *verbose);
        }
        Some(Commands::Export { output }) => {
            return command_export(&config, &catalog, args.config_format, output.clone());
        }
        Some(Commands::CheckRequirements) | None => {}
    }

    if let Err(e) = validate_effective_config(&config, &catalog) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }

    info!("Starting pmctop");

    if let Err(e) = startup_checks::validate_requirements(
        &config.proc_root(),
        config.show_kernel.unwrap_or(false),
    ) {
        error!("❌ Startup validation failed: {}", e);
        error!("   Tasks will be listed but counters may be unavailable");
    }

    let sort = args.sort.to_order(args.ascending);
    command_batch(&config, catalog, sort).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level(Some("debug")), LevelFilter::DEBUG);
        assert_eq!(parse_level(Some("TRACE")), LevelFilter::TRACE);
        assert_eq!(parse_level(Some("off")), LevelFilter::OFF);
        assert_eq!(parse_level(Some("bogus")), LevelFilter::WARN);
        assert_eq!(parse_level(None), LevelFilter::WARN);
    }
}
