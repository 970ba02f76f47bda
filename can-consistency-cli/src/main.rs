//! CAN Signal Consistency CLI Application
//!
//! This is the command-line interface for the consistency engine.
//! It uses the can-consistency library and adds:
//! - Log, property table and configuration loading from disk
//! - Parallel batch execution of many sessions
//! - A JSON batch report (file or stdout)

use anyhow::{Context, Result};
use can_consistency::Engine;
use clap::Parser;
use std::path::PathBuf;

mod batch;
mod config;
mod report;

use config::{AppConfig, SessionConfig};
use report::BatchReport;

/// CAN Signal Consistency - Compare VHAL and CAN traces
#[derive(Parser, Debug)]
#[command(name = "can-consistency-cli")]
#[command(about = "Check that VHAL property traffic and CAN signals behave consistently", long_about = None)]
#[command(version)]
struct Args {
    /// Upper-layer (VHAL/logcat) log file
    #[arg(long, value_name = "FILE", requires = "bus")]
    upper: Option<PathBuf>,

    /// Bus (CAN trace) log file
    #[arg(long, value_name = "FILE", requires = "upper")]
    bus: Option<PathBuf>,

    /// Session id for --upper/--bus
    #[arg(long, value_name = "ID", default_value = "session")]
    id: String,

    /// Property or signal name of interest (can be repeated)
    #[arg(short, long = "name", value_name = "NAME")]
    names: Vec<String>,

    /// Bug-comment text file to extract property names from
    #[arg(long, value_name = "FILE")]
    comments: Option<PathBuf>,

    /// Property table JSON file(s) (can be repeated)
    #[arg(short, long = "properties", value_name = "FILE")]
    properties: Vec<PathBuf>,

    /// Path to configuration file (config.toml) with engine settings and sessions
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output file for the JSON report (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Pretty-print the JSON report
    #[arg(long)]
    pretty: bool,

    /// Number of worker threads for batch mode
    #[arg(long, value_name = "COUNT")]
    threads: Option<usize>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("CAN Signal Consistency CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using engine library v{}", can_consistency::VERSION);

    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };
    merge_args(&mut config, &args);
    config.validate().context("Invalid command line options")?;

    if config.sessions.is_empty() {
        println!("CAN Signal Consistency - No input specified");
        println!("\nQuick Start:");
        println!("  can-consistency-cli --upper vhal.log --bus can.asc --name CLM_SWITCH_REQUEST");
        println!("  can-consistency-cli --upper vhal.log --bus can.asc --comments bug.txt -p table.json");
        println!("\nFor batch mode:");
        println!("  can-consistency-cli --config config.toml");
        println!("\nUse --help for more options");
        return Ok(());
    }

    let engine = build_engine(&config)?;
    let reports = batch::run_batch(&engine, &config.sessions, config.output.threads)?;

    let report = BatchReport::new(reports);
    log::info!("{}", report.summary_line());
    report.write_json(config.output.path.as_deref(), config.output.pretty)?;

    Ok(())
}

/// Command line options extend (inputs) or override (outputs) the config file
fn merge_args(config: &mut AppConfig, args: &Args) {
    config.input.property_files.extend(args.properties.iter().cloned());

    if let (Some(upper), Some(bus)) = (&args.upper, &args.bus) {
        config.sessions.push(SessionConfig {
            id: args.id.clone(),
            upper_log: upper.clone(),
            bus_log: bus.clone(),
            names: args.names.clone(),
            comments: args.comments.clone(),
        });
    }

    if let Some(output) = &args.output {
        config.output.path = Some(output.clone());
    }
    if args.pretty {
        config.output.pretty = true;
    }
    if args.threads.is_some() {
        config.output.threads = args.threads;
    }
}

/// Create the engine and load every property table
fn build_engine(config: &AppConfig) -> Result<Engine> {
    let mut engine = Engine::new(config.engine.clone()).context("Invalid engine configuration")?;

    for path in &config.input.property_files {
        engine
            .add_property_file(path)
            .with_context(|| format!("Failed to load property table: {:?}", path))?;
    }

    let stats = engine.property_stats();
    log::info!(
        "Property table: {} properties, {} signals",
        stats.num_properties,
        stats.num_signals
    );
    Ok(engine)
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_session_from_args() {
        let args = Args::parse_from([
            "can-consistency-cli",
            "--upper",
            "vhal.log",
            "--bus",
            "can.asc",
            "-n",
            "CLM_SWITCH_REQUEST",
            "--name",
            "CLM_SWITCH_STATUS",
            "-p",
            "table.json",
            "--threads",
            "2",
        ]);
        let mut config = AppConfig::default();
        merge_args(&mut config, &args);

        assert_eq!(config.sessions.len(), 1);
        assert_eq!(config.sessions[0].id, "session");
        assert_eq!(config.sessions[0].names.len(), 2);
        assert_eq!(config.input.property_files, vec![PathBuf::from("table.json")]);
        assert_eq!(config.output.threads, Some(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_upper_requires_bus() {
        assert!(Args::try_parse_from(["can-consistency-cli", "--upper", "vhal.log"]).is_err());
    }
}
