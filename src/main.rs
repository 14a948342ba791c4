//! CLI entry point for the carousel link
//!
//! # Usage
//!
//! List serial ports and the auto-detected board:
//! ```bash
//! carousel ports
//! ```
//!
//! Connect and type commands (`home`, `p3`, `status`, ... ; `quit` to leave):
//! ```bash
//! carousel run --port /dev/ttyACM0
//! ```
//!
//! Show today's trial file:
//! ```bash
//! carousel today
//! ```

use anyhow::{anyhow, Context, Result};
use carousel_daq::config::{CarouselConfig, DEFAULT_CONFIG_PATH};
use carousel_daq::events::{EventSink, LogTag};
use carousel_daq::transport::{available_ports, detect_device};
use carousel_daq::{logging, CarouselLink, TrialLog};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "carousel")]
#[command(about = "Serial link and trial logger for the carousel rig", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports and mark the one that looks like the board
    Ports,

    /// Connect and forward commands from stdin
    Run {
        /// Serial port; falls back to config, then auto-detection
        #[arg(long)]
        port: Option<String>,

        /// Baud rate; falls back to config
        #[arg(long)]
        baud: Option<u32>,

        /// Configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print today's trial file and its trial count
    Today {
        /// Configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

/// Prints every event to stdout, with the trial count after each write.
struct ConsoleSink {
    store: Arc<TrialLog>,
}

impl EventSink for ConsoleSink {
    fn on_log_line(&self, text: &str, tag: LogTag) {
        println!("[{}] {}", tag, text);
    }

    fn on_status_update(&self, field: &str, value: &str) {
        println!("  {} = {}", field, value);
    }

    fn on_data_logged(&self, success: bool) {
        if success {
            println!(
                "  trials today: {} ({})",
                self.store.trial_count(),
                self.store.current_identity().display_name
            );
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ports => list_ports(),
        Commands::Run { port, baud, config } => run(port, baud, config),
        Commands::Today { config } => today(config),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<CarouselConfig> {
    let path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = CarouselConfig::load_from(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    logging::init_from_config(&config).map_err(|e| anyhow!(e))?;
    Ok(config)
}

fn list_ports() -> Result<()> {
    let ports = available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
        return Ok(());
    }

    let detected = detect_device(&ports);
    for port in &ports {
        let marker = if detected.as_deref() == Some(port.name.as_str()) {
            "*"
        } else {
            " "
        };
        println!("{} {:<20} {}", marker, port.name, port.description);
    }
    Ok(())
}

#[cfg(feature = "instrument_serial")]
fn run(port: Option<String>, baud: Option<u32>, config: Option<PathBuf>) -> Result<()> {
    use carousel_daq::transport::SerialConnector;

    let config = load_config(config)?;
    let store = Arc::new(TrialLog::from_config(&config.storage)?);

    let port = match port.or_else(|| config.serial.port.clone()) {
        Some(port) => port,
        None => detect_device(&available_ports()?)
            .ok_or_else(|| anyhow!("No carousel board detected; pass --port"))?,
    };
    let baud = baud.unwrap_or(config.serial.baud_rate);

    let sink = Arc::new(ConsoleSink {
        store: store.clone(),
    });
    let mut link = CarouselLink::new(Arc::new(SerialConnector), store, sink)
        .with_timings(config.serial.timings());

    link.connect(&port, baud)?;
    info!("Logging trials to {}", link.current_identity().full_path.display());

    for line in io::stdin().lock().lines() {
        let line = line.context("Failed to read stdin")?;
        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        if command == "quit" {
            break;
        }
        // Failures are already reported through the sink
        let _ = link.send(command);
    }

    link.disconnect();
    Ok(())
}

#[cfg(not(feature = "instrument_serial"))]
fn run(_port: Option<String>, _baud: Option<u32>, _config: Option<PathBuf>) -> Result<()> {
    Err(carousel_daq::CarouselError::SerialFeatureDisabled.into())
}

fn today(config: Option<PathBuf>) -> Result<()> {
    let config = load_config(config)?;
    let store = TrialLog::from_config(&config.storage)?;
    let identity = store.current_identity();

    println!("File:   {}", identity.display_name);
    println!("Path:   {}", identity.full_path.display());
    println!("Trials: {}", store.trial_count());
    Ok(())
}
