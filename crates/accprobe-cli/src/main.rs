//! AccProbe headless runner
//!
//! Configures an accelerometer board over a serial port, runs one or more
//! acquisitions and writes each to a CSV file.
//!
//! # Usage
//!
//! ```bash
//! # Timer-paced run of 8192 samples on the default port
//! accprobe --port /dev/ttyACM0 --selectacc 1 --accscale 1 --acqnumsamples 8192
//!
//! # Three ODR-paced runs, logging to a file as well
//! accprobe --acqodrrun --looptimes 3 --log-file debug.log
//!
//! # Try it without hardware
//! accprobe --demo --acqnumsamples 1000 --output-dir /tmp
//! ```

mod runner;

use accprobe_core::acquisition::{AcquisitionConfig, AcquisitionMode};
use accprobe_core::config::{SessionConfig, DEFAULT_PORT};
use accprobe_core::demo::DemoOpener;
use accprobe_core::protocol::{list_ports, DeviceSession, SystemClock};
use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use runner::Runner;

#[derive(Parser)]
#[command(name = "accprobe")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Acquire accelerometer data from a serial test board")]
#[command(long_about = None)]
struct Cli {
    /// Serial port of the board
    #[arg(long)]
    port: Option<String>,

    /// Serial baud rate
    #[arg(long)]
    baudrate: Option<u32>,

    /// Accelerometer to select (1-4)
    #[arg(long, default_value_t = 1)]
    selectacc: u8,

    /// Full-scale code (0-3 for 2/4/8/16 g)
    #[arg(long, default_value_t = 1)]
    accscale: u8,

    /// Output data rate code
    #[arg(long, default_value_t = 0)]
    accodr: u8,

    /// Number of samples to acquire
    #[arg(long, default_value_t = 8192)]
    acqnumsamples: u32,

    /// Decimation factor
    #[arg(long, default_value_t = 1)]
    acqdecfactor: u32,

    /// Timer sample rate in Hz
    #[arg(long, default_value_t = 8000)]
    acqtimsamplerate: u32,

    /// Pace acquisitions by the sensor output data rate
    #[arg(long, conflicts_with = "acqtimerrun")]
    acqodrrun: bool,

    /// Pace acquisitions by the board timer (default)
    #[arg(long)]
    acqtimerrun: bool,

    /// Number of acquisitions to run
    #[arg(long, default_value_t = 1)]
    looptimes: u32,

    /// JSON session configuration (link, timing, command vocabulary)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for CSV files
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Override the sensor SPI clock before acquiring
    #[arg(long)]
    spi_speed: Option<u32>,

    /// Use the simulated board instead of a serial port
    #[arg(long)]
    demo: bool,

    /// List serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Verbose mode (debug logs)
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn acquisition(&self) -> AcquisitionConfig {
        AcquisitionConfig {
            accelerometer: self.selectacc,
            scale: self.accscale,
            odr: self.accodr,
            num_samples: self.acqnumsamples,
            decimation_factor: self.acqdecfactor,
            timer_sample_rate: self.acqtimsamplerate,
        }
    }

    fn mode(&self) -> AcquisitionMode {
        if self.acqodrrun {
            AcquisitionMode::Odr
        } else {
            AcquisitionMode::Timer
        }
    }

    fn session_config(&self) -> Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => SessionConfig::for_port(DEFAULT_PORT),
        };
        if let Some(port) = &self.port {
            config.link.port_name = port.clone();
        }
        if let Some(baud) = self.baudrate {
            config.link.baud_rate = baud;
        }
        config.link.validate()?;
        Ok(config)
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let console = fmt::layer().with_writer(std::io::stderr).with_target(false);
    let file = match &cli.log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    if cli.list_ports {
        let ports = list_ports();
        if ports.is_empty() {
            println!("No serial ports found");
        }
        for port in ports {
            println!("{}", port.describe());
        }
        return Ok(());
    }

    let config = cli.session_config()?;
    tracing::info!(
        port = %config.link.port_name,
        baud = config.link.baud_rate,
        demo = cli.demo,
        "Starting acquisition runner"
    );

    let session = if cli.demo {
        let opener = DemoOpener::new(config.commands.clone(), config.endianness);
        DeviceSession::with_opener(config, Box::new(opener), Arc::new(SystemClock))
    } else {
        DeviceSession::open(config)
    };

    let mut runner = Runner::new(session, cli.acquisition(), cli.mode(), cli.output_dir.clone())
        .with_spi_speed(cli.spi_speed);
    runner.init()?;
    let files = runner.run(cli.looptimes)?;

    tracing::info!(files = files.len(), "Runner finished");
    Ok(())
}
