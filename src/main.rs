//! CLI Entry Point for daq-acquire
//!
//! Provides command-line interface for:
//! - Waiting for the first usable device on the configured (simulated) bus
//! - Checking a configuration file
//!
//! # Usage
//!
//! Wait up to 30 seconds, showing the status as it changes:
//! ```bash
//! daq-acquire wait --config config/acquire.toml --timeout-ms 30000
//! ```
//!
//! Block silently and only report the result:
//! ```bash
//! daq-acquire wait --quiet
//! ```

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use daq_acquire::acquisition::{AcquisitionService, ScanOutcome};
use daq_acquire::config::{AcquireConfig, DEFAULT_CONFIG_PATH};
use daq_acquire::hardware::RawDevice;
use daq_acquire::logging;
use daq_acquire::status::{self, Decision, StatusModel};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "daq-acquire")]
#[command(about = "Wait for the first usable device, installing firmware where needed", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log output format (pretty, compact, json); overrides application.log_format
    #[arg(long, global = true)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan until a device is ready, an upload fails, or the timeout elapses
    Wait {
        /// Timeout in milliseconds (overrides scan.timeout_ms)
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Do not render status; block and print the result only
        #[arg(long)]
        quiet: bool,
    },

    /// Load and validate the configuration, then print it
    CheckConfig,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = AcquireConfig::load_from(&cli.config)?;
    if let Some(format) = cli.log_format {
        config.application.log_format = format;
    }
    config.validate()?;
    logging::init_from_config(&config)?;

    match cli.command {
        Commands::Wait { timeout_ms, quiet } => {
            let timeout = timeout_ms
                .map(Duration::from_millis)
                .or_else(|| config.scan.timeout());
            wait_for_device(&config, timeout, quiet)
        }
        Commands::CheckConfig => {
            println!("✅ {} is valid", cli.config.display());
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn wait_for_device(config: &AcquireConfig, timeout: Option<Duration>, quiet: bool) -> Result<ExitCode> {
    let (bus, provisioner) = config.simulated_bus();
    let mut service =
        AcquisitionService::new(bus, provisioner).with_scan_period(config.scan.period());
    service.set_timeout(timeout)?;

    println!("🔍 Scanning {} simulated device(s)...", config.devices.len());

    let device = if quiet {
        service.start_and_block(None)?
    } else {
        let events = service.events();
        let model = StatusModel::new(config.status.convenience_delay());

        let consumer = std::thread::Builder::new()
            .name("status".to_string())
            .spawn(move || -> Result<Option<Decision>> {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()?;
                let mut renderer = StatusPrinter::default();
                Ok(rt.block_on(status::follow(events, model, |m| renderer.render(m))))
            })?;

        service.start()?;
        let decision = consumer
            .join()
            .map_err(|_| anyhow!("status thread panicked"))??;

        match decision {
            Some(Decision::Accept(identity)) => service.accept(identity),
            _ => None,
        }
    };

    match device {
        Some(device) => {
            println!("✅ Acquired {}", device.display_name());
            Ok(ExitCode::SUCCESS)
        }
        None => {
            match service.wait()? {
                ScanOutcome::FirmwareUploadFailed { name, message } => {
                    eprintln!("❌ Firmware upload to {name} failed: {message}");
                }
                ScanOutcome::TimedOut => eprintln!("⏱️  No device became ready in time"),
                ScanOutcome::Ready { name, .. } => eprintln!("❌ {name} was ready but could not be taken"),
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Prints the parts of the status that changed since the last render.
#[derive(Default)]
struct StatusPrinter {
    status: String,
    error: Option<String>,
    devices: Vec<String>,
}

impl StatusPrinter {
    fn render(&mut self, model: &StatusModel) {
        if model.status() != self.status {
            self.status = model.status().to_string();
            println!("   {}", self.status);
        }
        if model.error() != self.error.as_deref() {
            self.error = model.error().map(str::to_string);
            if let Some(error) = &self.error {
                println!("   Error: {error}");
            }
        }
        if model.device_lines() != self.devices.as_slice() {
            self.devices = model.device_lines().to_vec();
            for line in &self.devices {
                println!("   - {line}");
            }
        }
    }
}
