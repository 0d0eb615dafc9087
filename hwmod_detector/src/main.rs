//! # Hardware Module Detector Host
//!
//! Binds the capability register described in the configuration, attaches
//! the detector, keeps it attached until SIGINT/SIGTERM and detaches again.
//!
//! # Usage
//!
//! ```bash
//! # Attach using /etc/hwmod/detector.toml, publish under /run/hwmod
//! hwmod_detector
//!
//! # Explicit register, print the snapshot once and exit
//! hwmod_detector --resource /dev/mem --offset 0x40001000 --once
//!
//! # Same, as JSON
//! hwmod_detector --resource /dev/mem --offset 0x40001000 --once --json
//! ```

use clap::Parser;
use hwmod::config::{ConfigError, ConfigLoader, LogLevel};
use hwmod::detector::config::{DetectorConfig, RegisterResource};
use hwmod::detector::consts::{COMPATIBLE, DEFAULT_CONFIG_PATH, DRIVER_NAME};
use hwmod_detector::{ModuleBits, attach_with_config, detach, with_detector};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// How often the host checks for a shutdown request
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Hardware module detector - 32-bit capability register as a bitmask
#[derive(Parser, Debug)]
#[command(name = "hwmod_detector")]
#[command(version)]
#[command(about = "Expose the hardware module register as a queryable bitmask")]
#[command(long_about = None)]
struct Args {
    /// Path to detector configuration (detector.toml).
    /// Defaults to /etc/hwmod/detector.toml when present.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Register backing file (e.g. /dev/mem); overrides [register].path
    #[arg(short, long, value_name = "PATH")]
    resource: Option<PathBuf>,

    /// Register offset within the backing file (decimal or 0x-hex)
    #[arg(short, long, value_parser = parse_offset)]
    offset: Option<u64>,

    /// Root of the published attribute tree; overrides [namespace].root
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Print the snapshot, detach and exit
    #[arg(long)]
    once: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs (and the --once snapshot) as JSON
    #[arg(long)]
    json: bool,
}

/// Snapshot printed by `--once`.
#[derive(Debug, Serialize)]
struct Snapshot {
    module_bits: String,
    mask: u32,
    present: Vec<u32>,
    node: String,
}

fn main() {
    if let Err(e) = run() {
        error!("Detector host failed: {}", e);
        eprintln!("{DRIVER_NAME}: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_config(&args)?;
    setup_tracing(&args, config.shared.log_level);

    info!(
        "{} v{} starting ({}, compatible \"{}\")",
        DRIVER_NAME,
        env!("CARGO_PKG_VERSION"),
        config.shared.service_name,
        COMPATIBLE
    );

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        flag.store(false, Ordering::SeqCst);
    })?;

    attach_with_config(&config)?;

    if args.once {
        if let Some(snapshot) = with_detector(|d| snapshot(d.module_bits(), d.node().to_string())) {
            print_snapshot(&snapshot, args.json)?;
        }
        detach();
        return Ok(());
    }

    info!(
        "Attributes published under {}",
        config.namespace.root.display()
    );
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(SHUTDOWN_POLL);
    }

    detach();
    info!("{} shutdown complete", DRIVER_NAME);
    Ok(())
}

/// Load the config file and apply CLI overrides.
fn load_config(args: &Args) -> Result<DetectorConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => DetectorConfig::load(path)?,
        None => match DetectorConfig::load(std::path::Path::new(DEFAULT_CONFIG_PATH)) {
            Ok(config) => config,
            Err(ConfigError::FileNotFound) => DetectorConfig::default(),
            Err(e) => return Err(e),
        },
    };

    if let Some(path) = &args.resource {
        let offset = args
            .offset
            .or_else(|| config.register.as_ref().map(|r| r.offset))
            .unwrap_or(0);
        config.register = Some(RegisterResource::new(path.clone(), offset));
    } else if let (Some(offset), Some(register)) = (args.offset, config.register.as_mut()) {
        register.offset = offset;
    }

    if let Some(root) = &args.root {
        config.namespace.root = root.clone();
    }

    Ok(config)
}

fn snapshot(bits: ModuleBits, node: String) -> Snapshot {
    Snapshot {
        module_bits: bits.to_string(),
        mask: bits.mask(),
        present: bits.iter_present().collect(),
        node,
    }
}

fn print_snapshot(snapshot: &Snapshot, json: bool) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
    } else {
        println!("module_bits: {}", snapshot.module_bits);
        println!("present:     {:?}", snapshot.present);
        println!("node:        {}", snapshot.node);
    }
    Ok(())
}

/// Accept `1234` or `0x4d2`.
fn parse_offset(raw: &str) -> Result<u64, String> {
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => raw.replace('_', "").parse(),
    };
    parsed.map_err(|e| format!("invalid offset {raw:?}: {e}"))
}

/// Setup tracing subscriber from CLI flags and the configured level.
fn setup_tracing(args: &Args, level: LogLevel) {
    let directive = if args.verbose {
        LogLevel::Debug.as_directive()
    } else {
        level.as_directive()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
