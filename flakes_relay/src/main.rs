//! # Show Flakes Relay Binary
//!
//! Connects to the show controller, receives channel levels and dims the
//! relay outputs with software PWM.
//!
//! # Usage
//!
//! ```bash
//! # Run with the default configuration file
//! flakes_relay --config /etc/flakes/relay.toml
//!
//! # Simulated outputs against a local controller
//! flakes_relay -s --host 127.0.0.1 --port 5466
//!
//! # Verbose JSON logging
//! flakes_relay -s -v --json
//! ```

use clap::Parser;
use flakes_common::config::{ConfigLoader, RelayConfig};
use flakes_common::consts::{DEFAULT_CONFIG_PATH, DEFAULT_DRIVER};
use flakes_relay::core::RelayCore;
use flakes_relay::error::RelayError;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Show Flakes relay - software-PWM dimming driven by a TCP controller
#[derive(Parser, Debug)]
#[command(name = "flakes_relay")]
#[command(version)]
#[command(about = "Software-PWM dimming relay driven by a remote TCP controller")]
#[command(long_about = None)]
struct Args {
    /// Path to relay configuration file (relay.toml).
    /// Built-in defaults are used if the file does not exist.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Force simulation driver
    #[arg(short = 's', long)]
    simulate: bool,

    /// Output driver to load (overrides the config file)
    #[arg(short, long)]
    driver: Option<String>,

    /// Controller host
    #[arg(long)]
    host: Option<String>,

    /// Controller port
    #[arg(long)]
    port: Option<u16>,

    /// Relay identifier sent in the handshake
    #[arg(long)]
    relay_name: Option<String>,

    /// Frame rate of the dimming loop (Hz)
    #[arg(long)]
    fps: Option<u32>,

    /// Network update rate (Hz)
    #[arg(long)]
    ups: Option<u32>,

    /// Number of output channels
    #[arg(long)]
    channels: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("flakes_relay: {e}");
            std::process::exit(1);
        }
    };

    setup_tracing(&args, &config);

    if let Err(e) = run(&args, config) {
        error!("Relay startup failed: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args, config: RelayConfig) -> Result<(), RelayError> {
    info!(
        "Show Flakes relay v{} starting as '{}'...",
        env!("CARGO_PKG_VERSION"),
        config.shared.service_name
    );

    let driver_name = if args.simulate {
        info!("Simulation mode enabled");
        DEFAULT_DRIVER.to_string()
    } else {
        config.outputs.driver.clone()
    };

    let mut core: RelayCore = RelayCore::new(config)?;

    let running = core.running_flag();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        running.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to install signal handler: {}", e);
    }

    core.init_driver(&driver_name)?;
    core.connect_tcp()?;

    if let Err(e) = core.run() {
        error!("Scheduling loop error: {}", e);
    }

    core.shutdown()?;

    let link = core.connection_stats();
    info!(
        "Relay shutdown complete ({} connects, {} reconnects, {} retries, {} updates applied)",
        link.connects, link.reconnects, link.retries, link.updates_applied
    );
    Ok(())
}

/// Load the config file (or defaults) and apply CLI overrides.
fn load_config(args: &Args) -> Result<RelayConfig, RelayError> {
    let mut config = if args.config.exists() {
        RelayConfig::load(&args.config)?
    } else {
        RelayConfig::default()
    };

    if let Some(driver) = &args.driver {
        config.outputs.driver = driver.clone();
    }
    if let Some(host) = &args.host {
        config.network.host = host.clone();
    }
    if let Some(port) = args.port {
        config.network.port = port;
    }
    if let Some(name) = &args.relay_name {
        config.network.relay_name = name.clone();
    }
    if let Some(fps) = args.fps {
        config.timing.fps = fps;
    }
    if let Some(ups) = args.ups {
        config.timing.ups = ups;
    }
    if let Some(channels) = args.channels {
        config.outputs.channel_count = channels;
    }

    config.validate()?;
    Ok(config)
}

/// Setup tracing subscriber based on CLI arguments and config.
fn setup_tracing(args: &Args, config: &RelayConfig) {
    let directive = if args.verbose {
        "debug"
    } else {
        config.shared.log_level.as_directive()
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
