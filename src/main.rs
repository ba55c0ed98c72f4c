// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the scada-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the simulated process controller
use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;
use tokio::signal;

use scada_acquisition::client::TagMap;
use scada_acquisition::config::{self, Config};
use scada_acquisition::daemon::VirtualPlc;

/// Simulated process controller serving registers and coils over Modbus TCP
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (created with defaults if missing)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Modbus listener address
    #[arg(long)]
    address: Option<String>,

    /// Modbus listener port
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Seed making value generation reproducible
    #[arg(long)]
    seed: Option<u64>,

    /// Value generator period in milliseconds
    #[arg(long)]
    tick_interval_ms: Option<u64>,

    /// Output the configuration schema as JSON and exit
    #[arg(long)]
    show_config_schema: bool,

    /// Enable verbose logging (debug level)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Disable all logging output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.quiet {
        log::LevelFilter::Off
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .parse_default_env()
        .init();

    if args.show_config_schema {
        return config::output_config_schema();
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    let mut config = Config::from_file(&config_path)?;

    config.apply_args(
        args.address.clone(),
        args.port,
        args.seed,
        args.tick_interval_ms,
        None,
        None,
        None,
    );
    config.controller.validate().context("Invalid controller layout")?;

    // A client tag map that disagrees with the layout misreads silently
    let tags = TagMap::from_config(&config.client.tags)?;
    for mismatch in tags.check_against(&config.controller) {
        log::warn!("Client tag map mismatch: {}", mismatch);
    }

    let plc = VirtualPlc::start(&config.controller).await?;
    info!("Simulated controller listening on {}", plc.local_addr());

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal, terminating controller");
            plc.shutdown();
            plc.join().await?;
        }
        Err(err) => {
            eprintln!("Error waiting for shutdown signal: {}", err);
        }
    }

    Ok(())
}
