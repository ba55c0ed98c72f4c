// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the scada-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::time::Duration;
use tokio::{signal, time};

use scada_acquisition::client::{Poller, ScanClient, Snapshot, TagValue};
use scada_acquisition::config::Config;

/// Tag based Modbus scan client for the simulated process controller
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Configuration file (created with defaults if missing)
    #[clap(long)]
    config: Option<PathBuf>,

    /// Controller address
    #[clap(long)]
    host: Option<String>,

    /// Controller port
    #[clap(long)]
    port: Option<u16>,

    /// Scan period in milliseconds
    #[clap(long)]
    interval_ms: Option<u64>,

    /// Stop after this many scan cycles
    #[clap(long)]
    cycles: Option<u64>,

    /// Print snapshots as JSON lines
    #[clap(long)]
    json: bool,

    /// Read a single tag and exit
    #[clap(long, value_name = "TAG", conflicts_with = "write")]
    read: Option<String>,

    /// Write a single tag and exit
    #[clap(long, value_name = "TAG=VALUE")]
    write: Option<String>,

    /// Enable verbose logging (debug level)
    #[clap(short = 'v', long = "verbose")]
    verbose: bool,
}

/// Parse a command line value: `true`/`false`, an integer, or a real number.
fn parse_value(text: &str) -> Result<TagValue> {
    if let Ok(state) = text.parse::<bool>() {
        return Ok(TagValue::Bool(state));
    }
    if let Ok(raw) = text.parse::<u16>() {
        return Ok(TagValue::Integer(raw));
    }
    text.parse::<f64>()
        .map(TagValue::Number)
        .with_context(|| format!("Invalid tag value: {text}"))
}

fn print_snapshot(snapshot: &Snapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(snapshot)?);
    } else {
        println!("{snapshot}");
    }
    Ok(())
}

async fn single_operation(client: &mut ScanClient, args: &Args) -> Result<()> {
    if !client.connect().await {
        anyhow::bail!("Could not connect to the controller");
    }

    let outcome = if let Some(name) = &args.read {
        client
            .read_tag(name)
            .await
            .map(|value| println!("{name} = {value}"))
    } else if let Some(assignment) = &args.write {
        let (name, text) = assignment
            .split_once('=')
            .context("--write expects TAG=VALUE")?;
        let value = parse_value(text)?;
        client
            .write_tag(name, value)
            .await
            .map(|()| println!("{name} <- {value}"))
    } else {
        Ok(())
    };

    client.disconnect().await;
    Ok(outcome?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .parse_default_env()
        .init();

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    let mut config = Config::from_file(&config_path)?;
    config.apply_args(
        None,
        None,
        None,
        None,
        args.host.clone(),
        args.port,
        args.interval_ms,
    );
    config
        .client
        .validate()
        .context("Invalid client configuration")?;

    let mut client = ScanClient::from_config(&config.client)?;
    if args.read.is_some() || args.write.is_some() {
        return single_operation(&mut client, &args).await;
    }

    let interval = Duration::from_millis(config.client.scan_interval_ms);
    let json = args.json;
    let mut print = move |snapshot: &Snapshot| print_snapshot(snapshot, json);

    if let Some(cycles) = args.cycles {
        let mut ticker = time::interval(interval);
        for _ in 0..cycles {
            ticker.tick().await;
            let snapshot = client.scan_cycle(Some(&mut print)).await;
            if snapshot.is_empty() {
                warn!("Cycle {}: no data acquired", snapshot.cycle());
            }
        }
        client.disconnect().await;
        return Ok(());
    }

    let poller = Poller::spawn(client, interval, print)?;
    signal::ctrl_c()
        .await
        .context("Error waiting for shutdown signal")?;
    info!("Received shutdown signal, stopping scan loop");
    poller.stop();
    poller.join().await?;
    Ok(())
}
