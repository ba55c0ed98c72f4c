// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the scada-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the acquisition core
//!
//! This module provides functionality for loading, validating, and applying
//! configuration settings. The configuration is backed by a YAML file and
//! validated against a JSON schema for robustness.
//!
//! ## Configuration Structure
//!
//! - `controller`: network settings and memory layout of the simulated controller
//! - `client`: connection settings and tag map of the scan client
//!
//! ## Usage
//!
//! ```no_run
//! use scada_acquisition::config::Config;
//! use std::path::Path;
//!
//! // Load config from file, creates a default if not found
//! let mut config = Config::from_file(Path::new("config.yaml")).unwrap();
//!
//! // Apply command line overrides if needed
//! config.apply_args(
//!     Some("0.0.0.0".to_string()), // Controller address
//!     Some(15020),                 // Controller port
//!     Some(42),                    // Generator seed
//!     None,                        // Tick interval
//!     None,                        // Client host
//!     Some(15020),                 // Client port
//!     None,                        // Scan interval
//! );
//!
//! println!("Controller port: {}", config.controller.port);
//! ```

pub mod client;
pub mod controller;
pub mod utils;

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};

// Re-export all types for public API
pub use client::{ClientConfig, TagConfig, TagMapConfig};
pub use controller::{
    CoilConfig, CoilRule, ControllerConfig, CounterRule, RegisterConfig, RegisterRule, WalkRule,
};
pub use utils::{is_valid_ip_address, output_config_schema};

/// Root configuration structure.
///
/// Both sections fall back to their defaults when absent, so an empty file
/// describes the aerospace demonstrator served on `127.0.0.1:5020` together
/// with the matching tag map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Simulated controller settings and memory layout.
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Scan client settings and tag map.
    #[serde(default)]
    pub client: ClientConfig,
}

impl Config {
    /// Helper method to create a sample config file when validation fails
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        let sample_path = path.with_extension("sample.yaml");
        debug!("Original path: {:?}, Sample path: {:?}", path, sample_path);

        if let Some(parent) = sample_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!("Creating parent directory: {:?}", parent);
                fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create parent directory for sample config at {:?}",
                        parent
                    )
                })?;
            }
        }

        Self::default()
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Load configuration from a file
    ///
    /// A missing file is created with the default configuration. A file that
    /// fails schema validation, deserialization or the specific rules of
    /// [`utils::validate_specific_rules`] produces an error and a
    /// `*.sample.yaml` file with defaults next to it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(
                "Configuration file not found at {:?}, creating default",
                path
            );
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        Self::from_yaml_str(&contents).or_else(|err| {
            if let Err(e) = Self::create_sample_config(path) {
                error!("Failed to create sample config: {}", e);
            }
            Err(err.context(format!("Invalid configuration file {}", path.display())))
        })
    }

    /// Parse, validate and check a YAML configuration document.
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        // An empty document means "all defaults"
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }

        // First step: convert YAML to a generic Value
        let yaml_value: serde_yml::Value =
            serde_yml::from_str(contents).context("Failed to parse YAML configuration")?;

        // Convert to JSON Value for validation
        let json_value = serde_json::to_value(&yaml_value)
            .context("Failed to convert YAML to JSON for validation")?;

        let schema: serde_json::Value =
            serde_json::from_str(utils::CONFIG_SCHEMA).context("Failed to parse JSON schema")?;

        let validator = jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(&schema)?;

        debug!("Validating configuration against schema");
        if let Err(error) = validator.validate(&json_value) {
            error!("Configuration validation error before deserialization");
            anyhow::bail!("Configuration validation failed: {}", error);
        }

        debug!("Schema validation passed, deserializing into Config structure");
        let config: Config =
            serde_yml::from_str(contents).context("Failed to deserialize configuration")?;

        // Perform additional specific validations
        utils::validate_specific_rules(&config)?;

        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Apply command line arguments to override configuration values.
    ///
    /// Only arguments that are `Some` override the loaded configuration.
    ///
    /// # Parameters
    ///
    /// * `controller_address` - Bind address of the simulated controller
    /// * `controller_port` - Bind port of the simulated controller
    /// * `seed` - Seed for the value generator
    /// * `tick_interval_ms` - Generator period
    /// * `client_host` - Controller address used by the scan client
    /// * `client_port` - Controller port used by the scan client
    /// * `scan_interval_ms` - Poller period
    #[allow(clippy::too_many_arguments)]
    pub fn apply_args(
        &mut self,
        controller_address: Option<String>,
        controller_port: Option<u16>,
        seed: Option<u64>,
        tick_interval_ms: Option<u64>,
        client_host: Option<String>,
        client_port: Option<u16>,
        scan_interval_ms: Option<u64>,
    ) {
        if let Some(address) = controller_address {
            debug!("Overriding controller address from command line: {}", address);
            self.controller.address = address;
        }
        if let Some(port) = controller_port {
            debug!("Overriding controller port from command line: {}", port);
            self.controller.port = port;
        }
        if let Some(seed) = seed {
            debug!("Overriding generator seed from command line: {}", seed);
            self.controller.seed = Some(seed);
        }
        if let Some(interval) = tick_interval_ms {
            debug!("Overriding tick interval from command line: {} ms", interval);
            self.controller.tick_interval_ms = interval;
        }
        if let Some(host) = client_host {
            debug!("Overriding client host from command line: {}", host);
            self.client.host = host;
        }
        if let Some(port) = client_port {
            debug!("Overriding client port from command line: {}", port);
            self.client.port = port;
        }
        if let Some(interval) = scan_interval_ms {
            debug!("Overriding scan interval from command line: {} ms", interval);
            self.client.scan_interval_ms = interval;
        }
    }
}
