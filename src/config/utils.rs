// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the scada-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! This module provides utility functions for working with configuration
//! settings, including validation and schema management.

use anyhow::{Context, Result};
use log::{debug, warn};

use super::Config;

/// JSON schema of the configuration file, embedded at compile time.
pub(crate) const CONFIG_SCHEMA: &str = include_str!("../../resources/config.schema.json");

/// Output the embedded JSON schema to the console.
///
/// This function is called when the `--show-config-schema` flag is provided
/// on the command line. It outputs the full JSON schema for the configuration
/// to stdout, formatted for readability.
///
/// # Example
///
/// ```bash
/// ./virtual_plc --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema: serde_json::Value =
        serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;

    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;

    println!("{}", formatted_schema);

    Ok(())
}

/// Check if a string is a valid IP address
///
/// Validates that a string represents a valid IPv4 or IPv6 address,
/// or is one of the special values like "localhost" or "0.0.0.0".
pub fn is_valid_ip_address(addr: &str) -> bool {
    if addr.parse::<std::net::IpAddr>().is_ok() {
        return true;
    }

    // Special cases
    matches!(addr, "localhost" | "::" | "::0" | "0.0.0.0")
}

/// Validates the configuration against additional rules that aren't covered by the JSON schema.
///
/// # Validation Rules
///
/// - **Port Range**: controller and client ports within 1-65534
/// - **IP Address Format**: unusual addresses are reported but not rejected
/// - **Controller Layout**: see [`ControllerConfig::validate`](super::ControllerConfig::validate)
/// - **Client**: see [`ClientConfig::validate`](super::ClientConfig::validate);
///   non-zero timeout and scan interval, the tag map must build
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    if !(1..=65534).contains(&config.controller.port) {
        anyhow::bail!("Invalid controller port number: {}", config.controller.port);
    }

    for (section, address) in [
        ("controller", &config.controller.address),
        ("client", &config.client.host),
    ] {
        if !is_valid_ip_address(address) {
            // Hostnames are legal, just unusual for a loopback simulator
            warn!("Potentially invalid {} address format: {}", section, address);
        }
    }

    config
        .controller
        .validate()
        .context("Invalid controller layout")?;

    config.client.validate()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ip_address_validation() {
        assert!(is_valid_ip_address("127.0.0.1"));
        assert!(is_valid_ip_address("::1"));
        assert!(is_valid_ip_address("localhost"));
        assert!(!is_valid_ip_address("plc.local"));
    }

    #[test]
    fn test_default_config_passes_specific_rules() {
        assert!(validate_specific_rules(&Config::default()).is_ok());
    }

    #[test]
    fn test_port_zero_is_rejected() {
        let mut config = Config::default();
        config.client.port = 0;
        assert!(validate_specific_rules(&config).is_err());
    }

    #[test]
    fn test_zero_scan_interval_is_rejected() {
        let mut config = Config::default();
        config.client.scan_interval_ms = 0;
        assert!(validate_specific_rules(&config).is_err());

        let mut config = Config::default();
        config.client.timeout_ms = 0;
        assert!(validate_specific_rules(&config).is_err());
    }

    #[test]
    fn test_schema_is_valid_json() {
        let schema: serde_json::Value = serde_json::from_str(CONFIG_SCHEMA).unwrap();
        assert!(schema.get("properties").is_some());
    }
}
