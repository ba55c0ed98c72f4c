// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the scada-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::Result;
use scada_acquisition::config::Config;
use std::fs;
use std::path::Path;
use std::sync::Once;
use tempfile::tempdir;

static INIT: Once = Once::new();

// Setup logger for tests
fn setup() {
    INIT.call_once(|| {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .try_init();
    });
}

/// Load `contents` from a fresh file, expect failure and a valid sample file.
fn assert_rejected_with_sample(contents: &str) -> Result<String> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents)?;

    let result = Config::from_file(&config_path);
    let message = match result {
        Ok(_) => anyhow::bail!("Config loading should have failed"),
        Err(e) => format!("{e:#}"),
    };

    let sample_path = config_path.with_extension("sample.yaml");
    assert!(
        Path::new(&sample_path).exists(),
        "Sample config file was not created"
    );

    // The sample file is a valid configuration with default values
    let sample_config = Config::from_file(&sample_path)?;
    assert_eq!(sample_config.controller.port, 5020);
    assert_eq!(sample_config.client.tags.len(), 12);

    Ok(message)
}

#[test]
fn test_schema_type_error_creates_sample_file() -> Result<()> {
    setup();
    let message = assert_rejected_with_sample(
        r#"
controller:
  port: "not-an-integer"
  address: 12345
"#,
    )?;
    assert!(message.contains("validation failed"), "{message}");
    Ok(())
}

#[test]
fn test_port_out_of_range_creates_sample_file() -> Result<()> {
    setup();
    assert_rejected_with_sample(
        r#"
client:
  port: 99999
"#,
    )?;
    Ok(())
}

#[test]
fn test_unknown_section_is_rejected() -> Result<()> {
    setup();
    assert_rejected_with_sample(
        r#"
visualization:
  port: 8080
"#,
    )?;
    Ok(())
}

#[test]
fn test_layout_rule_violation_creates_sample_file() -> Result<()> {
    setup();
    // Schema valid, but the initial value lies outside the walk bounds
    let message = assert_rejected_with_sample(
        r#"
controller:
  registers:
    - name: t1
      address: 0
      initial: 200.0
      rule: { type: walk, min: 20.0, max: 150.0, delta: 2.0, scale: 0.1 }
  coils: []
"#,
    )?;
    assert!(message.contains("controller layout"), "{message}");
    Ok(())
}

#[test]
fn test_duplicate_tag_address_creates_sample_file() -> Result<()> {
    setup();
    let message = assert_rejected_with_sample(
        r#"
client:
  tags:
    t1: { address: 0, kind: holding, scale: 0.1 }
    t2: { address: 0, kind: holding }
"#,
    )?;
    assert!(message.contains("tag map"), "{message}");
    Ok(())
}

#[test]
fn test_scaled_coil_creates_sample_file() -> Result<()> {
    setup();
    assert_rejected_with_sample(
        r#"
client:
  tags:
    flag: { address: 22, kind: coil, scale: 0.1 }
"#,
    )?;
    Ok(())
}
