// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the scada-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Tests for the simulated controller's Modbus service
//!
//! These tests start a controller on an ephemeral port and talk to it with a
//! plain Modbus client. Reads, writes and error conditions are checked at the
//! protocol level.

use std::net::SocketAddr;
use std::time::Duration;

use tokio_modbus::prelude::*;

use scada_acquisition::config::ControllerConfig;
use scada_acquisition::daemon::VirtualPlc;

/// Start a controller whose generator is effectively idle during a test.
async fn start_test_controller() -> Result<(VirtualPlc, SocketAddr), Box<dyn std::error::Error>> {
    let config = ControllerConfig {
        port: 0,
        tick_interval_ms: 3_600_000,
        seed: Some(1),
        ..ControllerConfig::default()
    };
    let plc = VirtualPlc::start(&config).await?;
    let socket_addr = plc.local_addr();
    println!("Test controller started on: {}", socket_addr);
    Ok((plc, socket_addr))
}

#[tokio::test]
async fn test_read_holding_registers() -> Result<(), Box<dyn std::error::Error>> {
    let (_plc, socket_addr) = start_test_controller().await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    // Temperatures start at 25.0, 25.0 and 22.0 with a 0.1 scale
    let data = ctx.read_holding_registers(0, 3).await??;
    assert_eq!(data, vec![250, 250, 220]);

    let data = ctx.read_holding_registers(10, 3).await??;
    assert_eq!(data, vec![2000, 500, 800]);

    let data = ctx.read_holding_registers(30, 2).await??;
    assert_eq!(data, vec![1250, 850]);

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_read_coils() -> Result<(), Box<dyn std::error::Error>> {
    let (_plc, socket_addr) = start_test_controller().await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    let data = ctx.read_coils(20, 4).await??;
    assert_eq!(data, vec![true, false, false, true]);

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_write_single_register() -> Result<(), Box<dyn std::error::Error>> {
    let (plc, socket_addr) = start_test_controller().await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    ctx.write_single_register(2, 250).await??;

    let data = ctx.read_holding_registers(2, 1).await??;
    assert_eq!(data[0], 250);

    // The controller side sees the same value
    let image = plc.image();
    assert_eq!(image.lock().unwrap().register(2), Some(250));

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_write_multiple_registers_is_all_or_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let (_plc, socket_addr) = start_test_controller().await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    ctx.write_multiple_registers(10, &[1900, 550, 750]).await??;
    let data = ctx.read_holding_registers(10, 3).await??;
    assert_eq!(data, vec![1900, 550, 750]);

    // 2300 is above the hydraulic pressure limit: nothing is written
    let result = ctx.write_multiple_registers(10, &[1850, 2300]).await?;
    assert_eq!(result, Err(ExceptionCode::IllegalDataValue));
    let data = ctx.read_holding_registers(10, 2).await??;
    assert_eq!(data, vec![1900, 550]);

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_write_coils() -> Result<(), Box<dyn std::error::Error>> {
    let (_plc, socket_addr) = start_test_controller().await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    ctx.write_single_coil(22, true).await??;
    ctx.write_multiple_coils(20, &[false, true]).await??;

    let data = ctx.read_coils(20, 4).await??;
    assert_eq!(data, vec![false, true, true, true]);

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_counter_cannot_be_lowered() -> Result<(), Box<dyn std::error::Error>> {
    let (_plc, socket_addr) = start_test_controller().await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    let result = ctx.write_single_register(30, 1000).await?;
    assert_eq!(result, Err(ExceptionCode::IllegalDataValue));

    ctx.write_single_register(30, 1300).await??;
    let data = ctx.read_holding_registers(30, 1).await??;
    assert_eq!(data[0], 1300);

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_invalid_addresses_and_functions() -> Result<(), Box<dyn std::error::Error>> {
    let (_plc, socket_addr) = start_test_controller().await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    // Address 3 is a gap between cabin_temp and the pressures
    let result = ctx.read_holding_registers(0, 4).await?;
    assert_eq!(result, Err(ExceptionCode::IllegalDataAddress));

    let result = ctx.read_coils(100, 1).await?;
    assert_eq!(result, Err(ExceptionCode::IllegalDataAddress));

    let result = ctx.write_single_register(100, 1).await?;
    assert_eq!(result, Err(ExceptionCode::IllegalDataAddress));

    let result = ctx.read_input_registers(0, 1).await?;
    assert_eq!(result, Err(ExceptionCode::IllegalFunction));

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_generator_keeps_values_in_bounds() -> Result<(), Box<dyn std::error::Error>> {
    let config = ControllerConfig {
        port: 0,
        tick_interval_ms: 5,
        seed: Some(99),
        ..ControllerConfig::default()
    };
    let plc = VirtualPlc::start(&config).await?;
    let mut ctx = tcp::connect(plc.local_addr()).await?;

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(plc.image().lock().unwrap().ticks() > 0);

    let temps = ctx.read_holding_registers(0, 3).await??;
    assert!(temps[..2].iter().all(|t| (200..=1500).contains(t)), "{temps:?}");
    assert!((180..=300).contains(&temps[2]), "{temps:?}");

    let pressures = ctx.read_holding_registers(10, 3).await??;
    assert!((1800..=2200).contains(&pressures[0]), "{pressures:?}");
    assert!((450..=600).contains(&pressures[1]), "{pressures:?}");
    assert!((700..=900).contains(&pressures[2]), "{pressures:?}");

    let counters = ctx.read_holding_registers(30, 2).await??;
    assert!(counters[0] >= 1250 && counters[1] >= 850, "{counters:?}");

    ctx.disconnect().await?;
    plc.shutdown();
    plc.join().await?;
    Ok(())
}

#[tokio::test]
async fn test_shutdown_stops_serving() -> Result<(), Box<dyn std::error::Error>> {
    let (plc, socket_addr) = start_test_controller().await?;
    let mut ctx = tcp::connect(socket_addr).await?;
    ctx.read_coils(20, 1).await??;

    plc.shutdown();
    assert!(!plc.is_running());

    // Requests on a connection that is still open fail cleanly
    match ctx.read_coils(20, 1).await {
        Ok(Err(code)) => assert_eq!(code, ExceptionCode::ServerDeviceFailure),
        Ok(Ok(data)) => panic!("controller answered after shutdown: {data:?}"),
        Err(_) => {}
    }

    plc.join().await?;

    // The listener is closed
    assert!(tcp::connect(socket_addr).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_bind_conflict_is_reported() -> Result<(), Box<dyn std::error::Error>> {
    let (_plc, socket_addr) = start_test_controller().await?;
    let config = ControllerConfig {
        port: socket_addr.port(),
        ..ControllerConfig::default()
    };
    let err = VirtualPlc::start(&config).await.err().expect("bind should fail");
    assert!(matches!(
        err,
        scada_acquisition::ControllerError::Bind { .. }
    ));
    Ok(())
}
