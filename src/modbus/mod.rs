// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the scada-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus communication module
//!
//! This module provides the Modbus TCP service of the simulated process
//! controller, allowing scan clients to read and write its holding
//! registers and coils.
//!
//! ## Key Components
//!
//! - `ControllerModbusService`: per-connection service answering Modbus
//!   requests from the shared process image.
//!
//! ## Usage
//!
//! The service is normally started by the controller daemon:
//!
//! ```no_run
//! use scada_acquisition::config::ControllerConfig;
//! use scada_acquisition::daemon::VirtualPlc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let plc = VirtualPlc::start(&ControllerConfig::default()).await?;
//! println!("Serving on {}", plc.local_addr());
//! # Ok(())
//! # }
//! ```
//!
//! ## Register Map
//!
//! The layout comes from the `controller` configuration section. The
//! default layout is:
//!
//! ### Holding Registers (Read/Write)
//!
//! - Registers 0-2: engine and cabin temperatures (°C × 10)
//! - Registers 10-12: hydraulic, fuel and oil pressures (bar × 10)
//! - Register 30: flight hours
//! - Register 31: cycle count
//!
//! ### Coils (Read/Write)
//!
//! - Coils 20-21: pump status
//! - Coil 22: emergency stop
//! - Coil 23: system ready

pub mod modbus_server;
pub use modbus_server::ControllerModbusService;
