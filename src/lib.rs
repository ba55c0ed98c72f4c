// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the scada-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! SCADA acquisition core
//!
//! This library provides a simulated process controller serving holding
//! registers and coils over Modbus TCP, and a tag based scan client that
//! polls it and hands one snapshot per cycle to a consumer.
//!
//! ## Modules
//!
//! - [`config`]: YAML configuration validated against an embedded JSON schema
//! - [`simulation`]: controller value table and generation rules
//! - [`modbus`]: Modbus service exposing the value table
//! - [`daemon`]: controller lifecycle (listener and generator tasks)
//! - [`client`]: tag map, scan client, snapshots and poller
//! - [`utility`]: engineering unit scaling

pub mod client;
pub mod config;
pub mod daemon;
pub mod modbus;
pub mod simulation;
pub mod utility;

pub use client::{ScanClient, ScanError, Snapshot, TagValue};
pub use daemon::VirtualPlc;
pub use simulation::ControllerError;
