// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the scada-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Scan client
//!
//! Translates symbolic tag operations into Modbus requests against the
//! simulated controller and manages the connection lifecycle.
//!
//! ## Key Components
//!
//! - [`TagMap`]: validated binding from tag name to register or coil
//! - [`ScanClient`]: connect, single tag read/write, full scan cycles
//! - [`Snapshot`]: ordered values of one scan cycle
//! - [`SnapshotHandler`]: consumer invoked with every non-empty snapshot
//! - [`Poller`]: periodic scan loop running in its own task
//!
//! ## Usage
//!
//! ```no_run
//! use scada_acquisition::client::{ScanClient, Snapshot};
//! use scada_acquisition::config::ClientConfig;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut client = ScanClient::from_config(&ClientConfig::default())?;
//! let mut print = |snapshot: &Snapshot| -> anyhow::Result<()> {
//!     println!("{snapshot}");
//!     Ok(())
//! };
//! let snapshot = client.scan_cycle(Some(&mut print)).await;
//! println!("{} tags read", snapshot.len());
//! # Ok(())
//! # }
//! ```

pub mod poller;
pub mod scan_client;
pub mod snapshot;
pub mod tags;

use thiserror::Error;
use tokio_modbus::ExceptionCode;

pub use poller::Poller;
pub use scan_client::{ConnectionState, ScanClient};
pub use snapshot::{Snapshot, SnapshotHandler};
pub use tags::{Tag, TagKind, TagMap, TagMapError, TagValue};

/// Errors reported by single tag operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScanError {
    #[error("not connected to the controller")]
    NotConnected,

    #[error("connection to the controller failed: {0}")]
    ConnectionFailure(String),

    #[error("request timed out")]
    Timeout,

    #[error("unknown tag `{0}`")]
    UnknownTag(String),

    /// The controller answered with a Modbus exception.
    #[error("controller rejected request for tag `{tag}`: {code}")]
    Protocol { tag: String, code: ExceptionCode },

    /// The connection was lost during the request.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("value {value} does not fit tag `{tag}` ({kind})")]
    TypeMismatch {
        tag: String,
        kind: TagKind,
        value: String,
    },

    #[error("value {value} is out of range for tag `{tag}`")]
    ValueOutOfRange { tag: String, value: String },
}
