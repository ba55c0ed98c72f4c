// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the scada-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Tag addressed Modbus client
//!
//! For avoiding confusion with the Modbus master/slave terminology, this module
//! uses the terms "server" and "client". The scan client is the Modbus master,
//! the simulated controller is the Modbus slave.
//!
//! ## Connection state
//!
//! ```text
//! DISCONNECTED --connect success--> CONNECTED
//! CONNECTED --disconnect | transport failure | timeout--> DISCONNECTED
//! ```
//!
//! Every tag operation fails with [`ScanError::NotConnected`] while
//! disconnected. [`ScanClient::scan_cycle`] reconnects on demand and never
//! fails: it always returns a snapshot, possibly empty.

use std::net::SocketAddr;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::{self, error::Elapsed};
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;

use super::snapshot::{self, Snapshot, SnapshotHandler};
use super::tags::{Tag, TagKind, TagMap, TagMapError, TagValue};
use super::ScanError;
use crate::config::ClientConfig;

/// Connection state of a [`ScanClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Modbus client reading and writing tags of one controller.
///
/// One request is in flight at a time: every operation takes `&mut self`
/// and tags are scanned sequentially in declaration order.
pub struct ScanClient {
    host: String,
    port: u16,
    unit: Slave,
    timeout: Duration,
    tags: TagMap,
    ctx: Option<Context>,
    cycles: u64,
}

/// Collapse the layered result of a timed Modbus request.
fn settle<T>(
    tag: &str,
    response: Result<Result<Result<T, ExceptionCode>, tokio_modbus::Error>, Elapsed>,
) -> Result<T, ScanError> {
    match response {
        Err(_) => Err(ScanError::Timeout),
        Ok(Err(e)) => Err(ScanError::Transport(e.to_string())),
        Ok(Ok(Err(code))) => Err(ScanError::Protocol {
            tag: tag.to_string(),
            code,
        }),
        Ok(Ok(Ok(value))) => Ok(value),
    }
}

/// Resolve the controller endpoint and open a Modbus TCP context.
async fn open_context(
    host: &str,
    port: u16,
    unit: Slave,
    timeout: Duration,
) -> Result<Context, ScanError> {
    let socket_addr: SocketAddr = time::timeout(timeout, tokio::net::lookup_host((host, port)))
        .await
        .map_err(|_| ScanError::Timeout)?
        .map_err(|e| ScanError::ConnectionFailure(e.to_string()))?
        .next()
        .ok_or_else(|| ScanError::ConnectionFailure(format!("{host}:{port} did not resolve")))?;

    debug!("Connecting to Modbus server at {}", socket_addr);
    time::timeout(timeout, tcp::connect_slave(socket_addr, unit))
        .await
        .map_err(|_| ScanError::Timeout)?
        .map_err(|e| ScanError::ConnectionFailure(e.to_string()))
}

impl ScanClient {
    /// Create a disconnected client.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        unit_id: u8,
        timeout: Duration,
        tags: TagMap,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            unit: Slave(unit_id),
            timeout,
            tags,
            ctx: None,
            cycles: 0,
        }
    }

    /// Create a disconnected client from the `client` configuration section.
    pub fn from_config(config: &ClientConfig) -> Result<Self, TagMapError> {
        let tags = TagMap::from_config(&config.tags)?;
        Ok(Self::new(
            config.host.clone(),
            config.port,
            config.unit_id,
            Duration::from_millis(config.timeout_ms),
            tags,
        ))
    }

    pub fn tags(&self) -> &TagMap {
        &self.tags
    }

    pub fn state(&self) -> ConnectionState {
        if self.ctx.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.ctx.is_some()
    }

    /// Number of scan cycles attempted so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Establish the connection.
    ///
    /// Returns whether the client is connected afterwards. Failures are
    /// logged, the client then stays disconnected.
    pub async fn connect(&mut self) -> bool {
        if self.ctx.is_some() {
            return true;
        }
        match open_context(&self.host, self.port, self.unit, self.timeout).await {
            Ok(ctx) => {
                info!("Connected to controller at {}:{}", self.host, self.port);
                self.ctx = Some(ctx);
                true
            }
            Err(e) => {
                warn!(
                    "Failed to connect to controller at {}:{}: {}",
                    self.host, self.port, e
                );
                false
            }
        }
    }

    /// Close the connection if open. Idempotent.
    pub async fn disconnect(&mut self) {
        if let Some(mut ctx) = self.ctx.take() {
            if let Err(e) = ctx.disconnect().await {
                debug!("Error while closing Modbus connection: {}", e);
            }
            info!("Disconnected from controller at {}:{}", self.host, self.port);
        }
    }

    fn lookup(&self, name: &str) -> Result<Tag, ScanError> {
        self.tags
            .get(name)
            .cloned()
            .ok_or_else(|| ScanError::UnknownTag(name.to_string()))
    }

    /// Drop the connection after a failure that may have desynchronized it.
    fn settle_connection<T>(&mut self, result: &Result<T, ScanError>) {
        if let Err(e @ (ScanError::Transport(_) | ScanError::Timeout)) = result {
            warn!("Lost connection to controller: {}", e);
            self.ctx = None;
        }
    }

    /// Read one tag and convert it.
    ///
    /// Scaled registers yield [`TagValue::Number`], unscaled registers
    /// [`TagValue::Integer`] and coils [`TagValue::Bool`].
    pub async fn read_tag(&mut self, name: &str) -> Result<TagValue, ScanError> {
        let tag = self.lookup(name)?;
        let ctx = self.ctx.as_mut().ok_or(ScanError::NotConnected)?;

        let result = match tag.kind {
            TagKind::Holding => settle(
                &tag.name,
                time::timeout(self.timeout, ctx.read_holding_registers(tag.address, 1)).await,
            )
            .and_then(|words| {
                words
                    .first()
                    .map(|&raw| tag.register_value(raw))
                    .ok_or_else(|| ScanError::Transport("empty register response".to_string()))
            }),
            TagKind::Coil => settle(
                &tag.name,
                time::timeout(self.timeout, ctx.read_coils(tag.address, 1)).await,
            )
            .and_then(|bits| {
                bits.first()
                    .map(|&state| TagValue::Bool(state))
                    .ok_or_else(|| ScanError::Transport("empty coil response".to_string()))
            }),
        };

        self.settle_connection(&result);
        result
    }

    /// Convert and write one tag.
    ///
    /// Scaled values are divided by the scale and truncated toward zero.
    pub async fn write_tag(
        &mut self,
        name: &str,
        value: impl Into<TagValue>,
    ) -> Result<(), ScanError> {
        let value = value.into();
        let tag = self.lookup(name)?;
        let ctx = self.ctx.as_mut().ok_or(ScanError::NotConnected)?;

        let result = match tag.kind {
            TagKind::Holding => {
                let raw = tag.raw_register(value)?;
                debug!("Writing {} (raw {}) to tag {}", value, raw, tag.name);
                settle(
                    &tag.name,
                    time::timeout(self.timeout, ctx.write_single_register(tag.address, raw)).await,
                )
            }
            TagKind::Coil => {
                let state = tag.coil_state(value)?;
                debug!("Writing {} to tag {}", state, tag.name);
                settle(
                    &tag.name,
                    time::timeout(self.timeout, ctx.write_single_coil(tag.address, state)).await,
                )
            }
        };

        self.settle_connection(&result);
        result
    }

    /// Read every tag in declaration order.
    ///
    /// Failed tags are left out of the values and listed in
    /// [`Snapshot::failed`].
    pub async fn read_all_tags(&mut self) -> Snapshot {
        self.cycles += 1;
        let mut snapshot = Snapshot::new(self.cycles);
        let names: Vec<String> = self.tags.iter().map(|tag| tag.name.clone()).collect();

        for name in names {
            match self.read_tag(&name).await {
                Ok(value) => snapshot.insert(name, value),
                Err(e) => {
                    debug!("Cycle {}: skipping tag {}: {}", self.cycles, name, e);
                    snapshot.record_failure(name);
                }
            }
        }

        if !snapshot.failed().is_empty() {
            warn!(
                "Cycle {}: {} of {} tags could not be read",
                self.cycles,
                snapshot.failed().len(),
                self.tags.len()
            );
        }
        snapshot
    }

    /// Run one scan cycle.
    ///
    /// Connects first if needed. When the controller cannot be reached the
    /// returned snapshot is empty and lists every tag as failed. The handler
    /// is only invoked with non-empty snapshots; its failures are logged.
    pub async fn scan_cycle(&mut self, handler: Option<&mut dyn SnapshotHandler>) -> Snapshot {
        if !self.is_connected() && !self.connect().await {
            self.cycles += 1;
            let mut snapshot = Snapshot::new(self.cycles);
            for tag in self.tags.iter() {
                snapshot.record_failure(tag.name.clone());
            }
            return snapshot;
        }

        let snapshot = self.read_all_tags().await;
        if let Some(handler) = handler {
            if !snapshot.is_empty() {
                snapshot::deliver(handler, &snapshot).await;
            }
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TagMapConfig;

    fn offline_client() -> ScanClient {
        let tags = TagMap::from_config(&TagMapConfig::default()).unwrap();
        // Port 1 on loopback is expected to refuse connections
        ScanClient::new("127.0.0.1", 1, 1, Duration::from_millis(500), tags)
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let mut client = offline_client();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(
            client.read_tag("engine_temp_1").await,
            Err(ScanError::NotConnected)
        );
        assert_eq!(
            client.write_tag("pump_1_status", true).await,
            Err(ScanError::NotConnected)
        );
    }

    #[tokio::test]
    async fn test_unknown_tag_is_reported_before_connection_state() {
        let mut client = offline_client();
        assert_eq!(
            client.read_tag("no_such_tag").await,
            Err(ScanError::UnknownTag("no_such_tag".to_string()))
        );
        assert_eq!(
            client.write_tag("no_such_tag", 1.0).await,
            Err(ScanError::UnknownTag("no_such_tag".to_string()))
        );
    }

    #[tokio::test]
    async fn test_unreachable_controller_yields_empty_snapshot() {
        let mut client = offline_client();
        let mut calls = 0;
        let mut handler = |_: &Snapshot| -> anyhow::Result<()> {
            calls += 1;
            Ok(())
        };
        let snapshot = client.scan_cycle(Some(&mut handler)).await;
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.failed().len(), 12);
        assert_eq!(snapshot.cycle(), 1);
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(calls, 0);

        client.disconnect().await;
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }
}
