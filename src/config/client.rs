// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the scada-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Scan client configuration
//!
//! Connection settings of the scan client and the tag map it polls. In the
//! configuration file the tag map is a mapping keyed by tag name:
//!
//! ```yaml
//! tags:
//!   engine_temp_1: { address: 0, kind: holding, scale: 0.1 }
//!   emergency_stop: { address: 22, kind: coil }
//! ```
//!
//! Mapping order is the declaration order and is kept as is: it becomes the
//! order of every snapshot.

use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use anyhow::Context;

use super::controller::ControllerConfig;
use crate::client::tags::{TagKind, TagMap};

/// Configuration for the scan client.
///
/// # Fields
///
/// * `host` - Controller address (default: 127.0.0.1)
/// * `port` - Controller port (default: 5020)
/// * `unit_id` - Modbus unit identifier sent with every request (default: 1)
/// * `timeout_ms` - Connect and per-request timeout in milliseconds (default: 3000)
/// * `scan_interval_ms` - Period between two scan cycles of the poller (default: 2000)
/// * `tags` - Tag map
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub unit_id: u8,
    pub timeout_ms: u64,
    pub scan_interval_ms: u64,
    pub tags: TagMapConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5020,
            unit_id: 1,
            timeout_ms: 3000,
            scan_interval_ms: 2000,
            tags: TagMapConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Check the client settings for rules a JSON schema cannot express.
    ///
    /// Also called after command line overrides, which bypass the schema.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(1..=65534).contains(&self.port) {
            anyhow::bail!("Invalid client port number: {}", self.port);
        }
        if self.timeout_ms == 0 {
            anyhow::bail!("Client timeout must be at least 1 ms");
        }
        if self.scan_interval_ms == 0 {
            anyhow::bail!("Client scan interval must be at least 1 ms");
        }
        TagMap::from_config(&self.tags).context("Invalid client tag map")?;
        Ok(())
    }
}

/// Definition of one tag as written in the configuration file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TagConfig {
    pub address: u16,
    pub kind: TagKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
}

impl TagConfig {
    pub fn holding(address: u16, scale: Option<f64>) -> Self {
        Self {
            address,
            kind: TagKind::Holding,
            scale,
        }
    }

    pub fn coil(address: u16) -> Self {
        Self {
            address,
            kind: TagKind::Coil,
            scale: None,
        }
    }
}

/// Ordered tag map, serialized as a YAML/JSON mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct TagMapConfig(Vec<(String, TagConfig)>);

impl TagMapConfig {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a tag at the end of the declaration order.
    pub fn push(&mut self, name: impl Into<String>, tag: TagConfig) {
        self.0.push((name.into(), tag));
    }

    /// Builder-style [`push`](Self::push).
    pub fn with(mut self, name: impl Into<String>, tag: TagConfig) -> Self {
        self.push(name, tag);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TagConfig)> {
        self.0.iter().map(|(name, tag)| (name.as_str(), tag))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Tag map covering every register and coil of a controller layout,
    /// registers first, each in layout order.
    pub fn from_layout(layout: &ControllerConfig) -> Self {
        let mut tags = Self::new();
        for register in &layout.registers {
            tags.push(
                register.name.clone(),
                TagConfig::holding(register.address, register.rule.scale()),
            );
        }
        for coil in &layout.coils {
            tags.push(coil.name.clone(), TagConfig::coil(coil.address));
        }
        tags
    }
}

impl Default for TagMapConfig {
    /// Tag map of the aerospace process demonstrator, in display order.
    fn default() -> Self {
        Self::new()
            .with("engine_temp_1", TagConfig::holding(0, Some(0.1)))
            .with("engine_temp_2", TagConfig::holding(1, Some(0.1)))
            .with("cabin_temp", TagConfig::holding(2, Some(0.1)))
            .with("hydraulic_pressure", TagConfig::holding(10, Some(0.1)))
            .with("fuel_pressure", TagConfig::holding(11, Some(0.1)))
            .with("oil_pressure", TagConfig::holding(12, Some(0.1)))
            .with("pump_1_status", TagConfig::coil(20))
            .with("pump_2_status", TagConfig::coil(21))
            .with("emergency_stop", TagConfig::coil(22))
            .with("system_ready", TagConfig::coil(23))
            .with("flight_hours", TagConfig::holding(30, None))
            .with("cycles_count", TagConfig::holding(31, None))
    }
}

impl Serialize for TagMapConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, tag) in &self.0 {
            map.serialize_entry(name, tag)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TagMapConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TagMapVisitor;

        impl<'de> Visitor<'de> for TagMapVisitor {
            type Value = TagMapConfig;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a mapping from tag name to tag definition")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries: Vec<(String, TagConfig)> =
                    Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, tag)) = access.next_entry::<String, TagConfig>()? {
                    if entries.iter().any(|(existing, _)| *existing == name) {
                        return Err(de::Error::custom(format!("duplicate tag name `{name}`")));
                    }
                    entries.push((name, tag));
                }
                Ok(TagMapConfig(entries))
            }
        }

        deserializer.deserialize_map(TagMapVisitor)
    }
}
