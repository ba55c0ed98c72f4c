// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the scada-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Tag map and tag values
//!
//! A tag binds a human readable name to one holding register or coil of the
//! controller, with an optional scale for registers carrying engineering
//! values. The [`TagMap`] is built once from configuration, checked eagerly
//! and immutable afterwards.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ScanError;
use crate::config::{ControllerConfig, TagMapConfig};
use crate::utility::scaling::{self, is_valid_scale, ScalingError};

/// Address space a tag lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagKind {
    /// 16-bit read/write register
    Holding,
    /// Read/write bit
    Coil,
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagKind::Holding => f.write_str("holding register"),
            TagKind::Coil => f.write_str("coil"),
        }
    }
}

/// A validated tag descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub name: String,
    pub address: u16,
    pub kind: TagKind,
    pub scale: Option<f64>,
}

/// Errors detected while building a tag map.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TagMapError {
    #[error("tag `{0}` is declared more than once")]
    DuplicateName(String),

    #[error("tags `{first}` and `{second}` are both bound to {kind} {address}")]
    DuplicateAddress {
        first: String,
        second: String,
        kind: TagKind,
        address: u16,
    },

    #[error("tag `{name}` has invalid scale {scale}")]
    InvalidScale { name: String, scale: f64 },

    #[error("tag `{0}` is a coil and cannot be scaled")]
    ScaledCoil(String),
}

/// Read-only lookup table from tag name to descriptor.
///
/// Iteration follows declaration order.
#[derive(Debug, Clone, Default)]
pub struct TagMap {
    tags: Vec<Tag>,
    index: HashMap<String, usize>,
}

impl TagMap {
    /// Build a tag map, rejecting duplicate names, duplicate addresses within
    /// one space, invalid scales and scaled coils.
    pub fn new<I>(entries: I) -> Result<Self, TagMapError>
    where
        I: IntoIterator<Item = Tag>,
    {
        let mut tags: Vec<Tag> = Vec::new();
        let mut index = HashMap::new();
        let mut bindings: HashMap<(TagKind, u16), usize> = HashMap::new();

        for tag in entries {
            if index.contains_key(&tag.name) {
                return Err(TagMapError::DuplicateName(tag.name));
            }
            match (tag.kind, tag.scale) {
                (TagKind::Coil, Some(_)) => return Err(TagMapError::ScaledCoil(tag.name)),
                (TagKind::Holding, Some(scale)) if !is_valid_scale(scale) => {
                    return Err(TagMapError::InvalidScale {
                        name: tag.name,
                        scale,
                    })
                }
                _ => {}
            }
            if let Some(&existing) = bindings.get(&(tag.kind, tag.address)) {
                return Err(TagMapError::DuplicateAddress {
                    first: tags[existing].name.clone(),
                    second: tag.name,
                    kind: tag.kind,
                    address: tag.address,
                });
            }

            let position = tags.len();
            bindings.insert((tag.kind, tag.address), position);
            index.insert(tag.name.clone(), position);
            tags.push(tag);
        }

        Ok(Self { tags, index })
    }

    /// Build a tag map from the `client.tags` configuration section.
    pub fn from_config(config: &TagMapConfig) -> Result<Self, TagMapError> {
        Self::new(config.iter().map(|(name, tag)| Tag {
            name: name.to_string(),
            address: tag.address,
            kind: tag.kind,
            scale: tag.scale,
        }))
    }

    pub fn get(&self, name: &str) -> Option<&Tag> {
        self.index.get(name).map(|&position| &self.tags[position])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.tags.iter()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Compare the tag map with a controller layout.
    ///
    /// Returns one message per tag that would misread: the bound address does
    /// not exist in the layout, or the scale differs from the register's walk
    /// scale. An empty result means the map matches the layout.
    pub fn check_against(&self, layout: &ControllerConfig) -> Vec<String> {
        let mut mismatches = Vec::new();
        for tag in &self.tags {
            match tag.kind {
                TagKind::Coil => {
                    if layout.coil(tag.address).is_none() {
                        mismatches.push(format!(
                            "tag `{}`: coil {} is not part of the controller layout",
                            tag.name, tag.address
                        ));
                    }
                }
                TagKind::Holding => match layout.register(tag.address) {
                    None => mismatches.push(format!(
                        "tag `{}`: holding register {} is not part of the controller layout",
                        tag.name, tag.address
                    )),
                    Some(register) => {
                        let expected = register.rule.scale();
                        let same = match (tag.scale, expected) {
                            (Some(a), Some(b)) => (a - b).abs() <= f64::EPSILON * a.abs().max(b.abs()),
                            (None, None) => true,
                            _ => false,
                        };
                        if !same {
                            mismatches.push(format!(
                                "tag `{}`: scale {:?} does not match register `{}` scale {:?}",
                                tag.name, tag.scale, register.name, expected
                            ));
                        }
                    }
                },
            }
        }
        mismatches
    }
}

/// Converted value of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    /// Unscaled holding register
    Integer(u16),
    /// Scaled holding register, in engineering units
    Number(f64),
    /// Coil state
    Bool(bool),
}

impl TagValue {
    /// Numeric view of the value, `None` for coils.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TagValue::Integer(raw) => Some(f64::from(*raw)),
            TagValue::Number(value) => Some(*value),
            TagValue::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TagValue::Bool(state) => Some(*state),
            _ => None,
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Integer(raw) => write!(f, "{raw}"),
            TagValue::Number(value) => write!(f, "{value}"),
            TagValue::Bool(state) => write!(f, "{state}"),
        }
    }
}

impl From<bool> for TagValue {
    fn from(state: bool) -> Self {
        TagValue::Bool(state)
    }
}

impl From<u16> for TagValue {
    fn from(raw: u16) -> Self {
        TagValue::Integer(raw)
    }
}

impl From<f64> for TagValue {
    fn from(value: f64) -> Self {
        TagValue::Number(value)
    }
}

impl Tag {
    /// Convert a raw register value read for this tag.
    pub fn register_value(&self, raw: u16) -> TagValue {
        match self.scale {
            Some(scale) => TagValue::Number(scaling::to_engineering(raw, scale)),
            None => TagValue::Integer(raw),
        }
    }

    /// Raw register value to write for `value`.
    pub fn raw_register(&self, value: TagValue) -> Result<u16, ScanError> {
        let out_of_range = |_: ScalingError| ScanError::ValueOutOfRange {
            tag: self.name.clone(),
            value: value.to_string(),
        };
        match (self.scale, value) {
            (_, TagValue::Bool(_)) => Err(self.type_mismatch(value)),
            (Some(scale), TagValue::Number(number)) => {
                scaling::to_raw(number, scale).map_err(out_of_range)
            }
            (Some(scale), TagValue::Integer(raw)) => {
                scaling::to_raw(f64::from(raw), scale).map_err(out_of_range)
            }
            (None, TagValue::Integer(raw)) => Ok(raw),
            (None, TagValue::Number(number)) => {
                if number.fract() != 0.0 {
                    return Err(self.type_mismatch(value));
                }
                scaling::to_raw(number, 1.0).map_err(out_of_range)
            }
        }
    }

    /// Coil state to write for `value`.
    pub fn coil_state(&self, value: TagValue) -> Result<bool, ScanError> {
        value.as_bool().ok_or_else(|| self.type_mismatch(value))
    }

    fn type_mismatch(&self, value: TagValue) -> ScanError {
        ScanError::TypeMismatch {
            tag: self.name.clone(),
            kind: self.kind,
            value: value.to_string(),
        }
    }
}
