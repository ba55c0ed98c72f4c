// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the scada-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Simulated controller configuration
//!
//! This module defines the network settings of the simulated process
//! controller and the layout of its memory: which holding registers and
//! coils exist, their initial values, and the rule that advances each of
//! them on every generator tick.

use std::collections::HashSet;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::utility::scaling::{is_valid_scale, raw_bounds};

/// Configuration for the simulated process controller.
///
/// # Fields
///
/// * `address` - Network address the Modbus listener binds to (default: 127.0.0.1)
/// * `port` - TCP port of the Modbus listener (default: 5020)
/// * `tick_interval_ms` - Period of the value generator in milliseconds (default: 1000)
/// * `seed` - Optional seed making value generation reproducible
/// * `registers` - Holding register layout
/// * `coils` - Coil layout
///
/// # Example
///
/// ```
/// use scada_acquisition::config::ControllerConfig;
///
/// let controller = ControllerConfig {
///     port: 15020,
///     seed: Some(7),
///     ..ControllerConfig::default()
/// };
/// assert!(controller.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// The network address the listener binds to.
    ///
    /// Use "0.0.0.0" to serve on all IPv4 interfaces.
    pub address: String,

    /// The TCP port the listener binds to.
    ///
    /// Deliberately not the well-known Modbus port 502 so the simulator can
    /// run unprivileged next to real equipment.
    pub port: u16,

    /// Generator period in milliseconds.
    pub tick_interval_ms: u64,

    /// Seed for the value generator. When absent the generator is seeded
    /// from the operating system.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Holding registers exposed by the controller.
    pub registers: Vec<RegisterConfig>,

    /// Coils exposed by the controller.
    pub coils: Vec<CoilConfig>,
}

/// One holding register of the controller layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegisterConfig {
    /// Process variable name, used in logs and for tag map cross-checks
    pub name: String,
    /// Register address, unique among holding registers
    pub address: u16,
    /// Initial value: engineering units for a walk, raw count for a counter
    pub initial: f64,
    /// How the value evolves on each tick
    pub rule: RegisterRule,
}

/// Generation rule of a holding register.
///
/// Written as `{ type: walk, min: 20, max: 150, delta: 2, scale: 0.1 }` or
/// `{ type: counter, step: 1, every_ticks: 10 }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegisterRule {
    /// Bounded analog value
    Walk(WalkRule),
    /// Monotonic counter
    Counter(CounterRule),
}

/// Bounded random walk `v' = clamp(v + uniform(-delta, delta), min, max)`.
///
/// `min`, `max` and `delta` are in engineering units; the register stores
/// `value / scale`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalkRule {
    pub min: f64,
    pub max: f64,
    pub delta: f64,
    pub scale: f64,
}

/// Counter incremented by `step` every `every_ticks` ticks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CounterRule {
    pub step: u16,
    pub every_ticks: u32,
}

/// One coil of the controller layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoilConfig {
    pub name: String,
    /// Coil address, unique among coils
    pub address: u16,
    pub initial: bool,
    pub rule: CoilRule,
}

/// Generation rule of a coil.
///
/// Both variants flip the coil with an independent Bernoulli draw per tick.
/// `Event` marks a fault coil: its flips are rare and logged as warnings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoilRule {
    Toggle { probability: f64 },
    Event { probability: f64 },
}

impl CoilRule {
    /// Per-tick flip probability.
    pub fn probability(&self) -> f64 {
        match self {
            CoilRule::Toggle { probability } | CoilRule::Event { probability } => *probability,
        }
    }
}

impl RegisterRule {
    /// Engineering scale of the register, if it has one.
    pub fn scale(&self) -> Option<f64> {
        match self {
            RegisterRule::Walk(walk) => Some(walk.scale),
            RegisterRule::Counter(_) => None,
        }
    }
}

impl WalkRule {
    /// Raw register bounds `[lo, hi]` of this walk.
    pub fn raw_bounds(&self) -> (f64, f64) {
        raw_bounds(self.min, self.max, self.scale)
    }
}

fn walk(name: &str, address: u16, initial: f64, min: f64, max: f64, delta: f64) -> RegisterConfig {
    RegisterConfig {
        name: name.to_string(),
        address,
        initial,
        rule: RegisterRule::Walk(WalkRule {
            min,
            max,
            delta,
            scale: 0.1,
        }),
    }
}

fn counter(name: &str, address: u16, initial: f64, every_ticks: u32) -> RegisterConfig {
    RegisterConfig {
        name: name.to_string(),
        address,
        initial,
        rule: RegisterRule::Counter(CounterRule {
            step: 1,
            every_ticks,
        }),
    }
}

fn coil(name: &str, address: u16, initial: bool, rule: CoilRule) -> CoilConfig {
    CoilConfig {
        name: name.to_string(),
        address,
        initial,
        rule,
    }
}

/// Register layout of the aerospace process demonstrator.
pub fn default_registers() -> Vec<RegisterConfig> {
    vec![
        // Temperatures (°C)
        walk("engine_temp_1", 0, 25.0, 20.0, 150.0, 2.0),
        walk("engine_temp_2", 1, 25.0, 20.0, 150.0, 2.0),
        walk("cabin_temp", 2, 22.0, 18.0, 30.0, 0.5),
        // Pressures (bar)
        walk("hydraulic_pressure", 10, 200.0, 180.0, 220.0, 1.0),
        walk("fuel_pressure", 11, 50.0, 45.0, 60.0, 1.0),
        walk("oil_pressure", 12, 80.0, 70.0, 90.0, 1.0),
        // Counters
        counter("flight_hours", 30, 1250.0, 10),
        counter("cycles_count", 31, 850.0, 5),
    ]
}

/// Coil layout of the aerospace process demonstrator.
pub fn default_coils() -> Vec<CoilConfig> {
    let toggle = || CoilRule::Toggle { probability: 0.01 };
    vec![
        coil("pump_1_status", 20, true, toggle()),
        coil("pump_2_status", 21, false, toggle()),
        coil(
            "emergency_stop",
            22,
            false,
            CoilRule::Event { probability: 0.001 },
        ),
        coil("system_ready", 23, true, toggle()),
    ]
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 5020,
            tick_interval_ms: 1000,
            seed: None,
            registers: default_registers(),
            coils: default_coils(),
        }
    }
}

impl ControllerConfig {
    /// Check the layout for rules a JSON schema cannot express.
    ///
    /// # Errors
    ///
    /// Fails on duplicate names or addresses, empty or inverted walk ranges,
    /// walks that do not fit a 16-bit register, initial values outside their
    /// range, zero counter steps or periods, and coil probabilities outside
    /// `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            anyhow::bail!("Controller tick interval must be at least 1 ms");
        }

        let mut names = HashSet::new();
        let mut addresses = HashSet::new();
        for register in &self.registers {
            if !names.insert(register.name.as_str()) {
                anyhow::bail!("Duplicate process variable name: {}", register.name);
            }
            if !addresses.insert(register.address) {
                anyhow::bail!(
                    "Holding register address {} is used more than once",
                    register.address
                );
            }
            validate_register(register)?;
        }

        addresses.clear();
        for coil in &self.coils {
            if !names.insert(coil.name.as_str()) {
                anyhow::bail!("Duplicate process variable name: {}", coil.name);
            }
            if !addresses.insert(coil.address) {
                anyhow::bail!("Coil address {} is used more than once", coil.address);
            }
            let probability = coil.rule.probability();
            if !(0.0..=1.0).contains(&probability) {
                anyhow::bail!(
                    "Coil {} has probability {} outside [0, 1]",
                    coil.name,
                    probability
                );
            }
        }

        Ok(())
    }

    /// Find a holding register by address.
    pub fn register(&self, address: u16) -> Option<&RegisterConfig> {
        self.registers.iter().find(|r| r.address == address)
    }

    /// Find a coil by address.
    pub fn coil(&self, address: u16) -> Option<&CoilConfig> {
        self.coils.iter().find(|c| c.address == address)
    }
}

fn validate_register(register: &RegisterConfig) -> Result<()> {
    let name = &register.name;
    match &register.rule {
        RegisterRule::Walk(walk) => {
            if !(walk.min.is_finite() && walk.max.is_finite() && walk.min < walk.max) {
                anyhow::bail!("Register {name}: min must be lower than max");
            }
            if !(walk.delta.is_finite() && walk.delta > 0.0) {
                anyhow::bail!("Register {name}: delta must be positive");
            }
            if !is_valid_scale(walk.scale) {
                anyhow::bail!("Register {name}: scale must be positive");
            }
            let (lo, hi) = walk.raw_bounds();
            if lo < 0.0 || hi > f64::from(u16::MAX) || lo > hi {
                anyhow::bail!(
                    "Register {name}: range [{}, {}] does not fit a 16-bit register with scale {}",
                    walk.min,
                    walk.max,
                    walk.scale
                );
            }
            if register.initial < walk.min || register.initial > walk.max {
                anyhow::bail!(
                    "Register {name}: initial value {} outside [{}, {}]",
                    register.initial,
                    walk.min,
                    walk.max
                );
            }
        }
        RegisterRule::Counter(counter) => {
            if counter.step == 0 || counter.every_ticks == 0 {
                anyhow::bail!("Register {name}: counter step and period must be positive");
            }
            let initial = register.initial;
            if initial.fract() != 0.0 || initial < 0.0 || initial > f64::from(u16::MAX) {
                anyhow::bail!("Register {name}: counter initial value {initial} is not a 16-bit integer");
            }
        }
    }
    Ok(())
}
