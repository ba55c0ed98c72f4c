// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the scada-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Controller value table
//!
//! The process image is the simulated controller's addressable memory: a
//! holding register space of 16-bit values and a coil space of bits. Each
//! configured address owns a cell that knows how to advance itself on a
//! generator tick.
//!
//! Every configured address always holds a value. An address outside the
//! layout is answered with `IllegalDataAddress`; a write the cell refuses is
//! answered with `IllegalDataValue`.
//!
//! ## Known edge case
//!
//! Counters add their step with wrapping arithmetic. After 65535 a counter
//! wraps to 0; this is the only way a counter value ever decreases.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use log::{debug, warn};
use rand::Rng;
use tokio_modbus::ExceptionCode;

use super::ControllerError;
use crate::config::{CoilRule, ControllerConfig, RegisterRule};

/// How a holding register evolves on each tick.
#[derive(Debug, Clone)]
enum RegisterBehavior {
    /// Random walk in raw units, `level` is kept unrounded so small deltas
    /// still accumulate.
    Walk {
        level: f64,
        lo: f64,
        hi: f64,
        delta: f64,
    },
    Counter { step: u16, every_ticks: u32 },
}

#[derive(Debug, Clone)]
struct RegisterCell {
    name: String,
    value: u16,
    behavior: RegisterBehavior,
}

#[derive(Debug, Clone)]
struct CoilCell {
    name: String,
    value: bool,
    probability: f64,
    fault: bool,
}

/// Addressable memory of the simulated controller.
#[derive(Debug, Clone)]
pub struct ProcessImage {
    registers: BTreeMap<u16, RegisterCell>,
    coils: BTreeMap<u16, CoilCell>,
    ticks: u64,
}

/// Addresses covered by a request, or the exception it deserves.
fn address_range(addr: u16, cnt: usize) -> Result<RangeInclusive<u16>, ExceptionCode> {
    if cnt == 0 {
        return Err(ExceptionCode::IllegalDataValue);
    }
    let last = u16::try_from(cnt - 1)
        .ok()
        .and_then(|offset| addr.checked_add(offset))
        .ok_or(ExceptionCode::IllegalDataAddress)?;
    Ok(addr..=last)
}

impl ProcessImage {
    /// Build the image described by a controller layout.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Layout`] if the layout does not validate.
    pub fn from_config(config: &ControllerConfig) -> Result<Self, ControllerError> {
        config
            .validate()
            .map_err(|e| ControllerError::Layout(format!("{e:#}")))?;

        let registers = config
            .registers
            .iter()
            .map(|register| {
                let (value, behavior) = match &register.rule {
                    RegisterRule::Walk(walk) => {
                        let (lo, hi) = walk.raw_bounds();
                        let level = (register.initial / walk.scale).clamp(lo, hi);
                        (
                            level.round() as u16,
                            RegisterBehavior::Walk {
                                level,
                                lo,
                                hi,
                                delta: walk.delta / walk.scale,
                            },
                        )
                    }
                    RegisterRule::Counter(counter) => (
                        register.initial as u16,
                        RegisterBehavior::Counter {
                            step: counter.step,
                            every_ticks: counter.every_ticks,
                        },
                    ),
                };
                let cell = RegisterCell {
                    name: register.name.clone(),
                    value,
                    behavior,
                };
                (register.address, cell)
            })
            .collect();

        let coils = config
            .coils
            .iter()
            .map(|coil| {
                let cell = CoilCell {
                    name: coil.name.clone(),
                    value: coil.initial,
                    probability: coil.rule.probability(),
                    fault: matches!(coil.rule, CoilRule::Event { .. }),
                };
                (coil.address, cell)
            })
            .collect();

        Ok(Self {
            registers,
            coils,
            ticks: 0,
        })
    }

    /// Number of generator ticks applied so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Current raw value of a holding register.
    pub fn register(&self, addr: u16) -> Option<u16> {
        self.registers.get(&addr).map(|cell| cell.value)
    }

    /// Current state of a coil.
    pub fn coil(&self, addr: u16) -> Option<bool> {
        self.coils.get(&addr).map(|cell| cell.value)
    }

    /// One line summary of every register, `name=value` in address order.
    pub fn status_line(&self) -> String {
        self.registers
            .values()
            .map(|cell| format!("{}={}", cell.name, cell.value))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Advance every cell by one generator tick.
    pub fn tick<R: Rng>(&mut self, rng: &mut R) {
        self.ticks += 1;
        let ticks = self.ticks;

        for cell in self.registers.values_mut() {
            match &mut cell.behavior {
                RegisterBehavior::Walk {
                    level,
                    lo,
                    hi,
                    delta,
                } => {
                    let step = rng.random_range(-*delta..=*delta);
                    *level = (*level + step).clamp(*lo, *hi);
                    cell.value = level.round() as u16;
                }
                RegisterBehavior::Counter { step, every_ticks } => {
                    if ticks % u64::from(*every_ticks) == 0 {
                        cell.value = cell.value.wrapping_add(*step);
                    }
                }
            }
        }

        for cell in self.coils.values_mut() {
            if rng.random_bool(cell.probability) {
                cell.value = !cell.value;
                if cell.fault {
                    warn!("Fault coil {} switched to {}", cell.name, cell.value);
                } else {
                    debug!("Coil {} switched to {}", cell.name, cell.value);
                }
            }
        }
    }

    /// Read `cnt` consecutive holding registers starting at `addr`.
    pub fn read_registers(&self, addr: u16, cnt: u16) -> Result<Vec<u16>, ExceptionCode> {
        address_range(addr, cnt.into())?
            .map(|reg_addr| {
                self.registers.get(&reg_addr).map(|cell| cell.value).ok_or_else(|| {
                    debug!("Holding register {} is not part of the layout", reg_addr);
                    ExceptionCode::IllegalDataAddress
                })
            })
            .collect()
    }

    /// Read `cnt` consecutive coils starting at `addr`.
    pub fn read_coils(&self, addr: u16, cnt: u16) -> Result<Vec<bool>, ExceptionCode> {
        address_range(addr, cnt.into())?
            .map(|coil_addr| {
                self.coils.get(&coil_addr).map(|cell| cell.value).ok_or_else(|| {
                    debug!("Coil {} is not part of the layout", coil_addr);
                    ExceptionCode::IllegalDataAddress
                })
            })
            .collect()
    }

    /// Write consecutive holding registers starting at `addr`.
    ///
    /// The write is all-or-nothing: every target is checked before any is
    /// modified. Walk registers refuse values outside their bounds and
    /// counters refuse values lower than their current count.
    pub fn write_registers(&mut self, addr: u16, values: &[u16]) -> Result<(), ExceptionCode> {
        let range = address_range(addr, values.len())?;

        for (reg_addr, value) in range.clone().zip(values) {
            let cell = self
                .registers
                .get(&reg_addr)
                .ok_or(ExceptionCode::IllegalDataAddress)?;
            let accepted = match &cell.behavior {
                RegisterBehavior::Walk { lo, hi, .. } => {
                    (*lo..=*hi).contains(&f64::from(*value))
                }
                RegisterBehavior::Counter { .. } => *value >= cell.value,
            };
            if !accepted {
                warn!(
                    "Rejected write of {} to register {} ({})",
                    value, reg_addr, cell.name
                );
                return Err(ExceptionCode::IllegalDataValue);
            }
        }

        for (reg_addr, value) in range.zip(values) {
            if let Some(cell) = self.registers.get_mut(&reg_addr) {
                cell.value = *value;
                if let RegisterBehavior::Walk { level, .. } = &mut cell.behavior {
                    *level = f64::from(*value);
                }
                debug!("Written value {} to register {} ({})", value, reg_addr, cell.name);
            }
        }
        Ok(())
    }

    /// Write consecutive coils starting at `addr`, all-or-nothing.
    pub fn write_coils(&mut self, addr: u16, values: &[bool]) -> Result<(), ExceptionCode> {
        let range = address_range(addr, values.len())?;
        if range.clone().any(|coil_addr| !self.coils.contains_key(&coil_addr)) {
            return Err(ExceptionCode::IllegalDataAddress);
        }

        for (coil_addr, value) in range.zip(values) {
            if let Some(cell) = self.coils.get_mut(&coil_addr) {
                cell.value = *value;
                debug!("Written value {} to coil {} ({})", value, coil_addr, cell.name);
            }
        }
        Ok(())
    }
}
