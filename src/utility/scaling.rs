// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the scada-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Engineering unit conversion for 16-bit registers
//!
//! Registers carry unsigned integers; process values are reals. A register
//! bound to a `scale` stores `engineering / scale` and is read back as
//! `raw * scale`, so a scale of `0.1` gives one decimal of resolution.
//!
//! Conversion toward the register truncates. Because most decimal scales are
//! not exactly representable in binary, a quotient that lands within
//! `1e-6` of an integer is snapped to that integer first: `123.4 / 0.1`
//! evaluates to `1233.9999…` in floating point and must still store `1234`.

use thiserror::Error;

/// Distance under which a quotient is considered to be an exact integer.
const SNAP_EPSILON: f64 = 1e-6;

/// Errors raised when an engineering value cannot be stored in a register.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScalingError {
    #[error("scale must be a positive finite number, got {0}")]
    InvalidScale(f64),
    #[error("value {0} is not a finite number")]
    NotFinite(f64),
    #[error("value {value} converts to raw {raw}, outside the 16-bit register range")]
    OutOfRange { value: f64, raw: f64 },
}

/// Returns `true` when `scale` can be used to convert register values.
pub fn is_valid_scale(scale: f64) -> bool {
    scale.is_finite() && scale > 0.0
}

/// Nearest integer to `q` if `q` is within [`SNAP_EPSILON`] of it.
fn snapped(q: f64) -> Option<f64> {
    let nearest = q.round();
    ((q - nearest).abs() < SNAP_EPSILON).then_some(nearest)
}

/// Convert a raw register value to engineering units.
///
/// Decimal scales such as `0.1` divide by their integral inverse, which
/// yields the double closest to the decimal result (`300 * 0.1` would give
/// `30.000000000000004`).
pub fn to_engineering(raw: u16, scale: f64) -> f64 {
    match snapped(1.0 / scale) {
        Some(divisor) if divisor >= 1.0 => f64::from(raw) / divisor,
        _ => f64::from(raw) * scale,
    }
}

/// Convert an engineering value to a raw register value.
///
/// # Errors
///
/// * [`ScalingError::InvalidScale`] if `scale` is not strictly positive and finite
/// * [`ScalingError::NotFinite`] for NaN or infinite values
/// * [`ScalingError::OutOfRange`] if the truncated quotient is negative or above 65535
///
/// # Example
///
/// ```
/// use scada_acquisition::utility::scaling::to_raw;
///
/// assert_eq!(to_raw(42.0, 0.1).unwrap(), 420);
/// assert_eq!(to_raw(123.4, 0.1).unwrap(), 1234);
/// assert_eq!(to_raw(12.37, 0.1).unwrap(), 123);
/// ```
pub fn to_raw(value: f64, scale: f64) -> Result<u16, ScalingError> {
    if !is_valid_scale(scale) {
        return Err(ScalingError::InvalidScale(scale));
    }
    if !value.is_finite() {
        return Err(ScalingError::NotFinite(value));
    }

    let q = value / scale;
    let raw = snapped(q).unwrap_or_else(|| q.trunc());
    if raw < 0.0 || raw > f64::from(u16::MAX) {
        return Err(ScalingError::OutOfRange { value, raw });
    }
    Ok(raw as u16)
}

/// Raw register bounds enclosing the engineering range `[min, max]`.
///
/// The lower bound rounds up and the upper bound rounds down so that every
/// raw value inside the returned range reads back inside `[min, max]`.
pub fn raw_bounds(min: f64, max: f64, scale: f64) -> (f64, f64) {
    let lo = min / scale;
    let hi = max / scale;
    (
        snapped(lo).unwrap_or_else(|| lo.ceil()),
        snapped(hi).unwrap_or_else(|| hi.floor()),
    )
}
