// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the scada-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Process simulation
//!
//! The simulated controller keeps its addressable memory in a
//! [`ProcessImage`]. The image is shared between the generator task, which
//! advances it once per tick, and every protocol connection. A single mutex
//! covers one whole tick or one whole request, so readers never observe a
//! partially applied tick.

pub mod process_image;

use std::io;
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;

pub use process_image::ProcessImage;

/// Process image shared between the generator and the protocol service.
pub type SharedProcessImage = Arc<Mutex<ProcessImage>>;

/// Errors raised while setting up the simulated controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The listening endpoint could not be acquired.
    #[error("failed to bind Modbus listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The memory layout is inconsistent.
    #[error("invalid controller layout: {0}")]
    Layout(String),
}

/// Random generator driving the simulation.
///
/// A fixed seed makes every run produce the same value sequence.
pub fn generator_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}
