//! Turbidostat controller library.
//!
//! Online growth-rate estimation and dilution control for banks of
//! continuously diluted cultures, plus the ports, adapters and simulation
//! rig needed to run them.  The `turbsim` binary drives the simulated rig.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod bank;
pub mod config;
pub mod control;
pub mod error;
pub mod manifest;
pub mod sim;

pub use error::{Error, Result};
