//! Application core — orchestration without I/O.
//!
//! Per-cycle read → step → actuate, runtime commands, and checkpoint /
//! restore of every channel.  All interaction with instruments and disk
//! happens through **port traits** defined in [`ports`], keeping this layer
//! fully testable without a plate reader or liquid handler.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
