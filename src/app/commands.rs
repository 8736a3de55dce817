//! Inbound commands to the application service.
//!
//! Actions requested by the outside world (operator console, manifest
//! watcher, scheduler) that the [`CycleService`](super::service::CycleService)
//! interprets and applies between cycles.

use crate::config::Limits;

/// Channels are addressed by identity, as they appear in history file names
/// and in the manifest.
#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    /// Change one channel's target OD.
    SetSetpoint { name: String, setpoint: f64 },

    /// Change one channel's dilution fraction bounds.
    SetOutputLimits { name: String, limits: Limits },

    /// Change one channel's growth-rate bounds.
    SetKLimits { name: String, limits: Limits },

    /// Apply target ODs in bulk, e.g. from a re-read manifest.
    ApplySetpoints(Vec<(String, f64)>),

    /// Persist every channel's history now.
    Checkpoint,
}
