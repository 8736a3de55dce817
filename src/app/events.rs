//! Outbound application events.
//!
//! The [`CycleService`](super::service::CycleService) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other side
//! decide what to do with them: write a log line, feed a dashboard, page
//! someone.

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The service is ready to run cycles.
    Started { channels: usize, rejected: usize },

    /// A channel was refused at build time and will not be controlled.
    ChannelRejected { name: String, reason: String },

    /// One full read → step → actuate pass finished.
    CycleCompleted(CycleReport),

    /// A channel resumed from its saved history.
    HistoryRestored { name: String, steps: usize },

    /// No saved history; the channel starts from defaults.
    HistoryMissing { name: String },

    /// Saved history exists but could not be used; the channel starts from defaults.
    RestoreFailed { name: String, reason: String },

    /// Every channel's history was saved.
    Checkpointed { channels: usize },

    CheckpointFailed { name: String, reason: String },

    /// A channel's target OD changed at runtime.
    SetpointChanged { name: String, setpoint: f64 },

    /// A runtime command could not be applied.
    CommandRejected { reason: String },
}

/// Per-cycle snapshot, one entry per channel in bank order.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    pub readings: Vec<f64>,
    /// Dilution fractions handed to the actuator.
    pub outputs: Vec<f64>,
    /// `outputs` converted to replacement volumes (µL).
    pub volumes_ul: Vec<f64>,
    pub k_estimates: Vec<Option<f64>>,
    pub od_estimates: Vec<f64>,
}
