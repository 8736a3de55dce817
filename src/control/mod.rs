//! Control core: the base controller, its pluggable strategies, and the
//! state records they produce.
//!
//! ```text
//!   measurement ──▶ Controller<S> ──▶ S::update ──▶ clamp ──▶ HistoryLog
//!                        │                                       │
//!                        └────────────── output ◀────────────────┘
//! ```
//!
//! [`Controller`] owns time bookkeeping, output clamping and history; a
//! [`Strategy`] only turns the previous state and a new reading into an OD,
//! a raw output, and optionally a growth-rate estimate.

pub mod controller;
pub mod estimator;
pub mod pid;
pub mod state;

pub use controller::Controller;
pub use estimator::ParamEstimator;
pub use pid::Pid;
pub use state::{ControllerState, HistoryError, HistoryLog, StateField};

use crate::config::Limits;

/// Everything a strategy may look at for one step.
#[derive(Debug, Clone, Copy)]
pub struct StepInput<'a> {
    /// Seconds since the previous record.
    pub delta_time: f64,
    pub measurement: Option<f64>,
    /// The previous record (the seed on the first step).
    pub prior: &'a ControllerState,
    pub prior_od: f64,
    /// Dilution actually applied after the previous step.
    pub prior_output: f64,
    /// The controller's current OD when no measurement arrives.
    pub cached_od: f64,
    pub setpoint: f64,
    pub output_limits: Limits,
    /// `false` until the first step since construction or reload.
    pub ever_updated: bool,
}

/// What a strategy decided for one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    pub od: f64,
    /// Unclamped dilution fraction.
    pub output: f64,
    pub k_estimate: Option<f64>,
}

/// A control law plugged into [`Controller`].
pub trait Strategy {
    fn update(&mut self, input: &StepInput<'_>) -> StepOutcome;

    /// Estimate recorded in the seed state, if the strategy keeps one.
    fn seed_estimate(&self) -> Option<f64> {
        None
    }

    /// Resynchronise internal state after the history was replaced.
    fn restore(&mut self, _last: &ControllerState) {}
}
