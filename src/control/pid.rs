//! Fixed-gain PID strategy
//!
//! Proportional-integral-derivative control of the dilution fraction on
//! the OD error (`od − setpoint`, positive means dilute harder).  Time is
//! measured in hours so gains are comparable with growth rates.  Useful as a
//! baseline against [`ParamEstimator`](super::ParamEstimator) on the same
//! channel; it keeps no growth-rate estimate.

use super::{ControllerState, StepInput, StepOutcome, Strategy};

/// PID controller
#[derive(Debug, Clone, PartialEq)]
pub struct Pid {
    kp: f64,
    ki: f64,
    kd: f64,
    /// Output at zero error.
    bias: f64,
    integral: f64,
    prev_error: Option<f64>,
}

impl Pid {
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            bias: 0.0,
            integral: 0.0,
            prev_error: None,
        }
    }

    /// Set the feed-forward output applied at zero error.
    pub fn with_bias(mut self, bias: f64) -> Self {
        self.bias = bias;
        self
    }

    /// Reset controller state
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = None;
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }
}

impl Strategy for Pid {
    fn update(&mut self, input: &StepInput<'_>) -> StepOutcome {
        let od = input.measurement.filter(|m| m.is_finite()).unwrap_or(input.cached_od);
        let dt = input.delta_time / 3600.0;
        let error = od - input.setpoint;

        // Proportional
        let p = self.kp * error;

        // Integral
        self.integral += error * dt;
        let i = self.ki * self.integral;

        // Derivative
        let d = match self.prev_error {
            Some(prev) if dt > 0.0 => self.kd * (error - prev) / dt,
            _ => 0.0,
        };
        self.prev_error = Some(error);

        let output = self.bias + p + i + d;

        // Anti-windup: if output is saturated, stop integrating
        let limits = input.output_limits;
        if output >= limits.max || output <= limits.min {
            self.integral -= error * dt;
        }

        StepOutcome {
            od,
            output,
            k_estimate: None,
        }
    }

    fn restore(&mut self, _last: &ControllerState) {
        self.reset();
    }
}
