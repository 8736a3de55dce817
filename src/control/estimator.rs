//! Recursive growth-rate estimation with a setpoint-tracking dilution law.
//!
//! Growth model, `dt` in seconds and `k` per hour:
//!
//! ```text
//!   predict_od(od, f, dt, k) = od · exp(dt/3600 · k) / (1 + f)
//!   infer_k(od₀, f, od₁, dt)  = clamp(ln((1 + f) · od₁ / od₀) / dt · 3600, k_limits)
//! ```
//!
//! A growth rate cannot be identified from one point, so the first step after
//! construction or reload repeats the previous output and keeps the previous
//! estimate.  After that each inferred k is blended in with weight `s_k`, and
//! the output is the fraction that would land the next reading `s_o` of the way
//! from the prior OD to the setpoint.

use log::{debug, warn};

use super::{ControllerState, StepInput, StepOutcome, Strategy};
use crate::config::{self, ControllerConfig, DEFAULT_K, Limits};
use crate::error::ConfigError;

const SECS_PER_HOUR: f64 = 3600.0;

/// Parameter-estimating turbidostat strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamEstimator {
    k_limits: Limits,
    k_smoothing: f64,
    output_smoothing: f64,
    prediction_clamp: Option<f64>,
    initial_k: f64,
    k_estimate: f64,
}

impl ParamEstimator {
    /// Estimator with the default smoothing weights.
    pub fn new(k_limits: Limits, initial_k: f64) -> Self {
        let defaults = ControllerConfig::default();
        Self {
            k_limits,
            k_smoothing: defaults.k_smoothing,
            output_smoothing: defaults.output_smoothing,
            prediction_clamp: None,
            initial_k,
            k_estimate: initial_k,
        }
    }

    /// Build from an already validated config.
    pub fn from_config(cfg: &ControllerConfig) -> Self {
        Self {
            k_limits: cfg.k_limits,
            k_smoothing: cfg.k_smoothing,
            output_smoothing: cfg.output_smoothing,
            prediction_clamp: cfg.prediction_clamp,
            initial_k: cfg.initial_k,
            k_estimate: cfg.initial_k,
        }
    }

    /// OD after growing for `dt` seconds at rate `k` then diluting by `transfer_frac`.
    pub fn predict_od(od_now: f64, transfer_frac: f64, dt: f64, k: f64) -> f64 {
        od_now * (dt / SECS_PER_HOUR * k).exp() / (1.0 + transfer_frac)
    }

    /// Growth rate implied by two readings `dt` seconds apart with a dilution
    /// of `transfer_frac` in between, clamped into `k_limits`.
    pub fn infer_k(&self, od_then: f64, transfer_frac: f64, od_now: f64, dt: f64) -> f64 {
        let raw = ((transfer_frac + 1.0) * od_now / od_then).ln() / dt * SECS_PER_HOUR;
        self.k_limits.clamp(raw)
    }

    /// Most recent growth-rate estimate (per hour).
    pub fn k_estimate(&self) -> f64 {
        self.k_estimate
    }

    pub fn k_limits(&self) -> Limits {
        self.k_limits
    }

    pub fn set_k_limits(&mut self, limits: Limits) -> Result<(), ConfigError> {
        config::validate_k_limits(&limits)?;
        self.k_limits = limits;
        Ok(())
    }

    /// Replace `s_k` and `s_o`.  Both must lie in `(0, 1]`.
    pub fn set_smoothing(&mut self, k_smoothing: f64, output_smoothing: f64) -> Result<(), ConfigError> {
        for (value, msg) in [
            (k_smoothing, "k_smoothing must be in (0, 1]"),
            (output_smoothing, "output_smoothing must be in (0, 1]"),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::Invalid(msg));
            }
        }
        self.k_smoothing = k_smoothing;
        self.output_smoothing = output_smoothing;
        Ok(())
    }

    pub fn set_prediction_clamp(&mut self, band: Option<f64>) -> Result<(), ConfigError> {
        if let Some(b) = band {
            if !(b.is_finite() && b > 0.0) {
                return Err(ConfigError::Invalid("prediction_clamp must be positive"));
            }
        }
        self.prediction_clamp = band;
        Ok(())
    }

    /// Accept a reading, optionally pulling it back toward the model prediction.
    fn screen(&self, measurement: f64, input: &StepInput<'_>, prior_k: f64) -> f64 {
        let Some(band) = self.prediction_clamp else {
            return measurement;
        };
        let predicted =
            Self::predict_od(input.prior_od, input.prior_output, input.delta_time, prior_k);
        if !predicted.is_finite() {
            return measurement;
        }
        let screened = measurement.clamp(predicted - band, predicted + band);
        if screened != measurement {
            debug!("reading {measurement:.4} pulled to {screened:.4} (predicted {predicted:.4})");
        }
        screened
    }
}

impl Strategy for ParamEstimator {
    fn update(&mut self, input: &StepInput<'_>) -> StepOutcome {
        let prior_k = input.prior.k_estimate.unwrap_or(DEFAULT_K);

        let od = match input.measurement {
            Some(m) if m.is_finite() => self.screen(m, input, prior_k),
            Some(m) => {
                warn!("ignoring non-finite OD reading {m}");
                input.cached_od
            }
            None => input.cached_od,
        };

        let (k, output) = if input.ever_updated {
            let inferred = self.infer_k(input.prior_od, input.prior_output, od, input.delta_time);
            let k = self
                .k_limits
                .clamp(prior_k * (1.0 - self.k_smoothing) + inferred * self.k_smoothing);
            let s = self.output_smoothing;
            let target = input.setpoint * s + input.prior_od * (1.0 - s);
            let output = od * (input.delta_time / SECS_PER_HOUR * k).exp() / target - 1.0;
            (k, output)
        } else {
            // One point cannot identify k: hold the estimate and repeat the last action.
            (self.k_limits.clamp(prior_k), input.prior_output)
        };

        self.k_estimate = k;
        StepOutcome {
            od,
            output,
            k_estimate: Some(k),
        }
    }

    fn seed_estimate(&self) -> Option<f64> {
        Some(self.initial_k)
    }

    fn restore(&mut self, last: &ControllerState) {
        self.k_estimate = last.k_estimate.unwrap_or(DEFAULT_K);
    }
}
