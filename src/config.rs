//! Controller and run configuration
//!
//! All tunable parameters for a turbidostat run.  Per-channel values
//! (setpoint, limits, initial estimate) can be replaced at runtime between
//! cycles through [`AppCommand`](crate::app::commands::AppCommand).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Growth-rate estimate used when neither the caller nor the history has one.
pub const DEFAULT_K: f64 = 0.5;

/// Closed `(min, max)` interval used for output and growth-rate bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    pub min: f64,
    /// Upper bound; `+inf` is stored as `null` in JSON.
    #[serde(with = "upper_bound", default = "upper_bound::unbounded")]
    pub max: f64,
}

impl Limits {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// `[min, +inf)`.
    pub const fn at_least(min: f64) -> Self {
        Self::new(min, f64::INFINITY)
    }

    /// Clamp `value` into the interval.  NaN collapses onto `min`; the
    /// result is always finite, so an open upper bound yields `f64::MAX`
    /// rather than `+inf`.
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.min;
        }
        let clamped = value.max(self.min).min(self.max);
        if clamped.is_finite() {
            clamped
        } else {
            clamped.clamp(f64::MIN, f64::MAX)
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn validate(&self, field: &'static str) -> Result<(), ConfigError> {
        if self.min.is_nan() || self.max.is_nan() || self.min > self.max {
            return Err(ConfigError::BadLimits {
                field,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

mod upper_bound {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn unbounded() -> f64 {
        f64::INFINITY
    }

    pub fn serialize<S: Serializer>(value: &f64, s: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            s.serialize_some(value)
        } else {
            s.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(d)?.unwrap_or(f64::INFINITY))
    }
}

// ───────────────────────────────────────────────────────────────
// Per-channel controller configuration
// ───────────────────────────────────────────────────────────────

/// Parameters for one parameter-estimating controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Target OD.  Required: a channel without one must not start.
    pub setpoint: Option<f64>,
    /// Bounds on the dilution fraction handed to the actuator.
    pub output_limits: Limits,
    /// Bounds on the inferred growth rate (per hour).
    pub k_limits: Limits,
    /// Growth-rate estimate recorded in the seed state (per hour).
    pub initial_k: f64,
    /// OD recorded in the seed state.
    pub initial_od: f64,
    /// Weight given to each newly inferred k (`s_k`).
    pub k_smoothing: f64,
    /// Fraction of the gap from prior OD to setpoint closed per step (`s_o`).
    pub output_smoothing: f64,
    /// When set, measurements are clamped to the model prediction ± this.
    pub prediction_clamp: Option<f64>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            setpoint: None,
            output_limits: Limits::at_least(0.0),
            k_limits: Limits::new(0.05, 3.0),
            initial_k: DEFAULT_K,
            initial_od: 1e-6,
            k_smoothing: 0.15,
            output_smoothing: 0.70,
            prediction_clamp: None,
        }
    }
}

impl ControllerConfig {
    /// Default parameters with the given target OD.
    pub fn with_setpoint(setpoint: f64) -> Self {
        Self {
            setpoint: Some(setpoint),
            ..Self::default()
        }
    }

    /// Range-check every field.  Nothing is silently defaulted.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let setpoint = self.setpoint.ok_or(ConfigError::Missing("setpoint"))?;
        validate_setpoint(setpoint)?;
        validate_output_limits(&self.output_limits)?;
        validate_k_limits(&self.k_limits)?;
        if !self.k_limits.contains(self.initial_k) {
            return Err(ConfigError::Invalid("initial_k must lie within k_limits"));
        }
        if !(self.initial_od.is_finite() && self.initial_od > 0.0) {
            return Err(ConfigError::Invalid("initial_od must be positive"));
        }
        if !(self.k_smoothing > 0.0 && self.k_smoothing <= 1.0) {
            return Err(ConfigError::Invalid("k_smoothing must be in (0, 1]"));
        }
        if !(self.output_smoothing > 0.0 && self.output_smoothing <= 1.0) {
            return Err(ConfigError::Invalid("output_smoothing must be in (0, 1]"));
        }
        if let Some(c) = self.prediction_clamp {
            if !(c.is_finite() && c > 0.0) {
                return Err(ConfigError::Invalid("prediction_clamp must be positive"));
            }
        }
        Ok(())
    }
}

pub(crate) fn validate_setpoint(setpoint: f64) -> Result<(), ConfigError> {
    if setpoint.is_finite() && setpoint > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid("setpoint must be a positive OD"))
    }
}

pub(crate) fn validate_output_limits(limits: &Limits) -> Result<(), ConfigError> {
    limits.validate("output_limits")?;
    if !limits.min.is_finite() {
        return Err(ConfigError::Invalid("output_limits.min must be finite"));
    }
    if limits.min < 0.0 {
        return Err(ConfigError::Invalid("output_limits.min must be >= 0"));
    }
    Ok(())
}

pub(crate) fn validate_k_limits(limits: &Limits) -> Result<(), ConfigError> {
    limits.validate("k_limits")?;
    if !(limits.min.is_finite() && limits.max.is_finite()) {
        return Err(ConfigError::Invalid("k_limits must be finite"));
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// Vessel geometry
// ───────────────────────────────────────────────────────────────

/// Working volume and pipetting bounds of one vessel (µL).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VesselConfig {
    pub volume_ul: f64,
    pub min_transfer_ul: f64,
    pub max_transfer_ul: f64,
}

impl Default for VesselConfig {
    fn default() -> Self {
        Self {
            volume_ul: 150.0,
            min_transfer_ul: 15.0,
            max_transfer_ul: 150.0,
        }
    }
}

impl VesselConfig {
    /// Dilution-fraction bounds implied by the pipetting bounds.
    pub fn output_limits(&self) -> Limits {
        Limits::new(
            self.min_transfer_ul / self.volume_ul,
            self.max_transfer_ul / self.volume_ul,
        )
    }

    /// Volume to replace for a given dilution fraction.
    pub fn transfer_volume(&self, fraction: f64) -> f64 {
        fraction * self.volume_ul
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.volume_ul.is_finite() && self.volume_ul > 0.0) {
            return Err(ConfigError::Invalid("volume_ul must be positive"));
        }
        if !(self.min_transfer_ul >= 0.0 && self.min_transfer_ul <= self.max_transfer_ul) {
            return Err(ConfigError::Invalid(
                "transfer volumes must satisfy 0 <= min <= max",
            ));
        }
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Whole-run configuration
// ───────────────────────────────────────────────────────────────

/// Core run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Scheduling cycle length (seconds).
    pub cycle_secs: f64,
    /// Root directory for per-channel history files.
    pub history_dir: String,
    /// Number of 96-well plates.
    pub plates: usize,
    /// Wells in use per plate.
    pub wells_per_plate: usize,
    /// Backoff between storage retries (milliseconds).
    pub retry_backoff_ms: u64,
    /// Give up after this many storage attempts; `None` retries forever.
    pub max_storage_attempts: Option<u32>,
    pub vessel: VesselConfig,
    /// Template for every channel; the manifest overrides the setpoint.
    pub controller: ControllerConfig,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            cycle_secs: 15.0 * 60.0,
            history_dir: "controller_history".into(),
            plates: 5,
            wells_per_plate: 96,
            retry_backoff_ms: 30_000,
            max_storage_attempts: None,
            vessel: VesselConfig::default(),
            controller: ControllerConfig {
                setpoint: Some(0.6),
                ..ControllerConfig::default()
            },
        }
    }
}

impl SystemConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let cfg: Self =
            serde_json::from_str(text).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Malformed(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    /// Channel template with output limits taken from the vessel geometry.
    pub fn channel_config(&self) -> ControllerConfig {
        ControllerConfig {
            output_limits: self.vessel.output_limits(),
            ..self.controller.clone()
        }
    }

    pub fn channel_count(&self) -> usize {
        self.plates * self.wells_per_plate
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.cycle_secs.is_finite() && self.cycle_secs > 0.0) {
            return Err(ConfigError::Invalid("cycle_secs must be positive"));
        }
        if self.history_dir.is_empty() {
            return Err(ConfigError::Missing("history_dir"));
        }
        if !(1..=96).contains(&self.wells_per_plate) {
            return Err(ConfigError::Invalid("wells_per_plate must be 1-96"));
        }
        if self.max_storage_attempts == Some(0) {
            return Err(ConfigError::Invalid("max_storage_attempts must be >= 1"));
        }
        self.vessel.validate()?;
        self.channel_config().validate()
    }
}
