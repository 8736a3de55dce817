//! Base controller: time bookkeeping, output clamping, history, persistence.
//!
//! Every call to [`Controller::step`] appends exactly one record.  The
//! returned fraction must actually be applied (or the applied value reported
//! back through `override_output` on the next step): OD tracking assumes the
//! previous output happened.

use log::{debug, info, warn};

use super::estimator::ParamEstimator;
use super::state::{ControllerState, HistoryLog, StateField};
use super::{StepInput, Strategy};
use crate::adapters::clock::SystemClock;
use crate::app::ports::{Clock, HistoryStore};
use crate::config::{self, ControllerConfig, Limits};
use crate::error::Result;

/// One channel's controller, generic over its control law.
#[derive(Debug, Clone)]
pub struct Controller<S = ParamEstimator> {
    name: String,
    setpoint: f64,
    output_limits: Limits,
    /// Current OD estimate; stands in when a step arrives without a reading.
    od: f64,
    ever_updated: bool,
    history: HistoryLog,
    strategy: S,
}

impl Controller<ParamEstimator> {
    /// Parameter-estimating controller from a channel config.
    ///
    /// The config is validated first; a channel with a missing or malformed
    /// setpoint or limits is refused rather than defaulted.
    pub fn new(name: impl Into<String>, cfg: &ControllerConfig) -> Result<Self> {
        Self::new_on(&SystemClock, name, cfg)
    }

    /// As [`new`](Self::new), seeded at `clock`'s current time.
    pub fn new_on(
        clock: &impl Clock,
        name: impl Into<String>,
        cfg: &ControllerConfig,
    ) -> Result<Self> {
        cfg.validate()?;
        let setpoint = cfg.setpoint.ok_or(crate::error::ConfigError::Missing("setpoint"))?;
        Self::with_strategy_on(
            clock,
            name,
            setpoint,
            cfg.output_limits,
            cfg.initial_od,
            ParamEstimator::from_config(cfg),
        )
    }

    /// Most recent growth-rate estimate (per hour).
    pub fn k_estimate(&self) -> f64 {
        self.strategy.k_estimate()
    }

    /// Growth-rate estimate on the latest record, or the default.
    pub fn last_known_k(&self) -> f64 {
        self.history
            .last()
            .k_estimate
            .unwrap_or(config::DEFAULT_K)
    }

    pub fn set_k_limits(&mut self, limits: Limits) -> Result<()> {
        self.strategy.set_k_limits(limits)?;
        Ok(())
    }
}

impl<S: Strategy> Controller<S> {
    /// Controller around an arbitrary strategy, seeded at the current wall-clock time.
    pub fn with_strategy(
        name: impl Into<String>,
        setpoint: f64,
        output_limits: Limits,
        initial_od: f64,
        strategy: S,
    ) -> Result<Self> {
        Self::with_strategy_on(&SystemClock, name, setpoint, output_limits, initial_od, strategy)
    }

    pub fn with_strategy_on(
        clock: &impl Clock,
        name: impl Into<String>,
        setpoint: f64,
        output_limits: Limits,
        initial_od: f64,
        strategy: S,
    ) -> Result<Self> {
        config::validate_setpoint(setpoint)?;
        config::validate_output_limits(&output_limits)?;
        let mut seed = ControllerState::seed(clock.now_secs(), initial_od);
        seed.k_estimate = strategy.seed_estimate();
        Ok(Self {
            name: name.into(),
            setpoint,
            output_limits,
            od: initial_od,
            ever_updated: false,
            history: HistoryLog::new(seed),
            strategy,
        })
    }

    // ── Stepping ──────────────────────────────────────────────

    /// Advance one step and return the clamped dilution fraction.
    ///
    /// * `delta_time` — seconds since the last record; `None` uses the wall clock.
    /// * `measurement` — new OD reading, if one was taken.
    /// * `override_output` — dilution actually applied last step, when the
    ///   hardware could not execute the commanded one exactly.
    pub fn step(
        &mut self,
        delta_time: Option<f64>,
        measurement: Option<f64>,
        override_output: Option<f64>,
    ) -> f64 {
        self.step_on(&SystemClock, delta_time, measurement, override_output)
    }

    /// [`step`](Self::step) with `clock` standing in for the wall clock.
    pub fn step_on(
        &mut self,
        clock: &impl Clock,
        delta_time: Option<f64>,
        measurement: Option<f64>,
        override_output: Option<f64>,
    ) -> f64 {
        let update_time = match delta_time {
            Some(dt) => self.history.last().update_time + dt,
            None => clock.now_secs(),
        };
        self.step_at(update_time, measurement, override_output)
    }

    /// Real-time shorthand for `step(None, Some(measurement), None)`.
    pub fn observe(&mut self, measurement: f64) -> f64 {
        self.observe_on(&SystemClock, measurement)
    }

    pub fn observe_on(&mut self, clock: &impl Clock, measurement: f64) -> f64 {
        self.step_on(clock, None, Some(measurement), None)
    }

    /// Advance to an absolute `update_time`.
    ///
    /// A time earlier than the last record is raised to it, so the log
    /// never runs backwards.
    pub fn step_at(
        &mut self,
        update_time: f64,
        measurement: Option<f64>,
        override_output: Option<f64>,
    ) -> f64 {
        let last = self.history.last();
        let update_time = if update_time >= last.update_time {
            update_time
        } else {
            warn!(
                "{}: update time {update_time} precedes last record {}; holding",
                self.name, last.update_time
            );
            last.update_time
        };
        let delta_time = update_time - last.update_time;

        let input = StepInput {
            delta_time,
            measurement,
            prior: last,
            prior_od: last.od.unwrap_or(self.od),
            prior_output: override_output.unwrap_or_else(|| last.output.unwrap_or(0.0)),
            cached_od: self.od,
            setpoint: self.setpoint,
            output_limits: self.output_limits,
            ever_updated: self.ever_updated,
        };
        let outcome = self.strategy.update(&input);
        let output = self.output_limits.clamp(outcome.output);

        self.od = outcome.od;
        self.history.push(ControllerState {
            update_time,
            od: Some(outcome.od),
            delta_time: Some(delta_time),
            output: Some(output),
            k_estimate: outcome.k_estimate,
        });
        self.ever_updated = true;

        debug!(
            "{}: od={:.4} out={:.4} (raw {:.4}) k={:?}",
            self.name, outcome.od, output, outcome.output, outcome.k_estimate
        );
        output
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn last_known_od(&self) -> f64 {
        self.history.last().od.unwrap_or(self.od)
    }

    pub fn last_known_output(&self) -> f64 {
        self.history.last().output.unwrap_or(0.0)
    }

    /// Step records, seed excluded.
    pub fn history(&self) -> &[ControllerState] {
        self.history.steps()
    }

    /// The full log, seed included.
    pub fn log(&self) -> &HistoryLog {
        &self.history
    }

    /// One field across all steps, `fill` where it is absent.
    pub fn scrape(&self, field: StateField, fill: f64) -> Vec<f64> {
        self.history
            .scrape(field)
            .into_iter()
            .map(|v| v.unwrap_or(fill))
            .collect()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    pub fn output_limits(&self) -> Limits {
        self.output_limits
    }

    pub fn od(&self) -> f64 {
        self.od
    }

    pub fn ever_updated(&self) -> bool {
        self.ever_updated
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn strategy_mut(&mut self) -> &mut S {
        &mut self.strategy
    }

    // ── Runtime configuration ─────────────────────────────────

    pub fn set_setpoint(&mut self, setpoint: f64) -> Result<()> {
        config::validate_setpoint(setpoint)?;
        self.setpoint = setpoint;
        Ok(())
    }

    pub fn set_output_limits(&mut self, limits: Limits) -> Result<()> {
        config::validate_output_limits(&limits)?;
        self.output_limits = limits;
        Ok(())
    }

    /// Overwrite the cached OD (used when a step arrives without a reading).
    pub fn set_od(&mut self, od: f64) {
        self.od = od;
    }

    // ── Persistence ───────────────────────────────────────────

    /// Checkpoint the full log under this controller's name.
    pub fn save_to(&self, store: &impl HistoryStore) -> Result<()> {
        self.save_as(store, &self.name)
    }

    pub fn save_as(&self, store: &impl HistoryStore, name: &str) -> Result<()> {
        store.save(name, &self.history)?;
        info!("{}: saved {} steps as '{name}'", self.name, self.history.len());
        Ok(())
    }

    /// Replace the log with the one saved under this controller's name.
    pub fn load_from(&mut self, store: &impl HistoryStore) -> Result<&HistoryLog> {
        let name = self.name.clone();
        self.load_as(store, &name)
    }

    /// Replace the log with the one saved under `name`.
    ///
    /// The loaded records are trusted as past state, but the next step is
    /// treated as a first step: it repeats the last output and holds k.
    pub fn load_as(&mut self, store: &impl HistoryStore, name: &str) -> Result<&HistoryLog> {
        let history = store.load(name)?;
        self.replace_history(history);
        info!("{}: restored {} steps from '{name}'", self.name, self.history.len());
        Ok(&self.history)
    }

    fn replace_history(&mut self, history: HistoryLog) {
        self.history = history;
        self.ever_updated = false;
        let last = self.history.last();
        if let Some(od) = last.od {
            self.od = od;
        }
        self.strategy.restore(last);
    }
}
