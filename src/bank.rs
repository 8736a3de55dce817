//! Controller bank — one independent controller per vessel.
//!
//! Channels share nothing: no controller reads or mutates another, so a
//! cycle can be stepped in parallel (feature `parallel`, on by default) with
//! results identical to stepping them one at a time in any order.

use log::{debug, warn};

use crate::adapters::clock::SystemClock;
use crate::app::ports::Clock;
use crate::config::ControllerConfig;
use crate::control::{Controller, ParamEstimator, Strategy};
use crate::error::{Error, Result};

/// How a batched step advances time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepTiming {
    /// Read the wall clock once and step every channel to that instant.
    WallClock,
    /// Step every channel to this absolute time (seconds).
    At(f64),
    /// Advance every channel by this many seconds from its own last record.
    Elapsed(f64),
}

/// A channel refused at build time.
#[derive(Debug)]
pub struct RejectedChannel {
    pub name: String,
    pub error: Error,
}

/// Result of [`ControllerBank::build`]: the channels that started and the
/// ones that did not.
#[derive(Debug)]
pub struct BankBuild<S = ParamEstimator> {
    pub bank: ControllerBank<S>,
    pub rejected: Vec<RejectedChannel>,
}

#[derive(Debug, Clone)]
pub struct ControllerBank<S = ParamEstimator> {
    controllers: Vec<Controller<S>>,
}

impl ControllerBank<ParamEstimator> {
    /// Build one controller per `(identity, config)` item.
    ///
    /// A channel whose config is missing or invalid is rejected on its own;
    /// it never stops the rest of the bank from starting.
    pub fn build<I, N>(channels: I) -> BankBuild
    where
        I: IntoIterator<Item = (N, Result<ControllerConfig>)>,
        N: Into<String>,
    {
        let mut controllers = Vec::new();
        let mut rejected = Vec::new();
        for (name, cfg) in channels {
            let name = name.into();
            match cfg.and_then(|cfg| Controller::new(name.clone(), &cfg)) {
                Ok(c) => controllers.push(c),
                Err(error) => {
                    warn!("channel {name} not started: {error}");
                    rejected.push(RejectedChannel { name, error });
                }
            }
        }
        BankBuild {
            bank: ControllerBank { controllers },
            rejected,
        }
    }

    /// `count` identically configured channels named by index.
    pub fn uniform(count: usize, cfg: &ControllerConfig) -> Result<Self> {
        Self::uniform_on(&SystemClock, count, cfg)
    }

    /// As [`uniform`](Self::uniform), every channel seeded at `clock`'s time.
    pub fn uniform_on(clock: &impl Clock, count: usize, cfg: &ControllerConfig) -> Result<Self> {
        let controllers = (0..count)
            .map(|i| Controller::new_on(clock, i.to_string(), cfg))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { controllers })
    }

    pub fn k_estimates(&self) -> Vec<f64> {
        self.controllers.iter().map(Controller::k_estimate).collect()
    }
}

impl<S: Strategy> ControllerBank<S> {
    pub fn from_controllers(controllers: Vec<Controller<S>>) -> Self {
        Self { controllers }
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    pub fn get(&self, channel: usize) -> Option<&Controller<S>> {
        self.controllers.get(channel)
    }

    pub fn get_mut(&mut self, channel: usize) -> Option<&mut Controller<S>> {
        self.controllers.get_mut(channel)
    }

    /// Index of the channel with this identity.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.controllers.iter().position(|c| c.name() == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Controller<S>> {
        self.controllers.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Controller<S>> {
        self.controllers.iter_mut()
    }

    pub fn names(&self) -> Vec<&str> {
        self.controllers.iter().map(Controller::name).collect()
    }

    /// Consecutive groups of `per_plate` channels (the last may be short).
    pub fn plates(&self, per_plate: usize) -> std::slice::Chunks<'_, Controller<S>> {
        self.controllers.chunks(per_plate.max(1))
    }

    pub fn od_estimates(&self) -> Vec<f64> {
        self.controllers.iter().map(Controller::od).collect()
    }

    pub fn last_outputs(&self) -> Vec<f64> {
        self.controllers
            .iter()
            .map(Controller::last_known_output)
            .collect()
    }

    /// Step every channel with its reading; outputs come back in channel order.
    pub fn step_all(&mut self, timing: StepTiming, readings: &[f64]) -> Result<Vec<f64>>
    where
        S: Send,
    {
        self.step_all_on(&SystemClock, timing, readings)
    }

    /// [`step_all`](Self::step_all) with `clock` resolving [`StepTiming::WallClock`].
    pub fn step_all_on(
        &mut self,
        clock: &impl Clock,
        timing: StepTiming,
        readings: &[f64],
    ) -> Result<Vec<f64>>
    where
        S: Send,
    {
        let timing = self.check(clock, timing, readings)?;

        #[cfg(feature = "parallel")]
        let outputs: Vec<f64> = {
            use rayon::prelude::*;
            self.controllers
                .par_iter_mut()
                .zip(readings.par_iter())
                .map(|(c, &od)| step_one(c, timing, od))
                .collect()
        };

        #[cfg(not(feature = "parallel"))]
        let outputs: Vec<f64> = self
            .controllers
            .iter_mut()
            .zip(readings)
            .map(|(c, &od)| step_one(c, timing, od))
            .collect();

        debug!("bank stepped {} channels", outputs.len());
        Ok(outputs)
    }

    /// Same as [`step_all`](Self::step_all) on the calling thread only.
    pub fn step_all_sequential(&mut self, timing: StepTiming, readings: &[f64]) -> Result<Vec<f64>> {
        self.step_all_sequential_on(&SystemClock, timing, readings)
    }

    pub fn step_all_sequential_on(
        &mut self,
        clock: &impl Clock,
        timing: StepTiming,
        readings: &[f64],
    ) -> Result<Vec<f64>> {
        let timing = self.check(clock, timing, readings)?;
        Ok(self
            .controllers
            .iter_mut()
            .zip(readings)
            .map(|(c, &od)| step_one(c, timing, od))
            .collect())
    }

    /// Validate the reading count and read the clock once for the whole cycle.
    fn check(&self, clock: &impl Clock, timing: StepTiming, readings: &[f64]) -> Result<StepTiming> {
        if readings.len() != self.controllers.len() {
            return Err(Error::ChannelCount {
                expected: self.controllers.len(),
                got: readings.len(),
            });
        }
        Ok(match timing {
            StepTiming::WallClock => StepTiming::At(clock.now_secs()),
            other => other,
        })
    }
}

impl<S> IntoIterator for ControllerBank<S> {
    type Item = Controller<S>;
    type IntoIter = std::vec::IntoIter<Controller<S>>;

    fn into_iter(self) -> Self::IntoIter {
        self.controllers.into_iter()
    }
}

fn step_one<S: Strategy>(c: &mut Controller<S>, timing: StepTiming, od: f64) -> f64 {
    match timing {
        StepTiming::Elapsed(dt) => c.step(Some(dt), Some(od), None),
        StepTiming::At(t) => c.step_at(t, Some(od), None),
        // Resolved in `check`.
        StepTiming::WallClock => c.step(None, Some(od), None),
    }
}
