//! Cycle service — the hexagonal core.
//!
//! [`CycleService`] owns the controller bank and the vessel geometry.  All
//! I/O flows through port traits injected at call sites, so the whole service
//! runs against mock adapters or the simulation rig unchanged.
//!
//! ```text
//!  SensorPort ──▶ ┌────────────────────────┐ ──▶ EventSink
//!                 │      CycleService       │
//! ActuatorPort ◀──│   ControllerBank · k̂    │ ◀─▶ HistoryStore
//!                 └────────────────────────┘
//! ```

use log::{info, warn};

use crate::adapters::clock::SystemClock;
use crate::bank::{BankBuild, ControllerBank, StepTiming};
use crate::config::{SystemConfig, VesselConfig};
use crate::control::Controller;
use crate::error::{Error, Result};

use super::commands::AppCommand;
use super::events::{AppEvent, CycleReport};
use super::ports::{ActuatorPort, Clock, EventSink, HistoryStore, SensorPort};

// ───────────────────────────────────────────────────────────────
// CycleService
// ───────────────────────────────────────────────────────────────

pub struct CycleService {
    bank: ControllerBank,
    vessel: VesselConfig,
    timing: StepTiming,
    cycle_count: u64,
}

impl CycleService {
    /// Service over an already built bank, stepping on the wall clock.
    pub fn new(bank: ControllerBank, config: &SystemConfig) -> Self {
        Self {
            bank,
            vessel: config.vessel.clone(),
            timing: StepTiming::WallClock,
            cycle_count: 0,
        }
    }

    /// Take over a bank build, reporting every rejected channel and then
    /// [`AppEvent::Started`].
    pub fn start(build: BankBuild, config: &SystemConfig, sink: &mut impl EventSink) -> Self {
        for rejected in &build.rejected {
            sink.emit(&AppEvent::ChannelRejected {
                name: rejected.name.clone(),
                reason: rejected.error.to_string(),
            });
        }
        let service = Self::new(build.bank, config);
        sink.emit(&AppEvent::Started {
            channels: service.bank.len(),
            rejected: build.rejected.len(),
        });
        info!(
            "CycleService started: {} channels, {} rejected",
            service.bank.len(),
            build.rejected.len()
        );
        service
    }

    /// Replace how each cycle advances controller time.
    pub fn with_timing(mut self, timing: StepTiming) -> Self {
        self.timing = timing;
        self
    }

    // ── Per-cycle orchestration ───────────────────────────────

    /// Run one full cycle: read every channel → step the bank → actuate.
    ///
    /// The `hw` parameter satisfies **both** [`SensorPort`] and
    /// [`ActuatorPort`], since a plate reader and liquid handler are usually
    /// driven by the same instrument session.
    pub fn tick(
        &mut self,
        hw: &mut (impl SensorPort + ActuatorPort),
        sink: &mut impl EventSink,
    ) -> Result<CycleReport> {
        self.tick_on(&SystemClock, hw, sink)
    }

    /// [`tick`](Self::tick) with `clock` as the wall clock.
    pub fn tick_on(
        &mut self,
        clock: &impl Clock,
        hw: &mut (impl SensorPort + ActuatorPort),
        sink: &mut impl EventSink,
    ) -> Result<CycleReport> {
        let readings: Vec<f64> = (0..self.bank.len()).map(|ch| hw.measure(ch)).collect();
        let outputs = self.bank.step_all_on(clock, self.timing, &readings)?;
        for (ch, &fraction) in outputs.iter().enumerate() {
            hw.actuate(ch, fraction);
        }
        self.cycle_count += 1;

        let report = CycleReport {
            cycle: self.cycle_count,
            volumes_ul: outputs
                .iter()
                .map(|&f| self.vessel.transfer_volume(f))
                .collect(),
            outputs,
            readings,
            k_estimates: self.bank.iter().map(|c| c.log().last().k_estimate).collect(),
            od_estimates: self.bank.od_estimates(),
        };
        sink.emit(&AppEvent::CycleCompleted(report.clone()));
        Ok(report)
    }

    // ── Command handling ──────────────────────────────────────

    /// Apply an external command between cycles.
    ///
    /// A command that cannot be applied emits [`AppEvent::CommandRejected`]
    /// and returns the error; controllers are left unchanged.
    pub fn handle_command(
        &mut self,
        cmd: AppCommand,
        store: &impl HistoryStore,
        sink: &mut impl EventSink,
    ) -> Result<()> {
        match cmd {
            AppCommand::SetSetpoint { name, setpoint } => {
                self.set_setpoint(&name, setpoint, sink)
            }
            AppCommand::SetOutputLimits { name, limits } => {
                let result = self
                    .channel_mut(&name)
                    .and_then(|c| c.set_output_limits(limits));
                reject_on_error(result, sink)
            }
            AppCommand::SetKLimits { name, limits } => {
                let result = self.channel_mut(&name).and_then(|c| c.set_k_limits(limits));
                reject_on_error(result, sink)
            }
            AppCommand::ApplySetpoints(targets) => {
                let mut first_error = None;
                for (name, setpoint) in targets {
                    if let Err(e) = self.set_setpoint(&name, setpoint, sink) {
                        first_error = first_error.or(Some(e));
                    }
                }
                first_error.map_or(Ok(()), Err)
            }
            AppCommand::Checkpoint => self.checkpoint(store, sink).map(|_| ()),
        }
    }

    // ── Persistence ───────────────────────────────────────────

    /// Resume every channel from `store`.
    ///
    /// Channels without usable history keep their defaults; the event says
    /// which.  Returns the number of channels restored.
    pub fn restore(&mut self, store: &impl HistoryStore, sink: &mut impl EventSink) -> usize {
        let mut restored = 0;
        for controller in self.bank.iter_mut() {
            let name = controller.name().to_owned();
            match controller.load_from(store) {
                Ok(log) => {
                    restored += 1;
                    sink.emit(&AppEvent::HistoryRestored {
                        name,
                        steps: log.len(),
                    });
                }
                Err(Error::NotFound { .. }) => sink.emit(&AppEvent::HistoryMissing { name }),
                Err(e) => {
                    warn!("{name}: history unusable, starting fresh: {e}");
                    sink.emit(&AppEvent::RestoreFailed {
                        name,
                        reason: e.to_string(),
                    });
                }
            }
        }
        info!("restored {restored}/{} channels", self.bank.len());
        restored
    }

    /// Save every channel's history.
    ///
    /// A failing channel does not stop the others from being saved; the first
    /// failure is returned once all have been tried.
    pub fn checkpoint(&self, store: &impl HistoryStore, sink: &mut impl EventSink) -> Result<usize> {
        let mut first_error = None;
        let mut saved = 0;
        for controller in self.bank.iter() {
            match controller.save_to(store) {
                Ok(()) => saved += 1,
                Err(e) => {
                    warn!("{}: checkpoint failed: {e}", controller.name());
                    sink.emit(&AppEvent::CheckpointFailed {
                        name: controller.name().to_owned(),
                        reason: e.to_string(),
                    });
                    first_error = first_error.or(Some(e));
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => {
                sink.emit(&AppEvent::Checkpointed { channels: saved });
                Ok(saved)
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn bank(&self) -> &ControllerBank {
        &self.bank
    }

    pub fn bank_mut(&mut self) -> &mut ControllerBank {
        &mut self.bank
    }

    pub fn vessel(&self) -> &VesselConfig {
        &self.vessel
    }

    pub fn timing(&self) -> StepTiming {
        self.timing
    }

    /// Cycles completed since startup.
    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    // ── Internal ──────────────────────────────────────────────

    fn channel_mut(&mut self, name: &str) -> Result<&mut Controller> {
        let idx = self.bank.position(name).ok_or_else(|| Error::NotFound {
            name: name.to_owned(),
        })?;
        self.bank.get_mut(idx).ok_or_else(|| Error::NotFound {
            name: name.to_owned(),
        })
    }

    fn set_setpoint(&mut self, name: &str, setpoint: f64, sink: &mut impl EventSink) -> Result<()> {
        let result = self
            .channel_mut(name)
            .and_then(|c| c.set_setpoint(setpoint));
        reject_on_error(result, sink)?;
        sink.emit(&AppEvent::SetpointChanged {
            name: name.to_owned(),
            setpoint,
        });
        Ok(())
    }
}

fn reject_on_error(result: Result<()>, sink: &mut impl EventSink) -> Result<()> {
    if let Err(e) = &result {
        warn!("command rejected: {e}");
        sink.emit(&AppEvent::CommandRejected {
            reason: e.to_string(),
        });
    }
    result
}
