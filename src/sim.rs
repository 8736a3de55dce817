//! Simulated turbidostat rig.
//!
//! Ground-truth exponential growth with measurement and pipetting noise,
//! exposed through [`SensorPort`] and [`ActuatorPort`] so the full
//! [`CycleService`](crate::app::service::CycleService) runs without
//! instruments.
//!
//! ```text
//!   measure(ch) ──▶ grow one cycle ──▶ true OD + noise
//!   actuate(ch, f) ──▶ f + pipetting noise ──▶ true OD / (1 + f')
//! ```
//!
//! Noise is drawn from a seeded [`StdRng`], so a given seed replays exactly.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::app::ports::{ActuatorPort, SensorPort};

// ───────────────────────────────────────────────────────────────
// Noise
// ───────────────────────────────────────────────────────────────

/// Noise amplitudes.  Every term is skipped when its amplitude is zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseModel {
    /// Uniform measurement noise in `±measurement`.
    pub measurement: f64,
    /// Peak of the occasional positive spike (clumps occluding the reader).
    /// The spike is `spike / (1 + u * 10_000)` with `u` uniform in `[0, 1)`,
    /// so it is large only rarely.
    pub spike: f64,
    /// Uniform error on the executed dilution fraction in `±actuation`.
    pub actuation: f64,
}

impl Default for NoiseModel {
    fn default() -> Self {
        Self {
            measurement: 0.005,
            spike: 0.1,
            actuation: 0.01,
        }
    }
}

impl NoiseModel {
    /// Exact readings and exact pipetting.
    pub const fn none() -> Self {
        Self {
            measurement: 0.0,
            spike: 0.0,
            actuation: 0.0,
        }
    }
}

fn jitter(rng: &mut StdRng, half_width: f64) -> f64 {
    if half_width > 0.0 {
        rng.gen_range(-half_width..=half_width)
    } else {
        0.0
    }
}

// ───────────────────────────────────────────────────────────────
// Vessel
// ───────────────────────────────────────────────────────────────

/// One culture with a known growth rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimVessel {
    /// True OD, unknown to the controller.
    pub od: f64,
    /// True growth rate (per hour).
    pub growth_k: f64,
}

impl SimVessel {
    pub fn new(od: f64, growth_k: f64) -> Self {
        Self { od, growth_k }
    }

    pub fn grow(&mut self, secs: f64) {
        self.od *= (secs / 3600.0 * self.growth_k).exp();
    }

    /// Replace `fraction` of the volume with sterile medium.
    pub fn dilute(&mut self, fraction: f64) {
        self.od /= 1.0 + fraction;
    }
}

/// Growth rates staggered across `count` vessels: the first half spread
/// from 0.5 down to 0.3 per hour, the second from 1.3 down to 1.1.
pub fn staggered_growth(count: usize) -> Vec<f64> {
    let slow = count / 2;
    let fast = count - slow;
    let spread = |i: usize, n: usize, lo: f64, hi: f64| {
        let n = n.max(1) as f64;
        let i = i as f64;
        i / n * lo + (n - i) / n * hi
    };
    (0..count)
        .map(|w| {
            if w < slow {
                spread(w, slow, 0.3, 0.5)
            } else {
                spread(w - slow, fast, 1.1, 1.3)
            }
        })
        .collect()
}

// ───────────────────────────────────────────────────────────────
// Rig
// ───────────────────────────────────────────────────────────────

/// A bank of simulated vessels on a fixed cycle.
///
/// Each `measure(ch)` first grows vessel `ch` by one cycle, so a service tick
/// (measure all, then actuate all) advances the whole rig by one cycle.
pub struct SimRig {
    vessels: Vec<SimVessel>,
    cycle_secs: f64,
    noise: NoiseModel,
    rng: StdRng,
    applied: Vec<f64>,
}

impl SimRig {
    pub fn new(vessels: Vec<SimVessel>, cycle_secs: f64, noise: NoiseModel, seed: u64) -> Self {
        let applied = vec![0.0; vessels.len()];
        Self {
            vessels,
            cycle_secs,
            noise,
            rng: StdRng::seed_from_u64(seed),
            applied,
        }
    }

    /// Vessels with the given growth rates and starting ODs drawn uniformly
    /// from `od_range`.
    pub fn random_start(
        growth: &[f64],
        od_range: (f64, f64),
        cycle_secs: f64,
        noise: NoiseModel,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed ^ 0x5eed);
        let (lo, hi) = od_range;
        let vessels = growth
            .iter()
            .map(|&k| {
                let od = if hi > lo { rng.gen_range(lo..hi) } else { lo };
                SimVessel::new(od, k)
            })
            .collect();
        Self::new(vessels, cycle_secs, noise, seed)
    }

    pub fn len(&self) -> usize {
        self.vessels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vessels.is_empty()
    }

    pub fn vessels(&self) -> &[SimVessel] {
        &self.vessels
    }

    pub fn vessel_mut(&mut self, channel: usize) -> Option<&mut SimVessel> {
        self.vessels.get_mut(channel)
    }

    pub fn true_ods(&self) -> Vec<f64> {
        self.vessels.iter().map(|v| v.od).collect()
    }

    /// Fractions actually executed on the last actuation, noise included.
    pub fn applied(&self) -> &[f64] {
        &self.applied
    }

    pub fn cycle_secs(&self) -> f64 {
        self.cycle_secs
    }
}

impl SensorPort for SimRig {
    fn measure(&mut self, channel: usize) -> f64 {
        let Some(vessel) = self.vessels.get_mut(channel) else {
            return f64::NAN;
        };
        vessel.grow(self.cycle_secs);
        let mut reading = vessel.od + jitter(&mut self.rng, self.noise.measurement);
        if self.noise.spike > 0.0 {
            reading += self.noise.spike / (1.0 + self.rng.gen_range(0.0..1.0) * 10_000.0);
        }
        reading
    }
}

impl ActuatorPort for SimRig {
    fn actuate(&mut self, channel: usize, fraction: f64) {
        let actual = fraction + jitter(&mut self.rng, self.noise.actuation);
        if let Some(vessel) = self.vessels.get_mut(channel) {
            vessel.dilute(actual);
            self.applied[channel] = actual;
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Setpoint schedule
// ───────────────────────────────────────────────────────────────

/// Square-wave setpoint: every `tooth_cycles` cycles the target alternates
/// between `base` and `base + height`, with a fresh random height each time.
pub struct SetpointSchedule {
    pub tooth_cycles: u64,
    pub base: f64,
    pub min_height: f64,
    pub extra_height: f64,
    rng: StdRng,
}

impl SetpointSchedule {
    pub fn new(seed: u64) -> Self {
        Self {
            tooth_cycles: 40,
            base: 0.4,
            min_height: 0.02,
            extra_height: 0.06,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// New setpoint at the start of a tooth, otherwise `None`.
    pub fn at(&mut self, cycle: u64) -> Option<f64> {
        let tooth = self.tooth_cycles.max(1);
        if cycle % tooth != 0 {
            return None;
        }
        let extra = if self.extra_height > 0.0 {
            self.rng.gen_range(0.0..=self.extra_height)
        } else {
            0.0
        };
        let height = self.min_height + extra;
        let phase = (cycle % (2 * tooth)) as f64 / tooth as f64;
        Some(phase * height + self.base)
    }
}
