//! Mock instrument adapters for integration tests.
//!
//! Records every actuator call and event so tests can assert on the full
//! command history without a plate reader or liquid handler.

use std::collections::VecDeque;

use turbctl::app::events::AppEvent;
use turbctl::app::ports::{ActuatorPort, EventSink, SensorPort};

// ── Actuator call record ──────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Actuation {
    pub channel: usize,
    pub fraction: f64,
}

// ── MockHardware ──────────────────────────────────────────────

/// Scripted readings per channel; once a channel's script runs out it
/// keeps returning `fallback`.
pub struct MockHardware {
    scripts: Vec<VecDeque<f64>>,
    pub fallback: f64,
    pub reads: usize,
    pub calls: Vec<Actuation>,
}

#[allow(dead_code)]
impl MockHardware {
    pub fn new(channels: usize, fallback: f64) -> Self {
        Self {
            scripts: vec![VecDeque::new(); channels],
            fallback,
            reads: 0,
            calls: Vec::new(),
        }
    }

    pub fn script(mut self, channel: usize, readings: &[f64]) -> Self {
        self.scripts[channel].extend(readings);
        self
    }

    /// Fractions commanded to `channel`, oldest first.
    pub fn fractions(&self, channel: usize) -> Vec<f64> {
        self.calls
            .iter()
            .filter(|c| c.channel == channel)
            .map(|c| c.fraction)
            .collect()
    }

    pub fn last_call(&self) -> Option<&Actuation> {
        self.calls.last()
    }
}

impl SensorPort for MockHardware {
    fn measure(&mut self, channel: usize) -> f64 {
        self.reads += 1;
        self.scripts
            .get_mut(channel)
            .and_then(VecDeque::pop_front)
            .unwrap_or(self.fallback)
    }
}

impl ActuatorPort for MockHardware {
    fn actuate(&mut self, channel: usize, fraction: f64) {
        self.calls.push(Actuation { channel, fraction });
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}
