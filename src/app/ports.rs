//! Port traits — the hexagonal boundary between the control core and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ CycleService (domain)
//! ```
//!
//! Plate reader, liquid handler, history storage, clock and event output are
//! all reached through these traits.  The [`CycleService`](super::service::CycleService)
//! consumes them via generics, so the core never touches hardware or disk
//! directly.
//!
//! Channels are addressed by their index in the
//! [`ControllerBank`](crate::bank::ControllerBank).

use crate::control::HistoryLog;
use crate::error::Result;

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: plate reader → domain)
// ───────────────────────────────────────────────────────────────

/// Read-side port: one OD reading per channel per cycle.
///
/// Readings may be noisy or occasionally extreme; the core does no outlier
/// rejection unless a prediction clamp is configured.
pub trait SensorPort {
    fn measure(&mut self, channel: usize) -> f64;
}

// ───────────────────────────────────────────────────────────────
// Actuator port (driven adapter: domain → liquid handler)
// ───────────────────────────────────────────────────────────────

/// Write-side port: replace `fraction` of the vessel volume with fresh medium.
///
/// `fraction` always lies within the channel's output limits.
pub trait ActuatorPort {
    fn actuate(&mut self, channel: usize, fraction: f64);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// History storage port (driven adapter: domain ↔ disk)
// ───────────────────────────────────────────────────────────────

/// Durable per-channel history keyed by channel identity.
///
/// - `save` either stores the whole log or nothing.
/// - `load` returns [`Error::NotFound`](crate::error::Error::NotFound) when
///   nothing was ever saved under `name`.
/// - Transient contention is retried inside the implementation; only
///   unusable targets surface as [`Error::Storage`](crate::error::Error::Storage).
pub trait HistoryStore {
    fn save(&self, name: &str, history: &HistoryLog) -> Result<()>;

    fn load(&self, name: &str) -> Result<HistoryLog>;

    fn exists(&self, name: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Wall-clock source for real-time stepping.
pub trait Clock {
    /// Seconds since the Unix epoch.
    fn now_secs(&self) -> f64;
}
