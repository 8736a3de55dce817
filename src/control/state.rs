//! Controller state records and the per-channel history log.
//!
//! A [`HistoryLog`] always starts with a *seed* record (`update_time`, the
//! initial `od`, and for the estimating strategy the initial `k_estimate`);
//! every later record is one controller step.  Serialised as a JSON array of
//! objects whose absent fields are omitted, which keeps `.turbhistory` files
//! interchangeable with older runs.

use core::fmt;

use serde::{Deserialize, Serialize};

/// One time step's estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerState {
    /// Seconds since the epoch, or simulated elapsed seconds.
    pub update_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub od: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta_time: Option<f64>,
    /// Dilution fraction commanded this step, already clamped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<f64>,
    /// Growth-rate estimate, per hour.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k_estimate: Option<f64>,
}

impl ControllerState {
    pub fn seed(update_time: f64, od: f64) -> Self {
        Self {
            update_time,
            od: Some(od),
            delta_time: None,
            output: None,
            k_estimate: None,
        }
    }

    pub fn is_seed(&self) -> bool {
        self.delta_time.is_none() && self.output.is_none()
    }

    pub fn get(&self, field: StateField) -> Option<f64> {
        match field {
            StateField::UpdateTime => Some(self.update_time),
            StateField::Od => self.od,
            StateField::DeltaTime => self.delta_time,
            StateField::Output => self.output,
            StateField::KEstimate => self.k_estimate,
        }
    }
}

/// Selector for [`HistoryLog::scrape`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateField {
    UpdateTime,
    Od,
    DeltaTime,
    Output,
    KEstimate,
}

// ───────────────────────────────────────────────────────────────
// HistoryLog
// ───────────────────────────────────────────────────────────────

/// Append-only, time-ordered sequence of states for one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ControllerState>", into = "Vec<ControllerState>")]
pub struct HistoryLog {
    states: Vec<ControllerState>,
}

impl HistoryLog {
    pub fn new(seed: ControllerState) -> Self {
        Self { states: vec![seed] }
    }

    /// The first record.
    pub fn seed(&self) -> &ControllerState {
        &self.states[0]
    }

    /// The most recent record (the seed if no step has run).
    pub fn last(&self) -> &ControllerState {
        // Construction guarantees at least the seed.
        &self.states[self.states.len() - 1]
    }

    /// Step records, seed excluded.
    pub fn steps(&self) -> &[ControllerState] {
        &self.states[1..]
    }

    /// Every record, seed included.
    pub fn records(&self) -> &[ControllerState] {
        &self.states
    }

    /// Number of step records.
    pub fn len(&self) -> usize {
        self.states.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One field across all step records, `None` where absent.
    pub fn scrape(&self, field: StateField) -> Vec<Option<f64>> {
        self.steps().iter().map(|s| s.get(field)).collect()
    }

    /// Append a step.  Callers guarantee `update_time` does not go backwards.
    pub(crate) fn push(&mut self, state: ControllerState) {
        debug_assert!(state.update_time >= self.last().update_time);
        self.states.push(state);
    }

    /// Encode as the on-disk JSON record sequence.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Decode and check the on-disk JSON record sequence.
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

impl TryFrom<Vec<ControllerState>> for HistoryLog {
    type Error = HistoryError;

    fn try_from(states: Vec<ControllerState>) -> Result<Self, Self::Error> {
        if states.is_empty() {
            return Err(HistoryError::Empty);
        }
        for (index, state) in states.iter().enumerate() {
            if !state.update_time.is_finite() {
                return Err(HistoryError::NonFiniteTime { index });
            }
            if index > 0 && state.update_time < states[index - 1].update_time {
                return Err(HistoryError::TimeReversed { index });
            }
        }
        Ok(Self { states })
    }
}

impl From<HistoryLog> for Vec<ControllerState> {
    fn from(log: HistoryLog) -> Self {
        log.states
    }
}

/// Why a record sequence cannot be a [`HistoryLog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    Empty,
    NonFiniteTime { index: usize },
    TimeReversed { index: usize },
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "history has no seed record"),
            Self::NonFiniteTime { index } => write!(f, "record {index} has a non-finite time"),
            Self::TimeReversed { index } => write!(f, "record {index} goes back in time"),
        }
    }
}
