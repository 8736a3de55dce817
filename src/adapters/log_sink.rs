//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events through
//! the `log` facade, one line per concern, so run logs can be grepped by tag.
//! A dashboard or notification adapter would implement the same trait.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::CycleCompleted(r) => {
                info!("CYCLE {} | FLOW RATES {}", r.cycle, fmt_all(&r.outputs));
                let ks: Vec<f64> = r.k_estimates.iter().map(|k| k.unwrap_or(f64::NAN)).collect();
                info!("CYCLE {} | K ESTIMATES {}", r.cycle, fmt_all(&ks));
                info!("CYCLE {} | OD ESTIMATES {}", r.cycle, fmt_all(&r.od_estimates));
                info!(
                    "CYCLE {} | REPLACEMENT VOLUMES {}",
                    r.cycle,
                    fmt_all(&r.volumes_ul)
                );
            }
            AppEvent::Started { channels, rejected } => {
                info!("START | channels={channels} rejected={rejected}");
            }
            AppEvent::ChannelRejected { name, reason } => {
                warn!("CONFIG | {name} rejected: {reason}");
            }
            AppEvent::HistoryRestored { name, steps } => {
                info!("HISTORY | {name} restored ({steps} steps)");
            }
            AppEvent::HistoryMissing { name } => {
                info!("HISTORY | {name} has no saved history, using defaults");
            }
            AppEvent::RestoreFailed { name, reason } => {
                warn!("HISTORY | {name} restore failed: {reason}");
            }
            AppEvent::Checkpointed { channels } => {
                info!("HISTORY | checkpointed {channels} channels");
            }
            AppEvent::CheckpointFailed { name, reason } => {
                warn!("HISTORY | {name} checkpoint failed: {reason}");
            }
            AppEvent::SetpointChanged { name, setpoint } => {
                info!("SETPOINT | {name} -> {setpoint:.3}");
            }
            AppEvent::CommandRejected { reason } => {
                warn!("COMMAND | rejected: {reason}");
            }
        }
    }
}

fn fmt_all(values: &[f64]) -> String {
    let parts: Vec<String> = values.iter().map(|v| format!("{v:.3}")).collect();
    format!("[{}]", parts.join(", "))
}
