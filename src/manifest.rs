//! Controller manifest: per-well target ODs.
//!
//! A headerless CSV whose first column is a `plate<P>,<WELL>` key (quoted,
//! since it contains a comma) and whose second column is the target OD:
//!
//! ```text
//! "plate0,A1",0.6
//! "plate0,B1",0.45
//! ```
//!
//! Wells are numbered column-major on a 96-well plate: index 0 is `A1`,
//! 1 is `B1`, 7 is `H1`, 8 is `A2`, 95 is `H12`.  The manifest is usually
//! edited by hand while a run is live, so reads retry on I/O errors.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use log::{info, warn};

use crate::adapters::fs_store::{classify, retry_io};
use crate::config::{ControllerConfig, SystemConfig};
use crate::error::{ConfigError, Result};

pub const PLATE_ROWS: usize = 8;
pub const PLATE_COLUMNS: usize = 12;
pub const WELLS_PER_PLATE: usize = PLATE_ROWS * PLATE_COLUMNS;

/// Well name at a column-major position, `None` past `H12`.
pub fn well_id(index: usize) -> Option<String> {
    if index >= WELLS_PER_PLATE {
        return None;
    }
    let row = char::from(b'A' + (index % PLATE_ROWS) as u8);
    Some(format!("{row}{}", index / PLATE_ROWS + 1))
}

/// Manifest key (and channel identity) for a plate and well position.
pub fn channel_key(plate: usize, well: usize) -> Option<String> {
    well_id(well).map(|w| format!("plate{plate},{w}"))
}

/// Identities of every channel, in bank order: plate by plate, wells
/// column-major within each plate.
pub fn channel_keys(plates: usize, wells_per_plate: usize) -> Vec<String> {
    (0..plates)
        .flat_map(|p| (0..wells_per_plate.min(WELLS_PER_PLATE)).filter_map(move |w| channel_key(p, w)))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    entries: BTreeMap<String, String>,
}

impl Manifest {
    /// Parse manifest CSV.  Later rows win over earlier rows with the same key.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes);
        let mut entries = BTreeMap::new();
        for record in reader.records() {
            let record = record.map_err(|e| ConfigError::Malformed(format!("manifest: {e}")))?;
            let Some(key) = record.get(0).map(str::trim).filter(|k| !k.is_empty()) else {
                continue;
            };
            let value = record.get(1).unwrap_or_default().trim();
            entries.insert(key.to_owned(), value.to_owned());
        }
        Ok(Self { entries })
    }

    /// Read and parse a manifest file, retrying transient I/O failures.
    pub fn read(path: &Path, backoff: Duration, max_attempts: Option<u32>) -> Result<Self> {
        let bytes = retry_io(backoff, max_attempts, "manifest read", path, || fs::read(path))
            .map_err(|e| classify(e, path))?;
        let manifest = Self::parse(&bytes)?;
        info!("manifest {}: {} entries", path.display(), manifest.len());
        Ok(manifest)
    }

    /// [`read`](Self::read) with the retry policy from `cfg`.
    pub fn read_with(path: &Path, cfg: &SystemConfig) -> Result<Self> {
        Self::read(
            path,
            Duration::from_millis(cfg.retry_backoff_ms),
            cfg.max_storage_attempts,
        )
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, target_od: f64) {
        self.entries.insert(key.into(), target_od.to_string());
    }

    /// Target OD for `key`.  An absent or blank entry is a missing setpoint.
    pub fn setpoint(&self, key: &str) -> Result<f64> {
        match self.get(key) {
            None | Some("") => Err(ConfigError::Missing("setpoint").into()),
            Some(v) => v.parse::<f64>().map_err(|_| {
                ConfigError::Malformed(format!("{key}: target OD '{v}' is not a number")).into()
            }),
        }
    }

    /// One config per channel, `template` with the manifest's setpoint.
    ///
    /// Feed the result to [`ControllerBank::build`](crate::bank::ControllerBank::build):
    /// channels without a usable entry are rejected there, the rest start.
    pub fn channel_configs(
        &self,
        keys: &[String],
        template: &ControllerConfig,
    ) -> Vec<(String, Result<ControllerConfig>)> {
        keys.iter()
            .map(|key| {
                let cfg = self.setpoint(key).map(|sp| ControllerConfig {
                    setpoint: Some(sp),
                    ..template.clone()
                });
                (key.clone(), cfg)
            })
            .collect()
    }

    /// Target ODs for the given channels, skipping (and logging) unusable entries.
    pub fn setpoints<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Vec<(String, f64)> {
        names
            .into_iter()
            .filter_map(|name| match self.setpoint(name) {
                Ok(sp) => Some((name.to_owned(), sp)),
                Err(e) => {
                    warn!("manifest: {name}: {e}");
                    None
                }
            })
            .collect()
    }
}
