//! In-memory history store.
//!
//! Same contract as the filesystem store: records pass through the JSON
//! codec, so a round trip here exercises exactly what lands on disk.

use std::cell::RefCell;
use std::collections::HashMap;

use log::debug;

use crate::app::ports::HistoryStore;
use crate::control::HistoryLog;
use crate::error::{Error, Result, StorageError};

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RefCell<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored channel names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.records.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    /// Put raw bytes under `name`, bypassing the encoder.
    pub fn insert_raw(&self, name: &str, bytes: Vec<u8>) {
        self.records.borrow_mut().insert(name.to_owned(), bytes);
    }
}

impl HistoryStore for MemoryStore {
    fn save(&self, name: &str, history: &HistoryLog) -> Result<()> {
        let bytes = history
            .to_json()
            .map_err(|e| StorageError::Encode(e.to_string()))?;
        debug!("MemoryStore: {name} <- {} bytes", bytes.len());
        self.records.borrow_mut().insert(name.to_owned(), bytes);
        Ok(())
    }

    fn load(&self, name: &str) -> Result<HistoryLog> {
        let records = self.records.borrow();
        let bytes = records.get(name).ok_or_else(|| Error::NotFound {
            name: name.to_owned(),
        })?;
        HistoryLog::from_json(bytes).map_err(|e| Error::Corrupted {
            name: name.to_owned(),
            reason: e.to_string(),
        })
    }

    fn exists(&self, name: &str) -> bool {
        self.records.borrow().contains_key(name)
    }
}
