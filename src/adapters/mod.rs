//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements         | Connects to                 |
//! |----------------|--------------------|-----------------------------|
//! | `clock`        | Clock              | System time / manual replay |
//! | `fs_store`     | HistoryStore       | `.turbhistory` JSON files   |
//! | `log_sink`     | EventSink          | `log` facade                |
//! | `memory_store` | HistoryStore       | In-process map              |
//!
//! Sensor and actuator adapters for the simulated rig live in
//! [`crate::sim`].

pub mod clock;
pub mod fs_store;
pub mod log_sink;
pub mod memory_store;
