//! Unified error types for the turbidostat controller.
//!
//! A single [`Error`] enum that every subsystem converts into, so the cycle
//! service and the simulation runner handle failures uniformly.  Numeric
//! degeneracy in the control law never shows up here: it is absorbed by
//! clamping to the configured limits.

use core::fmt;
use std::io;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug)]
pub enum Error {
    /// Caller-supplied setpoint or limits are missing or malformed.
    Configuration(ConfigError),
    /// No saved history exists under this name.
    NotFound { name: String },
    /// The persistence target cannot be used.
    Storage(StorageError),
    /// A stored history exists but cannot be trusted.
    Corrupted { name: String, reason: String },
    /// `step_all` was handed a different number of readings than channels.
    ChannelCount { expected: usize, got: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(e) => write!(f, "configuration: {e}"),
            Self::NotFound { name } => write!(f, "no saved history for '{name}'"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Corrupted { name, reason } => {
                write!(f, "history for '{name}' is corrupted: {reason}")
            }
            Self::ChannelCount { expected, got } => {
                write!(f, "expected {expected} readings, got {got}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(StorageError::Io { source, .. }) => Some(source),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A required field was not supplied.
    Missing(&'static str),
    /// A field is outside its valid range.  The message names the field.
    Invalid(&'static str),
    /// A `(min, max)` pair has `min > max` or a NaN bound.
    BadLimits { field: &'static str, min: f64, max: f64 },
    /// A config or manifest document could not be parsed.
    Malformed(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(field) => write!(f, "missing {field}"),
            Self::Invalid(msg) => write!(f, "{msg}"),
            Self::BadLimits { field, min, max } => {
                write!(f, "{field} ({min}, {max}) is not a valid range")
            }
            Self::Malformed(msg) => write!(f, "malformed: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Configuration(e)
    }
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum StorageError {
    /// The storage root exists but is not a directory.
    NotADirectory(String),
    /// The storage root or record cannot be written.
    PermissionDenied(String),
    /// History could not be encoded.
    Encode(String),
    /// An I/O failure that exhausted the configured retry budget.
    Io { path: String, source: io::Error },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotADirectory(path) => write!(f, "{path} is not a directory"),
            Self::PermissionDenied(path) => write!(f, "permission denied on {path}"),
            Self::Encode(msg) => write!(f, "encode failed: {msg}"),
            Self::Io { path, source } => write!(f, "I/O error on {path}: {source}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
