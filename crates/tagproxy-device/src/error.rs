//! Error types for device operations.

use crate::state::DeviceState;
use std::path::PathBuf;
use tagproxy_core::CodecError;
use tagproxy_hardware::{HardwareError, TagFamily, TransportError};

/// Result type alias for device operations.
pub type Result<T> = std::result::Result<T, DeviceError>;

/// Errors raised by the device state machine and controller.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Neither a tag nor emulation is active.
    #[error("No tag present")]
    NoTagPresent,

    /// No reader is attached.
    #[error("No reader available")]
    NoReader,

    /// Emulation needs an existing JSON file.
    #[error("Emulation file not found: {}", path.display())]
    EmulationFileMissing { path: PathBuf },

    /// The tag cannot hold records.
    #[error("Tag family {family} does not support record storage")]
    UnsupportedTag { family: TagFamily },

    /// The tag holds a record of another kind.
    #[error("Tag holds a {found} record, expected a {expected} record")]
    UnexpectedRecord {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: DeviceState, to: DeviceState },

    /// No event loop serves controller commands.
    #[error("Device event loop is not running")]
    EventLoopStopped,

    /// The event loop of this controller was already started.
    #[error("Device event loop is already running")]
    EventLoopRunning,

    /// A tag operation took too long.
    #[error("Tag operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Hardware error: {0}")]
    Hardware(#[from] HardwareError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DeviceError {
    pub fn emulation_file_missing(path: impl Into<PathBuf>) -> Self {
        Self::EmulationFileMissing { path: path.into() }
    }

    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Page at which a tag transfer stopped.
    pub fn failed_page(&self) -> Option<u16> {
        match self {
            Self::Transport(e) => e.failed_page(),
            _ => None,
        }
    }
}
