//! Device states and transition records.
//!
//! # States
//!
//! - `NoReader`: no reader attached
//! - `ReaderIdle`: a reader is selected, no tag in its field
//! - `TagPresent`: a tag is on the reader
//! - `Emulating`: a JSON file stands in for the tag
//!
//! # Valid Transitions
//!
//! - NoReader → ReaderIdle → TagPresent → ReaderIdle
//! - ReaderIdle/TagPresent → NoReader (reader detached)
//! - NoReader/ReaderIdle/TagPresent → Emulating → ReaderIdle/NoReader

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// State of the device proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    /// No reader attached.
    NoReader,

    /// Reader selected, no tag in its field.
    ReaderIdle,

    /// A tag is on the reader.
    TagPresent,

    /// The emulation file stands in for a tag.
    Emulating,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            DeviceState::NoReader => "NoReader",
            DeviceState::ReaderIdle => "ReaderIdle",
            DeviceState::TagPresent => "TagPresent",
            DeviceState::Emulating => "Emulating",
        };
        write!(f, "{}", state_str)
    }
}

impl DeviceState {
    /// Check if transition to target state is valid from this state.
    ///
    /// # Examples
    ///
    /// ```
    /// use tagproxy_device::DeviceState;
    ///
    /// assert!(DeviceState::ReaderIdle.can_transition_to(&DeviceState::TagPresent));
    /// assert!(!DeviceState::NoReader.can_transition_to(&DeviceState::TagPresent));
    /// ```
    pub fn can_transition_to(&self, target: &DeviceState) -> bool {
        matches!(
            (self, target),
            // From NoReader
            (DeviceState::NoReader, DeviceState::ReaderIdle | DeviceState::Emulating)
            // From ReaderIdle
            | (DeviceState::ReaderIdle, DeviceState::TagPresent | DeviceState::Emulating | DeviceState::NoReader)
            // From TagPresent
            | (DeviceState::TagPresent, DeviceState::ReaderIdle | DeviceState::Emulating | DeviceState::NoReader)
            // From Emulating
            | (DeviceState::Emulating, DeviceState::ReaderIdle | DeviceState::NoReader)
        )
    }

    /// Whether a record source (tag or file) is available.
    pub fn has_record_source(&self) -> bool {
        matches!(self, DeviceState::TagPresent | DeviceState::Emulating)
    }
}

/// A single state transition with timestamp.
///
/// The `timestamp` field is not serialized as `Instant` is process-specific.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: DeviceState,
    pub to: DeviceState,

    #[serde(skip, default = "Instant::now")]
    pub timestamp: Instant,
}

impl StateTransition {
    pub fn new(from: DeviceState, to: DeviceState) -> Self {
        Self {
            from,
            to,
            timestamp: Instant::now(),
        }
    }

    /// Get the duration since this transition occurred.
    pub fn elapsed(&self) -> Duration {
        self.timestamp.elapsed()
    }
}
