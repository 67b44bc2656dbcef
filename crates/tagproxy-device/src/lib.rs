//! Device state for the tagproxy service.
//!
//! This crate tracks the reader and the tag in its field, caches the record
//! read from the tag and substitutes a JSON file for the tag in emulation
//! mode.
//!
//! - [`DeviceStateMachine`]: synchronous state, transitions and history
//! - [`DeviceController`]: shared handle, tag I/O and the event loop
//! - [`EmulationFile`]: the JSON file used in emulation mode

pub mod config;
pub mod controller;
pub mod emulation;
pub mod error;
pub mod machine;
pub mod state;

pub use config::DeviceConfig;
pub use controller::DeviceController;
pub use emulation::EmulationFile;
pub use error::{DeviceError, Result};
pub use machine::{DeviceSnapshot, DeviceStateMachine, EMULATED_TAG_MODEL, TagSession};
pub use state::{DeviceState, StateTransition};
