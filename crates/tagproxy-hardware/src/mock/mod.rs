//! Mock device implementations for testing and development.
//!
//! This module provides a simulated reader and tag memory that can be
//! controlled programmatically without requiring physical hardware.

pub mod channel;
pub mod reader;

// Re-export commonly used types
pub use channel::{MockPagedChannel, MockTagHandle, PageCall, PageOp};
pub use reader::{MOCK_ULTRALIGHT_ATR, MockReader, MockReaderHandle, mock_ultralight_tag};
