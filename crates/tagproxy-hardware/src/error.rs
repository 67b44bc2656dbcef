//! Error types for reader and tag operations.
//!
//! [`HardwareError`] covers failures of a single driver call (a page read,
//! a page write, a reader listing). [`TransportError`] wraps those failures
//! with the page at which a multi-call transfer stopped.

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur during reader or tag operations.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Reader or tag is not connected or has been removed.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// Operation timed out after specified duration.
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Driver communication error.
    #[error("Communication error: {message}")]
    CommunicationError { message: String },

    /// Invalid data received from the reader.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Page outside the memory of the tag.
    #[error("Page {page} is out of range")]
    PageOutOfRange { page: u16 },

    /// Reader subsystem could not be initialized.
    #[error("Initialization failed: {message}")]
    InitializationFailed { message: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a new communication error.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::CommunicationError {
            message: message.into(),
        }
    }

    /// Create a new invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create a new initialization failed error.
    pub fn initialization_failed(message: impl Into<String>) -> Self {
        Self::InitializationFailed {
            message: message.into(),
        }
    }
}

/// Errors of a chunked transfer between a buffer and tag memory.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// A page write failed. Pages before `at_page` stay written.
    #[error("Write failed at page {at_page}: {source}")]
    Write { at_page: u16, source: HardwareError },

    /// A page read failed. No partial buffer is returned.
    #[error("Read failed at page {at_page}: {source}")]
    Read { at_page: u16, source: HardwareError },

    /// The transfer does not fit the user memory of the tag.
    #[error("{requested} bytes exceed tag user memory of {capacity} bytes")]
    InsufficientCapacity { requested: usize, capacity: usize },

    /// The payload is not a whole number of pages.
    #[error("Payload of {len} bytes is not a multiple of the {page_size}-byte page size")]
    Misaligned { len: usize, page_size: usize },

    /// A page of the transfer has no 16-bit address.
    #[error("Page {offset_pages} after page {first_page} is outside the page address range")]
    PageOutOfRange { first_page: u16, offset_pages: usize },
}

impl TransportError {
    /// Page at which a failed transfer stopped, if a driver call failed.
    pub fn failed_page(&self) -> Option<u16> {
        match self {
            Self::Write { at_page, .. } | Self::Read { at_page, .. } => Some(*at_page),
            _ => None,
        }
    }
}
