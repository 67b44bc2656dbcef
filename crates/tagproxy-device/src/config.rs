//! Device controller configuration.

use std::path::PathBuf;
use std::time::Duration;
use tagproxy_core::constants::DEFAULT_TAG_READ_TIMEOUT_MS;

/// Default location of the emulation file.
pub const DEFAULT_EMULATION_FILE: &str = "thing.json";

/// Configuration for [`DeviceController`](crate::DeviceController).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use tagproxy_device::DeviceConfig;
///
/// let config = DeviceConfig::default()
///     .with_tag_timeout(Duration::from_secs(2))
///     .with_emulation_file("/var/lib/tagproxy/thing.json");
/// assert_eq!(config.tag_timeout, Duration::from_secs(2));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Upper bound for one whole-buffer tag read or write.
    pub tag_timeout: Duration,

    /// JSON file substituted for the tag in emulation mode.
    pub emulation_file: PathBuf,

    /// Rewrite the emulation file without keeping a `.backup` copy.
    pub overwrite_emulation: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            tag_timeout: Duration::from_millis(DEFAULT_TAG_READ_TIMEOUT_MS),
            emulation_file: PathBuf::from(DEFAULT_EMULATION_FILE),
            overwrite_emulation: false,
        }
    }
}

impl DeviceConfig {
    pub fn with_tag_timeout(mut self, tag_timeout: Duration) -> Self {
        self.tag_timeout = tag_timeout;
        self
    }

    pub fn with_emulation_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.emulation_file = path.into();
        self
    }

    pub fn with_overwrite_emulation(mut self, overwrite: bool) -> Self {
        self.overwrite_emulation = overwrite;
        self
    }
}
