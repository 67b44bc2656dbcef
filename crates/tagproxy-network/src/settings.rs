//! Runtime server settings.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Settings as exchanged over `/settings`.
///
/// Serializes as `{"RootDir": "...", "BytesServed": n}`. On input only
/// `RootDir` is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerSettings {
    pub root_dir: PathBuf,
    #[serde(default)]
    pub bytes_served: u64,
}

/// Settings shared by all request handlers.
#[derive(Debug)]
pub struct Settings {
    root_dir: RwLock<PathBuf>,
    bytes_served: AtomicU64,
}

impl Settings {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: RwLock::new(root_dir.into()),
            bytes_served: AtomicU64::new(0),
        }
    }

    /// Directory static resources are served from.
    pub fn root_dir(&self) -> PathBuf {
        self.root_dir
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set_root_dir(&self, root_dir: impl AsRef<Path>) {
        *self
            .root_dir
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = root_dir.as_ref().to_path_buf();
    }

    pub fn bytes_served(&self) -> u64 {
        self.bytes_served.load(Ordering::Relaxed)
    }

    pub fn add_bytes_served(&self, count: u64) {
        self.bytes_served.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ServerSettings {
        ServerSettings {
            root_dir: self.root_dir(),
            bytes_served: self.bytes_served(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(".")
    }
}
