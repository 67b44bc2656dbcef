//! JSON file standing in for a tag.
//!
//! The emulation file holds one [`Thing`] in its JSON shape. It is read
//! wholesale on every access and rewritten pretty-printed; unless
//! `overwrite` is set the previous content is kept next to it as
//! `<file>.backup`.

use crate::error::{DeviceError, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tagproxy_core::Thing;
use tagproxy_core::constants::BACKUP_SUFFIX;
use tracing::{debug, info};

/// Emulation file at a fixed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmulationFile {
    path: PathBuf,
    overwrite: bool,
}

impl EmulationFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            overwrite: false,
        }
    }

    /// Skip the backup copy on writes.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the backup copy: the file name with `.backup` appended.
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_default();
        name.push(BACKUP_SUFFIX);
        self.path.with_file_name(name)
    }

    pub async fn exists(&self) -> bool {
        tokio::fs::metadata(&self.path)
            .await
            .is_ok_and(|metadata| metadata.is_file())
    }

    /// Read the Thing from the file.
    ///
    /// # Errors
    ///
    /// - `EmulationFileMissing` if the file does not exist
    /// - `Json` if the file is empty or not a valid Thing
    pub async fn read(&self) -> Result<Thing> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DeviceError::emulation_file_missing(&self.path));
            }
            Err(e) => return Err(e.into()),
        };
        debug!(path = %self.path.display(), len = bytes.len(), "Emulation file read");
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Replace the Thing in the file.
    ///
    /// # Errors
    ///
    /// Returns `EmulationFileMissing` if the file does not exist; the file
    /// is never created here.
    pub async fn write(&self, thing: &Thing) -> Result<()> {
        if !self.exists().await {
            return Err(DeviceError::emulation_file_missing(&self.path));
        }
        if !self.overwrite {
            let backup = self.backup_path();
            tokio::fs::copy(&self.path, &backup).await?;
            debug!(backup = %backup.display(), "Emulation file backed up");
        }

        let json = serde_json::to_string_pretty(thing)?;
        tokio::fs::write(&self.path, json).await?;
        info!(path = %self.path.display(), id = %thing.id(), "Emulation file written");
        Ok(())
    }
}
