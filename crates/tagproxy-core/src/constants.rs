//! Core constants for the tag data layout.
//!
//! This module defines the constants that fix the on-tag record layout and
//! the page geometry of MIFARE Ultralight compatible tags. Both the codec and
//! the paged transport depend on these values; changing them breaks every
//! tag written with the previous values.
//!
//! # Record Layout
//!
//! A record is stored as a short comma separated text followed by padding:
//!
//! ```text
//! S,9000,6f1c2c3e-3b6e-4f9e-9d1a-1b2c3d4e5f60,2026-10-19T12:00:00Z*********...
//! ^ ^    ^                                    ^                   ^
//! | |    id                                   created at          padding
//! | type as number
//! format token
//! ```
//!
//! # Usage
//!
//! ```
//! use tagproxy_core::constants::*;
//!
//! assert_eq!(TAG_CAPACITY % PAGE_SIZE, 0);
//! assert_eq!(TAG_CAPACITY / PAGE_SIZE, 36);
//! ```

// ============================================================================
// Record Text
// ============================================================================

/// Separator between the fields of a textual record.
///
/// # Examples
///
/// ```
/// use tagproxy_core::constants::FIELD_SEPARATOR;
///
/// let fields: Vec<&str> = "T,50,id".split(FIELD_SEPARATOR).collect();
/// assert_eq!(fields, vec!["T", "50", "id"]);
/// ```
pub const FIELD_SEPARATOR: char = ',';

/// Marker byte filling the unused tail of a page buffer.
///
/// The first occurrence of this byte ends the payload. It can never appear
/// inside a record because no field of any format may contain `*`.
pub const PADDING_BYTE: u8 = b'*';

/// Timestamp layout used by every textual format (RFC 3339, whole seconds, UTC).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Earliest year [`TIMESTAMP_FORMAT`] writes as four digits.
pub const MIN_TIMESTAMP_YEAR: i32 = 0;

/// Latest year [`TIMESTAMP_FORMAT`] writes as four digits.
pub const MAX_TIMESTAMP_YEAR: i32 = 9999;

/// Length in bytes of a supplier or customer address blob.
pub const ADDRESS_LENGTH: usize = 40;

// ============================================================================
// Tag Geometry
// ============================================================================

/// Bytes per tag page.
pub const PAGE_SIZE: usize = 4;

/// First page of user memory. Pages 0-3 hold UID, lock bits and OTP.
pub const FIRST_USER_PAGE: u16 = 4;

/// Pages returned by a single read command.
pub const READ_QUANTUM: usize = 4;

/// Pages accepted by a single write command.
pub const WRITE_QUANTUM: usize = 1;

/// User memory of the canonical tag profile, in bytes.
///
/// 36 pages (4-39) as found on NTAG213 / Ultralight EV1 class tags.
pub const TAG_CAPACITY: usize = 144;

/// Capacity at or below which the tiny encoding is preferred.
///
/// This is the user memory of the original MIFARE Ultralight (MF0ICU1,
/// pages 4-15). Such tags cannot hold the standard encoding.
pub const TINY_PROFILE_CAPACITY: usize = 48;

// ============================================================================
// Service Defaults
// ============================================================================

/// Default HTTP port of the device service.
pub const DEFAULT_HTTP_PORT: u16 = 9090;

/// Default time allowed for reading a freshly presented tag, in milliseconds.
pub const DEFAULT_TAG_READ_TIMEOUT_MS: u64 = 5000;

/// Suffix appended to the emulation file name for the previous version.
pub const BACKUP_SUFFIX: &str = ".backup";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacities_are_page_aligned() {
        assert_eq!(TAG_CAPACITY % PAGE_SIZE, 0);
        assert_eq!(TINY_PROFILE_CAPACITY % PAGE_SIZE, 0);
    }

    #[test]
    fn test_capacity_is_whole_read_quanta() {
        assert_eq!(TAG_CAPACITY % (READ_QUANTUM * PAGE_SIZE), 0);
    }

    #[test]
    fn test_padding_is_not_separator() {
        assert_ne!(PADDING_BYTE as char, FIELD_SEPARATOR);
    }
}
