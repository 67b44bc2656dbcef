//! Common types shared across reader backends and tag channels.

use crate::error::{HardwareError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tagproxy_core::constants::{
    FIRST_USER_PAGE, PAGE_SIZE, READ_QUANTUM, TAG_CAPACITY, WRITE_QUANTUM,
};

/// Smart card reader information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderInfo {
    /// Reader name as reported by the driver (e.g., "ACS ACR122U PICC Interface").
    pub name: String,

    /// Driver-specific identity of the reader.
    pub identity: String,
}

impl ReaderInfo {
    pub fn new(name: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identity: identity.into(),
        }
    }
}

/// Family of a storage tag, as identified from its ATR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum TagFamily {
    /// MIFARE Ultralight, Ultralight C/EV1 and NTAG21x.
    MifareUltralight,
    MifareStandard,
    MifareDesfire,
    Felica,
    Iso15693,
    Unknown,
}

impl TagFamily {
    /// Get a human-readable name for the family.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MifareUltralight => "MIFARE Ultralight",
            Self::MifareStandard => "MIFARE Classic",
            Self::MifareDesfire => "MIFARE DESFire",
            Self::Felica => "FeliCa",
            Self::Iso15693 => "ISO 15693",
            Self::Unknown => "Unknown",
        }
    }

    /// Whether the family has the 4-byte page memory the transport expects.
    pub fn is_paged(&self) -> bool {
        matches!(self, Self::MifareUltralight)
    }

    /// Identify the family from a PC/SC contactless ATR.
    ///
    /// Storage cards report `3B 8F 80 01 80 4F 0C A0 00 00 03 06 SS C0 C1 ..`
    /// where `SS` is the standard and `C0 C1` the card name.
    pub fn from_atr(atr: &[u8]) -> Self {
        const RID: [u8; 5] = [0xA0, 0x00, 0x00, 0x03, 0x06];
        if atr.len() < 15 || atr[7..12] != RID {
            return Self::Unknown;
        }
        match (atr[12], atr[13], atr[14]) {
            (_, 0x00, 0x03) => Self::MifareUltralight,
            (_, 0x00, 0x01) | (_, 0x00, 0x02) | (_, 0x00, 0x26) => Self::MifareStandard,
            (_, 0xF0, 0x11) | (_, 0xF0, 0x12) => Self::Felica,
            (0x0B, _, _) | (0x0C, _, _) => Self::Iso15693,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for TagFamily {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Identity of a tag placed on a reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagIdentity {
    pub family: TagFamily,

    /// Product name (e.g., "NTAG213").
    pub name: String,

    /// Answer-to-reset bytes.
    pub atr: Vec<u8>,

    /// Tag UID, empty when the reader does not report it.
    pub uid: Vec<u8>,
}

impl TagIdentity {
    pub fn new(family: TagFamily, name: impl Into<String>, atr: Vec<u8>) -> Self {
        Self {
            family,
            name: name.into(),
            atr,
            uid: Vec::new(),
        }
    }

    /// Set the UID.
    pub fn with_uid(mut self, uid: Vec<u8>) -> Self {
        self.uid = uid;
        self
    }

    /// ATR as uppercase hex pairs separated by dashes (`3B-8F-80-01`).
    pub fn atr_display(&self) -> String {
        self.atr
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join("-")
    }

    /// UID as uppercase hex.
    pub fn uid_hex(&self) -> String {
        hex::encode_upper(&self.uid)
    }
}

/// Page geometry of a tag channel.
///
/// The default describes the canonical 144-byte Ultralight-compatible
/// profile: 4-byte pages starting at page 4, one page per write and four
/// pages per read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelGeometry {
    pub page_size: usize,
    pub first_user_page: u16,
    pub read_quantum: usize,
    pub write_quantum: usize,
    pub user_capacity: usize,
}

impl ChannelGeometry {
    /// Set the user memory size in bytes.
    pub fn with_user_capacity(mut self, user_capacity: usize) -> Self {
        self.user_capacity = user_capacity;
        self
    }

    /// Set the number of pages moved by one read call.
    pub fn with_read_quantum(mut self, read_quantum: usize) -> Self {
        self.read_quantum = read_quantum;
        self
    }

    /// Set the number of pages moved by one write call.
    pub fn with_write_quantum(mut self, write_quantum: usize) -> Self {
        self.write_quantum = write_quantum;
        self
    }

    /// Number of user pages.
    pub fn user_pages(&self) -> usize {
        self.user_capacity / self.page_size
    }

    /// One past the last user page, saturating at the end of the page range.
    pub fn end_page(&self) -> u16 {
        u16::try_from(self.user_pages())
            .map_or(u16::MAX, |pages| self.first_user_page.saturating_add(pages))
    }

    /// Check that the geometry describes whole pages and usable quanta.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::InvalidData` on a zero page size or quantum,
    /// or a capacity that is not a whole number of pages.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 || self.read_quantum == 0 || self.write_quantum == 0 {
            return Err(HardwareError::invalid_data(
                "Page size and quanta must be non-zero",
            ));
        }
        if self.user_capacity % self.page_size != 0 {
            return Err(HardwareError::invalid_data(format!(
                "User capacity {} is not a multiple of page size {}",
                self.user_capacity, self.page_size
            )));
        }
        if usize::from(self.first_user_page) + self.user_pages() > usize::from(u16::MAX) {
            return Err(HardwareError::invalid_data("User memory exceeds page range"));
        }
        Ok(())
    }
}

impl Default for ChannelGeometry {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
            first_user_page: FIRST_USER_PAGE,
            read_quantum: READ_QUANTUM,
            write_quantum: WRITE_QUANTUM,
            user_capacity: TAG_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const ULTRALIGHT_ATR: [u8; 20] = [
        0x3B, 0x8F, 0x80, 0x01, 0x80, 0x4F, 0x0C, 0xA0, 0x00, 0x00, 0x03, 0x06, 0x03, 0x00, 0x03,
        0x00, 0x00, 0x00, 0x00, 0x68,
    ];

    #[test]
    fn test_atr_display() {
        let tag = TagIdentity::new(TagFamily::MifareUltralight, "NTAG213", vec![0x3B, 0x8F, 0x80]);
        assert_eq!(tag.atr_display(), "3B-8F-80");
    }

    #[test]
    fn test_uid_hex() {
        let tag = TagIdentity::new(TagFamily::MifareUltralight, "NTAG213", Vec::new())
            .with_uid(vec![0x04, 0xab, 0x12]);
        assert_eq!(tag.uid_hex(), "04AB12");
    }

    #[rstest]
    #[case(0x03, TagFamily::MifareUltralight)]
    #[case(0x01, TagFamily::MifareStandard)]
    #[case(0x02, TagFamily::MifareStandard)]
    #[case(0x44, TagFamily::Unknown)]
    fn test_family_from_atr(#[case] card_name: u8, #[case] expected: TagFamily) {
        let mut atr = ULTRALIGHT_ATR;
        atr[14] = card_name;
        assert_eq!(TagFamily::from_atr(&atr), expected);
    }

    #[test]
    fn test_family_from_short_atr() {
        assert_eq!(TagFamily::from_atr(&[0x3B, 0x00]), TagFamily::Unknown);
    }

    #[test]
    fn test_only_ultralight_is_paged() {
        assert!(TagFamily::MifareUltralight.is_paged());
        assert!(!TagFamily::MifareDesfire.is_paged());
        assert!(!TagFamily::Unknown.is_paged());
    }

    #[test]
    fn test_default_geometry() {
        let geometry = ChannelGeometry::default();
        assert_eq!(geometry.user_pages(), 36);
        assert_eq!(geometry.end_page(), 40);
        assert!(geometry.validate().is_ok());
    }

    #[rstest]
    #[case(ChannelGeometry::default().with_user_capacity(10))]
    #[case(ChannelGeometry::default().with_read_quantum(0))]
    #[case(ChannelGeometry::default().with_write_quantum(0))]
    fn test_invalid_geometry(#[case] geometry: ChannelGeometry) {
        assert!(geometry.validate().is_err());
    }
}
