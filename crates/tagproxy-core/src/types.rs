use crate::{
    Result,
    constants::{ADDRESS_LENGTH, MAX_TIMESTAMP_YEAR, MIN_TIMESTAMP_YEAR, TIMESTAMP_FORMAT},
    error::CodecError,
};
use chrono::{DateTime, Datelike, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Drop the sub-second part of a timestamp.
///
/// Every timestamp held by a record goes through this function so that
/// the textual formats, which carry whole seconds, round-trip exactly.
#[must_use]
pub fn truncate_to_seconds(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp.trunc_subsecs(0)
}

/// Accept a timestamp into a record.
///
/// The textual layout only carries four-digit years, so anything outside
/// `0000..=9999` could be written but never read back.
///
/// # Errors
/// Returns `CodecError::InvalidRecord` for a year outside that range.
pub fn record_timestamp(timestamp: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let year = timestamp.year();
    if !(MIN_TIMESTAMP_YEAR..=MAX_TIMESTAMP_YEAR).contains(&year) {
        return Err(CodecError::invalid(format!(
            "Timestamp year {year} is outside {MIN_TIMESTAMP_YEAR:04}..={MAX_TIMESTAMP_YEAR}"
        )));
    }
    Ok(truncate_to_seconds(timestamp))
}

/// Format a timestamp for the textual record formats.
#[must_use]
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a record timestamp.
///
/// Accepts any RFC 3339 timestamp; the value is converted to UTC and
/// truncated to whole seconds.
///
/// # Errors
/// Returns `CodecError::MalformedRecord` if the text is not RFC 3339.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(text)
        .map_err(|e| CodecError::malformed(format!("Invalid timestamp '{text}': {e}")))?;
    Ok(truncate_to_seconds(parsed.with_timezone(&Utc)))
}

/// Supplier or customer address (40 bytes, hex encoded in text).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    /// Create an address from raw bytes.
    ///
    /// # Errors
    /// Returns `CodecError::InvalidRecord` if `bytes` is not exactly
    /// [`ADDRESS_LENGTH`] bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; ADDRESS_LENGTH] = bytes.try_into().map_err(|_| {
            CodecError::invalid(format!(
                "Address must be {ADDRESS_LENGTH} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Address(array))
    }

    /// Parse an address from its hex representation.
    ///
    /// # Errors
    /// Returns `CodecError::MalformedRecord` for invalid hex and
    /// `CodecError::InvalidRecord` for a wrong length.
    pub fn from_hex(text: &str) -> Result<Self> {
        let bytes = hex::decode(text)
            .map_err(|e| CodecError::malformed(format!("Invalid address '{text}': {e}")))?;
        Self::from_slice(&bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex, two digits per byte.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::str::FromStr for Address {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self> {
        Address::from_hex(s)
    }
}

impl Serialize for Address {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Address::from_hex(&text).map_err(serde::de::Error::custom)
    }
}

/// Kind of device reported by the HTTP surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum DeviceKind {
    /// Sentinel for "nothing there".
    NoDevice = 0,
    SmartCardReader = 10,
    NfcTag = 200,
}

impl DeviceKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            DeviceKind::NoDevice => "NoDevice",
            DeviceKind::SmartCardReader => "SmartCardReader",
            DeviceKind::NfcTag => "NfcTag",
        }
    }
}

impl From<DeviceKind> for u16 {
    fn from(kind: DeviceKind) -> Self {
        kind as u16
    }
}

impl TryFrom<u16> for DeviceKind {
    type Error = CodecError;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            0 => Ok(DeviceKind::NoDevice),
            10 => Ok(DeviceKind::SmartCardReader),
            200 => Ok(DeviceKind::NfcTag),
            _ => Err(CodecError::malformed(format!("Unknown device kind {value}"))),
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// JSON description of the reader or the tag.
///
/// Serializes as `{"Type":10,"TypeAsString":"SmartCardReader","Model":..,"Identity":..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceDescriptor {
    #[serde(rename = "Type")]
    pub kind: DeviceKind,
    pub type_as_string: String,
    pub model: String,
    pub identity: String,
}

impl DeviceDescriptor {
    pub fn new(kind: DeviceKind, model: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            kind,
            type_as_string: kind.name().to_string(),
            model: model.into(),
            identity: identity.into(),
        }
    }

    /// The "no device" sentinel.
    #[must_use]
    pub fn none() -> Self {
        Self::new(DeviceKind::NoDevice, "Unknown model", "Unknown identity")
    }

    pub fn reader(model: impl Into<String>, identity: impl Into<String>) -> Self {
        Self::new(DeviceKind::SmartCardReader, model, identity)
    }

    pub fn tag(model: impl Into<String>, identity: impl Into<String>) -> Self {
        Self::new(DeviceKind::NfcTag, model, identity)
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        self.kind == DeviceKind::NoDevice
    }
}

impl Default for DeviceDescriptor {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[test]
    fn test_timestamp_format_and_parse() {
        let ts = Utc.with_ymd_and_hms(2026, 10, 19, 12, 30, 5).unwrap();
        let text = format_timestamp(&ts);
        assert_eq!(text, "2026-10-19T12:30:05Z");
        assert_eq!(parse_timestamp(&text).unwrap(), ts);
    }

    #[test]
    fn test_record_timestamp_year_bounds() {
        let first = Utc.with_ymd_and_hms(0, 1, 1, 0, 0, 0).unwrap();
        let last = Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(
            format_timestamp(&record_timestamp(first).unwrap()),
            "0000-01-01T00:00:00Z"
        );
        assert_eq!(
            format_timestamp(&record_timestamp(last).unwrap()),
            "9999-12-31T23:59:59Z"
        );
        assert_eq!(parse_timestamp("0000-01-01T00:00:00Z").unwrap(), first);

        for year in [-5, -1, 10000] {
            let timestamp = Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap();
            assert!(matches!(
                record_timestamp(timestamp),
                Err(CodecError::InvalidRecord(_))
            ));
        }
    }

    #[test]
    fn test_timestamp_parse_converts_offset() {
        let parsed = parse_timestamp("2026-10-19T14:30:05+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 10, 19, 12, 30, 5).unwrap());
    }

    #[test]
    fn test_timestamp_parse_truncates_fraction() {
        let parsed = parse_timestamp("2026-10-19T12:30:05.750Z").unwrap();
        assert_eq!(format_timestamp(&parsed), "2026-10-19T12:30:05Z");
    }

    #[rstest]
    #[case("")]
    #[case("19/10/2026 12:30:05")]
    #[case("yesterday")]
    fn test_timestamp_parse_invalid(#[case] input: &str) {
        assert!(matches!(
            parse_timestamp(input),
            Err(CodecError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_address_hex_roundtrip() {
        let bytes: Vec<u8> = (0..ADDRESS_LENGTH as u8).collect();
        let address = Address::from_slice(&bytes).unwrap();
        let text = address.to_hex();
        assert_eq!(text.len(), ADDRESS_LENGTH * 2);
        assert!(text.starts_with("000102"));
        assert_eq!(text.parse::<Address>().unwrap(), address);
    }

    #[rstest]
    #[case(39)]
    #[case(41)]
    #[case(0)]
    fn test_address_wrong_length(#[case] len: usize) {
        assert!(matches!(
            Address::from_slice(&vec![0xAB; len]),
            Err(CodecError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_address_invalid_hex() {
        assert!(matches!(
            Address::from_hex("zz"),
            Err(CodecError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_no_device_sentinel_json() {
        let json = serde_json::to_string(&DeviceDescriptor::none()).unwrap();
        assert_eq!(
            json,
            r#"{"Type":0,"TypeAsString":"NoDevice","Model":"Unknown model","Identity":"Unknown identity"}"#
        );
    }

    #[test]
    fn test_reader_descriptor_roundtrip() {
        let reader = DeviceDescriptor::reader("ACS ACR122U PICC Interface", "0");
        let json = serde_json::to_string(&reader).unwrap();
        assert!(json.contains(r#""Type":10"#));
        let parsed: DeviceDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, reader);
        assert!(!parsed.is_none());
    }

    #[test]
    fn test_device_kind_unknown_code() {
        assert!(DeviceKind::try_from(7).is_err());
    }
}
