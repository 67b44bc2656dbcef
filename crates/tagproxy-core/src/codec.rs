//! Record codec: textual/JSON formats and padded page buffers.
//!
//! A tag holds exactly one record followed by [`PADDING_BYTE`] up to the
//! capacity of its user memory. [`RecordCodec::to_page_buffer`] picks the
//! largest encoding that fits; [`RecordCodec::from_page_buffer`] strips the
//! padding and dispatches on the leading format token.
//!
//! # Example
//!
//! ```
//! use tagproxy_core::{Record, RecordCodec, Thing, ThingType};
//!
//! let codec = RecordCodec::new();
//! let thing = Thing::new(ThingType::Engine).unwrap();
//! let buffer = codec.to_page_buffer(&Record::Thing(thing.clone()), 144).unwrap();
//! assert_eq!(buffer.len(), 144);
//! assert_eq!(codec.from_page_buffer(&buffer).unwrap(), Record::Thing(thing));
//! ```

use crate::{
    Result,
    constants::{FIELD_SEPARATOR, PADDING_BYTE, TINY_PROFILE_CAPACITY},
    error::CodecError,
    format::{ExternalFormat, Layout},
    product::Product,
    thing::Thing,
};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

/// Any record that can live on a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Record {
    Thing(Thing),
    Product(Product),
}

impl Record {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Record::Thing(_) => "thing",
            Record::Product(_) => "product",
        }
    }

    #[must_use]
    pub fn as_thing(&self) -> Option<&Thing> {
        match self {
            Record::Thing(thing) => Some(thing),
            Record::Product(_) => None,
        }
    }

    #[must_use]
    pub fn as_product(&self) -> Option<&Product> {
        match self {
            Record::Product(product) => Some(product),
            Record::Thing(_) => None,
        }
    }
}

impl From<Thing> for Record {
    fn from(thing: Thing) -> Self {
        Record::Thing(thing)
    }
}

impl From<Product> for Record {
    fn from(product: Product) -> Self {
        Record::Product(product)
    }
}

/// Encoder/decoder for records.
#[derive(Debug, Clone)]
pub struct RecordCodec {
    tiny_threshold: usize,
}

impl RecordCodec {
    /// Codec with the default tiny-preference threshold.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tiny_threshold: TINY_PROFILE_CAPACITY,
        }
    }

    /// Encode a record in the given external format.
    ///
    /// # Errors
    /// `UnsupportedFormat` for products in the tiny or display format.
    pub fn encode(&self, record: &Record, format: ExternalFormat) -> Result<Vec<u8>> {
        match (record, format) {
            (_, ExternalFormat::Json) => Ok(serde_json::to_vec(record)?),
            (Record::Thing(thing), format) => Ok(thing.to_text(format)?.into_bytes()),
            (Record::Product(product), ExternalFormat::Standard) => {
                Ok(product.to_text().into_bytes())
            }
            (Record::Product(_), format) => Err(CodecError::UnsupportedFormat {
                record: "product",
                format: format.to_string(),
            }),
        }
    }

    /// Decode a textual record.
    ///
    /// # Errors
    /// `MalformedRecord` for structural problems, `InvalidRecord` for a
    /// well-formed record that breaks a domain rule.
    pub fn decode(&self, bytes: &[u8]) -> Result<Record> {
        let text = std::str::from_utf8(bytes)
            .ok()
            .filter(|text| text.is_ascii())
            .ok_or_else(|| CodecError::malformed("Record is not ASCII text"))?;
        if text.is_empty() {
            return Err(CodecError::malformed("Empty record"));
        }

        let fields: Vec<&str> = text.split(FIELD_SEPARATOR).collect();
        match Layout::from_token(fields[0])? {
            Layout::Thing(format) => Thing::from_fields(format, &fields).map(Record::Thing),
            Layout::Product => Product::from_fields(&fields).map(Record::Product),
        }
    }

    /// Decode a JSON record, thing or product.
    pub fn decode_json(&self, bytes: &[u8]) -> Result<Record> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Encode a record into a buffer of exactly `capacity` bytes.
    ///
    /// # Errors
    /// `PayloadTooLarge` when even the smallest encoding does not fit.
    pub fn to_page_buffer(&self, record: &Record, capacity: usize) -> Result<Vec<u8>> {
        let payload = self.select_payload(record, capacity)?;
        if payload.len() > capacity {
            return Err(CodecError::PayloadTooLarge {
                size: payload.len(),
                capacity,
            });
        }

        let mut buffer = Vec::with_capacity(capacity);
        buffer.extend_from_slice(&payload);
        buffer.resize(capacity, PADDING_BYTE);
        trace!(
            kind = record.kind(),
            payload = payload.len(),
            capacity,
            "Record encoded into page buffer"
        );
        Ok(buffer)
    }

    /// Decode a padded page buffer.
    ///
    /// The payload ends at the first padding byte. A buffer without padding
    /// is decoded whole.
    pub fn from_page_buffer(&self, buffer: &[u8]) -> Result<Record> {
        let payload = match buffer.iter().position(|&b| b == PADDING_BYTE) {
            Some(end) => &buffer[..end],
            None => {
                warn!(
                    len = buffer.len(),
                    "No padding found in page buffer, decoding whole buffer"
                );
                buffer
            }
        };
        self.decode(payload)
    }

    fn select_payload(&self, record: &Record, capacity: usize) -> Result<Vec<u8>> {
        match record {
            Record::Thing(thing) => {
                let tiny = thing.to_text(ExternalFormat::Tiny)?;
                if capacity <= self.tiny_threshold {
                    return Ok(tiny.into_bytes());
                }
                let standard = thing.to_text(ExternalFormat::Standard)?;
                if standard.len() <= capacity {
                    Ok(standard.into_bytes())
                } else {
                    Ok(tiny.into_bytes())
                }
            }
            Record::Product(product) => Ok(product.to_text().into_bytes()),
        }
    }
}

impl Default for RecordCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ThingType, constants::ADDRESS_LENGTH, types::Address};
    use chrono::{TimeZone, Utc};
    use rstest::rstest;
    use uuid::Uuid;

    fn thing() -> Thing {
        Thing::builder(
            ThingType::Engine,
            Uuid::parse_str("6f1c2c3e-3b6e-4f9e-9d1a-1b2c3d4e5f60").unwrap(),
        )
        .created_at(Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap())
        .build()
        .unwrap()
    }

    fn product() -> Product {
        Product::builder(1, 42, Address::from_slice(&[7; ADDRESS_LENGTH]).unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn test_standard_buffer_layout() {
        let codec = RecordCodec::new();
        let buffer = codec.to_page_buffer(&thing().into(), 144).unwrap();
        assert_eq!(buffer.len(), 144);
        let expected = b"S,50,6f1c2c3e-3b6e-4f9e-9d1a-1b2c3d4e5f60,2026-10-19T12:00:00Z";
        assert_eq!(&buffer[..expected.len()], expected);
        assert!(buffer[expected.len()..].iter().all(|&b| b == PADDING_BYTE));
    }

    #[test]
    fn test_small_capacity_uses_tiny() {
        let codec = RecordCodec::new();
        let buffer = codec.to_page_buffer(&thing().into(), 48).unwrap();
        assert_eq!(&buffer[..2], b"T,");
        let decoded = codec.from_page_buffer(&buffer).unwrap();
        assert_eq!(decoded.as_thing().map(Thing::id), Some(thing().id()));
    }

    #[test]
    fn test_falls_back_to_tiny_when_standard_does_not_fit() {
        let codec = RecordCodec::new();
        let buffer = codec.to_page_buffer(&thing().into(), 52).unwrap();
        assert_eq!(&buffer[..2], b"T,");
    }

    #[test]
    fn test_payload_too_large() {
        let codec = RecordCodec::new();
        let result = codec.to_page_buffer(&thing().into(), 10);
        assert!(matches!(
            result,
            Err(CodecError::PayloadTooLarge { size: 41, capacity: 10 })
        ));
    }

    #[test]
    fn test_product_buffer_roundtrip() {
        let codec = RecordCodec::new();
        let record = Record::from(product());
        let buffer = codec.to_page_buffer(&record, 144).unwrap();
        assert_eq!(codec.from_page_buffer(&buffer).unwrap(), record);
    }

    #[test]
    fn test_buffer_without_padding() {
        let codec = RecordCodec::new();
        let text = thing().to_text(ExternalFormat::Standard).unwrap();
        let decoded = codec.from_page_buffer(text.as_bytes()).unwrap();
        assert_eq!(decoded, Record::Thing(thing()));
    }

    #[test]
    fn test_blank_buffer_is_malformed() {
        let codec = RecordCodec::new();
        let result = codec.from_page_buffer(&[PADDING_BYTE; 144]);
        assert!(matches!(result, Err(CodecError::MalformedRecord(_))));
    }

    #[rstest]
    #[case::unknown_token("X,50,6f1c2c3e-3b6e-4f9e-9d1a-1b2c3d4e5f60")]
    #[case::missing_field("S,50,6f1c2c3e-3b6e-4f9e-9d1a-1b2c3d4e5f60")]
    #[case::extra_field("T,50,6f1c2c3e-3b6e-4f9e-9d1a-1b2c3d4e5f60,x")]
    #[case::empty_type("T,,6f1c2c3e-3b6e-4f9e-9d1a-1b2c3d4e5f60")]
    #[case::bad_type("T,fifty,6f1c2c3e-3b6e-4f9e-9d1a-1b2c3d4e5f60")]
    #[case::unlisted_type("T,51,6f1c2c3e-3b6e-4f9e-9d1a-1b2c3d4e5f60")]
    #[case::bad_uuid("T,50,6f1c2c3e")]
    #[case::bad_time("S,50,6f1c2c3e-3b6e-4f9e-9d1a-1b2c3d4e5f60,noon")]
    #[case::non_ascii("T,50,6f1c2c3e-3b6e-4f9e-9d1a-1b2c3d4e5f6é")]
    fn test_malformed_text(#[case] text: &str) {
        let codec = RecordCodec::new();
        assert!(matches!(
            codec.decode(text.as_bytes()),
            Err(CodecError::MalformedRecord(_))
        ));
    }

    #[rstest]
    #[case::unknown_type("T,0,6f1c2c3e-3b6e-4f9e-9d1a-1b2c3d4e5f60")]
    #[case::nil_id("T,50,00000000-0000-0000-0000-000000000000")]
    fn test_invalid_text(#[case] text: &str) {
        let codec = RecordCodec::new();
        assert!(matches!(
            codec.decode(text.as_bytes()),
            Err(CodecError::InvalidRecord(_))
        ));
    }

    #[rstest]
    #[case(ExternalFormat::Tiny)]
    #[case(ExternalFormat::Display)]
    fn test_product_unsupported_formats(#[case] format: ExternalFormat) {
        let codec = RecordCodec::new();
        assert!(matches!(
            codec.encode(&product().into(), format),
            Err(CodecError::UnsupportedFormat { record: "product", .. })
        ));
    }

    #[test]
    fn test_json_decode_dispatches_on_shape() {
        let codec = RecordCodec::new();
        for record in [Record::from(thing()), Record::from(product())] {
            let json = codec.encode(&record, ExternalFormat::Json).unwrap();
            assert_eq!(codec.decode_json(&json).unwrap(), record);
        }
    }

    #[test]
    fn test_json_decode_rejects_garbage() {
        let codec = RecordCodec::new();
        assert!(codec.decode_json(b"{\"Foo\":1}").is_err());
        assert!(codec.decode_json(b"not json").is_err());
    }
}
