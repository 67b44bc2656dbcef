//! The `Thing` record: a generic tracked item.

use crate::{
    Result,
    constants::FIELD_SEPARATOR,
    error::CodecError,
    format::ExternalFormat,
    types::{format_timestamp, parse_timestamp, record_timestamp},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kind of a [`Thing`]. The numeric codes are part of the tag format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u64", try_from = "u64")]
#[repr(u64)]
pub enum ThingType {
    /// Placeholder kind, never valid in a record.
    Unknown = 0,
    ExhaustSystem = 3,
    Engine = 50,
    UnderCarriage = 80,
    Digger = 9000,
}

impl ThingType {
    /// All kinds that may appear in a valid record.
    pub const KNOWN: [ThingType; 4] = [
        ThingType::ExhaustSystem,
        ThingType::Engine,
        ThingType::UnderCarriage,
        ThingType::Digger,
    ];

    #[must_use]
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(ThingType::Unknown),
            3 => Some(ThingType::ExhaustSystem),
            50 => Some(ThingType::Engine),
            80 => Some(ThingType::UnderCarriage),
            9000 => Some(ThingType::Digger),
            _ => None,
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Unknown" => Some(ThingType::Unknown),
            "ExhaustSystem" => Some(ThingType::ExhaustSystem),
            "Engine" => Some(ThingType::Engine),
            "UnderCarriage" => Some(ThingType::UnderCarriage),
            "Digger" => Some(ThingType::Digger),
            _ => None,
        }
    }

    #[must_use]
    pub fn code(self) -> u64 {
        self as u64
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ThingType::Unknown => "Unknown",
            ThingType::ExhaustSystem => "ExhaustSystem",
            ThingType::Engine => "Engine",
            ThingType::UnderCarriage => "UnderCarriage",
            ThingType::Digger => "Digger",
        }
    }
}

impl From<ThingType> for u64 {
    fn from(kind: ThingType) -> Self {
        kind.code()
    }
}

impl TryFrom<u64> for ThingType {
    type Error = CodecError;

    fn try_from(code: u64) -> Result<Self> {
        ThingType::from_code(code)
            .ok_or_else(|| CodecError::invalid(format!("Unknown thing type {code}")))
    }
}

impl fmt::Display for ThingType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A generic tracked item.
///
/// A `Thing` always has a known type and a non-nil id; both are checked
/// when it is built. The creation time is held at whole-second resolution.
///
/// # Examples
///
/// ```
/// use tagproxy_core::{Thing, ThingType};
///
/// let thing = Thing::new(ThingType::Digger).unwrap();
/// assert_eq!(thing.type_as_string(), "Digger");
/// assert!(!thing.id().is_nil());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ThingJson", into = "ThingJson")]
pub struct Thing {
    thing_type: ThingType,
    id: Uuid,
    created_at: DateTime<Utc>,
}

impl Thing {
    /// Create a thing of the given type with a random id, created now.
    pub fn new(thing_type: ThingType) -> Result<Self> {
        Self::builder(thing_type, Uuid::new_v4()).build()
    }

    pub fn builder(thing_type: ThingType, id: Uuid) -> ThingBuilder {
        ThingBuilder {
            thing_type,
            id,
            created_at: None,
        }
    }

    #[must_use]
    pub fn thing_type(&self) -> ThingType {
        self.thing_type
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn type_as_string(&self) -> &'static str {
        self.thing_type.name()
    }

    /// Render the thing in one of the textual formats.
    ///
    /// # Errors
    /// `ExternalFormat::Json` is not textual and yields `UnsupportedFormat`.
    pub fn to_text(&self, format: ExternalFormat) -> Result<String> {
        let sep = FIELD_SEPARATOR;
        let token = format.token();
        let code = self.thing_type.code();
        match format {
            ExternalFormat::Tiny => Ok(format!("{token}{sep}{code}{sep}{}", self.id)),
            ExternalFormat::Standard => Ok(format!(
                "{token}{sep}{code}{sep}{}{sep}{}",
                self.id,
                format_timestamp(&self.created_at)
            )),
            ExternalFormat::Display => Ok(format!(
                "{token}{sep}{code}{sep}{}{sep}{}{sep}{}",
                self.type_as_string(),
                self.id,
                format_timestamp(&self.created_at)
            )),
            ExternalFormat::Json => Err(CodecError::UnsupportedFormat {
                record: "thing",
                format: format.to_string(),
            }),
        }
    }

    /// Parse the fields of a textual thing. `fields[0]` is the format token.
    pub(crate) fn from_fields(format: ExternalFormat, fields: &[&str]) -> Result<Self> {
        let expected = match format {
            ExternalFormat::Tiny => 3,
            ExternalFormat::Standard => 4,
            ExternalFormat::Display => 5,
            ExternalFormat::Json => {
                return Err(CodecError::UnsupportedFormat {
                    record: "thing",
                    format: format.to_string(),
                });
            }
        };
        if fields.len() != expected {
            return Err(CodecError::malformed(format!(
                "{format} thing needs {expected} fields, got {}",
                fields.len()
            )));
        }

        let thing_type = parse_type(required(fields[1], "type")?)?;
        let (id_field, created_field) = match format {
            ExternalFormat::Tiny => (fields[2], None),
            ExternalFormat::Standard => (fields[2], Some(fields[3])),
            _ => {
                let name = required(fields[2], "type name")?;
                if name != thing_type.name() {
                    return Err(CodecError::malformed(format!(
                        "Type name '{name}' does not match type code {}",
                        thing_type.code()
                    )));
                }
                (fields[3], Some(fields[4]))
            }
        };

        let id_text = required(id_field, "id")?;
        let id = Uuid::parse_str(id_text)
            .map_err(|e| CodecError::malformed(format!("Invalid id '{id_text}': {e}")))?;

        let mut builder = Thing::builder(thing_type, id);
        if let Some(created) = created_field {
            builder = builder.created_at(parse_timestamp(required(created, "created at")?)?);
        }
        builder.build()
    }
}

impl fmt::Display for Thing {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} (created {})",
            self.thing_type,
            self.id,
            format_timestamp(&self.created_at)
        )
    }
}

fn required<'a>(field: &'a str, name: &str) -> Result<&'a str> {
    if field.is_empty() {
        Err(CodecError::malformed(format!("Missing field: {name}")))
    } else {
        Ok(field)
    }
}

fn parse_type(text: &str) -> Result<ThingType> {
    let code: u64 = text
        .parse()
        .map_err(|_| CodecError::malformed(format!("Invalid type code '{text}'")))?;
    ThingType::from_code(code)
        .ok_or_else(|| CodecError::malformed(format!("Unknown type code {code}")))
}

/// Builder for [`Thing`].
#[derive(Debug, Clone)]
pub struct ThingBuilder {
    thing_type: ThingType,
    id: Uuid,
    created_at: Option<DateTime<Utc>>,
}

impl ThingBuilder {
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Validate and build the thing.
    ///
    /// # Errors
    /// `InvalidRecord` for the `Unknown` type, a nil id or a creation year
    /// outside `0000..=9999`.
    pub fn build(self) -> Result<Thing> {
        if self.thing_type == ThingType::Unknown {
            return Err(CodecError::invalid("Thing type must not be Unknown"));
        }
        if self.id.is_nil() {
            return Err(CodecError::invalid("Thing id must not be nil"));
        }
        Ok(Thing {
            thing_type: self.thing_type,
            id: self.id,
            created_at: record_timestamp(self.created_at.unwrap_or_else(Utc::now))?,
        })
    }
}

/// Type field of the JSON shape: a code, or a name as some clients send.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum TypeField {
    Code(u64),
    Name(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ThingJson {
    #[serde(rename = "Type")]
    thing_type: TypeField,
    #[serde(rename = "TypeAsString", default, skip_serializing_if = "Option::is_none")]
    type_as_string: Option<String>,
    #[serde(rename = "Id")]
    id: Uuid,
    #[serde(rename = "CreatedWhen", default, skip_serializing_if = "Option::is_none")]
    created_when: Option<DateTime<Utc>>,
}

impl From<Thing> for ThingJson {
    fn from(thing: Thing) -> Self {
        ThingJson {
            thing_type: TypeField::Code(thing.thing_type.code()),
            type_as_string: Some(thing.type_as_string().to_string()),
            id: thing.id,
            created_when: Some(thing.created_at),
        }
    }
}

impl TryFrom<ThingJson> for Thing {
    type Error = CodecError;

    fn try_from(json: ThingJson) -> Result<Self> {
        let thing_type = match json.thing_type {
            TypeField::Code(code) => ThingType::try_from(code)?,
            TypeField::Name(name) => ThingType::from_name(&name)
                .ok_or_else(|| CodecError::invalid(format!("Unknown thing type '{name}'")))?,
        };
        let mut builder = Thing::builder(thing_type, json.id);
        if let Some(created) = json.created_when {
            builder = builder.created_at(created);
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn sample() -> Thing {
        Thing::builder(
            ThingType::Digger,
            Uuid::parse_str("6f1c2c3e-3b6e-4f9e-9d1a-1b2c3d4e5f60").unwrap(),
        )
        .created_at(Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap())
        .build()
        .unwrap()
    }

    #[test]
    fn test_unknown_type_rejected() {
        let result = Thing::new(ThingType::Unknown);
        assert!(matches!(result, Err(CodecError::InvalidRecord(_))));
    }

    #[test]
    fn test_nil_id_rejected() {
        let result = Thing::builder(ThingType::Engine, Uuid::nil()).build();
        assert!(matches!(result, Err(CodecError::InvalidRecord(_))));
    }

    #[test]
    fn test_created_at_truncated() {
        let precise = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let thing = Thing::builder(ThingType::Engine, Uuid::new_v4())
            .created_at(precise)
            .build()
            .unwrap();
        assert_eq!(thing.created_at().timestamp(), 1_700_000_000);
        assert_eq!(thing.created_at().timestamp_subsec_nanos(), 0);
    }

    #[rstest]
    #[case(ExternalFormat::Tiny, "T,9000,6f1c2c3e-3b6e-4f9e-9d1a-1b2c3d4e5f60")]
    #[case(
        ExternalFormat::Standard,
        "S,9000,6f1c2c3e-3b6e-4f9e-9d1a-1b2c3d4e5f60,2026-10-19T12:00:00Z"
    )]
    #[case(
        ExternalFormat::Display,
        "D,9000,Digger,6f1c2c3e-3b6e-4f9e-9d1a-1b2c3d4e5f60,2026-10-19T12:00:00Z"
    )]
    fn test_text_layouts(#[case] format: ExternalFormat, #[case] expected: &str) {
        assert_eq!(sample().to_text(format).unwrap(), expected);
    }

    #[test]
    fn test_json_shape() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["Type"], 9000);
        assert_eq!(value["TypeAsString"], "Digger");
        assert_eq!(value["Id"], "6f1c2c3e-3b6e-4f9e-9d1a-1b2c3d4e5f60");
        assert_eq!(value["CreatedWhen"], "2026-10-19T12:00:00Z");
    }

    #[test]
    fn test_json_roundtrip() {
        let json = serde_json::to_string(&sample()).unwrap();
        let parsed: Thing = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, sample());
    }

    #[test]
    fn test_json_type_as_string_ignored() {
        let json = r#"{"Type":50,"TypeAsString":"Digger","Id":"6f1c2c3e-3b6e-4f9e-9d1a-1b2c3d4e5f60"}"#;
        let parsed: Thing = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.thing_type(), ThingType::Engine);
    }

    #[test]
    fn test_json_accepts_type_name() {
        let json = r#"{"Type":"UnderCarriage","Id":"6f1c2c3e-3b6e-4f9e-9d1a-1b2c3d4e5f60"}"#;
        let parsed: Thing = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.thing_type(), ThingType::UnderCarriage);
    }

    #[rstest]
    #[case(r#"{"Type":0,"Id":"6f1c2c3e-3b6e-4f9e-9d1a-1b2c3d4e5f60"}"#)]
    #[case(r#"{"Type":7,"Id":"6f1c2c3e-3b6e-4f9e-9d1a-1b2c3d4e5f60"}"#)]
    #[case(r#"{"Type":50,"Id":"00000000-0000-0000-0000-000000000000"}"#)]
    #[case(r#"{"Type":50}"#)]
    #[case(r#"{"Type":50,"Id":"not-a-uuid"}"#)]
    fn test_json_invalid(#[case] json: &str) {
        assert!(serde_json::from_str::<Thing>(json).is_err());
    }

    #[test]
    fn test_type_name_mismatch() {
        let fields = [
            "D",
            "50",
            "Digger",
            "6f1c2c3e-3b6e-4f9e-9d1a-1b2c3d4e5f60",
            "2026-10-19T12:00:00Z",
        ];
        let result = Thing::from_fields(ExternalFormat::Display, &fields);
        assert!(matches!(result, Err(CodecError::MalformedRecord(_))));
    }

    #[test]
    fn test_type_code_lookup() {
        for kind in ThingType::KNOWN {
            assert_eq!(ThingType::from_code(kind.code()), Some(kind));
            assert_eq!(ThingType::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ThingType::from_code(1), None);
    }
}
