use crate::{Result, error::CodecError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// External representation of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalFormat {
    /// `T,<type>,<id>`
    Tiny,
    /// `S,<type>,<id>,<created>` for things, the `P` layout for products.
    Standard,
    /// `D,<type>,<name>,<id>,<created>`
    Display,
    Json,
}

impl ExternalFormat {
    /// Leading token of the textual layout. Empty for JSON.
    #[must_use]
    pub fn token(self) -> &'static str {
        match self {
            ExternalFormat::Tiny => "T",
            ExternalFormat::Standard => "S",
            ExternalFormat::Display => "D",
            ExternalFormat::Json => "",
        }
    }

    #[must_use]
    pub fn is_textual(self) -> bool {
        self != ExternalFormat::Json
    }
}

impl fmt::Display for ExternalFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ExternalFormat::Tiny => "tiny",
            ExternalFormat::Standard => "standard",
            ExternalFormat::Display => "display",
            ExternalFormat::Json => "json",
        };
        write!(f, "{name}")
    }
}

/// Record layout selected by the leading token of a textual record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Layout {
    Thing(ExternalFormat),
    Product,
}

/// Token of the product layout.
pub(crate) const PRODUCT_TOKEN: &str = "P";

impl Layout {
    pub(crate) fn from_token(token: &str) -> Result<Self> {
        match token {
            "T" => Ok(Layout::Thing(ExternalFormat::Tiny)),
            "S" => Ok(Layout::Thing(ExternalFormat::Standard)),
            "D" => Ok(Layout::Thing(ExternalFormat::Display)),
            PRODUCT_TOKEN => Ok(Layout::Product),
            other => Err(CodecError::malformed(format!(
                "Unknown format token '{other}'"
            ))),
        }
    }
}
