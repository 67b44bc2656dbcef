use thiserror::Error;

/// Errors raised while building, encoding or decoding records.
#[derive(Error, Debug)]
pub enum CodecError {
    /// A record violates a domain rule (unknown type, nil id, missing address).
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// An external representation could not be parsed.
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// The smallest encoding of a record does not fit the tag buffer.
    #[error("Payload of {size} bytes exceeds tag capacity of {capacity} bytes")]
    PayloadTooLarge { size: usize, capacity: usize },

    /// The record kind has no layout for the requested format.
    #[error("Format {format} is not supported for {record} records")]
    UnsupportedFormat {
        record: &'static str,
        format: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CodecError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRecord(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRecord(message.into())
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_too_large_display() {
        let error = CodecError::PayloadTooLarge {
            size: 43,
            capacity: 10,
        };
        assert_eq!(
            error.to_string(),
            "Payload of 43 bytes exceeds tag capacity of 10 bytes"
        );
    }
}
