//! # tagproxy-core
//!
//! Records stored on storage tags and the codec that maps them to the
//! padded page buffers written to tag memory.
//!
//! ## Modules
//!
//! - [`thing`]: generic tracked item (`Thing`, `ThingType`)
//! - [`product`]: supply-chain item (`Product`) and its description
//! - [`format`]: external representation formats
//! - [`codec`]: `RecordCodec` and the `Record` sum type
//! - [`types`]: timestamps, addresses and device descriptors
//! - [`constants`]: record layout and tag geometry

pub mod codec;
pub mod constants;
pub mod error;
pub mod format;
pub mod product;
pub mod thing;
pub mod types;

pub use codec::{Record, RecordCodec};
pub use error::{CodecError, Result};
pub use format::ExternalFormat;
pub use product::{Product, ProductBuilder, ProductDescription};
pub use thing::{Thing, ThingBuilder, ThingType};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
