//! Reader and tag abstraction layer for the tagproxy device service.
//!
//! This crate provides trait-based abstractions for a contactless reader and
//! the storage tags placed on it, plus the chunking layer that moves whole
//! page buffers across the narrow page-sized channel a tag offers. Mock
//! implementations allow development and testing without physical hardware.
//!
//! # Design Philosophy
//!
//! - **Async-first**: All I/O operations are asynchronous using native `async fn`
//!   in traits (Rust 1.90 + Edition 2024 RPITIT).
//! - **Enum dispatch**: [`AnyPagedChannel`] and [`AnyReaderBackend`] select
//!   the backend at compile time; hardware backends sit behind features.
//! - **Error-aware**: All operations return `Result<T>` with detailed error information.
//!
//! # Paged Channels
//!
//! The [`PagedChannel`] trait exposes page reads and writes on one tag. The
//! [`TagTransport`] splits a buffer into the read and write quanta of the
//! channel:
//!
//! ```
//! use tagproxy_hardware::mock::MockPagedChannel;
//! use tagproxy_hardware::TagTransport;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tagproxy_hardware::TransportError> {
//!     let (channel, tag) = MockPagedChannel::new();
//!     let mut transport = TagTransport::new(channel);
//!
//!     transport.write(&[b'*'; 16]).await?;
//!     assert_eq!(tag.calls().len(), 4);
//!     Ok(())
//! }
//! ```
//!
//! # Reader Backends
//!
//! The [`ReaderBackend`] trait lists readers and reports tags entering and
//! leaving the field as [`TagEvent`]s. Every `Added` event carries the
//! channel of the new tag.
//!
//! # Features
//!
//! - `hardware-pcsc`: PC/SC backend (`pcsc` crate) for ACR122U-class readers.
//!
//! [`PagedChannel`]: traits::PagedChannel
//! [`ReaderBackend`]: traits::ReaderBackend

pub mod devices;
pub mod error;
pub mod mock;
#[cfg(feature = "hardware-pcsc")]
pub mod pcsc;
pub mod traits;
pub mod transport;
pub mod types;

// Re-export commonly used types for convenience
pub use devices::{AnyPagedChannel, AnyReaderBackend, TagEvent};
pub use error::{HardwareError, Result, TransportError};
pub use traits::{PagedChannel, ReaderBackend};
pub use transport::TagTransport;
pub use types::{ChannelGeometry, ReaderInfo, TagFamily, TagIdentity};
