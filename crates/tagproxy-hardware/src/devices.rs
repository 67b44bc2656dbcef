//! Enum wrappers for reader and channel dispatch.
//!
//! Native `async fn` in traits (RPITIT - Rust Edition 2024) are not
//! object-safe, so we cannot use `Box<dyn PagedChannel>`. The enums in this
//! module provide concrete type dispatch at compile time instead, with one
//! variant per backend and hardware backends behind feature flags.
//!
//! # Examples
//!
//! ```
//! use tagproxy_hardware::devices::AnyPagedChannel;
//! use tagproxy_hardware::mock::MockPagedChannel;
//! use tagproxy_hardware::transport::TagTransport;
//!
//! let (channel, _handle) = MockPagedChannel::new();
//! let transport = TagTransport::new(AnyPagedChannel::Mock(channel));
//! assert_eq!(transport.geometry().user_capacity, 144);
//! ```

use crate::mock::{MockPagedChannel, MockReader};
use crate::traits::{PagedChannel, ReaderBackend};
use crate::types::{ChannelGeometry, ReaderInfo, TagIdentity};
use crate::Result;

#[cfg(feature = "hardware-pcsc")]
use crate::pcsc::{PcscBackend, PcscChannel};

/// Hot-plug notification from a reader backend.
#[derive(Debug)]
pub enum TagEvent {
    /// A tag entered the field of `reader`.
    Added {
        reader: String,
        tag: TagIdentity,
        channel: AnyPagedChannel,
    },

    /// The tag left the field of `reader`.
    Removed { reader: String },
}

/// Enum wrapper for paged channel dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyPagedChannel {
    /// In-memory tag for development and testing.
    Mock(MockPagedChannel),

    /// PC/SC connected tag.
    #[cfg(feature = "hardware-pcsc")]
    Pcsc(PcscChannel),
}

impl PagedChannel for AnyPagedChannel {
    fn geometry(&self) -> ChannelGeometry {
        match self {
            Self::Mock(channel) => channel.geometry(),
            #[cfg(feature = "hardware-pcsc")]
            Self::Pcsc(channel) => channel.geometry(),
        }
    }

    async fn read_pages(&mut self, start: u16, count: usize) -> Result<Vec<u8>> {
        match self {
            Self::Mock(channel) => channel.read_pages(start, count).await,
            #[cfg(feature = "hardware-pcsc")]
            Self::Pcsc(channel) => channel.read_pages(start, count).await,
        }
    }

    async fn write_pages(&mut self, start: u16, data: &[u8]) -> Result<()> {
        match self {
            Self::Mock(channel) => channel.write_pages(start, data).await,
            #[cfg(feature = "hardware-pcsc")]
            Self::Pcsc(channel) => channel.write_pages(start, data).await,
        }
    }
}

/// Enum wrapper for reader backend dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyReaderBackend {
    /// Mock backend for development and testing.
    Mock(MockReader),

    /// PC/SC reader subsystem.
    #[cfg(feature = "hardware-pcsc")]
    Pcsc(PcscBackend),
}

impl ReaderBackend for AnyReaderBackend {
    async fn list_readers(&mut self) -> Result<Vec<ReaderInfo>> {
        match self {
            Self::Mock(backend) => backend.list_readers().await,
            #[cfg(feature = "hardware-pcsc")]
            Self::Pcsc(backend) => backend.list_readers().await,
        }
    }

    async fn next_event(&mut self) -> Result<Option<TagEvent>> {
        match self {
            Self::Mock(backend) => backend.next_event().await,
            #[cfg(feature = "hardware-pcsc")]
            Self::Pcsc(backend) => backend.next_event().await,
        }
    }
}
