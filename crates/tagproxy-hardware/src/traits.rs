//! Reader and tag channel trait definitions.
//!
//! These traits establish the contract between the device layer and the
//! reader driver, enabling substitution between mock and real hardware.
//!
//! All traits use native `async fn` methods (Rust 1.90 + Edition 2024 RPITIT),
//! eliminating the need for the `async_trait` macro.

#![allow(async_fn_in_trait)]

use crate::devices::TagEvent;
use crate::error::Result;
use crate::types::{ChannelGeometry, ReaderInfo};

/// Page-addressed access to the memory of one tag.
///
/// A channel is opened when a tag is placed on the reader and becomes
/// useless once the tag leaves; every call then fails with
/// `HardwareError::Disconnected`.
///
/// # Object Safety and Dynamic Dispatch
///
/// This trait is NOT object-safe because `async fn` methods return
/// `impl Future`. Use generic type parameters, or the enum wrapper
/// [`AnyPagedChannel`](crate::devices::AnyPagedChannel) for dispatch over
/// the available backends.
///
/// # Examples
///
/// ```no_run
/// use tagproxy_hardware::traits::PagedChannel;
/// use tagproxy_hardware::error::Result;
///
/// async fn first_block<C: PagedChannel>(channel: &mut C) -> Result<Vec<u8>> {
///     let geometry = channel.geometry();
///     channel.read_pages(geometry.first_user_page, geometry.read_quantum).await
/// }
/// ```
pub trait PagedChannel: Send {
    /// Geometry of the tag behind this channel.
    fn geometry(&self) -> ChannelGeometry;

    /// Read `count` pages starting at `start`.
    ///
    /// Returns `count * page_size` bytes on success. Fewer bytes indicate a
    /// short response from the tag.
    async fn read_pages(&mut self, start: u16, count: usize) -> Result<Vec<u8>>;

    /// Write whole pages starting at `start`.
    ///
    /// `data.len()` must be a multiple of the page size and at most
    /// `write_quantum` pages.
    async fn write_pages(&mut self, start: u16, data: &[u8]) -> Result<()>;
}

/// Reader discovery and tag hot-plug notifications.
///
/// # Examples
///
/// ```no_run
/// use tagproxy_hardware::traits::ReaderBackend;
/// use tagproxy_hardware::devices::TagEvent;
/// use tagproxy_hardware::error::Result;
///
/// async fn wait_for_tag<B: ReaderBackend>(backend: &mut B) -> Result<bool> {
///     while let Some(event) = backend.next_event().await? {
///         if let TagEvent::Added { .. } = event {
///             return Ok(true);
///         }
///     }
///     Ok(false)
/// }
/// ```
pub trait ReaderBackend: Send {
    /// List the readers currently attached.
    async fn list_readers(&mut self) -> Result<Vec<ReaderInfo>>;

    /// Wait for the next tag event.
    ///
    /// Returns `Ok(None)` once the backend is closed and no further events
    /// will arrive.
    async fn next_event(&mut self) -> Result<Option<TagEvent>>;
}
