//! Chunked transfer of whole buffers over a [`PagedChannel`].
//!
//! A tag moves a few pages per driver call: one page per write and four per
//! read on Ultralight-compatible tags. [`TagTransport`] splits a page buffer
//! into those quanta, issues the calls strictly in increasing page order and
//! reassembles the reads.
//!
//! A call timeout bounds each driver call rather than the whole transfer, so
//! a slow tag fails at a known page instead of being cut off between calls.
//!
//! # Examples
//!
//! ```
//! use tagproxy_hardware::mock::MockPagedChannel;
//! use tagproxy_hardware::transport::TagTransport;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tagproxy_hardware::TransportError> {
//!     let (channel, _handle) = MockPagedChannel::new();
//!     let mut transport = TagTransport::new(channel);
//!
//!     let page_buffer = b"T,50,abcd*******";
//!     transport.write(page_buffer).await?;
//!     let buffer = transport.read(page_buffer.len()).await?;
//!     assert_eq!(&buffer[..], &page_buffer[..]);
//!     Ok(())
//! }
//! ```

use crate::error::TransportError;
use crate::traits::PagedChannel;
use crate::types::ChannelGeometry;
use crate::HardwareError;
use bytes::{Bytes, BytesMut};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Result type alias for transfers.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Chunking layer on top of a paged channel.
#[derive(Debug)]
pub struct TagTransport<C> {
    channel: C,
    geometry: ChannelGeometry,
    call_timeout: Option<Duration>,
}

impl<C: PagedChannel> TagTransport<C> {
    /// Wrap a channel, taking its geometry.
    pub fn new(channel: C) -> Self {
        let geometry = channel.geometry();
        Self {
            channel,
            geometry,
            call_timeout: None,
        }
    }

    /// Bound every single page call by `timeout`.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout
    }

    pub fn geometry(&self) -> &ChannelGeometry {
        &self.geometry
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn into_inner(self) -> C {
        self.channel
    }

    /// Write a page-aligned payload to user memory.
    ///
    /// The payload is written `write_quantum` pages at a time, starting at
    /// the first user page. The first failing call stops the transfer;
    /// pages written before it are not rolled back.
    ///
    /// # Errors
    ///
    /// - `Misaligned` if the payload is not a whole number of pages
    /// - `InsufficientCapacity` if it exceeds user memory
    /// - `Write` with the page of the failing call
    pub async fn write(&mut self, payload: &[u8]) -> Result<()> {
        let geometry = self.geometry;
        if payload.len() % geometry.page_size != 0 {
            return Err(TransportError::Misaligned {
                len: payload.len(),
                page_size: geometry.page_size,
            });
        }
        if payload.len() > geometry.user_capacity {
            return Err(TransportError::InsufficientCapacity {
                requested: payload.len(),
                capacity: geometry.user_capacity,
            });
        }

        let chunk_size = geometry.write_quantum * geometry.page_size;
        let calls = payload.len().div_ceil(chunk_size);
        if calls > 0 {
            page_at(&geometry, (calls - 1) * geometry.write_quantum)?;
        }
        let call_timeout = self.call_timeout;
        for (index, chunk) in payload.chunks(chunk_size).enumerate() {
            let page = page_at(&geometry, index * geometry.write_quantum)?;
            trace!(page, len = chunk.len(), "Writing pages");
            bounded(call_timeout, self.channel.write_pages(page, chunk))
                .await
                .map_err(|source| TransportError::Write {
                    at_page: page,
                    source,
                })?;
        }

        debug!(
            bytes = payload.len(),
            calls,
            "Tag write complete"
        );
        Ok(())
    }

    /// Read at least `expected` bytes of user memory.
    ///
    /// The buffer is rounded up to whole read quanta. Any failing or short
    /// call aborts the transfer without returning partial data.
    ///
    /// # Errors
    ///
    /// - `InsufficientCapacity` if the rounded size exceeds user memory
    /// - `Read` with the page of the failing call
    pub async fn read(&mut self, expected: usize) -> Result<Bytes> {
        let geometry = self.geometry;
        let block = geometry.read_quantum * geometry.page_size;
        let size = expected.div_ceil(block) * block;
        if size > geometry.user_capacity {
            return Err(TransportError::InsufficientCapacity {
                requested: size,
                capacity: geometry.user_capacity,
            });
        }

        let calls = size / block;
        if calls > 0 {
            page_at(&geometry, (calls - 1) * geometry.read_quantum)?;
        }
        let call_timeout = self.call_timeout;
        let mut buffer = BytesMut::with_capacity(size);
        for index in 0..calls {
            let page = page_at(&geometry, index * geometry.read_quantum)?;
            trace!(page, pages = geometry.read_quantum, "Reading pages");
            let data = bounded(call_timeout, self.channel.read_pages(page, geometry.read_quantum))
                .await
                .map_err(|source| TransportError::Read {
                    at_page: page,
                    source,
                })?;
            if data.len() < block {
                return Err(TransportError::Read {
                    at_page: page,
                    source: HardwareError::invalid_data(format!(
                        "Short read: expected {block} bytes, got {}",
                        data.len()
                    )),
                });
            }
            buffer.extend_from_slice(&data[..block]);
        }

        debug!(bytes = size, calls, "Tag read complete");
        Ok(buffer.freeze())
    }

    /// Read the whole user memory.
    pub async fn read_all(&mut self) -> Result<Bytes> {
        self.read(self.geometry.user_capacity).await
    }
}

/// Address of the page `offset_pages` after the first user page.
fn page_at(geometry: &ChannelGeometry, offset_pages: usize) -> Result<u16> {
    u16::try_from(offset_pages)
        .ok()
        .and_then(|offset| geometry.first_user_page.checked_add(offset))
        .ok_or(TransportError::PageOutOfRange {
            first_page: geometry.first_user_page,
            offset_pages,
        })
}

async fn bounded<T>(
    timeout: Option<Duration>,
    call: impl Future<Output = crate::Result<T>>,
) -> crate::Result<T> {
    let Some(limit) = timeout else {
        return call.await;
    };
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!(timeout_ms = limit.as_millis() as u64, "Page call timed out");
            Err(HardwareError::timeout(limit.as_millis() as u64))
        }
    }
}
