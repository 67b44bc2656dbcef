//! Mock tag channel for testing and development.
//!
//! The tag memory lives behind a shared lock so that a test can inspect
//! what was written, preload data, and inject failures through the
//! [`MockTagHandle`] while the channel itself is owned by a transport.
//! Delays run on the tokio clock, so paused-time tests step over them.

use crate::{
    HardwareError, Result,
    traits::PagedChannel,
    types::ChannelGeometry,
};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Kind of page operation, for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOp {
    Read,
    Write,
}

/// A page operation recorded by the mock channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCall {
    Read { start: u16, count: usize },
    Write { start: u16, len: usize },
}

#[derive(Debug)]
struct TagState {
    /// Memory from page 0 through the last user page.
    memory: Vec<u8>,
    calls: Vec<PageCall>,
    reads: usize,
    writes: usize,
    fail_on: Option<(PageOp, usize)>,
    delay_on: Option<(PageOp, usize, Duration)>,
    short_reads: bool,
    connected: bool,
}

/// Mock paged channel backed by in-memory tag pages.
///
/// # Examples
///
/// ```
/// use tagproxy_hardware::mock::MockPagedChannel;
/// use tagproxy_hardware::traits::PagedChannel;
///
/// #[tokio::main]
/// async fn main() -> tagproxy_hardware::Result<()> {
///     let (mut channel, handle) = MockPagedChannel::new();
///     handle.set_user_memory(b"S,50,");
///
///     let data = channel.read_pages(4, 2).await?;
///     assert_eq!(&data[..5], b"S,50,");
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockPagedChannel {
    state: Arc<Mutex<TagState>>,
    geometry: ChannelGeometry,
}

impl MockPagedChannel {
    /// Create a blank tag with the default geometry.
    pub fn new() -> (Self, MockTagHandle) {
        Self::with_geometry(ChannelGeometry::default())
    }

    /// Create a blank tag with a custom geometry.
    pub fn with_geometry(geometry: ChannelGeometry) -> (Self, MockTagHandle) {
        let size =
            usize::from(geometry.first_user_page) * geometry.page_size + geometry.user_capacity;
        let state = Arc::new(Mutex::new(TagState {
            memory: vec![0; size],
            calls: Vec::new(),
            reads: 0,
            writes: 0,
            fail_on: None,
            delay_on: None,
            short_reads: false,
            connected: true,
        }));

        let channel = Self {
            state: Arc::clone(&state),
            geometry,
        };
        let handle = MockTagHandle { state, geometry };
        (channel, handle)
    }

    fn range(&self, start: u16, len: usize) -> Result<std::ops::Range<usize>> {
        if start < self.geometry.first_user_page {
            return Err(HardwareError::PageOutOfRange { page: start });
        }
        let offset = usize::from(start) * self.geometry.page_size;
        let end = offset + len;
        let limit = usize::from(self.geometry.end_page()) * self.geometry.page_size;
        if end > limit {
            return Err(HardwareError::PageOutOfRange { page: start });
        }
        Ok(offset..end)
    }
}

impl PagedChannel for MockPagedChannel {
    fn geometry(&self) -> ChannelGeometry {
        self.geometry
    }

    async fn read_pages(&mut self, start: u16, count: usize) -> Result<Vec<u8>> {
        let range = self.range(start, count * self.geometry.page_size)?;
        let delay = {
            let mut state = lock(&self.state);
            state.calls.push(PageCall::Read { start, count });
            state.reads += 1;
            state.check(PageOp::Read, state.reads)?;
            state.delay(PageOp::Read, state.reads)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = lock(&self.state);
        let mut data = state.memory[range].to_vec();
        if state.short_reads {
            data.truncate(data.len() / 2);
        }
        Ok(data)
    }

    async fn write_pages(&mut self, start: u16, data: &[u8]) -> Result<()> {
        let page_size = self.geometry.page_size;
        if data.len() % page_size != 0 || data.len() > self.geometry.write_quantum * page_size {
            return Err(HardwareError::invalid_data(format!(
                "Write of {} bytes does not match the write quantum",
                data.len()
            )));
        }
        let range = self.range(start, data.len())?;
        let delay = {
            let mut state = lock(&self.state);
            state.calls.push(PageCall::Write {
                start,
                len: data.len(),
            });
            state.writes += 1;
            state.check(PageOp::Write, state.writes)?;
            state.delay(PageOp::Write, state.writes)
        };
        // Memory changes only once the delay has passed.
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        lock(&self.state).memory[range].copy_from_slice(data);
        Ok(())
    }
}

impl TagState {
    fn check(&self, op: PageOp, call: usize) -> Result<()> {
        if !self.connected {
            return Err(HardwareError::disconnected("mock tag"));
        }
        if self.fail_on == Some((op, call)) {
            return Err(HardwareError::communication(format!(
                "Injected {op:?} failure on call {call}"
            )));
        }
        Ok(())
    }

    fn delay(&self, op: PageOp, call: usize) -> Option<Duration> {
        match self.delay_on {
            Some((delayed, at, delay)) if delayed == op && at == call => Some(delay),
            _ => None,
        }
    }
}

fn lock(state: &Mutex<TagState>) -> MutexGuard<'_, TagState> {
    // Poisoning is ignored.
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle for inspecting and controlling a mock tag.
#[derive(Debug, Clone)]
pub struct MockTagHandle {
    state: Arc<Mutex<TagState>>,
    geometry: ChannelGeometry,
}

impl MockTagHandle {
    /// Copy of the user memory.
    pub fn user_memory(&self) -> Vec<u8> {
        let offset = usize::from(self.geometry.first_user_page) * self.geometry.page_size;
        lock(&self.state).memory[offset..].to_vec()
    }

    /// Overwrite the start of user memory. Excess bytes are ignored.
    pub fn set_user_memory(&self, data: &[u8]) {
        let offset = usize::from(self.geometry.first_user_page) * self.geometry.page_size;
        let mut state = lock(&self.state);
        let len = data.len().min(state.memory.len() - offset);
        state.memory[offset..offset + len].copy_from_slice(&data[..len]);
    }

    /// Make the `call`-th operation of kind `op` fail (1-based).
    pub fn fail_on_call(&self, op: PageOp, call: usize) {
        lock(&self.state).fail_on = Some((op, call));
    }

    /// Make the `call`-th operation of kind `op` take `delay` (1-based).
    pub fn delay_call(&self, op: PageOp, call: usize, delay: Duration) {
        lock(&self.state).delay_on = Some((op, call, delay));
    }

    /// Return half of the requested bytes on every read.
    pub fn set_short_reads(&self, enabled: bool) {
        lock(&self.state).short_reads = enabled;
    }

    /// Simulate the tag leaving the field.
    pub fn disconnect(&self) {
        lock(&self.state).connected = false;
    }

    /// Recorded page operations, in call order.
    pub fn calls(&self) -> Vec<PageCall> {
        lock(&self.state).calls.clone()
    }

    /// Forget recorded calls and reset failure counters.
    pub fn clear_calls(&self) {
        let mut state = lock(&self.state);
        state.calls.clear();
        state.reads = 0;
        state.writes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_then_read() {
        let (mut channel, handle) = MockPagedChannel::new();
        channel.write_pages(4, b"abcd").await.unwrap();
        channel.write_pages(5, b"efgh").await.unwrap();

        let data = channel.read_pages(4, 4).await.unwrap();
        assert_eq!(&data[..8], b"abcdefgh");
        assert_eq!(&handle.user_memory()[..8], b"abcdefgh");
    }

    #[tokio::test]
    async fn test_system_pages_protected() {
        let (mut channel, _handle) = MockPagedChannel::new();
        let error = channel.write_pages(3, b"abcd").await.unwrap_err();
        assert!(matches!(error, HardwareError::PageOutOfRange { page: 3 }));
    }

    #[tokio::test]
    async fn test_read_past_end() {
        let (mut channel, _handle) = MockPagedChannel::new();
        assert!(channel.read_pages(36, 4).await.is_ok());
        assert!(matches!(
            channel.read_pages(37, 4).await,
            Err(HardwareError::PageOutOfRange { page: 37 })
        ));
    }

    #[tokio::test]
    async fn test_write_larger_than_quantum() {
        let (mut channel, _handle) = MockPagedChannel::new();
        let error = channel.write_pages(4, b"abcdefgh").await.unwrap_err();
        assert!(matches!(error, HardwareError::InvalidData { .. }));
    }

    #[tokio::test]
    async fn test_injected_failure_and_reset() {
        let (mut channel, handle) = MockPagedChannel::new();
        handle.fail_on_call(PageOp::Read, 1);
        assert!(channel.read_pages(4, 4).await.is_err());

        handle.clear_calls();
        handle.fail_on_call(PageOp::Read, 2);
        assert!(channel.read_pages(4, 4).await.is_ok());
        assert_eq!(handle.calls(), vec![PageCall::Read { start: 4, count: 4 }]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_write_lands_after_delay() {
        let (mut channel, handle) = MockPagedChannel::new();
        handle.delay_call(PageOp::Write, 1, Duration::from_secs(2));

        let started = tokio::time::Instant::now();
        channel.write_pages(4, b"abcd").await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(&handle.user_memory()[..4], b"abcd");
    }

    #[tokio::test]
    async fn test_disconnected() {
        let (mut channel, handle) = MockPagedChannel::new();
        handle.disconnect();
        assert!(matches!(
            channel.write_pages(4, b"abcd").await,
            Err(HardwareError::Disconnected { .. })
        ));
    }
}
