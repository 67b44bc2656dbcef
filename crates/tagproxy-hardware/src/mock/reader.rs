//! Mock reader backend for testing and development.
//!
//! This module provides a simulated reader that can be controlled
//! programmatically: readers are attached and detached, and tags are
//! presented or removed through a [`MockReaderHandle`].

use crate::{
    HardwareError, Result,
    devices::{AnyPagedChannel, TagEvent},
    mock::channel::{MockPagedChannel, MockTagHandle},
    traits::ReaderBackend,
    types::{ReaderInfo, TagFamily, TagIdentity},
};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// ATR reported by the mock for Ultralight-compatible tags.
pub const MOCK_ULTRALIGHT_ATR: [u8; 20] = [
    0x3B, 0x8F, 0x80, 0x01, 0x80, 0x4F, 0x0C, 0xA0, 0x00, 0x00, 0x03, 0x06, 0x03, 0x00, 0x03, 0x00,
    0x00, 0x00, 0x00, 0x68,
];

/// Identity of the NTAG213 tag the mock presents by default.
pub fn mock_ultralight_tag() -> TagIdentity {
    TagIdentity::new(
        TagFamily::MifareUltralight,
        "NTAG213",
        MOCK_ULTRALIGHT_ATR.to_vec(),
    )
    .with_uid(vec![0x04, 0x9C, 0x51, 0x2A, 0x6B, 0x3F, 0x80])
}

/// Mock reader backend.
///
/// # Examples
///
/// ```
/// use tagproxy_hardware::devices::TagEvent;
/// use tagproxy_hardware::mock::{MockReader, mock_ultralight_tag};
/// use tagproxy_hardware::traits::ReaderBackend;
///
/// #[tokio::main]
/// async fn main() -> tagproxy_hardware::Result<()> {
///     let (mut reader, handle) = MockReader::with_reader("Mock NFC Reader");
///
///     let _tag = handle.present_tag(mock_ultralight_tag()).await?;
///
///     let event = reader.next_event().await?;
///     assert!(matches!(event, Some(TagEvent::Added { .. })));
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockReader {
    /// Channel receiver for tag events
    event_rx: mpsc::Receiver<TagEvent>,

    /// Attached readers, shared with the handle
    readers: Arc<Mutex<Vec<ReaderInfo>>>,
}

impl MockReader {
    /// Create a mock backend with no reader attached.
    ///
    /// Returns a tuple of (MockReader, MockReaderHandle) where the handle
    /// can be used to attach readers and present tags.
    pub fn new() -> (Self, MockReaderHandle) {
        let (event_tx, event_rx) = mpsc::channel(32);
        let readers = Arc::new(Mutex::new(Vec::new()));

        let reader = Self {
            event_rx,
            readers: Arc::clone(&readers),
        };
        let handle = MockReaderHandle { event_tx, readers };
        (reader, handle)
    }

    /// Create a mock backend with one reader attached.
    pub fn with_reader(name: impl Into<String>) -> (Self, MockReaderHandle) {
        let (reader, handle) = Self::new();
        handle.attach_reader(ReaderInfo::new(name, "mock-0"));
        (reader, handle)
    }
}

impl ReaderBackend for MockReader {
    async fn list_readers(&mut self) -> Result<Vec<ReaderInfo>> {
        Ok(lock(&self.readers).clone())
    }

    async fn next_event(&mut self) -> Result<Option<TagEvent>> {
        Ok(self.event_rx.recv().await)
    }
}

fn lock(readers: &Mutex<Vec<ReaderInfo>>) -> std::sync::MutexGuard<'_, Vec<ReaderInfo>> {
    readers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle for controlling a mock reader backend.
#[derive(Debug, Clone)]
pub struct MockReaderHandle {
    /// Channel sender for tag events
    event_tx: mpsc::Sender<TagEvent>,

    /// Attached readers
    readers: Arc<Mutex<Vec<ReaderInfo>>>,
}

impl MockReaderHandle {
    /// Attach a reader. It shows up in the next `list_readers` call.
    pub fn attach_reader(&self, info: ReaderInfo) {
        lock(&self.readers).push(info);
    }

    /// Detach every reader.
    pub fn detach_all(&self) {
        lock(&self.readers).clear();
    }

    pub fn readers(&self) -> Vec<ReaderInfo> {
        lock(&self.readers).clone()
    }

    /// Place a blank tag with the default geometry on the first reader.
    ///
    /// Returns the handle of the tag memory.
    ///
    /// # Errors
    ///
    /// Returns an error if no reader is attached or the backend was dropped.
    pub async fn present_tag(&self, tag: TagIdentity) -> Result<MockTagHandle> {
        let (channel, handle) = MockPagedChannel::new();
        self.present_channel(tag, channel).await?;
        Ok(handle)
    }

    /// Place a tag backed by the given channel on the first reader.
    pub async fn present_channel(&self, tag: TagIdentity, channel: MockPagedChannel) -> Result<()> {
        let reader = self.first_reader()?;
        self.send(TagEvent::Added {
            reader,
            tag,
            channel: AnyPagedChannel::Mock(channel),
        })
        .await
    }

    /// Remove the tag from the first reader.
    pub async fn remove_tag(&self) -> Result<()> {
        let reader = self.first_reader()?;
        self.send(TagEvent::Removed { reader }).await
    }

    fn first_reader(&self) -> Result<String> {
        lock(&self.readers)
            .first()
            .map(|info| info.name.clone())
            .ok_or_else(|| HardwareError::disconnected("no reader attached"))
    }

    async fn send(&self, event: TagEvent) -> Result<()> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| HardwareError::disconnected("Reader event channel closed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::channel::PageCall;
    use crate::traits::PagedChannel;

    #[tokio::test]
    async fn test_list_readers_follows_handle() {
        let (mut reader, handle) = MockReader::new();
        assert!(reader.list_readers().await.unwrap().is_empty());

        handle.attach_reader(ReaderInfo::new("Reader A", "a"));
        handle.attach_reader(ReaderInfo::new("Reader B", "b"));
        let names: Vec<String> = reader
            .list_readers()
            .await
            .unwrap()
            .into_iter()
            .map(|info| info.name)
            .collect();
        assert_eq!(names, vec!["Reader A", "Reader B"]);

        handle.detach_all();
        assert!(reader.list_readers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_present_and_remove() {
        let (mut reader, handle) = MockReader::with_reader("Mock NFC Reader");

        let tag_handle = handle.present_tag(mock_ultralight_tag()).await.unwrap();
        handle.remove_tag().await.unwrap();

        match reader.next_event().await.unwrap() {
            Some(TagEvent::Added {
                reader,
                tag,
                mut channel,
            }) => {
                assert_eq!(reader, "Mock NFC Reader");
                assert_eq!(tag.family, TagFamily::MifareUltralight);
                channel.read_pages(4, 4).await.unwrap();
                assert_eq!(tag_handle.calls(), vec![PageCall::Read { start: 4, count: 4 }]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(
            reader.next_event().await.unwrap(),
            Some(TagEvent::Removed { .. })
        ));
    }

    #[tokio::test]
    async fn test_present_without_reader() {
        let (_reader, handle) = MockReader::new();
        let result = handle.present_tag(mock_ultralight_tag()).await;
        assert!(matches!(result, Err(HardwareError::Disconnected { .. })));
    }

    #[tokio::test]
    async fn test_closed_when_handles_dropped() {
        let (mut reader, handle) = MockReader::with_reader("Mock NFC Reader");
        drop(handle);
        assert!(reader.next_event().await.unwrap().is_none());
    }

    #[test]
    fn test_mock_atr_is_ultralight() {
        assert_eq!(
            TagFamily::from_atr(&MOCK_ULTRALIGHT_ATR),
            TagFamily::MifareUltralight
        );
    }
}
