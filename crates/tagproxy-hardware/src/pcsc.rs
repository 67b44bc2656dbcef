//! PC/SC reader backend.
//!
//! Talks to contactless readers through the platform smart card service
//! (pcsc-lite, WinSCard). Storage tags are driven with the PC/SC part 3
//! pseudo-APDUs:
//!
//! | Command     | APDU                       |
//! |-------------|----------------------------|
//! | Get UID     | `FF CA 00 00 00`           |
//! | Read binary | `FF B0 00 <page> <len>`    |
//! | Update      | `FF D6 00 <page> 04 <data>`|
//!
//! All driver calls block, so each one runs on the blocking thread pool.

use crate::{
    HardwareError, Result,
    devices::{AnyPagedChannel, TagEvent},
    traits::{PagedChannel, ReaderBackend},
    types::{ChannelGeometry, ReaderInfo, TagFamily, TagIdentity},
};
use pcsc::{Attribute, Card, Context, Protocols, ReaderState, Scope, ShareMode, State};
use std::collections::VecDeque;
use std::ffi::CString;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Status word of a successful command.
const SW_SUCCESS: [u8; 2] = [0x90, 0x00];

/// Default time a single status poll may block.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

fn driver_error(error: pcsc::Error) -> HardwareError {
    match error {
        pcsc::Error::RemovedCard | pcsc::Error::NoSmartcard => {
            HardwareError::disconnected("tag removed")
        }
        pcsc::Error::ReaderUnavailable | pcsc::Error::UnknownReader => {
            HardwareError::disconnected("reader unavailable")
        }
        pcsc::Error::Timeout => HardwareError::timeout(DEFAULT_POLL_INTERVAL.as_millis() as u64),
        other => HardwareError::communication(other.to_string()),
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| HardwareError::communication(format!("Driver task failed: {e}")))?
}

fn transmit(card: &Card, apdu: &[u8]) -> Result<Vec<u8>> {
    let mut response = [0u8; pcsc::MAX_BUFFER_SIZE];
    let response = card.transmit(apdu, &mut response).map_err(driver_error)?;
    match response.split_last_chunk::<2>() {
        Some((data, sw)) if *sw == SW_SUCCESS => Ok(data.to_vec()),
        Some((_, sw)) => Err(HardwareError::communication(format!(
            "Command failed with status {:02X}{:02X}",
            sw[0], sw[1]
        ))),
        None => Err(HardwareError::invalid_data("Response without status word")),
    }
}

fn page_byte(page: u16) -> Result<u8> {
    u8::try_from(page).map_err(|_| HardwareError::PageOutOfRange { page })
}

/// A tag connected through PC/SC.
pub struct PcscChannel {
    card: Arc<Card>,
    reader: String,
    geometry: ChannelGeometry,
}

impl fmt::Debug for PcscChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscChannel")
            .field("reader", &self.reader)
            .field("geometry", &self.geometry)
            .finish()
    }
}

impl PagedChannel for PcscChannel {
    fn geometry(&self) -> ChannelGeometry {
        self.geometry
    }

    async fn read_pages(&mut self, start: u16, count: usize) -> Result<Vec<u8>> {
        let len = u8::try_from(count * self.geometry.page_size)
            .map_err(|_| HardwareError::invalid_data("Read length exceeds one APDU"))?;
        let apdu = [0xFF, 0xB0, 0x00, page_byte(start)?, len];
        let card = Arc::clone(&self.card);
        blocking(move || transmit(&card, &apdu)).await
    }

    async fn write_pages(&mut self, start: u16, data: &[u8]) -> Result<()> {
        let len = u8::try_from(data.len())
            .map_err(|_| HardwareError::invalid_data("Write length exceeds one APDU"))?;
        let mut apdu = vec![0xFF, 0xD6, 0x00, page_byte(start)?, len];
        apdu.extend_from_slice(data);
        let card = Arc::clone(&self.card);
        blocking(move || transmit(&card, &apdu).map(|_| ())).await
    }
}

/// Reader state tracked between status polls.
#[derive(Debug, Clone)]
struct TrackedReader {
    name: CString,
    state: State,
}

/// PC/SC reader subsystem.
pub struct PcscBackend {
    context: Context,
    readers: Vec<TrackedReader>,
    pending: VecDeque<TagEvent>,
    poll_interval: Duration,
}

impl fmt::Debug for PcscBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscBackend")
            .field("readers", &self.readers)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl PcscBackend {
    /// Connect to the smart card service.
    ///
    /// # Errors
    ///
    /// Returns `InitializationFailed` if the service is not running.
    pub fn new() -> Result<Self> {
        let context = Context::establish(Scope::User)
            .map_err(|e| HardwareError::initialization_failed(format!("PC/SC: {e}")))?;
        Ok(Self {
            context,
            readers: Vec::new(),
            pending: VecDeque::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Set the time a single status poll may block.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn reader_names(&self) -> Result<Vec<CString>> {
        let context = self.context.clone();
        blocking(move || match context.list_readers_owned() {
            Ok(names) => Ok(names),
            Err(pcsc::Error::NoReadersAvailable) => Ok(Vec::new()),
            Err(e) => Err(driver_error(e)),
        })
        .await
    }

    /// Sync the tracked readers with the attached ones.
    async fn refresh_readers(&mut self) -> Result<()> {
        let names = self.reader_names().await?;

        let mut kept = Vec::with_capacity(names.len());
        for tracked in self.readers.drain(..) {
            if names.contains(&tracked.name) {
                kept.push(tracked);
            } else {
                info!(reader = %tracked.name.to_string_lossy(), "Reader detached");
                if tracked.state.contains(State::PRESENT) {
                    self.pending.push_back(TagEvent::Removed {
                        reader: tracked.name.to_string_lossy().into_owned(),
                    });
                }
            }
        }
        for name in names {
            if !kept.iter().any(|tracked| tracked.name == name) {
                info!(reader = %name.to_string_lossy(), "Reader attached");
                kept.push(TrackedReader {
                    name,
                    state: State::UNAWARE,
                });
            }
        }
        self.readers = kept;
        Ok(())
    }

    /// Wait up to one poll interval for a state change and queue events.
    async fn poll(&mut self) -> Result<()> {
        self.refresh_readers().await?;
        if self.readers.is_empty() {
            tokio::time::sleep(self.poll_interval).await;
            return Ok(());
        }

        let context = self.context.clone();
        let tracked = self.readers.clone();
        let timeout = self.poll_interval;
        let changes = blocking(move || {
            let mut states: Vec<ReaderState> = tracked
                .iter()
                .map(|reader| ReaderState::new(reader.name.clone(), reader.state))
                .collect();
            match context.get_status_change(timeout, &mut states) {
                Ok(()) => Ok(states.iter().map(ReaderState::event_state).collect()),
                Err(pcsc::Error::Timeout) => Ok(Vec::new()),
                Err(e) => Err(driver_error(e)),
            }
        })
        .await?;

        for (index, event_state) in changes.into_iter().enumerate() {
            let Some(tracked) = self.readers.get(index).cloned() else {
                continue;
            };
            if !event_state.contains(State::CHANGED) {
                continue;
            }
            let was_present = tracked.state.contains(State::PRESENT);
            let is_present =
                event_state.contains(State::PRESENT) && !event_state.contains(State::MUTE);

            let reader = tracked.name.to_string_lossy().into_owned();
            match (was_present, is_present) {
                (false, true) => match self.connect(&tracked.name).await {
                    Ok((tag, channel)) => self.pending.push_back(TagEvent::Added {
                        reader,
                        tag,
                        channel: AnyPagedChannel::Pcsc(channel),
                    }),
                    Err(e) => warn!(reader = %reader, error = %e, "Failed to connect to tag"),
                },
                (true, false) => self.pending.push_back(TagEvent::Removed { reader }),
                _ => {}
            }
            // Committed last so a dropped poll sees the change again.
            self.readers[index].state = event_state - State::CHANGED;
        }
        Ok(())
    }

    async fn connect(&self, reader: &CString) -> Result<(TagIdentity, PcscChannel)> {
        let context = self.context.clone();
        let name = reader.clone();
        let (card, atr, uid) = blocking(move || {
            let card = context
                .connect(&name, ShareMode::Shared, Protocols::ANY)
                .map_err(driver_error)?;
            let atr = card
                .get_attribute_owned(Attribute::AtrString)
                .map_err(driver_error)?;
            let uid = transmit(&card, &[0xFF, 0xCA, 0x00, 0x00, 0x00]).unwrap_or_default();
            Ok((card, atr, uid))
        })
        .await?;

        let family = TagFamily::from_atr(&atr);
        let tag = TagIdentity::new(family, family.name(), atr).with_uid(uid);
        debug!(family = %family, uid = %tag.uid_hex(), "Tag connected");

        let channel = PcscChannel {
            card: Arc::new(card),
            reader: reader.to_string_lossy().into_owned(),
            geometry: ChannelGeometry::default(),
        };
        Ok((tag, channel))
    }
}

impl ReaderBackend for PcscBackend {
    async fn list_readers(&mut self) -> Result<Vec<ReaderInfo>> {
        let names = self.reader_names().await?;
        Ok(names
            .iter()
            .enumerate()
            .map(|(index, name)| ReaderInfo::new(name.to_string_lossy(), index.to_string()))
            .collect())
    }

    async fn next_event(&mut self) -> Result<Option<TagEvent>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            self.poll().await?;
        }
    }
}
