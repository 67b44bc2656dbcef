//! Device state machine.
//!
//! [`DeviceStateMachine`] owns everything the proxy knows about its
//! surroundings: the discovered readers, the selected reader, the tag in its
//! field, the tag session used for I/O, the cached record and the emulation
//! flag. It is synchronous and never touches hardware; the
//! [`DeviceController`](crate::DeviceController) feeds it events and runs
//! tag I/O outside of its lock.
//!
//! # Generations
//!
//! Every tag arrival, removal and emulation toggle bumps a generation
//! counter. Tag I/O started under one generation may only cache its result
//! while the generation is unchanged, so a read finishing after a tag swap
//! cannot publish the old tag's record.
//!
//! # Examples
//!
//! ```
//! use tagproxy_device::{DeviceState, DeviceStateMachine};
//! use tagproxy_hardware::ReaderInfo;
//!
//! let mut machine = DeviceStateMachine::new();
//! assert_eq!(machine.current_state(), DeviceState::NoReader);
//!
//! machine.readers_discovered(vec![ReaderInfo::new("ACS ACR122U", "0")]);
//! assert_eq!(machine.current_state(), DeviceState::ReaderIdle);
//! ```

use crate::error::{DeviceError, Result};
use crate::state::{DeviceState, StateTransition};
use serde::Serialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tagproxy_core::{DeviceDescriptor, Record};
use tagproxy_hardware::{AnyPagedChannel, PagedChannel, ReaderInfo, TagIdentity, TagTransport};
use tracing::{debug, info, warn};

/// Maximum number of transitions to keep in history.
const MAX_HISTORY_SIZE: usize = 100;

/// Model reported for the emulated tag.
pub const EMULATED_TAG_MODEL: &str = "Emulated tag";

/// Transport of the present tag, shared with in-flight I/O tasks.
pub type SharedTransport = Arc<tokio::sync::Mutex<TagTransport<AnyPagedChannel>>>;

/// I/O handle for the tag currently in the field.
#[derive(Debug, Clone)]
pub struct TagSession {
    generation: u64,
    transport: SharedTransport,
}

impl TagSession {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn transport(&self) -> &SharedTransport {
        &self.transport
    }
}

/// Point-in-time copy of the machine for queries.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSnapshot {
    pub state: DeviceState,
    pub generation: u64,
    pub readers: Vec<ReaderInfo>,
    pub reader: Option<ReaderInfo>,
    pub tag: Option<TagIdentity>,
    pub record: Option<Record>,
    pub emulation_path: Option<PathBuf>,
    #[serde(skip)]
    pub time_in_state: Duration,
}

impl DeviceSnapshot {
    pub fn is_emulating(&self) -> bool {
        self.state == DeviceState::Emulating
    }

    /// Descriptor of the selected reader, or the "no device" sentinel.
    pub fn reader_descriptor(&self) -> DeviceDescriptor {
        match &self.reader {
            Some(reader) => DeviceDescriptor::reader(&reader.name, &reader.identity),
            None => DeviceDescriptor::none(),
        }
    }

    /// Descriptor of the tag, the emulated tag, or the "no device" sentinel.
    pub fn tag_descriptor(&self) -> DeviceDescriptor {
        match (self.state, &self.tag, &self.emulation_path) {
            (DeviceState::Emulating, _, Some(path)) => {
                DeviceDescriptor::tag(EMULATED_TAG_MODEL, path.display().to_string())
            }
            (DeviceState::TagPresent, Some(tag), _) => {
                DeviceDescriptor::tag(&tag.name, tag.atr_display())
            }
            _ => DeviceDescriptor::none(),
        }
    }
}

/// Reader, tag and emulation state of the proxy.
///
/// # Examples
///
/// ```
/// use tagproxy_device::{DeviceState, DeviceStateMachine};
/// use tagproxy_hardware::{AnyPagedChannel, ReaderInfo};
/// use tagproxy_hardware::mock::{MockPagedChannel, mock_ultralight_tag};
///
/// let mut machine = DeviceStateMachine::new();
/// machine.readers_discovered(vec![ReaderInfo::new("Mock NFC Reader", "mock-0")]);
///
/// let (channel, _tag) = MockPagedChannel::new();
/// let session = machine
///     .tag_added("Mock NFC Reader", mock_ultralight_tag(), AnyPagedChannel::Mock(channel))
///     .unwrap();
/// assert!(session.is_some());
/// assert_eq!(machine.current_state(), DeviceState::TagPresent);
/// ```
#[derive(Debug)]
pub struct DeviceStateMachine {
    current_state: DeviceState,
    state_entered_at: Instant,
    history: VecDeque<StateTransition>,
    readers: Vec<ReaderInfo>,
    reader: Option<ReaderInfo>,
    tag: Option<TagIdentity>,
    session: Option<TagSession>,
    record: Option<Record>,
    emulation_path: Option<PathBuf>,
    generation: u64,
    call_timeout: Option<Duration>,
}

impl DeviceStateMachine {
    /// Create a machine with no reader.
    pub fn new() -> Self {
        Self {
            current_state: DeviceState::NoReader,
            state_entered_at: Instant::now(),
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
            readers: Vec::new(),
            reader: None,
            tag: None,
            session: None,
            record: None,
            emulation_path: None,
            generation: 0,
            call_timeout: None,
        }
    }

    /// Bound each page call of new tag sessions by `timeout`.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn current_state(&self) -> DeviceState {
        self.current_state
    }

    pub fn time_in_current_state(&self) -> Duration {
        self.state_entered_at.elapsed()
    }

    /// Recent transitions, oldest first.
    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// Get the last N state transitions.
    pub fn last_transitions(&self, count: usize) -> Vec<StateTransition> {
        self.history
            .iter()
            .rev()
            .take(count)
            .rev()
            .cloned()
            .collect()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn readers(&self) -> &[ReaderInfo] {
        &self.readers
    }

    pub fn reader(&self) -> Option<&ReaderInfo> {
        self.reader.as_ref()
    }

    pub fn tag(&self) -> Option<&TagIdentity> {
        self.tag.as_ref()
    }

    pub fn session(&self) -> Option<&TagSession> {
        self.session.as_ref()
    }

    pub fn record(&self) -> Option<&Record> {
        self.record.as_ref()
    }

    pub fn emulation_path(&self) -> Option<&Path> {
        self.emulation_path.as_deref()
    }

    pub fn is_emulating(&self) -> bool {
        self.current_state == DeviceState::Emulating
    }

    /// Copy the queryable state.
    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            state: self.current_state,
            generation: self.generation,
            readers: self.readers.clone(),
            reader: self.reader.clone(),
            tag: self.tag.clone(),
            record: self.record.clone(),
            emulation_path: self.emulation_path.clone(),
            time_in_state: self.time_in_current_state(),
        }
    }

    /// Transition to a new state, validating the transition.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the transition is not allowed from the
    /// current state. The machine is left unchanged.
    pub fn transition_to(&mut self, new_state: DeviceState) -> Result<StateTransition> {
        if !self.current_state.can_transition_to(&new_state) {
            return Err(DeviceError::InvalidTransition {
                from: self.current_state,
                to: new_state,
            });
        }

        let transition = StateTransition::new(self.current_state, new_state);
        self.perform_state_change(new_state, transition.clone());
        Ok(transition)
    }

    /// Apply the result of a reader listing.
    ///
    /// The first listed reader becomes the active one. An empty list moves
    /// the machine to `NoReader` and drops any tag; while emulating only the
    /// reader selection is updated.
    pub fn readers_discovered(&mut self, readers: Vec<ReaderInfo>) -> Option<StateTransition> {
        let selected = readers.first().cloned();
        if selected.as_ref().map(|r| &r.name) != self.reader.as_ref().map(|r| &r.name) {
            match &selected {
                Some(reader) => info!(reader = %reader.name, "Reader selected"),
                None => info!("No reader available"),
            }
        }
        self.readers = readers;

        let previous = std::mem::replace(&mut self.reader, selected);
        if self.is_emulating() {
            return None;
        }

        let switched = match (&previous, &self.reader) {
            (Some(previous), Some(current)) => previous.name != current.name,
            _ => false,
        };
        match (self.reader.is_some(), self.current_state) {
            (true, DeviceState::NoReader) => self.transition_to(DeviceState::ReaderIdle).ok(),
            (true, DeviceState::TagPresent) if switched => {
                // The tag belonged to the previous reader.
                self.clear_tag();
                self.transition_to(DeviceState::ReaderIdle).ok()
            }
            (false, DeviceState::ReaderIdle | DeviceState::TagPresent) => {
                self.clear_tag();
                self.transition_to(DeviceState::NoReader).ok()
            }
            _ => None,
        }
    }

    /// Whether an event from `reader` concerns the active reader.
    pub fn is_active_reader(&self, reader: &str) -> bool {
        self.reader.as_ref().is_some_and(|active| active.name == reader)
    }

    /// A tag entered the field of `reader`.
    ///
    /// Returns the session to read the tag through, or `None` when the
    /// event was ignored or the tag family has no paged storage.
    ///
    /// # Errors
    ///
    /// Returns `NoReader` if no reader is active.
    pub fn tag_added(
        &mut self,
        reader: &str,
        tag: TagIdentity,
        channel: AnyPagedChannel,
    ) -> Result<Option<TagSession>> {
        if self.is_emulating() {
            info!(reader, family = %tag.family, "Tag event ignored while emulating");
            return Ok(None);
        }
        if self.reader.is_none() {
            return Err(DeviceError::NoReader);
        }
        if !self.is_active_reader(reader) {
            debug!(reader, "Tag on inactive reader ignored");
            return Ok(None);
        }

        if self.current_state == DeviceState::TagPresent {
            info!("Tag replaced without removal");
            self.clear_tag();
            self.transition_to(DeviceState::ReaderIdle)?;
        }
        self.transition_to(DeviceState::TagPresent)?;
        self.generation += 1;

        info!(
            reader,
            family = %tag.family,
            name = %tag.name,
            uid = %tag.uid_hex(),
            "Tag present"
        );

        let session = if !tag.family.is_paged() {
            warn!(family = %tag.family, "Tag family has no paged storage");
            None
        } else if let Err(e) = channel.geometry().validate() {
            warn!(family = %tag.family, error = %e, "Tag geometry unusable");
            None
        } else {
            let mut transport = TagTransport::new(channel);
            if let Some(timeout) = self.call_timeout {
                transport = transport.with_call_timeout(timeout);
            }
            Some(TagSession {
                generation: self.generation,
                transport: Arc::new(tokio::sync::Mutex::new(transport)),
            })
        };
        self.tag = Some(tag);
        self.session = session.clone();
        Ok(session)
    }

    /// The tag left the field of `reader`.
    pub fn tag_removed(&mut self, reader: &str) -> Option<StateTransition> {
        if self.is_emulating() {
            info!(reader, "Tag removal ignored while emulating");
            return None;
        }
        if !self.is_active_reader(reader) || self.current_state != DeviceState::TagPresent {
            debug!(reader, state = %self.current_state, "Tag removal ignored");
            return None;
        }

        info!(reader, "Tag removed");
        self.clear_tag();
        self.transition_to(DeviceState::ReaderIdle).ok()
    }

    /// Cache a record read or written under `generation`.
    ///
    /// Returns `false` and drops the record when the tag or emulation
    /// source changed in the meantime.
    pub fn cache_record(&mut self, generation: u64, record: Record) -> bool {
        if generation != self.generation || !self.current_state.has_record_source() {
            debug!(
                generation,
                current = self.generation,
                "Discarding record of a stale source"
            );
            return false;
        }
        self.record = Some(record);
        true
    }

    /// Forget the cached record, for example after a failed write.
    pub fn invalidate_record(&mut self, generation: u64) {
        if generation == self.generation {
            self.record = None;
        }
    }

    /// Substitute the JSON file at `path` for the tag.
    ///
    /// Returns `None` when emulation of the same file is already active.
    ///
    /// # Errors
    ///
    /// Returns `EmulationFileMissing` when no file exists at `path`; the
    /// state is left unchanged.
    pub fn enter_emulation(&mut self, path: impl Into<PathBuf>) -> Result<Option<StateTransition>> {
        let path = path.into();
        if !path.is_file() {
            return Err(DeviceError::emulation_file_missing(path));
        }
        if self.is_emulating() {
            if self.emulation_path.as_deref() == Some(path.as_path()) {
                return Ok(None);
            }
            info!(path = %path.display(), "Emulation file changed");
            self.emulation_path = Some(path);
            self.record = None;
            self.generation += 1;
            return Ok(None);
        }

        let transition = self.transition_to(DeviceState::Emulating)?;
        info!(path = %path.display(), "Emulation enabled");
        self.clear_tag();
        self.emulation_path = Some(path);
        Ok(Some(transition))
    }

    /// Leave emulation mode, back to the reader state.
    pub fn leave_emulation(&mut self) -> Option<StateTransition> {
        if !self.is_emulating() {
            return None;
        }
        let target = if self.reader.is_some() {
            DeviceState::ReaderIdle
        } else {
            DeviceState::NoReader
        };
        let transition = self.transition_to(target).ok()?;
        info!(state = %target, "Emulation disabled");
        self.emulation_path = None;
        self.clear_tag();
        Some(transition)
    }

    /// Drop tag identity, session and record, and retire the generation.
    fn clear_tag(&mut self) {
        self.tag = None;
        self.session = None;
        self.record = None;
        self.generation += 1;
    }

    fn perform_state_change(&mut self, new_state: DeviceState, transition: StateTransition) {
        debug!(from = %transition.from, to = %transition.to, "State transition");
        self.current_state = new_state;
        self.state_entered_at = Instant::now();
        self.add_to_history(transition);
    }

    fn add_to_history(&mut self, transition: StateTransition) {
        self.history.push_back(transition);
        if self.history.len() > MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
    }
}

impl Default for DeviceStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagproxy_core::{Thing, ThingType};
    use tagproxy_hardware::mock::{MockPagedChannel, mock_ultralight_tag};
    use tagproxy_hardware::{ChannelGeometry, TagFamily};

    const READER: &str = "Mock NFC Reader";

    fn machine_with_reader() -> DeviceStateMachine {
        let mut machine = DeviceStateMachine::new();
        machine.readers_discovered(vec![ReaderInfo::new(READER, "mock-0")]);
        machine
    }

    fn channel() -> AnyPagedChannel {
        AnyPagedChannel::Mock(MockPagedChannel::new().0)
    }

    fn thing() -> Record {
        Record::Thing(Thing::new(ThingType::Engine).unwrap())
    }

    #[test]
    fn test_new_machine_has_no_reader() {
        let machine = DeviceStateMachine::new();
        assert_eq!(machine.current_state(), DeviceState::NoReader);
        assert!(machine.history().is_empty());
        assert!(machine.snapshot().reader_descriptor().is_none());
    }

    #[test]
    fn test_discovery_selects_first_reader() {
        let mut machine = DeviceStateMachine::new();
        let transition = machine.readers_discovered(vec![
            ReaderInfo::new("Reader A", "0"),
            ReaderInfo::new("Reader B", "1"),
        ]);
        assert_eq!(transition.unwrap().to, DeviceState::ReaderIdle);
        assert_eq!(machine.reader().unwrap().name, "Reader A");
        assert_eq!(machine.readers().len(), 2);
    }

    #[test]
    fn test_empty_discovery_returns_to_no_reader() {
        let mut machine = machine_with_reader();
        machine.tag_added(READER, mock_ultralight_tag(), channel()).unwrap();

        let transition = machine.readers_discovered(Vec::new()).unwrap();
        assert_eq!(transition.from, DeviceState::TagPresent);
        assert_eq!(machine.current_state(), DeviceState::NoReader);
        assert!(machine.tag().is_none());
        assert!(machine.session().is_none());
    }

    #[test]
    fn test_tag_added_creates_session() {
        let mut machine = machine_with_reader();
        let session = machine
            .tag_added(READER, mock_ultralight_tag(), channel())
            .unwrap()
            .unwrap();
        assert_eq!(session.generation(), machine.generation());
        assert_eq!(machine.current_state(), DeviceState::TagPresent);

        let descriptor = machine.snapshot().tag_descriptor();
        assert_eq!(descriptor.model, "NTAG213");
        assert!(descriptor.identity.starts_with("3B-8F-80"));
    }

    #[test]
    fn test_session_carries_call_timeout() {
        let mut machine = DeviceStateMachine::new().with_call_timeout(Duration::from_secs(2));
        machine.readers_discovered(vec![ReaderInfo::new(READER, "mock-0")]);
        let session = machine
            .tag_added(READER, mock_ultralight_tag(), channel())
            .unwrap()
            .unwrap();

        let transport = session.transport().try_lock().unwrap();
        assert_eq!(transport.call_timeout(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_unusable_geometry_has_no_session() {
        let mut machine = machine_with_reader();
        let geometry = ChannelGeometry::default().with_write_quantum(0);
        let channel = AnyPagedChannel::Mock(MockPagedChannel::with_geometry(geometry).0);

        let session = machine
            .tag_added(READER, mock_ultralight_tag(), channel)
            .unwrap();
        assert!(session.is_none());
        assert_eq!(machine.current_state(), DeviceState::TagPresent);
    }

    #[test]
    fn test_tag_without_reader_rejected() {
        let mut machine = DeviceStateMachine::new();
        let result = machine.tag_added(READER, mock_ultralight_tag(), channel());
        assert!(matches!(result, Err(DeviceError::NoReader)));
        assert_eq!(machine.current_state(), DeviceState::NoReader);
    }

    #[test]
    fn test_tag_on_inactive_reader_ignored() {
        let mut machine = machine_with_reader();
        let session = machine
            .tag_added("Other Reader", mock_ultralight_tag(), channel())
            .unwrap();
        assert!(session.is_none());
        assert_eq!(machine.current_state(), DeviceState::ReaderIdle);
    }

    #[test]
    fn test_unpaged_tag_present_without_session() {
        let mut machine = machine_with_reader();
        let tag = TagIdentity::new(TagFamily::Felica, "FeliCa", vec![0x3B, 0x8F]);
        let session = machine.tag_added(READER, tag, channel()).unwrap();
        assert!(session.is_none());
        assert_eq!(machine.current_state(), DeviceState::TagPresent);
        assert_eq!(machine.tag().unwrap().family, TagFamily::Felica);
    }

    #[test]
    fn test_tag_removed_clears_everything() {
        let mut machine = machine_with_reader();
        let session = machine
            .tag_added(READER, mock_ultralight_tag(), channel())
            .unwrap()
            .unwrap();
        assert!(machine.cache_record(session.generation(), thing()));

        let transition = machine.tag_removed(READER).unwrap();
        assert_eq!(transition.to, DeviceState::ReaderIdle);
        assert!(machine.record().is_none());
        assert!(machine.tag().is_none());
        assert!(machine.session().is_none());
    }

    #[test]
    fn test_stale_record_discarded_after_swap() {
        let mut machine = machine_with_reader();
        let first = machine
            .tag_added(READER, mock_ultralight_tag(), channel())
            .unwrap()
            .unwrap();
        let second = machine
            .tag_added(READER, mock_ultralight_tag(), channel())
            .unwrap()
            .unwrap();

        assert!(!machine.cache_record(first.generation(), thing()));
        assert!(machine.record().is_none());
        assert!(machine.cache_record(second.generation(), thing()));
        assert_eq!(machine.current_state(), DeviceState::TagPresent);
    }

    #[test]
    fn test_emulation_requires_file() {
        let mut machine = machine_with_reader();
        let result = machine.enter_emulation("/nonexistent/thing.json");
        assert!(matches!(result, Err(DeviceError::EmulationFileMissing { .. })));
        assert_eq!(machine.current_state(), DeviceState::ReaderIdle);
    }

    #[test]
    fn test_emulation_round_trip() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut machine = machine_with_reader();
        machine.tag_added(READER, mock_ultralight_tag(), channel()).unwrap();

        let transition = machine.enter_emulation(file.path()).unwrap().unwrap();
        assert_eq!(transition.from, DeviceState::TagPresent);
        assert!(machine.tag().is_none());
        assert_eq!(machine.emulation_path(), Some(file.path()));
        assert_eq!(
            machine.snapshot().tag_descriptor().model,
            EMULATED_TAG_MODEL
        );

        // Already emulating the same file.
        assert!(machine.enter_emulation(file.path()).unwrap().is_none());

        // Tag events do not leave emulation.
        assert!(
            machine
                .tag_added(READER, mock_ultralight_tag(), channel())
                .unwrap()
                .is_none()
        );
        assert!(machine.tag_removed(READER).is_none());
        assert_eq!(machine.current_state(), DeviceState::Emulating);

        let transition = machine.leave_emulation().unwrap();
        assert_eq!(transition.to, DeviceState::ReaderIdle);
        assert!(machine.emulation_path().is_none());
        assert!(machine.leave_emulation().is_none());
    }

    #[test]
    fn test_leave_emulation_without_reader() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut machine = DeviceStateMachine::new();
        machine.enter_emulation(file.path()).unwrap();

        // Reader discovery while emulating only updates the selection.
        assert!(machine.readers_discovered(Vec::new()).is_none());
        let transition = machine.leave_emulation().unwrap();
        assert_eq!(transition.to, DeviceState::NoReader);
    }

    #[test]
    fn test_invalid_transition_leaves_state() {
        let mut machine = DeviceStateMachine::new();
        let result = machine.transition_to(DeviceState::TagPresent);
        assert!(matches!(result, Err(DeviceError::InvalidTransition { .. })));
        assert_eq!(machine.current_state(), DeviceState::NoReader);
    }

    #[test]
    fn test_history_limit() {
        let mut machine = machine_with_reader();
        for _ in 0..80 {
            machine.tag_added(READER, mock_ultralight_tag(), channel()).unwrap();
            machine.tag_removed(READER);
        }
        assert_eq!(machine.history().len(), MAX_HISTORY_SIZE);
        let last = machine.last_transitions(2);
        assert_eq!(last[0].to, DeviceState::TagPresent);
        assert_eq!(last[1].to, DeviceState::ReaderIdle);
    }
}
