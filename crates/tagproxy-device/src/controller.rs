//! Shared device handle and hardware event loop.
//!
//! [`DeviceController`] is the one handle the HTTP layer and the event loop
//! share. It wraps the [`DeviceStateMachine`] in a `std::sync::RwLock`:
//! every transition or cache update is one short write-locked section, and
//! queries work on a cloned [`DeviceSnapshot`]. Tag I/O never runs under
//! that lock; it goes through the session's own `tokio::sync::Mutex`, which
//! serializes reads and writes on one tag.
//!
//! ```text
//! ┌──────────────┐  TagEvent   ┌──────────────┐   spawn    ┌───────────┐
//! │ ReaderBackend│────────────►│  run_events  │───────────►│ tag read  │
//! └──────────────┘             └──────┬───────┘            └─────┬─────┘
//!        ▲          Rescan (mpsc)     │                          │
//!        └────────────────────────────┤     RwLock<Machine>      │
//!                                     └──────────►◄──────────────┘
//! ```

use crate::config::DeviceConfig;
use crate::emulation::EmulationFile;
use crate::error::{DeviceError, Result};
use crate::machine::{DeviceSnapshot, DeviceStateMachine, TagSession};
use crate::state::DeviceState;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tagproxy_core::{Record, RecordCodec, Thing};
use tagproxy_hardware::{
    AnyPagedChannel, ReaderBackend, ReaderInfo, TagEvent, TagFamily, TagIdentity,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pause after a failed backend poll.
const EVENT_ERROR_BACKOFF: Duration = Duration::from_millis(500);

/// Requests served by the event loop, which owns the backend.
#[derive(Debug)]
enum Command {
    Rescan(oneshot::Sender<Result<Vec<ReaderInfo>>>),
}

struct Inner {
    machine: RwLock<DeviceStateMachine>,
    codec: RecordCodec,
    emulation: EmulationFile,
    config: DeviceConfig,
    command_tx: mpsc::Sender<Command>,
    command_rx: Mutex<Option<mpsc::Receiver<Command>>>,
}

/// Cloneable handle to the device state.
///
/// # Examples
///
/// ```
/// use tagproxy_device::{DeviceConfig, DeviceController, DeviceState};
/// use tagproxy_hardware::mock::MockReader;
///
/// #[tokio::main]
/// async fn main() -> tagproxy_device::Result<()> {
///     let controller = DeviceController::new(DeviceConfig::default());
///     let (mut backend, _handle) = MockReader::with_reader("Mock NFC Reader");
///
///     controller.discover_readers(&mut backend).await?;
///     assert_eq!(controller.snapshot().state, DeviceState::ReaderIdle);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct DeviceController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for DeviceController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceController")
            .field("state", &self.read_machine().current_state())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl DeviceController {
    pub fn new(config: DeviceConfig) -> Self {
        let (command_tx, command_rx) = mpsc::channel(8);
        let emulation = EmulationFile::new(config.emulation_file.clone())
            .with_overwrite(config.overwrite_emulation);
        Self {
            inner: Arc::new(Inner {
                machine: RwLock::new(
                    DeviceStateMachine::new().with_call_timeout(config.tag_timeout),
                ),
                codec: RecordCodec::new(),
                emulation,
                config,
                command_tx,
                command_rx: Mutex::new(Some(command_rx)),
            }),
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.inner.config
    }

    pub fn emulation_file(&self) -> &EmulationFile {
        &self.inner.emulation
    }

    /// Copy of the current device state.
    pub fn snapshot(&self) -> DeviceSnapshot {
        self.read_machine().snapshot()
    }

    // ========================================================================
    // Hardware events
    // ========================================================================

    /// List the readers of `backend` and select the first one.
    pub async fn discover_readers<B: ReaderBackend>(
        &self,
        backend: &mut B,
    ) -> Result<Vec<ReaderInfo>> {
        let readers = backend.list_readers().await?;
        for (index, reader) in readers.iter().enumerate() {
            info!(index, name = %reader.name, identity = %reader.identity, "Reader discovered");
        }
        self.write_machine().readers_discovered(readers.clone());
        Ok(readers)
    }

    /// Register a tag that entered the field and start loading its record.
    ///
    /// The read runs in its own task bounded by the configured tag timeout;
    /// its handle is returned when one was started. A failed read leaves the
    /// tag present with no cached record.
    pub fn tag_added(
        &self,
        reader: &str,
        tag: TagIdentity,
        channel: AnyPagedChannel,
    ) -> Result<Option<JoinHandle<()>>> {
        let session = self.write_machine().tag_added(reader, tag, channel)?;
        Ok(session.map(|session| {
            let controller = self.clone();
            tokio::spawn(async move { controller.load_tag(session).await })
        }))
    }

    /// Register that the tag left the field of `reader`.
    pub fn tag_removed(&self, reader: &str) {
        self.write_machine().tag_removed(reader);
    }

    async fn load_tag(&self, session: TagSession) {
        let generation = session.generation();
        match self.read_session(&session).await {
            Ok(record) => {
                debug!(generation, kind = record.kind(), "Tag record loaded");
                self.write_machine().cache_record(generation, record);
            }
            Err(e) => warn!(generation, error = %e, "Tag present, data unknown"),
        }
    }

    /// Consume backend events until `cancel` fires or the backend closes.
    ///
    /// Readers are listed once on start. Only one loop may run per
    /// controller.
    pub async fn run_events<B: ReaderBackend>(
        &self,
        mut backend: B,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut commands = self.take_commands()?;
        if let Err(e) = self.discover_readers(&mut backend).await {
            warn!(error = %e, "Initial reader discovery failed");
        }
        info!("Device event loop started");

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Device event loop cancelled");
                    break;
                }

                Some(command) = commands.recv() => {
                    self.handle_command(command, &mut backend).await;
                }

                event = backend.next_event() => match event {
                    Ok(Some(event)) => self.handle_event(event, &mut backend).await,
                    Ok(None) => {
                        info!("Reader backend closed");
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "Reader backend failed");
                        tokio::time::sleep(EVENT_ERROR_BACKOFF).await;
                    }
                },
            }
        }
        Ok(())
    }

    /// Re-run reader discovery on the event loop.
    ///
    /// # Errors
    ///
    /// Returns `EventLoopStopped` when no event loop serves the request.
    pub async fn rescan(&self) -> Result<Vec<ReaderInfo>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(Command::Rescan(reply_tx))
            .await
            .map_err(|_| DeviceError::EventLoopStopped)?;
        let limit = self.inner.config.tag_timeout;
        let reply = tokio::time::timeout(limit, reply_rx)
            .await
            .map_err(|_| DeviceError::timeout(limit.as_millis() as u64))?;
        reply.map_err(|_| DeviceError::EventLoopStopped)?
    }

    fn take_commands(&self) -> Result<mpsc::Receiver<Command>> {
        self.inner
            .command_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or(DeviceError::EventLoopRunning)
    }

    async fn handle_command<B: ReaderBackend>(&self, command: Command, backend: &mut B) {
        match command {
            Command::Rescan(reply) => {
                let result = self.discover_readers(backend).await;
                // The requester may have timed out.
                let _ = reply.send(result);
            }
        }
    }

    async fn handle_event<B: ReaderBackend>(&self, event: TagEvent, backend: &mut B) {
        match event {
            TagEvent::Added {
                reader,
                tag,
                channel,
            } => {
                let known = {
                    let machine = self.read_machine();
                    machine.is_emulating() || machine.is_active_reader(&reader)
                };
                if !known {
                    debug!(reader = %reader, "Tag on unknown reader, rescanning");
                    if let Err(e) = self.discover_readers(backend).await {
                        warn!(error = %e, "Reader discovery failed");
                    }
                }
                if let Err(e) = self.tag_added(&reader, tag, channel) {
                    warn!(reader = %reader, error = %e, "Tag event rejected");
                }
            }
            TagEvent::Removed { reader } => self.tag_removed(&reader),
        }
    }

    // ========================================================================
    // Record access
    // ========================================================================

    /// Read the record from the tag or the emulation file.
    ///
    /// A record cached for the present tag is returned without tag I/O.
    ///
    /// # Errors
    ///
    /// - `NoTagPresent` without tag or emulation
    /// - `UnsupportedTag` for tags without paged storage
    /// - `Timeout`, `Transport`, `Codec` when the tag read fails
    pub async fn read_record(&self) -> Result<Record> {
        let (state, generation, session, cached, family) = {
            let machine = self.read_machine();
            (
                machine.current_state(),
                machine.generation(),
                machine.session().cloned(),
                machine.record().cloned(),
                machine.tag().map(|tag| tag.family),
            )
        };

        match state {
            DeviceState::Emulating => {
                let record = Record::Thing(self.inner.emulation.read().await?);
                self.write_machine().cache_record(generation, record.clone());
                Ok(record)
            }
            DeviceState::TagPresent => {
                if let Some(record) = cached {
                    return Ok(record);
                }
                let session = session.ok_or(DeviceError::UnsupportedTag {
                    family: family.unwrap_or(TagFamily::Unknown),
                })?;
                let record = self.read_session(&session).await?;
                self.write_machine()
                    .cache_record(session.generation(), record.clone());
                Ok(record)
            }
            DeviceState::NoReader | DeviceState::ReaderIdle => Err(DeviceError::NoTagPresent),
        }
    }

    /// Read the Thing from the tag or the emulation file.
    ///
    /// # Errors
    ///
    /// As [`read_record`](Self::read_record), plus `UnexpectedRecord` when
    /// the tag holds a Product.
    pub async fn read_thing(&self) -> Result<Thing> {
        match self.read_record().await? {
            Record::Thing(thing) => Ok(thing),
            other => Err(DeviceError::UnexpectedRecord {
                expected: "thing",
                found: other.kind(),
            }),
        }
    }

    /// Write a record to the tag, or a Thing to the emulation file.
    ///
    /// The cached record is replaced on success and dropped on failure,
    /// since a failed write may leave the tag partially written.
    pub async fn write_record(&self, record: Record) -> Result<()> {
        let (state, generation, session, family) = {
            let machine = self.read_machine();
            (
                machine.current_state(),
                machine.generation(),
                machine.session().cloned(),
                machine.tag().map(|tag| tag.family),
            )
        };

        match state {
            DeviceState::Emulating => {
                let Record::Thing(thing) = &record else {
                    return Err(DeviceError::UnexpectedRecord {
                        expected: "thing",
                        found: record.kind(),
                    });
                };
                self.inner.emulation.write(thing).await?;
                self.write_machine().cache_record(generation, record);
                Ok(())
            }
            DeviceState::TagPresent => {
                let session = session.ok_or(DeviceError::UnsupportedTag {
                    family: family.unwrap_or(TagFamily::Unknown),
                })?;
                match self.write_session(&session, &record).await {
                    Ok(()) => {
                        info!(kind = record.kind(), "Record written to tag");
                        self.write_machine()
                            .cache_record(session.generation(), record);
                        Ok(())
                    }
                    Err(e) => {
                        warn!(at_page = ?e.failed_page(), error = %e, "Tag write failed");
                        self.write_machine().invalidate_record(session.generation());
                        Err(e)
                    }
                }
            }
            DeviceState::NoReader | DeviceState::ReaderIdle => Err(DeviceError::NoTagPresent),
        }
    }

    pub async fn write_thing(&self, thing: Thing) -> Result<()> {
        self.write_record(Record::Thing(thing)).await
    }

    async fn read_session(&self, session: &TagSession) -> Result<Record> {
        self.with_timeout(async {
            let mut transport = session.transport().lock().await;
            let capacity = transport.geometry().user_capacity;
            let buffer = transport.read(capacity).await?;
            Ok::<_, DeviceError>(self.inner.codec.from_page_buffer(&buffer)?)
        })
        .await
    }

    /// Writes are bounded per page call by the transport, never as a whole,
    /// so a slow tag stops at a known page instead of between two calls.
    async fn write_session(&self, session: &TagSession, record: &Record) -> Result<()> {
        let mut transport = session.transport().lock().await;
        let capacity = transport.geometry().user_capacity;
        let buffer = self.inner.codec.to_page_buffer(record, capacity)?;
        transport.write(&buffer).await?;
        Ok(())
    }

    async fn with_timeout<T>(&self, operation: impl Future<Output = Result<T>>) -> Result<T> {
        let limit = self.inner.config.tag_timeout;
        tokio::time::timeout(limit, operation)
            .await
            .map_err(|_| DeviceError::timeout(limit.as_millis() as u64))?
    }

    // ========================================================================
    // Emulation
    // ========================================================================

    /// Switch emulation mode on or off.
    ///
    /// Enabling loads the file once so queries see its record.
    ///
    /// # Errors
    ///
    /// Returns `EmulationFileMissing` when enabling without the file.
    pub async fn set_emulation(&self, enabled: bool) -> Result<()> {
        if !enabled {
            self.write_machine().leave_emulation();
            return Ok(());
        }

        let generation = {
            let mut machine = self.write_machine();
            machine.enter_emulation(self.inner.emulation.path())?;
            machine.generation()
        };
        match self.inner.emulation.read().await {
            Ok(thing) => {
                self.write_machine()
                    .cache_record(generation, Record::Thing(thing));
            }
            Err(e) => warn!(error = %e, "Emulation file unreadable"),
        }
        Ok(())
    }

    fn read_machine(&self) -> RwLockReadGuard<'_, DeviceStateMachine> {
        self.inner
            .machine
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_machine(&self) -> RwLockWriteGuard<'_, DeviceStateMachine> {
        self.inner
            .machine
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
