//! Event loop tests driven by the mock reader backend.

use std::time::Duration;
use tagproxy_core::{Record, RecordCodec, Thing, ThingType};
use tagproxy_device::{DeviceConfig, DeviceController, DeviceSnapshot, DeviceState};
use tagproxy_hardware::ReaderInfo;
use tagproxy_hardware::mock::{MockPagedChannel, MockReader, mock_ultralight_tag};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const READER: &str = "Mock NFC Reader";

struct Harness {
    controller: DeviceController,
    cancel: CancellationToken,
    task: JoinHandle<tagproxy_device::Result<()>>,
}

fn start(backend: MockReader) -> Harness {
    let controller = DeviceController::new(DeviceConfig::default());
    let cancel = CancellationToken::new();
    let task = tokio::spawn({
        let controller = controller.clone();
        let cancel = cancel.clone();
        async move { controller.run_events(backend, cancel).await }
    });
    Harness {
        controller,
        cancel,
        task,
    }
}

/// Poll snapshots until `condition` holds.
async fn wait_for(
    controller: &DeviceController,
    condition: impl Fn(&DeviceSnapshot) -> bool,
) -> DeviceSnapshot {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let snapshot = controller.snapshot();
            if condition(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached")
}

#[tokio::test]
async fn test_tag_lifecycle() {
    let (backend, handle) = MockReader::with_reader(READER);
    let harness = start(backend);
    wait_for(&harness.controller, |s| s.state == DeviceState::ReaderIdle).await;

    let thing = Thing::new(ThingType::Digger).unwrap();
    let (channel, tag) = MockPagedChannel::new();
    let buffer = RecordCodec::new()
        .to_page_buffer(&Record::Thing(thing.clone()), 144)
        .unwrap();
    tag.set_user_memory(&buffer);
    handle
        .present_channel(mock_ultralight_tag(), channel)
        .await
        .unwrap();

    let snapshot = wait_for(&harness.controller, |s| s.record.is_some()).await;
    assert_eq!(snapshot.state, DeviceState::TagPresent);
    assert_eq!(snapshot.record, Some(Record::Thing(thing.clone())));
    assert_eq!(harness.controller.read_thing().await.unwrap(), thing);

    handle.remove_tag().await.unwrap();
    let snapshot = wait_for(&harness.controller, |s| s.state == DeviceState::ReaderIdle).await;
    assert!(snapshot.tag.is_none());
    assert!(snapshot.record.is_none());

    harness.cancel.cancel();
    harness.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_rescan_picks_up_new_reader() {
    let (backend, handle) = MockReader::new();
    let harness = start(backend);

    let readers = harness.controller.rescan().await.unwrap();
    assert!(readers.is_empty());
    assert_eq!(harness.controller.snapshot().state, DeviceState::NoReader);

    handle.attach_reader(ReaderInfo::new(READER, "mock-0"));
    let readers = harness.controller.rescan().await.unwrap();
    assert_eq!(readers.len(), 1);

    let snapshot = harness.controller.snapshot();
    assert_eq!(snapshot.state, DeviceState::ReaderIdle);
    assert_eq!(snapshot.reader_descriptor().model, READER);

    handle.detach_all();
    harness.controller.rescan().await.unwrap();
    assert_eq!(harness.controller.snapshot().state, DeviceState::NoReader);

    harness.cancel.cancel();
    harness.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_emulation_ignores_tag_events() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("thing.json");
    let thing = Thing::new(ThingType::UnderCarriage).unwrap();
    std::fs::write(&path, serde_json::to_string(&thing).unwrap()).unwrap();

    let (backend, handle) = MockReader::with_reader(READER);
    let controller =
        DeviceController::new(DeviceConfig::default().with_emulation_file(path.clone()));
    let cancel = CancellationToken::new();
    let task = tokio::spawn({
        let controller = controller.clone();
        let cancel = cancel.clone();
        async move { controller.run_events(backend, cancel).await }
    });
    wait_for(&controller, |s| s.state == DeviceState::ReaderIdle).await;

    controller.set_emulation(true).await.unwrap();
    let snapshot = controller.snapshot();
    assert!(snapshot.is_emulating());
    assert_eq!(snapshot.record, Some(Record::Thing(thing.clone())));

    let tag = handle.present_tag(mock_ultralight_tag()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(tag.calls().is_empty());
    assert!(controller.snapshot().is_emulating());
    assert!(controller.snapshot().tag.is_none());

    controller.set_emulation(false).await.unwrap();
    assert_eq!(controller.snapshot().state, DeviceState::ReaderIdle);

    cancel.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_loop_ends_when_backend_closes() {
    let (backend, handle) = MockReader::with_reader(READER);
    let harness = start(backend);
    drop(handle);
    harness.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_second_loop_rejected() {
    let (backend, _handle) = MockReader::with_reader(READER);
    let harness = start(backend);
    let (second, _second_handle) = MockReader::new();

    wait_for(&harness.controller, |s| s.state == DeviceState::ReaderIdle).await;
    let result = harness
        .controller
        .run_events(second, CancellationToken::new())
        .await;
    assert!(result.is_err());

    harness.cancel.cancel();
    harness.task.await.unwrap().unwrap();
}
