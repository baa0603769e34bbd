//! End-to-end tests: real peripheral controllers talking to a real master
//! controller over the in-memory bus.

use std::sync::Arc;
use std::time::Duration;

use splitkb_core::peer::{PairingState, PeerAddress};
use splitkb_core::protocol::{DeviceConfig, RawBitmapEvent, RawKeyEvent};
use splitkb_core::report::SixKroReport;
use splitkb_core::transport::MemoryBus;
use splitkb_master::application::master_controller::{MasterController, MasterSettings};
use splitkb_master::infrastructure::hid_output::mock::RecordingHidSink;
use splitkb_peripheral::application::peripheral_controller::{
    PeripheralController, PeripheralHandle, PeripheralSettings,
};
use tokio::task::JoinHandle;

const MASTER: PeerAddress = PeerAddress::new([0x02, 0, 0, 0, 0, 0x01]);
const LEFT: PeerAddress = PeerAddress::new([0x02, 0, 0, 0, 0, 0x10]);
const RIGHT: PeerAddress = PeerAddress::new([0x02, 0, 0, 0, 0, 0x11]);

struct RunningHalf {
    handle: PeripheralHandle,
    task: JoinHandle<PairingState>,
}

fn start_peripheral(bus: &MemoryBus, address: PeerAddress, rows: u8, keymap: &[u8]) -> RunningHalf {
    let (transport, frames) = bus.attach(address);
    let cols = u8::try_from(keymap.len() / usize::from(rows)).unwrap();
    let config = DeviceConfig::new(rows, cols, keymap).unwrap();
    let (controller, handle) =
        PeripheralController::new(Arc::new(transport), config, PeripheralSettings::default());
    handle.spawn_frame_pump(frames);
    let task = tokio::spawn(controller.run());
    RunningHalf { handle, task }
}

/// Re-sends `event` until the master reports `expected_reports` in total.
///
/// Events sent before pairing and the config exchange finish are dropped on
/// one side or the other, so the first few attempts may be lost.
async fn press_until_reported(
    half: &RunningHalf,
    event: RawKeyEvent,
    sink: &RecordingHidSink,
    expected_reports: usize,
) -> Vec<SixKroReport> {
    for _ in 0..100 {
        half.handle.post_key(event).await;
        if let Ok(reports) =
            tokio::time::timeout(Duration::from_millis(20), sink.wait_for(expected_reports)).await
        {
            return reports;
        }
    }
    panic!("no report after repeated key events");
}

#[tokio::test]
async fn test_two_halves_merge_into_one_report() {
    // Arrange
    let bus = MemoryBus::new();
    let (transport, frames) = bus.attach(MASTER);
    let sink = Arc::new(RecordingHidSink::new());
    let (master, master_handle) =
        MasterController::new(Arc::new(transport), sink.clone(), MasterSettings::default());
    master_handle.spawn_frame_pump(frames);
    let master_task = tokio::spawn(master.run());

    let left = start_peripheral(&bus, LEFT, 1, &[0x04]);
    let right = start_peripheral(&bus, RIGHT, 1, &[0x06]);

    // Act
    press_until_reported(&left, RawKeyEvent::press(0), &sink, 1).await;
    let reports = press_until_reported(&right, RawKeyEvent::press(0), &sink, 2).await;

    // Assert
    assert_eq!(reports[1].as_bytes(), &[0, 0, 0x04, 0x06, 0, 0, 0, 0]);

    left.handle.shutdown().await;
    right.handle.shutdown().await;
    master_handle.shutdown().await;
    assert!(matches!(left.task.await.unwrap(), PairingState::Paired { master } if master == MASTER));
    assert!(matches!(right.task.await.unwrap(), PairingState::Paired { .. }));
    let registry = master_task.await.unwrap();
    assert_eq!(registry.len(), 3);
}

#[tokio::test]
async fn test_bitmap_snapshot_releases_keys_missing_from_it() {
    // Arrange
    let bus = MemoryBus::new();
    let (transport, frames) = bus.attach(MASTER);
    let sink = Arc::new(RecordingHidSink::new());
    let (master, master_handle) =
        MasterController::new(Arc::new(transport), sink.clone(), MasterSettings::default());
    master_handle.spawn_frame_pump(frames);
    let master_task = tokio::spawn(master.run());
    let left = start_peripheral(&bus, LEFT, 2, &[0x04, 0x05, 0xE1, 0x2C]);
    press_until_reported(&left, RawKeyEvent::press(0), &sink, 1).await;

    // Act: snapshot holds Shift and Space only; KeyA is gone.
    let mut snapshot = RawBitmapEvent::with_keys(4).unwrap();
    snapshot.set(2, true);
    snapshot.set(3, true);
    left.handle.post_bitmap(snapshot).await;
    let reports = tokio::time::timeout(Duration::from_secs(2), sink.wait_for(2))
        .await
        .expect("snapshot report");

    // Assert
    assert_eq!(reports[1].as_bytes(), &[0x02, 0, 0x2C, 0, 0, 0, 0, 0]);

    left.handle.shutdown().await;
    master_handle.shutdown().await;
    left.task.await.unwrap();
    master_task.await.unwrap();
}
