//! MasterController: turns peripheral traffic into USB HID reports.
//!
//! This use case is the heart of the master half. It owns the link protocol,
//! the [`HidMapper`] and the [`SixKroEncoder`], and runs as a single tokio
//! task that reads one [`ControllerMessage`] at a time from its inbox.
//!
//! # Flow per received frame
//!
//! ```text
//! Frame ─► TransportProtocol::dispatch ─► Inbound { sender, packet }
//!            PairingRequest  → echo confirmation (+ config request if unmapped)
//!            KeyEvent/Bitmap → mapper (or config request if unmapped)
//!            Config          → mapper.insert_map
//!          then: snapshot aggregate bitmap; if it changed, encode and send report
//! ```
//!
//! # Architecture
//!
//! The controller depends only on the [`Transport`] and [`HidSink`] traits.
//! Concrete implementations are injected at construction time, so tests drive
//! it over the in-memory bus with a recording sink.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use splitkb_core::inbox::{inbox, InboxSender, InboxSettings};
use splitkb_core::keymap::{HidBitmap, HidMapper, HID_BITMAP_BYTES};
use splitkb_core::peer::{PeerId, PeerRegistry, Role, DEFAULT_RETRY_INTERVAL};
use splitkb_core::protocol::{Inbound, Packet, PairingPayload, TransportProtocol};
use splitkb_core::report::{SixKroEncoder, SixKroReport};
use splitkb_core::transport::{Frame, Transport};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Error type for HID report delivery.
#[derive(Debug, Error)]
pub enum HidError {
    /// The host has not enumerated the device yet.
    #[error("HID endpoint not ready")]
    NotReady,

    #[error("HID write failed: {0}")]
    Write(String),
}

/// Trait for handing finished reports to the USB HID endpoint.
///
/// The firmware implementation writes to the endpoint; test implementations
/// record calls.
#[async_trait]
pub trait HidSink: Send + Sync {
    async fn send_report(&self, report: SixKroReport) -> Result<(), HidError>;
}

/// Messages accepted by the controller task.
#[derive(Debug)]
pub enum ControllerMessage {
    /// A raw frame from the transport receive pump.
    Frame(Frame),
    /// Stop the loop.
    Shutdown,
}

/// Tunables for the controller loop.
#[derive(Debug, Clone, Copy)]
pub struct MasterSettings {
    pub inbox: InboxSettings,
    /// Inbox wait before the loop wakes with nothing to do.
    pub idle_tick: Duration,
}

impl Default for MasterSettings {
    fn default() -> Self {
        Self {
            inbox: InboxSettings::default(),
            idle_tick: DEFAULT_RETRY_INTERVAL,
        }
    }
}

/// Cloneable producer handle for a running [`MasterController`].
#[derive(Clone)]
pub struct MasterHandle {
    inbox: InboxSender<ControllerMessage>,
}

impl MasterHandle {
    /// Enqueues a received frame; dropped with a warning if the inbox stays full.
    pub async fn post_frame(&self, frame: Frame) -> bool {
        self.inbox.post(ControllerMessage::Frame(frame)).await
    }

    /// Asks the controller to stop after the message currently being handled.
    pub async fn shutdown(&self) {
        if !self.inbox.post_blocking(ControllerMessage::Shutdown).await {
            debug!("master controller already stopped");
        }
    }

    /// Spawns a task that forwards every frame from `frames` into the inbox.
    pub fn spawn_frame_pump(&self, frames: mpsc::Receiver<Frame>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(splitkb_core::inbox::forward_frames(
            frames,
            self.inbox.clone(),
            ControllerMessage::Frame,
        ))
    }
}

pub struct MasterController {
    protocol: TransportProtocol,
    mapper: HidMapper,
    encoder: SixKroEncoder,
    /// Aggregate bitmap as of the last report sent.
    snapshot: [u8; HID_BITMAP_BYTES],
    sink: Arc<dyn HidSink>,
    inbox: mpsc::Receiver<ControllerMessage>,
    idle_tick: Duration,
}

impl MasterController {
    /// Creates a controller with an empty peer registry.
    pub fn new(
        transport: Arc<dyn Transport>,
        sink: Arc<dyn HidSink>,
        settings: MasterSettings,
    ) -> (Self, MasterHandle) {
        let protocol = TransportProtocol::new(transport, Role::Master);
        Self::with_protocol(protocol, sink, settings)
    }

    /// Creates a controller around a previously saved registry.
    ///
    /// The registry's master entry is replaced by this node's own address. A
    /// registry that lists this node as a peripheral is discarded.
    pub fn with_registry(
        transport: Arc<dyn Transport>,
        mut registry: PeerRegistry,
        sink: Arc<dyn HidSink>,
        settings: MasterSettings,
    ) -> (Self, MasterHandle) {
        let local = transport.local_address();
        if registry.register_master(local).is_none() {
            warn!(address = %local, "saved registry lists this node as a peripheral, starting empty");
            registry = PeerRegistry::with_master(local);
        }
        let protocol = TransportProtocol::with_registry(transport, Role::Master, registry);
        Self::with_protocol(protocol, sink, settings)
    }

    fn with_protocol(
        mut protocol: TransportProtocol,
        sink: Arc<dyn HidSink>,
        settings: MasterSettings,
    ) -> (Self, MasterHandle) {
        protocol.on_pairing_request();
        protocol.on_key_event();
        protocol.on_bitmap_event();
        protocol.on_config_received();

        let (sender, rx) = inbox(settings.inbox);
        let controller = Self {
            protocol,
            mapper: HidMapper::new(),
            encoder: SixKroEncoder::new(),
            snapshot: [0; HID_BITMAP_BYTES],
            sink,
            inbox: rx,
            idle_tick: settings.idle_tick,
        };
        (controller, MasterHandle { inbox: sender })
    }

    pub fn registry(&self) -> &PeerRegistry {
        self.protocol.registry()
    }

    pub fn mapper(&self) -> &HidMapper {
        &self.mapper
    }

    /// Runs until a shutdown message arrives or every handle is dropped.
    ///
    /// Returns the peer registry so the caller can persist it.
    pub async fn run(mut self) -> PeerRegistry {
        info!(address = %self.protocol.local_address(), "master controller started");
        loop {
            match tokio::time::timeout(self.idle_tick, self.inbox.recv()).await {
                Ok(Some(ControllerMessage::Frame(frame))) => self.handle_frame(&frame).await,
                Ok(Some(ControllerMessage::Shutdown)) | Ok(None) => break,
                Err(_) => trace!("master idle"),
            }
        }
        info!(peers = self.registry().len(), "master controller stopped");
        self.protocol.registry().clone()
    }

    /// Processes one received frame.
    pub async fn handle_frame(&mut self, frame: &Frame) {
        let Some(Inbound { sender, packet }) = self.protocol.dispatch(frame) else {
            return;
        };
        match packet {
            Packet::PairingRequest(payload) => self.on_pairing_request(sender, &payload).await,
            Packet::KeyEvent(event) => {
                if self.ensure_map(sender).await {
                    self.mapper
                        .map_index_to_hid_bitmap(event.index, event.pressed, sender);
                    self.refresh_report().await;
                }
            }
            Packet::KeyBitmap(event) => {
                if self.ensure_map(sender).await {
                    self.mapper
                        .map_bitmap_to_hid_bitmap(event.as_bytes(), event.size(), sender);
                    self.refresh_report().await;
                }
            }
            Packet::Config(config) => {
                info!(
                    peer = sender,
                    rows = config.rows,
                    cols = config.cols,
                    "keymap received"
                );
                self.mapper.insert_map(sender, &config.keymap);
                self.refresh_report().await;
            }
            other => debug!(peer = sender, kind = ?other.packet_type(), "packet not handled by master"),
        }
    }

    async fn on_pairing_request(&mut self, peer: PeerId, payload: &PairingPayload) {
        if let Err(e) = self.protocol.send_pairing_confirmation(peer, payload).await {
            warn!(peer, "pairing confirmation failed: {e}");
            return;
        }
        debug!(peer, "pairing confirmed");
        if !self.mapper.does_map_exist(peer) {
            self.request_config(peer).await;
        }
    }

    /// Returns `true` if `peer` has a keymap; otherwise asks it for one.
    async fn ensure_map(&self, peer: PeerId) -> bool {
        if self.mapper.does_map_exist(peer) {
            return true;
        }
        debug!(peer, "event from unmapped peer dropped");
        self.request_config(peer).await;
        false
    }

    async fn request_config(&self, peer: PeerId) {
        if let Err(e) = self.protocol.request_config(peer).await {
            warn!(peer, "config request failed: {e}");
        }
    }

    /// Sends a report if the aggregate bitmap differs from the last one sent.
    async fn refresh_report(&mut self) {
        let mut current = [0u8; HID_BITMAP_BYTES];
        self.mapper.copy_bitmap(&mut current);
        if current == self.snapshot {
            return;
        }
        self.snapshot = current;

        let report = self.encoder.encode(&HidBitmap::from_bytes(current));
        trace!(?report, "report");
        if let Err(e) = self.sink.send_report(report).await {
            warn!("HID report dropped: {e}");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
