//! PeripheralController: pairs with the master and forwards matrix events.
//!
//! The controller runs as one tokio task reading [`PeripheralMessage`]s from
//! its inbox. Between messages, and whenever the inbox stays quiet for a
//! retry interval, it checks whether a pairing request broadcast is due.
//!
//! # Lifecycle
//!
//! ```text
//! Unpaired ──► PairingRequested ──confirmation──► Paired
//!   local key events: dropped          forwarded to master (id 0)
//!   ConfigRequest:    dropped          answered with this half's DeviceConfig
//! ```

use std::sync::Arc;
use std::time::Duration;

use splitkb_core::inbox::{forward_frames, inbox, InboxSender, InboxSettings};
use splitkb_core::peer::{
    PairingState, PairingStateMachine, PeerId, PeerRegistry, Role, DEFAULT_RETRY_INTERVAL,
    MASTER_ID,
};
use splitkb_core::protocol::{
    DeviceConfig, Inbound, Packet, RawBitmapEvent, RawKeyEvent, TransportProtocol,
};
use splitkb_core::transport::{Frame, Transport};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// Messages accepted by the controller task.
#[derive(Debug)]
pub enum PeripheralMessage {
    /// A raw frame from the transport receive pump.
    Frame(Frame),
    /// One key transition from the matrix scanner.
    Key(RawKeyEvent),
    /// A whole-matrix snapshot from the matrix scanner.
    Bitmap(RawBitmapEvent),
    /// Stop the loop.
    Shutdown,
}

/// Tunables for the controller loop.
#[derive(Debug, Clone, Copy)]
pub struct PeripheralSettings {
    pub inbox: InboxSettings,
    /// Time between pairing request broadcasts while unpaired.
    pub pairing_interval: Duration,
}

impl Default for PeripheralSettings {
    fn default() -> Self {
        Self {
            inbox: InboxSettings::default(),
            pairing_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

/// Cloneable producer handle for a running [`PeripheralController`].
#[derive(Clone)]
pub struct PeripheralHandle {
    inbox: InboxSender<PeripheralMessage>,
}

impl PeripheralHandle {
    pub async fn post_key(&self, event: RawKeyEvent) -> bool {
        self.inbox.post(PeripheralMessage::Key(event)).await
    }

    pub async fn post_bitmap(&self, event: RawBitmapEvent) -> bool {
        self.inbox.post(PeripheralMessage::Bitmap(event)).await
    }

    pub async fn post_frame(&self, frame: Frame) -> bool {
        self.inbox.post(PeripheralMessage::Frame(frame)).await
    }

    /// Asks the controller to stop; pairing retries stop with it.
    pub async fn shutdown(&self) {
        if !self.inbox.post_blocking(PeripheralMessage::Shutdown).await {
            debug!("peripheral controller already stopped");
        }
    }

    /// Spawns a task that forwards every frame from `frames` into the inbox.
    pub fn spawn_frame_pump(&self, frames: mpsc::Receiver<Frame>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(forward_frames(
            frames,
            self.inbox.clone(),
            PeripheralMessage::Frame,
        ))
    }
}

pub struct PeripheralController {
    protocol: TransportProtocol,
    pairing: PairingStateMachine,
    config: DeviceConfig,
    inbox: mpsc::Receiver<PeripheralMessage>,
}

impl PeripheralController {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: DeviceConfig,
        settings: PeripheralSettings,
    ) -> (Self, PeripheralHandle) {
        let mut protocol = TransportProtocol::new(transport, Role::Peripheral);
        protocol.on_pairing_confirmation();
        protocol.on_config_request();

        let (sender, rx) = inbox(settings.inbox);
        let controller = Self {
            protocol,
            pairing: PairingStateMachine::new(settings.pairing_interval),
            config,
            inbox: rx,
        };
        (controller, PeripheralHandle { inbox: sender })
    }

    pub fn pairing_state(&self) -> PairingState {
        self.pairing.state()
    }

    pub fn registry(&self) -> &PeerRegistry {
        self.protocol.registry()
    }

    /// Runs until a shutdown message arrives or every handle is dropped.
    ///
    /// Returns the final pairing state.
    pub async fn run(mut self) -> PairingState {
        info!(
            address = %self.protocol.local_address(),
            keys = self.config.key_count(),
            "peripheral controller started"
        );
        self.poll_pairing().await;
        loop {
            match tokio::time::timeout(self.pairing.retry_interval(), self.inbox.recv()).await {
                Ok(Some(PeripheralMessage::Shutdown)) | Ok(None) => break,
                Ok(Some(message)) => self.handle_message(message).await,
                Err(_) => trace!("peripheral idle"),
            }
            self.poll_pairing().await;
        }
        info!(attempts = self.pairing.attempts(), "peripheral controller stopped");
        self.pairing.state()
    }

    /// Processes one inbox message other than shutdown.
    pub async fn handle_message(&mut self, message: PeripheralMessage) {
        match message {
            PeripheralMessage::Frame(frame) => self.handle_frame(&frame).await,
            PeripheralMessage::Key(event) => {
                if self.ready_to_forward() {
                    if let Err(e) = self.protocol.send_key_event(event).await {
                        warn!(index = event.index, "key event not sent: {e}");
                    }
                }
            }
            PeripheralMessage::Bitmap(event) => {
                if self.ready_to_forward() {
                    if let Err(e) = self.protocol.send_bitmap_event(&event).await {
                        warn!(size = event.size(), "bitmap event not sent: {e}");
                    }
                }
            }
            PeripheralMessage::Shutdown => {}
        }
    }

    /// Broadcasts a pairing request if one is due.
    pub async fn poll_pairing(&mut self) {
        if !self.pairing.poll(Instant::now()) {
            return;
        }
        if let Err(e) = self.protocol.send_pairing_request(None).await {
            warn!(attempt = self.pairing.attempts(), "pairing request not sent: {e}");
        }
    }

    fn ready_to_forward(&self) -> bool {
        if self.pairing.is_paired() {
            true
        } else {
            debug!("local event dropped while unpaired");
            false
        }
    }

    async fn handle_frame(&mut self, frame: &Frame) {
        let Some(Inbound { sender, packet }) = self.protocol.dispatch(frame) else {
            return;
        };
        match packet {
            Packet::PairingConfirmation(_) => self.on_confirmation(sender),
            Packet::ConfigRequest => self.on_config_request(sender).await,
            other => debug!(peer = sender, kind = ?other.packet_type(), "packet not handled by peripheral"),
        }
    }

    fn on_confirmation(&mut self, sender: PeerId) {
        if sender != MASTER_ID {
            warn!(
                address = %self.protocol.registry().address_of(sender),
                "confirmation from a node other than the recorded master ignored"
            );
            return;
        }
        let master = self.protocol.registry().address_of(MASTER_ID);
        self.pairing.on_confirmation(master);
    }

    async fn on_config_request(&self, sender: PeerId) {
        if !self.pairing.is_paired() {
            debug!(peer = sender, "config request before pairing ignored");
            return;
        }
        match self.protocol.push_config(sender, &self.config).await {
            Ok(()) => debug!(peer = sender, "config sent"),
            Err(e) => warn!(peer = sender, "config not sent: {e}"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
