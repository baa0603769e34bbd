//! PeerRegistry: address ↔ runtime id bookkeeping for every known keyboard half.
//!
//! # Id assignment
//!
//! ```text
//! id 0        the master (reserved, even before the master is known)
//! id 1, 2, …  peripherals, sequentially, first-come on first contact
//! ```
//!
//! Ids are never reused or reassigned while the registry lives, so a peer
//! that re-pairs or sends duplicate packets keeps the id it was first given.
//! The registry can be captured with [`PeerRegistry::snapshot`] and written to
//! disk; it is not persisted otherwise.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::address::PeerAddress;

/// Small integer id assigned to a peer at runtime.
pub type PeerId = u8;

/// Id permanently reserved for the master half.
pub const MASTER_ID: PeerId = 0;

/// Upper bound on the number of peers, master included.
pub const MAX_PEERS: usize = 20;

const MAX_PERIPHERALS: usize = MAX_PEERS - 1;

/// Which side of the split a peer plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Master,
    Peripheral,
}

/// A registered peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Peer {
    pub address: PeerAddress,
    pub id: PeerId,
    pub role: Role,
}

/// Errors raised when restoring a saved registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("snapshot holds {0} peripherals, capacity is {MAX_PERIPHERALS}")]
    TooManyPeers(usize),
    #[error("snapshot lists {0} more than once")]
    DuplicateAddress(PeerAddress),
    #[error("snapshot encoding error: {0}")]
    Encoding(#[from] bincode::Error),
}

/// Serialisable copy of a registry, in id order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub master: Option<PeerAddress>,
    pub peripherals: Vec<PeerAddress>,
}

impl RegistrySnapshot {
    /// Encodes the snapshot with `bincode`.
    pub fn to_bytes(&self) -> Result<Vec<u8>, RegistryError> {
        Ok(bincode::serialize(self)?)
    }

    /// Decodes a snapshot previously produced by [`RegistrySnapshot::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RegistryError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// In-memory table of known peers.
#[derive(Debug, Default, Clone)]
pub struct PeerRegistry {
    master: Option<PeerAddress>,
    peripherals: heapless::Vec<PeerAddress, MAX_PERIPHERALS>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry whose id 0 is already bound to `master`.
    pub fn with_master(master: PeerAddress) -> Self {
        Self {
            master: Some(master),
            peripherals: heapless::Vec::new(),
        }
    }

    /// Registers `address`, returning its id.
    ///
    /// A known address keeps the id it already has. Returns `None` when the
    /// registry is full.
    pub fn register(&mut self, address: PeerAddress) -> Option<PeerId> {
        if let Some(id) = self.id_of(address) {
            return Some(id);
        }
        if self.peripherals.push(address).is_err() {
            warn!(%address, "peer registry full, ignoring new peer");
            return None;
        }
        let id = self.peripherals.len() as PeerId;
        debug!(%address, id, "registered peer");
        Some(id)
    }

    /// Binds id 0 to `address`.
    ///
    /// Returns `None`, leaving the registry unchanged, if `address` already
    /// holds a peripheral id. An address never moves between ids.
    pub fn register_master(&mut self, address: PeerAddress) -> Option<PeerId> {
        if let Some(id) = self.peripheral_id(address) {
            warn!(%address, id, "address already registered as a peripheral, not binding it as master");
            return None;
        }
        match self.master {
            Some(existing) if existing == address => {}
            Some(existing) => {
                warn!(old = %existing, new = %address, "master address replaced");
                self.master = Some(address);
            }
            None => {
                debug!(%address, "registered master");
                self.master = Some(address);
            }
        }
        Some(MASTER_ID)
    }

    /// Returns the id bound to `address`, or `None` if it was never registered.
    pub fn id_of(&self, address: PeerAddress) -> Option<PeerId> {
        if self.master == Some(address) {
            return Some(MASTER_ID);
        }
        self.peripheral_id(address)
    }

    fn peripheral_id(&self, address: PeerAddress) -> Option<PeerId> {
        self.peripherals
            .iter()
            .position(|a| *a == address)
            .map(|idx| (idx + 1) as PeerId)
    }

    /// Returns the address bound to `id`.
    ///
    /// Unknown ids are logged and yield [`PeerAddress::ZERO`].
    pub fn address_of(&self, id: PeerId) -> PeerAddress {
        let found = if id == MASTER_ID {
            self.master
        } else {
            self.peripherals.get(id as usize - 1).copied()
        };
        found.unwrap_or_else(|| {
            warn!(id, "address lookup for unknown peer id");
            PeerAddress::ZERO
        })
    }

    pub fn master(&self) -> Option<PeerAddress> {
        self.master
    }

    /// Number of registered peers, master included when known.
    pub fn len(&self) -> usize {
        self.peripherals.len() + usize::from(self.master.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over every registered peer in id order.
    pub fn peers(&self) -> impl Iterator<Item = Peer> + '_ {
        let master = self.master.map(|address| Peer {
            address,
            id: MASTER_ID,
            role: Role::Master,
        });
        let peripherals = self.peripherals.iter().enumerate().map(|(idx, address)| Peer {
            address: *address,
            id: (idx + 1) as PeerId,
            role: Role::Peripheral,
        });
        master.into_iter().chain(peripherals)
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            master: self.master,
            peripherals: self.peripherals.iter().copied().collect(),
        }
    }

    /// Rebuilds a registry from a snapshot, keeping every saved id.
    pub fn restore(snapshot: &RegistrySnapshot) -> Result<Self, RegistryError> {
        if snapshot.peripherals.len() > MAX_PERIPHERALS {
            return Err(RegistryError::TooManyPeers(snapshot.peripherals.len()));
        }
        let mut registry = Self {
            master: snapshot.master,
            peripherals: heapless::Vec::new(),
        };
        for address in &snapshot.peripherals {
            if registry.id_of(*address).is_some() {
                return Err(RegistryError::DuplicateAddress(*address));
            }
            // Capacity was checked above.
            let _ = registry.peripherals.push(*address);
        }
        Ok(registry)
    }
}
