//! Peer addressing, id registry, and the pairing handshake.

pub mod address;
pub mod pairing;
pub mod registry;

pub use address::{AddressParseError, PeerAddress};
pub use pairing::{
    PairingState, PairingStateMachine, DEFAULT_RETRY_INTERVAL, MAX_RETRY_INTERVAL, MIN_RETRY_INTERVAL,
};
pub use registry::{
    Peer, PeerId, PeerRegistry, RegistryError, RegistrySnapshot, Role, MASTER_ID, MAX_PEERS,
};
