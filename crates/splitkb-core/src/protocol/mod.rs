//! Link protocol: packet types, the binary codec, config blobs, and dispatch.

pub mod codec;
pub mod config_blob;
pub mod link;
pub mod messages;
pub mod sequence;

pub use codec::{decode_frame, decode_payload, encode_frame, encode_payload, ProtocolError};
pub use config_blob::ConfigBlobError;
pub use link::{Inbound, LinkError, TransportProtocol};
pub use messages::*;
pub use sequence::PairingSequence;
