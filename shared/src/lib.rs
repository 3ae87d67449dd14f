pub mod rpc;
pub mod sequence;
pub mod vector;
pub mod wire;

use serde::{Deserialize, Serialize};

pub use rpc::RpcCall;
pub use sequence::is_newer;
pub use vector::Vector2;
pub use wire::{MessageReader, MessageWriter, WireError};

pub const PROTOCOL_VERSION: u32 = 1;

/// Stable identifier of a replicated object within a game
pub type NetId = u32;

/// Server-assigned connection identifier
pub type ClientId = u32;

/// Player slot within a game
pub type PlayerId = u8;

/// Envelope carried over the demo UDP transport
///
/// Object payloads are opaque here; they are decoded by the component that
/// owns the addressed object.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    ObjectData {
        net_id: NetId,
        target: Option<ClientId>,
        initial_state: bool,
        payload: Vec<u8>,
    },
    ObjectRpc {
        net_id: NetId,
        target: Option<ClientId>,
        call: u8,
        payload: Vec<u8>,
    },
    Disconnect,

    Connected {
        client_id: ClientId,
        player_id: PlayerId,
        transform_id: NetId,
        physics_id: NetId,
    },
    Disconnected {
        reason: String,
    },
}
