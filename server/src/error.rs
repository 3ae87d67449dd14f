use shared::{NetId, WireError};
use thiserror::Error;

/// Failures outside the per-call outcome: startup, transport and routing
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to load map data: {0}")]
    MapData(#[from] serde_json::Error),
    #[error("packet encoding error: {0}")]
    Packet(#[from] bincode::Error),
    #[error("malformed object message: {0}")]
    Wire(#[from] WireError),
    #[error("no object with net id {0}")]
    UnknownObject(NetId),
}
