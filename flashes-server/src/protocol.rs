//! Server-side signaling frames.
//!
//! The client-to-server frame is shared with the client crate; the
//! server-to-client frames are defined here because only the server ever
//! serializes them.

use serde::Serialize;

use flashes_net::protocol::{GameMap, Role};

pub use flashes_net::protocol::ClientMessage;

/// Server -> client signaling frames.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// First frame per client: role, map and identity assignment.
    ClientAcknowledged {
        /// Assigned session role.
        role: Role,
        /// The session map.
        map: GameMap,
        /// Identity assigned to this client.
        #[serde(rename = "clientId")]
        client_id: String,
    },
    /// Sent to both sides once both slots are filled.
    PeerJoined {
        /// Identity of the other client.
        #[serde(rename = "peerId")]
        peer_id: String,
    },
}
