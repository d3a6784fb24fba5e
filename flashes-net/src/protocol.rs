//! Wire Protocol
//!
//! Tagged unions for the two message channels: signaling frames exchanged
//! with the rendezvous server, and application frames exchanged directly
//! between peers. Both are one JSON object per message, decoded at a single
//! boundary so unknown tags surface as a distinct `Unrecognized` variant
//! instead of a runtime cast failure.

use serde::{Deserialize, Serialize};

/// Session role assigned by the signaling server.
///
/// Assigned exactly once per client and immutable for the session lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Acts on the world and is the source of truth for state.
    Player,
    /// Observes; follows the player's state via snapshot + deltas.
    Spectator,
}

impl Role {
    /// True for the state-owning side.
    pub fn is_player(self) -> bool {
        matches!(self, Role::Player)
    }
}

/// Initial world map agreed during the signaling handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameMap {
    /// Level glyph bytes, row-major.
    pub level: Vec<u8>,
    /// Cells per row.
    pub width: u8,
    /// Pixel width of one cell.
    #[serde(rename = "cellWidth")]
    pub cell_width: u8,
    /// Cells visible per row in the clipped camera view.
    #[serde(rename = "viewWidth")]
    pub view_width: u8,
}

/// Client -> server announcements.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Sent once, immediately after the signaling connection opens.
    ClientJoined {
        /// Address this client listens on for direct peer channels.
        ///
        /// Browser clients dial each other through a broker and omit this;
        /// native clients advertise a socket address here and the server
        /// uses it as their identity, so the remote side can dial it.
        #[serde(rename = "peerAddr", default, skip_serializing_if = "Option::is_none")]
        peer_addr: Option<String>,
    },
}

/// Server -> client signaling frames.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingMessage {
    /// First frame per client: role, map and identity assignment.
    ClientAcknowledged {
        /// Assigned session role.
        role: Role,
        /// The world map both sides will construct their engine from.
        map: GameMap,
        /// This client's identity, the addressable peer endpoint.
        client_id: String,
    },
    /// The remote party has registered; carries its identity.
    PeerJoined {
        /// Identity of the remote client, used as the dial target.
        peer_id: String,
    },
    /// A frame with an unknown `type` tag. Logged and ignored downstream.
    Unrecognized(String),
}

/// Application frames exchanged over the direct peer channel.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerMessage {
    /// Full world-state snapshot. Sent only by the player.
    InitialStateVector {
        /// Opaque snapshot bytes, meaningful only to the engine.
        data: Vec<u8>,
    },
    /// Incremental mutation, applied in strict arrival order.
    Delta {
        /// Opaque delta bytes, meaningful only to the engine.
        data: Vec<u8>,
    },
    /// A frame with an unknown `type` tag. Logged and ignored downstream.
    Unrecognized(String),
}

/// Frame decode failures. Malformed frames are discarded by the transport
/// readers after logging; they never terminate the session.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Not valid JSON, or a known tag with missing/invalid fields.
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON object without a `type` tag.
    #[error("frame has no type tag")]
    MissingTag,

    /// Attempted to encode a variant that has no wire representation.
    #[error("{0:?} frames cannot be encoded")]
    Unencodable(String),
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum RawSignaling {
    ClientAcknowledged {
        role: Role,
        map: GameMap,
        #[serde(rename = "clientId")]
        client_id: String,
    },
    PeerJoined {
        #[serde(rename = "peerId")]
        peer_id: String,
    },
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type")]
enum RawPeer {
    InitialStateVector { data: Vec<u8> },
    Delta { data: Vec<u8> },
}

fn type_tag(value: &serde_json::Value) -> Result<&str, DecodeError> {
    value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or(DecodeError::MissingTag)
}

impl SignalingMessage {
    /// Decode one signaling frame.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        match type_tag(&value)? {
            "ClientAcknowledged" | "PeerJoined" => {
                Ok(match serde_json::from_value::<RawSignaling>(value)? {
                    RawSignaling::ClientAcknowledged {
                        role,
                        map,
                        client_id,
                    } => SignalingMessage::ClientAcknowledged {
                        role,
                        map,
                        client_id,
                    },
                    RawSignaling::PeerJoined { peer_id } => {
                        SignalingMessage::PeerJoined { peer_id }
                    }
                })
            }
            other => Ok(SignalingMessage::Unrecognized(other.to_string())),
        }
    }
}

impl PeerMessage {
    /// Decode one peer frame.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        match type_tag(&value)? {
            "InitialStateVector" | "Delta" => {
                Ok(match serde_json::from_value::<RawPeer>(value)? {
                    RawPeer::InitialStateVector { data } => {
                        PeerMessage::InitialStateVector { data }
                    }
                    RawPeer::Delta { data } => PeerMessage::Delta { data },
                })
            }
            other => Ok(PeerMessage::Unrecognized(other.to_string())),
        }
    }

    /// Encode for transmission. Byte payloads serialize as JSON number
    /// arrays, matching the browser client's wire format.
    pub fn encode(&self) -> Result<String, DecodeError> {
        let raw = match self {
            PeerMessage::InitialStateVector { data } => RawPeer::InitialStateVector {
                data: data.clone(),
            },
            PeerMessage::Delta { data } => RawPeer::Delta { data: data.clone() },
            PeerMessage::Unrecognized(tag) => {
                return Err(DecodeError::Unencodable(tag.clone()))
            }
        };
        Ok(serde_json::to_string(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_map() -> GameMap {
        GameMap {
            level: vec![b'.', b'P', b'G'],
            width: 3,
            cell_width: 40,
            view_width: 3,
        }
    }

    #[test]
    fn decodes_client_acknowledged() {
        let text = r#"{"type":"ClientAcknowledged","role":"Spectator","map":{"level":[46,80,71],"width":3,"cellWidth":40,"viewWidth":3},"clientId":"c2"}"#;
        let msg = SignalingMessage::decode(text).unwrap();
        assert_eq!(
            msg,
            SignalingMessage::ClientAcknowledged {
                role: Role::Spectator,
                map: test_map(),
                client_id: "c2".to_string(),
            }
        );
    }

    #[test]
    fn decodes_peer_joined() {
        let msg = SignalingMessage::decode(r#"{"type":"PeerJoined","peerId":"c1"}"#).unwrap();
        assert_eq!(
            msg,
            SignalingMessage::PeerJoined {
                peer_id: "c1".to_string()
            }
        );
    }

    #[test]
    fn unknown_tag_is_unrecognized_not_an_error() {
        let msg = SignalingMessage::decode(r#"{"type":"ServerGossip","x":1}"#).unwrap();
        assert_eq!(msg, SignalingMessage::Unrecognized("ServerGossip".to_string()));

        let msg = PeerMessage::decode(r#"{"type":"Ping"}"#).unwrap();
        assert_eq!(msg, PeerMessage::Unrecognized("Ping".to_string()));
    }

    #[test]
    fn known_tag_with_missing_fields_is_an_error() {
        assert!(SignalingMessage::decode(r#"{"type":"PeerJoined"}"#).is_err());
        assert!(PeerMessage::decode(r#"{"type":"Delta"}"#).is_err());
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(SignalingMessage::decode("not json").is_err());
        assert!(SignalingMessage::decode(r#"{"no":"tag"}"#).is_err());
    }

    #[test]
    fn peer_frames_round_trip_as_number_arrays() {
        let msg = PeerMessage::Delta { data: vec![9] };
        let text = msg.encode().unwrap();
        assert_eq!(text, r#"{"type":"Delta","data":[9]}"#);
        assert_eq!(PeerMessage::decode(&text).unwrap(), msg);

        let msg = PeerMessage::InitialStateVector {
            data: vec![1, 2, 3],
        };
        let text = msg.encode().unwrap();
        assert_eq!(text, r#"{"type":"InitialStateVector","data":[1,2,3]}"#);
        assert_eq!(PeerMessage::decode(&text).unwrap(), msg);
    }

    #[test]
    fn unrecognized_frames_do_not_encode() {
        let msg = PeerMessage::Unrecognized("Ping".to_string());
        assert!(msg.encode().is_err());
    }

    #[test]
    fn bare_client_joined_stays_valid_on_the_wire() {
        let json = serde_json::to_string(&ClientMessage::ClientJoined { peer_addr: None }).unwrap();
        assert_eq!(json, r#"{"type":"ClientJoined"}"#);

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"ClientJoined"}"#).unwrap();
        let ClientMessage::ClientJoined { peer_addr } = msg;
        assert_eq!(peer_addr, None);
    }

    #[test]
    fn advertised_peer_addr_round_trips() {
        let msg = ClientMessage::ClientJoined {
            peer_addr: Some("127.0.0.1:9000".to_string()),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(
            json,
            r#"{"type":"ClientJoined","peerAddr":"127.0.0.1:9000"}"#
        );
    }
}
