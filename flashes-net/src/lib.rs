//! # Flashes Networking Core
//!
//! Connection and state-synchronization core for Flashes sessions: exactly
//! one Player and one Spectator are introduced through a signaling server,
//! then exchange world state over a direct peer channel.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       FLASHES NET                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  protocol.rs  - Tagged JSON message types                   │
//! │  status.rs    - Waiting/Connected/Disconnected status cell  │
//! │  signaling.rs - WebSocket signaling client                  │
//! │  peer/        - Direct peer channel                         │
//! │  ├── mod.rs   - Connector trait and transport task          │
//! │  ├── memory.rs- In-process connector (tests, demos)         │
//! │  └── ws.rs    - Direct WebSocket connector                  │
//! │  manager.rs   - Connection manager (two ordered sequences)  │
//! │  engine.rs    - Simulation engine interface                 │
//! │  sync.rs      - Session orchestrator                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! A client connects to the signaling server and announces itself; the
//! server assigns a role (first client is the Player, second the Spectator)
//! and, once both slots are filled, introduces the two. The Player dials
//! the Spectator directly, the signaling link is closed, and from then on
//! the Player streams its authoritative state as one full snapshot plus
//! ordered incremental deltas. A snapshot that arrives before the local
//! session starts is held pending and applied before any delta.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod engine;
pub mod manager;
pub mod peer;
pub mod protocol;
pub mod signaling;
pub mod status;
pub mod sync;

pub use engine::SimulationEngine;
pub use manager::ConnectionManager;
pub use peer::{PeerChannel, PeerConnector, PeerError};
pub use protocol::{ClientMessage, GameMap, PeerMessage, Role, SignalingMessage};
pub use signaling::{SignalingClient, SignalingConfig, SignalingError};
pub use status::{ConnectionStatus, StatusCell};
pub use sync::{SessionHandle, SyncSession};
