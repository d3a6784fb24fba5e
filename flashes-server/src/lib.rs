//! # Flashes Signaling Server
//!
//! Rendezvous point for exactly one Player and one Spectator. Clients
//! announce themselves over WebSocket; the server assigns roles in arrival
//! order, hands out the session map, and introduces the two once both
//! slots are filled. Gameplay traffic never passes through here.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     FLASHES SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  maps.rs     - Glyph alphabet and the default level         │
//! │  protocol.rs - Server-side signaling frames                 │
//! │  session.rs  - Player/Spectator slot bookkeeping            │
//! │  server.rs   - WebSocket accept loop and handshake          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod maps;
pub mod protocol;
pub mod server;
pub mod session;

pub use server::{ServerConfig, ServerError, SignalServer};
