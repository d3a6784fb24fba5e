//! Peer-link status tracking.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// State of the direct peer link (not the signaling link).
///
/// Legal transitions: `Waiting -> Connected -> Disconnected` or
/// `Waiting -> Disconnected`. `Disconnected` is terminal for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No peer channel established yet.
    Waiting,
    /// Peer channel carrying application messages.
    Connected,
    /// Peer channel closed or failed. No automatic reconnection.
    Disconnected,
}

/// Shared status cell, readable at any time by the presentation layer.
///
/// The transport tasks run on the tokio worker pool, so the cell is atomic
/// rather than relying on a single mutating thread. The terminal nature of
/// `Disconnected` is enforced here, not at the call sites.
#[derive(Debug)]
pub struct StatusCell(AtomicU8);

const WAITING: u8 = 0;
const CONNECTED: u8 = 1;
const DISCONNECTED: u8 = 2;

impl StatusCell {
    /// New cell in the initial `Waiting` state.
    pub fn new() -> Arc<Self> {
        Arc::new(Self(AtomicU8::new(WAITING)))
    }

    /// Current status.
    pub fn get(&self) -> ConnectionStatus {
        match self.0.load(Ordering::Acquire) {
            CONNECTED => ConnectionStatus::Connected,
            DISCONNECTED => ConnectionStatus::Disconnected,
            _ => ConnectionStatus::Waiting,
        }
    }

    /// Transition to `next`. Returns false if refused: the status only
    /// moves forward along `Waiting -> Connected -> Disconnected`, and once
    /// the cell reads `Disconnected` no later write can revive the link.
    pub fn set(&self, next: ConnectionStatus) -> bool {
        let next = match next {
            ConnectionStatus::Waiting => WAITING,
            ConnectionStatus::Connected => CONNECTED,
            ConnectionStatus::Disconnected => DISCONNECTED,
        };
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != DISCONNECTED && next >= current).then_some(next)
            })
            .is_ok()
    }
}
