//! In-process peer connector.
//!
//! Identities live in a shared registry; dialing one yields a pair of mpsc
//! channels whose far end is handed to that identity's acceptor. Used by
//! tests and single-process demos, where both clients share one hub.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{PeerChannel, PeerConnector, PeerError};

/// How long a dialer waits for the remote endpoint to register. Stands in
/// for the negotiation latency a real broker would absorb.
const DIAL_ATTEMPTS: u32 = 20;
const DIAL_RETRY: Duration = Duration::from_millis(25);

type Registry = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<PeerChannel>>>>;

/// Shared registry of reachable in-process endpoints.
#[derive(Clone, Default)]
pub struct MemoryHub {
    registry: Registry,
}

impl MemoryHub {
    /// Empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector attached to this hub.
    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector { hub: self.clone() }
    }

    fn acceptor(&self, id: &str) -> Option<mpsc::UnboundedSender<PeerChannel>> {
        self.registry
            .lock()
            .ok()
            .and_then(|reg| reg.get(id).cloned())
    }
}

/// Connector over a [`MemoryHub`]. Identity strings are arbitrary.
pub struct MemoryConnector {
    hub: MemoryHub,
}

#[async_trait]
impl PeerConnector for MemoryConnector {
    async fn open(
        &mut self,
        local_id: &str,
    ) -> Result<mpsc::UnboundedReceiver<PeerChannel>, PeerError> {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.hub.registry.lock() {
            Ok(mut reg) => {
                reg.insert(local_id.to_string(), tx);
                Ok(rx)
            }
            Err(_) => Err(PeerError::BadIdentity(local_id.to_string())),
        }
    }

    async fn dial(&mut self, remote_id: &str) -> Result<PeerChannel, PeerError> {
        for _ in 0..DIAL_ATTEMPTS {
            if let Some(acceptor) = self.hub.acceptor(remote_id) {
                let (local_tx, remote_rx) = mpsc::unbounded_channel();
                let (remote_tx, local_rx) = mpsc::unbounded_channel();
                let remote = PeerChannel {
                    tx: remote_tx,
                    rx: remote_rx,
                };
                if acceptor.send(remote).is_err() {
                    return Err(PeerError::Dial(remote_id.to_string()));
                }
                return Ok(PeerChannel {
                    tx: local_tx,
                    rx: local_rx,
                });
            }
            tokio::time::sleep(DIAL_RETRY).await;
        }
        Err(PeerError::Dial(remote_id.to_string()))
    }
}
