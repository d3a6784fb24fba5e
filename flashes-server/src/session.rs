//! Player/Spectator slot bookkeeping for one session.

use tokio::sync::mpsc;

use flashes_net::protocol::{GameMap, Role};

use crate::maps::default_map;

/// One connected, acknowledged client.
#[derive(Debug, Clone)]
pub struct Client {
    /// Identity the server assigned (or the client advertised).
    pub id: String,
    /// Outgoing frame queue for this client's connection.
    pub sender: mpsc::UnboundedSender<String>,
}

/// The single session this server hosts: one player slot, one spectator
/// slot, one map. Roles are assigned strictly in arrival order.
#[derive(Debug)]
pub struct GameSession {
    player: Option<Client>,
    spectator: Option<Client>,
    map: GameMap,
}

impl Default for GameSession {
    fn default() -> Self {
        Self::new(default_map())
    }
}

impl GameSession {
    /// Session on the given map with both slots empty.
    pub fn new(map: GameMap) -> Self {
        Self {
            player: None,
            spectator: None,
            map,
        }
    }

    /// The map every acknowledged client receives.
    pub fn map(&self) -> &GameMap {
        &self.map
    }

    /// Seat a client: the first becomes the Player, the second the
    /// Spectator. Returns `None` when both slots are taken.
    pub fn assign(&mut self, client: Client) -> Option<Role> {
        if self.player.is_none() {
            self.player = Some(client);
            Some(Role::Player)
        } else if self.spectator.is_none() {
            self.spectator = Some(client);
            Some(Role::Spectator)
        } else {
            None
        }
    }

    /// Free whichever slot `id` holds. Returns the vacated role, if any.
    pub fn drop_client(&mut self, id: &str) -> Option<Role> {
        if self.player.as_ref().is_some_and(|c| c.id == id) {
            self.player = None;
            return Some(Role::Player);
        }
        if self.spectator.as_ref().is_some_and(|c| c.id == id) {
            self.spectator = None;
            return Some(Role::Spectator);
        }
        None
    }

    /// Both seated clients, player first, once both slots are filled.
    pub fn pair(&self) -> Option<(&Client, &Client)> {
        match (&self.player, &self.spectator) {
            (Some(player), Some(spectator)) => Some((player, spectator)),
            _ => None,
        }
    }
}
