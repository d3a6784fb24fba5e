//! Synchronization Orchestrator
//!
//! Consumes the two message sequences produced by the connection manager
//! and drives the session lifecycle: record the handshake results, bring up
//! the peer transport on introduction, then keep the local world state in
//! step with the remote side. The spectator path owns the one correctness
//! property everything else exists for: a snapshot received early is held
//! pending and applied before any delta touches the engine.
//!
//! All session state lives in a single event loop (one `select!` over the
//! signaling sequence, the peer sequence and the command channel), so there
//! is exactly one mutating path and no locking. User-facing actions arrive
//! as commands through a cloneable [`SessionHandle`].

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::engine::SimulationEngine;
use crate::manager::ConnectionManager;
use crate::peer::PeerConnector;
use crate::protocol::{GameMap, PeerMessage, Role, SignalingMessage};
use crate::signaling::{SignalingConfig, SignalingError};
use crate::status::{ConnectionStatus, StatusCell};

enum Command {
    StartSession,
    SendDelta(Vec<u8>),
    SendInitialState(Vec<u8>),
}

/// Cloneable handle to a running session.
///
/// Commands are fire-and-forget; once the session loop is gone they are
/// silently dropped, matching the best-effort contract of the peer channel.
#[derive(Clone)]
pub struct SessionHandle {
    cmd: mpsc::UnboundedSender<Command>,
    status: Arc<StatusCell>,
    role: watch::Receiver<Option<Role>>,
    frames: watch::Receiver<Option<Vec<u8>>>,
}

impl SessionHandle {
    /// Construct the local engine and begin playing/observing. Triggered by
    /// a user action, never by a network event.
    pub fn start_session(&self) {
        let _ = self.cmd.send(Command::StartSession);
    }

    /// Send an incremental state mutation to the peer. Best-effort.
    pub fn send_delta(&self, bytes: Vec<u8>) {
        let _ = self.cmd.send(Command::SendDelta(bytes));
    }

    /// Send a full state snapshot to the peer. Best-effort, and a no-op for
    /// spectators, which never transmit snapshots.
    pub fn send_initial_state(&self, bytes: Vec<u8>) {
        let _ = self.cmd.send(Command::SendInitialState(bytes));
    }

    /// Current peer-link status.
    pub fn status(&self) -> ConnectionStatus {
        self.status.get()
    }

    /// Role assigned by the signaling server, once known.
    pub fn role(&self) -> Option<Role> {
        *self.role.borrow()
    }

    /// Watch for the role assignment.
    pub fn role_updates(&self) -> watch::Receiver<Option<Role>> {
        self.role.clone()
    }

    /// Watch the per-tick world-state readout the engine produces. The core
    /// forwards it verbatim; rendering is the observer's business.
    pub fn frames(&self) -> watch::Receiver<Option<Vec<u8>>> {
        self.frames.clone()
    }
}

/// The session state machine. Create with [`SyncSession::connect`], then
/// drive it to completion with [`SyncSession::run`] (typically spawned).
pub struct SyncSession<E, C, F>
where
    E: SimulationEngine,
    C: PeerConnector,
    F: FnMut(&GameMap) -> E + Send + 'static,
{
    manager: ConnectionManager<C>,
    server_rx: mpsc::UnboundedReceiver<SignalingMessage>,
    peer_rx: mpsc::UnboundedReceiver<PeerMessage>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    status: Arc<StatusCell>,
    role_tx: watch::Sender<Option<Role>>,
    frames_tx: watch::Sender<Option<Vec<u8>>>,
    factory: F,

    role: Option<Role>,
    client_id: Option<String>,
    map: Option<GameMap>,
    engine: Option<E>,
    pending_snapshot: Option<Vec<u8>>,
}

impl<E, C, F> SyncSession<E, C, F>
where
    E: SimulationEngine,
    C: PeerConnector,
    F: FnMut(&GameMap) -> E + Send + 'static,
{
    /// Connect to the signaling server and assemble the session. `factory`
    /// builds the simulation engine from the agreed map at session start.
    pub async fn connect(
        config: &SignalingConfig,
        connector: C,
        factory: F,
    ) -> Result<(Self, SessionHandle), SignalingError> {
        let manager = ConnectionManager::connect(config, connector).await?;
        Ok(Self::assemble(manager, factory))
    }

    fn assemble(mut manager: ConnectionManager<C>, factory: F) -> (Self, SessionHandle) {
        let server_rx = manager
            .server_messages()
            .expect("fresh manager owns its sequences");
        let peer_rx = manager
            .peer_messages()
            .expect("fresh manager owns its sequences");
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (role_tx, role_rx) = watch::channel(None);
        let (frames_tx, frames_rx) = watch::channel(None);
        let status = manager.status_cell();

        let handle = SessionHandle {
            cmd: cmd_tx,
            status: status.clone(),
            role: role_rx,
            frames: frames_rx,
        };
        let session = Self {
            manager,
            server_rx,
            peer_rx,
            cmd_rx,
            status,
            role_tx,
            frames_tx,
            factory,
            role: None,
            client_id: None,
            map: None,
            engine: None,
            pending_snapshot: None,
        };
        (session, handle)
    }

    /// Drive the session until every handle is dropped. Sequence
    /// terminations are not fatal by themselves: a disconnected session
    /// stays observable so presentation can show the terminal status.
    pub async fn run(mut self) {
        let mut server_open = true;
        let mut peer_open = true;
        loop {
            tokio::select! {
                msg = self.server_rx.recv(), if server_open => match msg {
                    Some(msg) => self.handle_signaling(msg).await,
                    None => server_open = false,
                },
                msg = self.peer_rx.recv(), if peer_open => match msg {
                    Some(msg) => self.handle_peer(msg),
                    None => {
                        debug!("peer message sequence ended");
                        peer_open = false;
                    }
                },
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
            }
        }
    }

    async fn handle_signaling(&mut self, msg: SignalingMessage) {
        match msg {
            SignalingMessage::ClientAcknowledged {
                role,
                map,
                client_id,
            } => {
                info!(?role, %client_id, "acknowledged by signaling server");
                self.role = Some(role);
                self.map = Some(map);
                self.client_id = Some(client_id);
                self.role_tx.send_replace(Some(role));
            }
            SignalingMessage::PeerJoined { peer_id } => {
                let Some(role) = self.role else {
                    warn!("PeerJoined before acknowledgement; discarding");
                    return;
                };
                info!(%peer_id, "peer joined");
                if role.is_player() {
                    // ready to dial; reflect that optimistically
                    self.status.set(ConnectionStatus::Connected);
                }
                let local_id = self.client_id.clone().unwrap_or_default();
                let dial_target = if role.is_player() {
                    Some(peer_id.as_str())
                } else {
                    None
                };
                if let Err(e) = self.manager.initialize_peer(&local_id, dial_target) {
                    error!("peer transport initialization failed: {e}");
                    self.status.set(ConnectionStatus::Disconnected);
                }
                // the introduction is done; everything else happens over
                // the peer channel
                self.manager.close_signaling().await;
            }
            SignalingMessage::Unrecognized(tag) => {
                warn!(%tag, "unexpected signaling message type")
            }
        }
    }

    fn handle_peer(&mut self, msg: PeerMessage) {
        match msg {
            PeerMessage::InitialStateVector { data } => {
                if data.is_empty() {
                    warn!("discarding empty initial state vector");
                    return;
                }
                if self.role == Some(Role::Player) {
                    // players are the source of truth and never accept one
                    debug!("ignoring initial state vector on the player side");
                    return;
                }
                match self.engine.as_mut() {
                    Some(engine) => {
                        engine.apply_initial_state_vector(&data);
                        let frame = engine.advance_tick();
                        self.frames_tx.send_replace(Some(frame));
                    }
                    None => {
                        // latest wins; a snapshot fully supersedes state
                        self.pending_snapshot = Some(data);
                    }
                }
            }
            PeerMessage::Delta { data } => {
                if data.is_empty() {
                    warn!("discarding empty delta");
                    return;
                }
                match self.engine.as_mut() {
                    Some(engine) => {
                        engine.apply_delta(&data);
                        let frame = engine.advance_tick();
                        self.frames_tx.send_replace(Some(frame));
                    }
                    None => warn!("delta received before session start; dropping"),
                }
            }
            PeerMessage::Unrecognized(tag) => {
                warn!(%tag, "unexpected peer message type")
            }
        }
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::StartSession => self.start_session(),
            Command::SendDelta(bytes) => {
                self.manager.send_to_peer(&PeerMessage::Delta { data: bytes });
            }
            Command::SendInitialState(bytes) => {
                if self.role == Some(Role::Spectator) {
                    debug!("spectators do not transmit snapshots");
                    return;
                }
                self.manager
                    .send_to_peer(&PeerMessage::InitialStateVector { data: bytes });
            }
        }
    }

    /// Construct the engine from the agreed map. For a spectator, any
    /// pending snapshot is applied before the first tick, so no delta can
    /// ever land on a stale or absent base state.
    fn start_session(&mut self) {
        if self.engine.is_some() {
            debug!("session already started");
            return;
        }
        let Some(map) = self.map.as_ref() else {
            warn!("cannot start the session before the map is known");
            return;
        };
        let mut engine = (self.factory)(map);
        if self.role == Some(Role::Spectator) {
            if let Some(snapshot) = self.pending_snapshot.take() {
                engine.apply_initial_state_vector(&snapshot);
            }
        }
        let frame = engine.advance_tick();
        self.frames_tx.send_replace(Some(frame));
        self.engine = Some(engine);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::memory::{MemoryConnector, MemoryHub};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Clone, Debug, PartialEq)]
    enum Call {
        Created(GameMap),
        Snapshot(Vec<u8>),
        Delta(Vec<u8>),
        Tick,
    }

    #[derive(Clone, Default)]
    struct CallLog(Arc<Mutex<Vec<Call>>>);

    impl CallLog {
        fn push(&self, call: Call) {
            self.0.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<Call> {
            self.0.lock().unwrap().clone()
        }

        /// Calls with ticks filtered out, for order assertions.
        fn applied(&self) -> Vec<Call> {
            self.calls()
                .into_iter()
                .filter(|c| !matches!(c, Call::Tick))
                .collect()
        }
    }

    struct MockEngine {
        log: CallLog,
    }

    impl SimulationEngine for MockEngine {
        fn apply_initial_state_vector(&mut self, bytes: &[u8]) {
            self.log.push(Call::Snapshot(bytes.to_vec()));
        }

        fn apply_delta(&mut self, bytes: &[u8]) {
            self.log.push(Call::Delta(bytes.to_vec()));
        }

        fn advance_tick(&mut self) -> Vec<u8> {
            self.log.push(Call::Tick);
            vec![]
        }
    }

    type TestSession =
        SyncSession<MockEngine, MemoryConnector, Box<dyn FnMut(&GameMap) -> MockEngine + Send>>;

    struct Harness {
        handle: SessionHandle,
        server_tx: mpsc::UnboundedSender<SignalingMessage>,
        peer_tx: mpsc::UnboundedSender<PeerMessage>,
        log: CallLog,
        hub: MemoryHub,
    }

    fn harness() -> Harness {
        let hub = MemoryHub::new();
        let (manager, server_tx, peer_tx) = ConnectionManager::stub(hub.connector());
        let log = CallLog::default();
        let factory_log = log.clone();
        let factory: Box<dyn FnMut(&GameMap) -> MockEngine + Send> = Box::new(move |map| {
            factory_log.push(Call::Created(map.clone()));
            MockEngine {
                log: factory_log.clone(),
            }
        });
        let (session, handle): (TestSession, _) = SyncSession::assemble(manager, factory);
        tokio::spawn(session.run());
        Harness {
            handle,
            server_tx,
            peer_tx,
            log,
            hub,
        }
    }

    fn test_map() -> GameMap {
        GameMap {
            level: vec![b'.', b'P'],
            width: 2,
            cell_width: 40,
            view_width: 2,
        }
    }

    fn acknowledge(h: &Harness, role: Role, client_id: &str) {
        h.server_tx
            .send(SignalingMessage::ClientAcknowledged {
                role,
                map: test_map(),
                client_id: client_id.to_string(),
            })
            .unwrap();
    }

    fn peer_joined(h: &Harness, peer_id: &str) {
        h.server_tx
            .send(SignalingMessage::PeerJoined {
                peer_id: peer_id.to_string(),
            })
            .unwrap();
    }

    /// Let the session loop drain everything queued so far.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(30)).await;
    }

    #[tokio::test]
    async fn spectator_applies_pending_snapshot_before_first_delta() {
        let h = harness();

        acknowledge(&h, Role::Spectator, "c2");
        peer_joined(&h, "c1");
        settle().await;

        // snapshot arrives before the engine exists
        h.peer_tx
            .send(PeerMessage::InitialStateVector {
                data: vec![1, 2, 3],
            })
            .unwrap();
        settle().await;
        assert_eq!(h.log.calls(), vec![]);

        h.handle.start_session();
        settle().await;
        h.peer_tx
            .send(PeerMessage::Delta { data: vec![9] })
            .unwrap();
        settle().await;

        assert_eq!(
            h.log.applied(),
            vec![
                Call::Created(test_map()),
                Call::Snapshot(vec![1, 2, 3]),
                Call::Delta(vec![9]),
            ]
        );
    }

    #[tokio::test]
    async fn player_never_applies_a_snapshot() {
        let h = harness();

        acknowledge(&h, Role::Player, "c1");
        peer_joined(&h, "c2");
        settle().await;
        assert_eq!(h.handle.status(), ConnectionStatus::Connected);

        h.handle.start_session();
        h.peer_tx
            .send(PeerMessage::InitialStateVector { data: vec![4, 5] })
            .unwrap();
        settle().await;

        assert!(h
            .log
            .calls()
            .iter()
            .all(|c| !matches!(c, Call::Snapshot(_))));
    }

    #[tokio::test]
    async fn delta_before_session_start_is_dropped() {
        let h = harness();

        acknowledge(&h, Role::Spectator, "c2");
        h.peer_tx
            .send(PeerMessage::Delta { data: vec![7] })
            .unwrap();
        settle().await;

        h.handle.start_session();
        settle().await;

        assert_eq!(h.log.applied(), vec![Call::Created(test_map())]);
    }

    #[tokio::test]
    async fn latest_pending_snapshot_supersedes_earlier_ones() {
        let h = harness();

        acknowledge(&h, Role::Spectator, "c2");
        h.peer_tx
            .send(PeerMessage::InitialStateVector { data: vec![1] })
            .unwrap();
        h.peer_tx
            .send(PeerMessage::InitialStateVector { data: vec![2] })
            .unwrap();
        settle().await;
        h.handle.start_session();
        settle().await;

        assert_eq!(
            h.log.applied(),
            vec![Call::Created(test_map()), Call::Snapshot(vec![2])]
        );
    }

    #[tokio::test]
    async fn snapshot_after_session_start_applies_immediately() {
        let h = harness();

        acknowledge(&h, Role::Spectator, "c2");
        settle().await;
        h.handle.start_session();
        settle().await;
        h.peer_tx
            .send(PeerMessage::InitialStateVector { data: vec![8] })
            .unwrap();
        settle().await;

        assert_eq!(
            h.log.applied(),
            vec![Call::Created(test_map()), Call::Snapshot(vec![8])]
        );
    }

    #[tokio::test]
    async fn empty_payloads_are_protocol_violations_and_discarded() {
        let h = harness();

        acknowledge(&h, Role::Spectator, "c2");
        h.peer_tx
            .send(PeerMessage::InitialStateVector { data: vec![] })
            .unwrap();
        settle().await;
        h.handle.start_session();
        settle().await;
        h.peer_tx.send(PeerMessage::Delta { data: vec![] }).unwrap();
        settle().await;

        assert_eq!(h.log.applied(), vec![Call::Created(test_map())]);
    }

    #[tokio::test]
    async fn session_start_before_map_is_known_does_nothing() {
        let h = harness();
        h.handle.start_session();
        settle().await;
        assert_eq!(h.log.calls(), vec![]);

        acknowledge(&h, Role::Spectator, "c2");
        settle().await;
        h.handle.start_session();
        settle().await;
        assert_eq!(h.log.applied(), vec![Call::Created(test_map())]);
    }

    #[tokio::test]
    async fn spectator_never_transmits_a_snapshot() {
        let h = harness();

        acknowledge(&h, Role::Spectator, "c2");
        peer_joined(&h, "c1");
        settle().await;

        // pose as the remote player by dialing the spectator's endpoint
        let mut dialer = h.hub.connector();
        let mut channel = dialer.dial("c2").await.unwrap();
        settle().await;

        h.handle.send_initial_state(vec![1, 2, 3]);
        h.handle.send_delta(vec![5]);

        // only the delta makes it onto the wire
        let frame = channel.rx.recv().await.unwrap();
        assert_eq!(
            PeerMessage::decode(&frame).unwrap(),
            PeerMessage::Delta { data: vec![5] }
        );
    }

    #[tokio::test]
    async fn unrecognized_messages_do_not_disturb_the_session() {
        let h = harness();

        h.server_tx
            .send(SignalingMessage::Unrecognized("Gossip".to_string()))
            .unwrap();
        acknowledge(&h, Role::Spectator, "c2");
        h.peer_tx
            .send(PeerMessage::Unrecognized("Ping".to_string()))
            .unwrap();
        settle().await;

        h.handle.start_session();
        settle().await;
        assert_eq!(h.log.applied(), vec![Call::Created(test_map())]);
        assert_eq!(h.handle.role(), Some(Role::Spectator));
    }

    #[tokio::test]
    async fn starting_twice_constructs_one_engine() {
        let h = harness();

        acknowledge(&h, Role::Player, "c1");
        settle().await;
        h.handle.start_session();
        h.handle.start_session();
        settle().await;

        let created = h
            .log
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::Created(_)))
            .count();
        assert_eq!(created, 1);
    }

    #[tokio::test]
    async fn role_is_observable_through_the_handle() {
        let h = harness();
        assert_eq!(h.handle.role(), None);
        acknowledge(&h, Role::Player, "c1");
        settle().await;
        assert_eq!(h.handle.role(), Some(Role::Player));
    }
}
