//! Flashes demo client
//!
//! Connects to a signaling server, takes whichever role it is assigned and
//! drives a minimal console engine. The player turns stdin lines into
//! deltas; the spectator prints every frame its mirrored engine produces.
//!
//! ```text
//! flashes-client [ws://host:port] --peer-addr 127.0.0.1:9001
//! ```
//!
//! `--peer-addr` is the address this client listens on for the direct peer
//! channel; it must be reachable by the other client.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use flashes_net::peer::ws::WsConnector;
use flashes_net::protocol::{GameMap, Role};
use flashes_net::signaling::SignalingConfig;
use flashes_net::status::ConnectionStatus;
use flashes_net::sync::{SessionHandle, SyncSession};
use flashes_net::SimulationEngine;

const DEFAULT_SERVER: &str = "ws://127.0.0.1:8080";

/// Toy engine for the demo: state is a byte buffer, a snapshot replaces it,
/// a delta appends a line to it.
struct ConsoleEngine {
    state: Vec<u8>,
}

impl ConsoleEngine {
    fn new(map: &GameMap) -> Self {
        info!(
            "engine created for a {}x{} map",
            map.width,
            map.level.len() / map.width.max(1) as usize
        );
        Self { state: Vec::new() }
    }
}

impl SimulationEngine for ConsoleEngine {
    fn apply_initial_state_vector(&mut self, bytes: &[u8]) {
        self.state = bytes.to_vec();
    }

    fn apply_delta(&mut self, bytes: &[u8]) {
        self.state.extend_from_slice(bytes);
        self.state.push(b'\n');
    }

    fn advance_tick(&mut self) -> Vec<u8> {
        self.state.clone()
    }
}

struct Args {
    server: String,
    peer_addr: Option<String>,
}

fn parse_args() -> Result<Args> {
    let mut server = DEFAULT_SERVER.to_string();
    let mut peer_addr = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--peer-addr" => {
                peer_addr = Some(args.next().context("--peer-addr needs a value")?);
            }
            "--help" | "-h" => {
                println!("usage: flashes-client [ws://host:port] --peer-addr host:port");
                std::process::exit(0);
            }
            url if url.starts_with("ws://") || url.starts_with("wss://") => {
                server = url.to_string();
            }
            other => bail!("unrecognized argument: {other}"),
        }
    }
    Ok(Args { server, peer_addr })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = parse_args()?;
    let peer_addr = args
        .peer_addr
        .context("--peer-addr is required so the remote side can dial this client")?;

    let config = SignalingConfig::new(&args.server).with_peer_addr(&peer_addr);
    info!("joining session at {}", args.server);

    let (session, handle) =
        SyncSession::connect(&config, WsConnector::new(), |map: &GameMap| {
            ConsoleEngine::new(map)
        })
        .await
        .context("could not reach the signaling server")?;
    tokio::spawn(session.run());

    let role = wait_for_role(&handle).await?;
    info!(?role, "role assigned, waiting for the peer");
    wait_until_connected(&handle).await?;

    handle.start_session();
    info!("session started");

    match role {
        Role::Player => run_player(handle).await,
        Role::Spectator => run_spectator(handle).await,
    }
}

async fn wait_for_role(handle: &SessionHandle) -> Result<Role> {
    let mut roles = handle.role_updates();
    loop {
        if let Some(role) = *roles.borrow_and_update() {
            return Ok(role);
        }
        roles
            .changed()
            .await
            .map_err(|_| anyhow::anyhow!("session ended before a role was assigned"))?;
    }
}

async fn wait_until_connected(handle: &SessionHandle) -> Result<()> {
    loop {
        match handle.status() {
            ConnectionStatus::Connected => return Ok(()),
            ConnectionStatus::Disconnected => bail!("peer connection failed"),
            ConnectionStatus::Waiting => tokio::time::sleep(Duration::from_millis(100)).await,
        }
    }
}

/// The player seeds the spectator with a snapshot, then turns every stdin
/// line into a delta.
async fn run_player(handle: SessionHandle) -> Result<()> {
    handle.send_initial_state(b"=== session log ===\n".to_vec());
    println!("type lines to broadcast them to the spectator (ctrl-d to quit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if handle.status() == ConnectionStatus::Disconnected {
            bail!("peer disconnected");
        }
        handle.send_delta(line.into_bytes());
    }
    Ok(())
}

/// The spectator prints each frame its engine produces.
async fn run_spectator(handle: SessionHandle) -> Result<()> {
    let mut frames = handle.frames();
    loop {
        if frames.changed().await.is_err() {
            bail!("session ended");
        }
        if let Some(frame) = frames.borrow_and_update().clone() {
            println!("--- frame ---");
            print!("{}", String::from_utf8_lossy(&frame));
        }
        if handle.status() == ConnectionStatus::Disconnected {
            info!("peer disconnected, exiting");
            return Ok(());
        }
    }
}
