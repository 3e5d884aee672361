//! Connected-client bookkeeping and the per-session protocol operations.
//!
//! This module handles the server-side view of every connected client:
//! - Session lifecycle (connecting, active, closed)
//! - Identity assignment and the last position each client reported
//! - Snapshot and delta fan-out through per-session outbound queues
//!
//! Outbound messages are queued with `try_send`, never awaited, so a slow
//! client drops its own updates instead of stalling the broadcaster.

use crate::world::World;
use log::{debug, info, warn};
use shared::{ClientMessage, ServerMessage, Vector2};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// Per-session outbound queue depth. Snapshots beyond this are dropped.
pub const OUTBOUND_QUEUE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closed,
}

/// Server-side record for one connected client
#[derive(Debug)]
pub struct Session {
    /// Identifier announced to the client with `ID:`
    pub id: u32,
    pub addr: SocketAddr,
    /// Last position the client reported
    pub position: Vector2,
    pub connected_at: Instant,
    state: SessionState,
    outbound: mpsc::Sender<String>,
}

impl Session {
    pub fn new(
        id: u32,
        addr: SocketAddr,
        position: Vector2,
        outbound: mpsc::Sender<String>,
    ) -> Self {
        Self {
            id,
            addr,
            position,
            connected_at: Instant::now(),
            state: SessionState::Connecting,
            outbound,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Moves a connecting session to active. Returns false from any other state.
    pub fn activate(&mut self) -> bool {
        if self.state == SessionState::Connecting {
            self.state = SessionState::Active;
            true
        } else {
            false
        }
    }

    /// Closes the session. Returns true only for the call that closed it.
    pub fn close(&mut self) -> bool {
        if self.state == SessionState::Closed {
            false
        } else {
            self.state = SessionState::Closed;
            true
        }
    }

    /// Queues `message` without waiting. Closed sessions and full queues drop it.
    pub fn send(&self, message: String) -> bool {
        if self.state == SessionState::Closed {
            return false;
        }
        match self.outbound.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("Outbound queue full for session {}, dropping message", self.id);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// Ordered collection of sessions plus the counter that hands out their ids
pub struct SessionRegistry {
    sessions: BTreeMap<u32, Session>,
    next_session_id: u32,
    max_sessions: Option<usize>,
    spawn: Vector2,
}

impl SessionRegistry {
    /// Creates an empty registry. Ids start from 1.
    pub fn new(max_sessions: Option<usize>, spawn: Vector2) -> Self {
        Self {
            sessions: BTreeMap::new(),
            next_session_id: 1,
            max_sessions,
            spawn,
        }
    }

    /// Registers a new connection and makes it active.
    ///
    /// The `ID:` announcement is queued before the session becomes visible to
    /// the broadcaster, so it is always the first thing the client reads.
    /// Returns None when the registry is at capacity.
    pub fn register(&mut self, addr: SocketAddr, outbound: mpsc::Sender<String>) -> Option<u32> {
        if let Some(max) = self.max_sessions {
            if self.sessions.len() >= max {
                return None;
            }
        }

        let id = self.next_session_id;
        self.next_session_id += 1;

        let mut session = Session::new(id, addr, self.spawn, outbound);
        session.send(ServerMessage::Welcome { client_id: id }.encode());
        session.activate();

        info!("Client {} connected from {}", id, addr);
        self.sessions.insert(id, session);
        Some(id)
    }

    /// Closes and removes a session. Returns None if it was already gone.
    pub fn remove(&mut self, id: u32) -> Option<Session> {
        let mut session = self.sessions.remove(&id)?;
        session.close();
        info!(
            "Client {} disconnected after {:.1}s",
            id,
            session.connected_at.elapsed().as_secs_f32()
        );
        Some(session)
    }

    pub fn get(&self, id: u32) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// Records a reported position. Returns false for unknown or inactive sessions.
    pub fn update_position(&mut self, id: u32, x: f64, y: f64) -> bool {
        match self.sessions.get_mut(&id) {
            Some(session) if session.is_active() => {
                session.position = Vector2::new(x, y);
                true
            }
            _ => false,
        }
    }

    pub fn active(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values().filter(|s| s.is_active())
    }

    /// Queues `message` on every active session except `exclude`.
    /// Returns how many sessions accepted it.
    pub fn fan_out(&self, message: &str, exclude: Option<u32>) -> usize {
        self.active()
            .filter(|s| Some(s.id) != exclude)
            .filter(|s| s.send(message.to_string()))
            .count()
    }

    /// Appends a `C:` record for every active session other than `viewer`.
    pub fn write_peers(&self, viewer: u32, out: &mut String) {
        for peer in self.active().filter(|s| s.id != viewer) {
            ServerMessage::Peer {
                client_id: peer.id,
                x: peer.position.x,
                y: peer.position.y,
            }
            .write_to(out);
        }
    }

    pub fn ids(&self) -> Vec<u32> {
        self.sessions.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(None, Vector2::default())
    }
}

/// Protocol operations for connected clients, bound to the shared world.
#[derive(Clone)]
pub struct SessionManager {
    world: Arc<World>,
}

impl SessionManager {
    pub fn new(world: Arc<World>) -> Self {
        Self { world }
    }

    pub fn world(&self) -> &Arc<World> {
        &self.world
    }

    /// Registers a connection, queues its `ID:` and an initial snapshot.
    ///
    /// Returns the session id and the receiving end of its outbound queue, or
    /// None when the server is full.
    pub async fn on_connect(&self, addr: SocketAddr) -> Option<(u32, mpsc::Receiver<String>)> {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        let id = self.world.sessions().write().await.register(addr, tx)?;
        self.send_snapshot(id).await;
        Some((id, rx))
    }

    /// Encodes the world part of a snapshot off the async workers.
    async fn encode_world(&self, tick: u64) -> Option<String> {
        match self.world.run_blocking(move |world| world.encode_world(tick)).await {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!("Snapshot encoding for tick {} failed: {}", tick, e);
                None
            }
        }
    }

    /// Queues a full snapshot for one session.
    pub async fn send_snapshot(&self, id: u32) -> bool {
        let Some(mut frame) = self.encode_world(self.world.tick()).await else {
            return false;
        };
        let sessions = self.world.sessions().read().await;
        match sessions.get(id) {
            Some(session) if session.is_active() => {
                sessions.write_peers(id, &mut frame);
                frame.push('\n');
                session.send(frame)
            }
            _ => false,
        }
    }

    /// Queues the snapshot for `tick` on every active session.
    ///
    /// The world part is encoded once; each session then gets its own peer list.
    pub async fn broadcast_snapshot(&self, tick: u64) -> usize {
        let Some(world_frame) = self.encode_world(tick).await else {
            return 0;
        };
        let sessions = self.world.sessions().read().await;

        sessions
            .active()
            .filter(|session| {
                let mut frame = world_frame.clone();
                sessions.write_peers(session.id, &mut frame);
                frame.push('\n');
                session.send(frame)
            })
            .count()
    }

    /// Handles one inbound frame. Anything other than a valid MOVE is ignored.
    pub async fn on_inbound_message(&self, id: u32, frame: &str) -> Option<ClientMessage> {
        let message = match ClientMessage::decode(frame) {
            Ok(message) => message,
            Err(e) => {
                debug!("Ignoring frame from client {}: {}", id, e);
                return None;
            }
        };

        match message {
            ClientMessage::Move { x, y } => {
                // The write guard spans the fan-out so peers see moves in arrival order.
                let mut sessions = self.world.sessions().write().await;
                if !sessions.update_position(id, x, y) {
                    warn!("Move from unknown client {}", id);
                    return None;
                }
                let delta = ServerMessage::Peer { client_id: id, x, y }.encode();
                sessions.fan_out(&delta, Some(id));
            }
        }

        Some(message)
    }

    /// Closes and removes a session, then tells everyone else it is gone.
    /// Safe to call more than once.
    pub async fn on_disconnect(&self, id: u32) -> bool {
        let mut sessions = self.world.sessions().write().await;
        if sessions.remove(id).is_none() {
            return false;
        }
        sessions.fan_out(&ServerMessage::PeerGone { client_id: id }.encode(), None);
        true
    }
}
