//! Client-side mirror of the server world, rebuilt from protocol messages.

use log::{debug, info};
use shared::{Bounds, ClientMessage, Particle, ServerMessage, Vector2, Wall};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct ClientWorld {
    pub client_id: Option<u32>,
    /// Tick of the last snapshot header received
    pub tick: u64,
    /// Own sprite position, reported to the server with MOVE
    pub position: Vector2,
    bounds: Bounds,
    particles: Vec<Particle>,
    walls: Vec<Wall>,
    peers: BTreeMap<u32, Vector2>,
    snapshots: u64,
    /// Snapshot whose closing newline has not arrived yet
    pending: Option<PendingSnapshot>,
}

#[derive(Debug, Clone, Default)]
struct PendingSnapshot {
    tick: u64,
    particles: Vec<Particle>,
    walls: Vec<Wall>,
    peers: BTreeMap<u32, Vector2>,
}

impl ClientWorld {
    pub fn new(bounds: Bounds) -> Self {
        Self {
            client_id: None,
            tick: 0,
            position: Vector2::new(bounds.width / 2.0, bounds.height / 2.0),
            bounds,
            particles: Vec::new(),
            walls: Vec::new(),
            peers: BTreeMap::new(),
            snapshots: 0,
            pending: None,
        }
    }

    /// Applies one server record.
    ///
    /// `T:` opens a snapshot that is collected off to the side. The visible
    /// particles, walls and peers are only replaced once [`end_snapshot`]
    /// is called for its closing newline, so a frame never shows a
    /// half-received world. Records outside a snapshot are peer deltas and
    /// apply immediately.
    ///
    /// [`end_snapshot`]: ClientWorld::end_snapshot
    pub fn apply(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Welcome { client_id } => {
                info!("Connected! Client ID: {}", client_id);
                self.client_id = Some(client_id);
            }
            ServerMessage::SnapshotStart { tick } => {
                if self.pending.is_some() {
                    debug!("Snapshot {} started before the previous one ended", tick);
                    self.end_snapshot();
                }
                self.pending = Some(PendingSnapshot {
                    tick,
                    ..PendingSnapshot::default()
                });
            }
            ServerMessage::Particle(state) => match &mut self.pending {
                Some(pending) => pending.particles.push(state.into()),
                None => self.particles.push(state.into()),
            },
            ServerMessage::Wall(wall) => match &mut self.pending {
                Some(pending) => pending.walls.push(wall),
                None => self.walls.push(wall),
            },
            ServerMessage::Peer { client_id, x, y } => {
                if Some(client_id) == self.client_id {
                    debug!("Ignoring own position echoed by server");
                    return;
                }
                let peers = match &mut self.pending {
                    Some(pending) => &mut pending.peers,
                    None => &mut self.peers,
                };
                peers.insert(client_id, Vector2::new(x, y));
            }
            ServerMessage::PeerGone { client_id } => {
                if let Some(pending) = &mut self.pending {
                    pending.peers.remove(&client_id);
                }
                if self.peers.remove(&client_id).is_some() {
                    info!("Client {} left", client_id);
                }
            }
        }
    }

    /// Swaps the snapshot collected since the last `T:` into view. Does
    /// nothing when no snapshot is open.
    pub fn end_snapshot(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        self.tick = pending.tick;
        self.snapshots += 1;
        self.particles = pending.particles;
        self.walls = pending.walls;
        self.peers = pending.peers;
    }

    /// Moves every particle forward by `dt` seconds until the next snapshot
    /// replaces them.
    pub fn extrapolate(&mut self, dt: f64) {
        for particle in &mut self.particles {
            particle.move_by(dt);
            let clipped = self.bounds.clamp(particle.position());
            particle.x = clipped.x;
            particle.y = clipped.y;
        }
    }

    /// Shifts the own sprite and returns the MOVE to report, or None if the
    /// sprite did not actually move.
    pub fn move_self(&mut self, dx: f64, dy: f64) -> Option<ClientMessage> {
        let target = self.bounds.clamp(self.position.add(&Vector2::new(dx, dy)));
        if target == self.position {
            return None;
        }
        self.position = target;
        Some(ClientMessage::Move {
            x: target.x,
            y: target.y,
        })
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn walls(&self) -> &[Wall] {
        &self.walls
    }

    pub fn peers(&self) -> impl Iterator<Item = (u32, Vector2)> + '_ {
        self.peers.iter().map(|(id, position)| (*id, *position))
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn snapshots_received(&self) -> u64 {
        self.snapshots
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Forgets everything learned from the current connection.
    pub fn reset(&mut self) {
        *self = Self::new(self.bounds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::ParticleState;

    fn decode_all(world: &mut ClientWorld, stream: &str) {
        for line in stream.split_inclusive('\n') {
            for frame in line.split(';') {
                if frame.trim().is_empty() {
                    continue;
                }
                world.apply(ServerMessage::decode(frame).unwrap());
            }
            if line.ends_with('\n') {
                world.end_snapshot();
            }
        }
    }

    #[test]
    fn test_new_world_is_empty() {
        let world = ClientWorld::new(Bounds::new(100.0, 50.0));
        assert!(world.client_id.is_none());
        assert!(world.particles().is_empty());
        assert_eq!(world.position, Vector2::new(50.0, 25.0));
    }

    #[test]
    fn test_snapshot_replaces_previous_one() {
        let mut world = ClientWorld::new(Bounds::new(100.0, 100.0));
        decode_all(
            &mut world,
            "ID:2;T:1;W:0,0,10,10;P:1,5,5,10,0;P:2,6,6,10,90;C:1,30,40;\n",
        );

        assert_eq!(world.client_id, Some(2));
        assert_eq!(world.tick, 1);
        assert_eq!(world.particles().len(), 2);
        assert_eq!(world.walls().len(), 1);
        assert_eq!(world.peers().collect::<Vec<_>>(), vec![(1, Vector2::new(30.0, 40.0))]);

        decode_all(&mut world, "T:2;P:1,7,5,10,0;\n");
        assert_eq!(world.tick, 2);
        assert_eq!(world.particles().len(), 1);
        assert_eq!(world.particles()[0].x, 7.0);
        assert!(world.walls().is_empty());
        assert_eq!(world.peer_count(), 0);
        assert_eq!(world.snapshots_received(), 2);
    }

    #[test]
    fn test_partial_snapshot_keeps_previous_world_visible() {
        let mut world = ClientWorld::new(Bounds::new(100.0, 100.0));
        decode_all(&mut world, "ID:2;T:1;P:1,5,5,10,0;P:2,6,6,10,90;C:1,30,40;\n");

        // Only part of the next snapshot has arrived.
        decode_all(&mut world, "T:2;P:1,7,5,10,0;");
        assert_eq!(world.tick, 1);
        assert_eq!(world.particles().len(), 2);
        assert_eq!(world.particles()[0].x, 5.0);
        assert_eq!(world.peer_count(), 1);
        assert_eq!(world.snapshots_received(), 1);

        decode_all(&mut world, "P:2,8,6,10,90;\n");
        assert_eq!(world.tick, 2);
        assert_eq!(world.particles().len(), 2);
        assert_eq!(world.particles()[0].x, 7.0);
        assert_eq!(world.peer_count(), 0);
        assert_eq!(world.snapshots_received(), 2);
    }

    #[test]
    fn test_unterminated_snapshot_is_committed_by_the_next_one() {
        let mut world = ClientWorld::new(Bounds::new(100.0, 100.0));
        decode_all(&mut world, "T:1;P:1,5,5,10,0;T:2;P:1,6,5,10,0;P:2,7,7,0,0;");

        assert_eq!(world.tick, 1);
        assert_eq!(world.particles().len(), 1);

        world.end_snapshot();
        assert_eq!(world.tick, 2);
        assert_eq!(world.particles().len(), 2);

        // A stray newline with no open snapshot changes nothing.
        world.end_snapshot();
        assert_eq!(world.snapshots_received(), 2);
    }

    #[test]
    fn test_peer_leaving_mid_snapshot_is_not_resurrected() {
        let mut world = ClientWorld::new(Bounds::new(100.0, 100.0));
        decode_all(&mut world, "T:1;C:3,1,1;\n");
        decode_all(&mut world, "T:2;C:3,2,2;DISCONNECTED_CLIENT:3;\n");

        assert_eq!(world.peer_count(), 0);
    }

    #[test]
    fn test_peer_delta_and_disconnect() {
        let mut world = ClientWorld::new(Bounds::new(100.0, 100.0));
        world.apply(ServerMessage::Welcome { client_id: 1 });
        world.apply(ServerMessage::Peer {
            client_id: 3,
            x: 1.0,
            y: 2.0,
        });
        world.apply(ServerMessage::Peer {
            client_id: 3,
            x: 4.0,
            y: 5.0,
        });
        world.apply(ServerMessage::Peer {
            client_id: 1,
            x: 9.0,
            y: 9.0,
        });

        assert_eq!(world.peers().collect::<Vec<_>>(), vec![(3, Vector2::new(4.0, 5.0))]);

        world.apply(ServerMessage::PeerGone { client_id: 3 });
        assert_eq!(world.peer_count(), 0);
        // Unknown ids are ignored.
        world.apply(ServerMessage::PeerGone { client_id: 42 });
    }

    #[test]
    fn test_extrapolation_stays_on_canvas() {
        let mut world = ClientWorld::new(Bounds::new(100.0, 100.0));
        world.apply(ServerMessage::Particle(ParticleState {
            id: 1,
            x: 90.0,
            y: 10.0,
            velocity: 20.0,
            angle: 0.0,
        }));

        world.extrapolate(0.25);
        assert_approx_eq!(world.particles()[0].x, 95.0);

        world.extrapolate(1.0);
        assert_approx_eq!(world.particles()[0].x, 100.0);
        assert_approx_eq!(world.particles()[0].y, 10.0);
    }

    #[test]
    fn test_move_self_reports_clamped_position() {
        let mut world = ClientWorld::new(Bounds::new(100.0, 100.0));

        assert_eq!(
            world.move_self(5.0, -10.0),
            Some(ClientMessage::Move { x: 55.0, y: 40.0 })
        );
        assert_eq!(
            world.move_self(500.0, 0.0),
            Some(ClientMessage::Move { x: 100.0, y: 40.0 })
        );
        // Already against the edge, nothing to report.
        assert_eq!(world.move_self(5.0, 0.0), None);
        assert_eq!(world.move_self(0.0, 0.0), None);
    }

    #[test]
    fn test_reset_keeps_bounds() {
        let mut world = ClientWorld::new(Bounds::new(80.0, 60.0));
        decode_all(&mut world, "ID:4;T:9;P:1,1,1,1,1;");
        world.reset();

        assert!(world.client_id.is_none());
        assert_eq!(world.tick, 0);
        assert!(world.particles().is_empty());
        assert_eq!(world.bounds(), Bounds::new(80.0, 60.0));
    }
}
