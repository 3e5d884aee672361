//! Shared world state: particles, walls and connected sessions.
//!
//! Each collection sits behind its own lock. Callers never hold two of them at
//! once, which keeps the engine, the broadcaster and the operator console free
//! of lock-ordering deadlocks.

use crate::session_manager::SessionRegistry;
use log::info;
use parking_lot::RwLock;
use rand::Rng;
use shared::{Bounds, Particle, ParticleState, ServerMessage, Vector2, Wall};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinError;

/// Upper bound for the speed of randomly spawned particles, in pixels per second.
pub const RANDOM_MAX_SPEED: f64 = 200.0;

pub struct World {
    bounds: Bounds,
    particles: RwLock<ParticleSet>,
    walls: RwLock<Vec<Wall>>,
    tick: AtomicU64,
    sessions: tokio::sync::RwLock<SessionRegistry>,
}

/// Particles plus the id counter that hands out their identities.
#[derive(Debug)]
struct ParticleSet {
    particles: Vec<Particle>,
    next_id: u32,
}

impl ParticleSet {
    fn spawn(&mut self, x: f64, y: f64, velocity: f64, angle: f64) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.particles.push(Particle::new(id, x, y, velocity, angle));
        id
    }
}

impl World {
    pub fn new(bounds: Bounds, sessions: SessionRegistry) -> Self {
        Self {
            bounds,
            particles: RwLock::new(ParticleSet {
                particles: Vec::new(),
                next_id: 1,
            }),
            walls: RwLock::new(Vec::new()),
            tick: AtomicU64::new(0),
            sessions: tokio::sync::RwLock::new(sessions),
        }
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Connected clients, ordered by id.
    pub fn sessions(&self) -> &tokio::sync::RwLock<SessionRegistry> {
        &self.sessions
    }

    /// Runs `f` on tokio's blocking pool.
    ///
    /// The particle and wall locks are synchronous and the engine holds the
    /// particle lock for a whole step, so async tasks reach them through here
    /// instead of stalling a runtime worker.
    pub async fn run_blocking<T, F>(self: &Arc<Self>, f: F) -> Result<T, JoinError>
    where
        F: FnOnce(&World) -> T + Send + 'static,
        T: Send + 'static,
    {
        let world = Arc::clone(self);
        tokio::task::spawn_blocking(move || f(&world)).await
    }

    pub fn tick(&self) -> u64 {
        self.tick.load(Ordering::Acquire)
    }

    pub fn set_tick(&self, tick: u64) {
        self.tick.store(tick, Ordering::Release);
    }

    pub fn add_particle(&self, x: f64, y: f64, velocity: f64, angle: f64) -> u32 {
        self.particles.write().spawn(x, y, velocity, angle)
    }

    pub fn add_wall(&self, x1: f64, y1: f64, x2: f64, y2: f64) {
        self.walls.write().push(Wall::new(x1, y1, x2, y2));
    }

    /// Removes every particle. Ids keep counting up from where they were.
    pub fn clear_particles(&self) -> usize {
        let mut set = self.particles.write();
        let removed = set.particles.len();
        set.particles.clear();
        info!("Cleared {} particles", removed);
        removed
    }

    pub fn clear_walls(&self) -> usize {
        let mut walls = self.walls.write();
        let removed = walls.len();
        walls.clear();
        info!("Cleared {} walls", removed);
        removed
    }

    /// Spawns `n` particles evenly spaced from `start` to `end`, all sharing one
    /// velocity and angle.
    pub fn add_particles_along_line(
        &self,
        n: usize,
        start: Vector2,
        end: Vector2,
        velocity: f64,
        angle: f64,
    ) -> Vec<u32> {
        let mut set = self.particles.write();
        (0..n)
            .map(|i| {
                let f = spread_fraction(i, n);
                let at = start.add(&end.sub(&start).scale(f));
                set.spawn(at.x, at.y, velocity, angle)
            })
            .collect()
    }

    /// Spawns `n` particles at one point with angles spread from `start_angle`
    /// to `end_angle`.
    pub fn add_particles_angle_spread(
        &self,
        n: usize,
        origin: Vector2,
        start_angle: f64,
        end_angle: f64,
        velocity: f64,
    ) -> Vec<u32> {
        let mut set = self.particles.write();
        (0..n)
            .map(|i| {
                let angle = lerp(start_angle, end_angle, spread_fraction(i, n));
                set.spawn(origin.x, origin.y, velocity, angle)
            })
            .collect()
    }

    /// Spawns `n` particles at one point with velocities spread from
    /// `start_velocity` to `end_velocity`.
    pub fn add_particles_velocity_spread(
        &self,
        n: usize,
        origin: Vector2,
        angle: f64,
        start_velocity: f64,
        end_velocity: f64,
    ) -> Vec<u32> {
        let mut set = self.particles.write();
        (0..n)
            .map(|i| {
                let velocity = lerp(start_velocity, end_velocity, spread_fraction(i, n));
                set.spawn(origin.x, origin.y, velocity, angle)
            })
            .collect()
    }

    pub fn add_random_particles<R: Rng>(&self, n: usize, rng: &mut R) -> Vec<u32> {
        let bounds = self.bounds;
        let mut set = self.particles.write();
        (0..n)
            .map(|_| {
                set.spawn(
                    rng.gen_range(0.0..bounds.width),
                    rng.gen_range(0.0..bounds.height),
                    rng.gen_range(0.0..RANDOM_MAX_SPEED),
                    rng.gen_range(0.0..360.0),
                )
            })
            .collect()
    }

    pub fn particle_count(&self) -> usize {
        self.particles.read().particles.len()
    }

    pub fn wall_count(&self) -> usize {
        self.walls.read().len()
    }

    /// Copies the current walls out from under their lock.
    pub fn walls(&self) -> Vec<Wall> {
        self.walls.read().clone()
    }

    pub fn particle_states(&self) -> Vec<ParticleState> {
        self.particles
            .read()
            .particles
            .iter()
            .map(ParticleState::from)
            .collect()
    }

    /// Runs `f` with exclusive access to the particle collection.
    pub fn with_particles_mut<T>(&self, f: impl FnOnce(&mut [Particle]) -> T) -> T {
        let mut set = self.particles.write();
        f(&mut set.particles)
    }

    /// Encodes the shared part of a snapshot: the tick header, every wall and
    /// every particle. Each lock is released before the next is taken.
    ///
    /// Blocks while a step is running; call it through [`World::run_blocking`]
    /// from async code.
    pub fn encode_world(&self, tick: u64) -> String {
        let mut out = String::new();
        ServerMessage::SnapshotStart { tick }.write_to(&mut out);

        for wall in self.walls.read().iter() {
            ServerMessage::Wall(*wall).write_to(&mut out);
        }

        for particle in self.particles.read().particles.iter() {
            ServerMessage::Particle(ParticleState::from(particle)).write_to(&mut out);
        }

        out
    }
}

fn spread_fraction(i: usize, n: usize) -> f64 {
    if n <= 1 {
        0.0
    } else {
        i as f64 / (n - 1) as f64
    }
}

fn lerp(from: f64, to: f64, f: f64) -> f64 {
    from + (to - from) * f
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::time::Duration;

    fn test_world() -> World {
        World::new(Bounds::new(100.0, 100.0), SessionRegistry::default())
    }

    #[test]
    fn test_particle_ids_increase() {
        let world = test_world();
        let a = world.add_particle(1.0, 1.0, 1.0, 0.0);
        let b = world.add_particle(2.0, 2.0, 1.0, 0.0);
        assert_eq!(a, 1);
        assert_eq!(b, 2);

        world.clear_particles();
        let c = world.add_particle(3.0, 3.0, 1.0, 0.0);
        assert_eq!(c, 3);
        assert_eq!(world.particle_count(), 1);
    }

    #[test]
    fn test_walls_add_and_clear() {
        let world = test_world();
        world.add_wall(0.0, 0.0, 10.0, 10.0);
        world.add_wall(10.0, 0.0, 0.0, 10.0);
        assert_eq!(world.wall_count(), 2);
        assert_eq!(world.walls()[1], Wall::new(10.0, 0.0, 0.0, 10.0));
        assert_eq!(world.clear_walls(), 2);
        assert_eq!(world.wall_count(), 0);
    }

    #[test]
    fn test_particles_along_line() {
        let world = test_world();
        let ids = world.add_particles_along_line(
            5,
            Vector2::new(0.0, 0.0),
            Vector2::new(40.0, 20.0),
            15.0,
            90.0,
        );
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);

        let states = world.particle_states();
        assert_approx_eq!(states[0].x, 0.0);
        assert_approx_eq!(states[2].x, 20.0);
        assert_approx_eq!(states[2].y, 10.0);
        assert_approx_eq!(states[4].x, 40.0);
        assert!(states.iter().all(|p| p.velocity == 15.0 && p.angle == 90.0));
    }

    #[test]
    fn test_angle_spread() {
        let world = test_world();
        world.add_particles_angle_spread(3, Vector2::new(50.0, 50.0), 0.0, 90.0, 10.0);
        let angles: Vec<f64> = world.particle_states().iter().map(|p| p.angle).collect();
        assert_eq!(angles, vec![0.0, 45.0, 90.0]);
    }

    #[test]
    fn test_velocity_spread() {
        let world = test_world();
        world.add_particles_velocity_spread(3, Vector2::new(50.0, 50.0), 30.0, 10.0, 30.0);
        let speeds: Vec<f64> = world.particle_states().iter().map(|p| p.velocity).collect();
        assert_eq!(speeds, vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_batch_edge_counts() {
        let world = test_world();
        assert!(world
            .add_particles_velocity_spread(0, Vector2::default(), 0.0, 1.0, 2.0)
            .is_empty());

        world.add_particles_angle_spread(1, Vector2::new(5.0, 5.0), 30.0, 60.0, 1.0);
        let states = world.particle_states();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].angle, 30.0);
    }

    #[test]
    fn test_random_particles_stay_in_bounds() {
        let world = test_world();
        let mut rng = StdRng::seed_from_u64(7);
        let ids = world.add_random_particles(50, &mut rng);
        assert_eq!(ids.len(), 50);

        for p in world.particle_states() {
            assert!((0.0..100.0).contains(&p.x));
            assert!((0.0..100.0).contains(&p.y));
            assert!((0.0..RANDOM_MAX_SPEED).contains(&p.velocity));
        }
    }

    #[test]
    fn test_encode_world_lists_walls_then_particles() {
        let world = test_world();
        world.add_wall(0.0, 0.0, 10.0, 0.0);
        world.add_particle(1.0, 2.0, 3.0, 4.0);

        let encoded = world.encode_world(9);
        assert_eq!(encoded, "T:9;W:0,0,10,0;P:1,1,2,3,4;");
    }

    #[test]
    fn test_tick_counter() {
        let world = test_world();
        assert_eq!(world.tick(), 0);
        world.set_tick(12);
        assert_eq!(world.tick(), 12);
    }

    #[tokio::test]
    async fn test_run_blocking_keeps_runtime_responsive_during_step() {
        let world = Arc::new(test_world());
        world.add_particle(1.0, 2.0, 3.0, 4.0);

        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let stepping = {
            let world = Arc::clone(&world);
            std::thread::spawn(move || {
                world.with_particles_mut(|_| {
                    locked_tx.send(()).unwrap();
                    std::thread::sleep(Duration::from_millis(200));
                })
            })
        };
        locked_rx.recv().unwrap();

        let encode = world.run_blocking(|world| world.encode_world(1));
        tokio::pin!(encode);

        // Timers still fire on this single-threaded runtime while the encode
        // waits for the particle lock.
        tokio::select! {
            _ = &mut encode => panic!("encoded while the particle lock was held"),
            _ = tokio::time::sleep(Duration::from_millis(20)) => {}
        }

        assert_eq!(encode.await.unwrap(), "T:1;P:1,1,2,3,4;");
        stepping.join().unwrap();
    }
}
