//! Physics and collision pass over the whole particle population.
//!
//! Particles never interact with each other, so every particle is advanced
//! independently on a rayon pool. `step` returns only after every particle has
//! been advanced, which is the barrier the broadcaster relies on.

use crate::world::World;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use shared::{Bounds, Particle, Wall};

/// Counters collected during one engine pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StepStats {
    pub advanced: usize,
    pub axis_bounces: usize,
    pub wall_bounces: usize,
}

impl StepStats {
    fn merge(self, other: StepStats) -> StepStats {
        StepStats {
            advanced: self.advanced + other.advanced,
            axis_bounces: self.axis_bounces + other.axis_bounces,
            wall_bounces: self.wall_bounces + other.wall_bounces,
        }
    }
}

pub struct Engine {
    pool: ThreadPool,
}

impl Engine {
    /// Builds an engine with `workers` threads. Zero lets rayon pick one per core.
    pub fn new(workers: usize) -> Result<Self, ThreadPoolBuildError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("physics-{}", i))
            .build()?;
        Ok(Self { pool })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Advances every particle by `dt` seconds and resolves collisions.
    pub fn step(
        &self,
        particles: &mut [Particle],
        walls: &[Wall],
        bounds: Bounds,
        dt: f64,
    ) -> StepStats {
        self.pool.install(|| {
            particles
                .par_iter_mut()
                .map(|particle| advance_particle(particle, walls, bounds, dt))
                .reduce(StepStats::default, StepStats::merge)
        })
    }

    /// Runs one pass over the shared world.
    ///
    /// Walls are copied out first so only the particle lock is held while the
    /// workers run.
    pub fn step_world(&self, world: &World, dt: f64) -> StepStats {
        let walls = world.walls();
        let bounds = world.bounds();
        world.with_particles_mut(|particles| self.step(particles, &walls, bounds, dt))
    }
}

/// Advances a single particle by one tick.
///
/// The look-ahead segment from the current to the predicted position is tested
/// first: an outward crossing of a canvas edge mirrors the heading on that axis,
/// then every wall the segment crosses reflects it again (walls are applied
/// after the axis check, so the last wall hit decides the final heading).
/// The move is committed with the resulting heading and clipped to the canvas.
pub fn advance_particle(
    particle: &mut Particle,
    walls: &[Wall],
    bounds: Bounds,
    dt: f64,
) -> StepStats {
    let mut stats = StepStats {
        advanced: 1,
        ..StepStats::default()
    };

    let origin = particle.position();
    let target = particle.predicted_position(dt);
    let velocity = particle.velocity();

    if (target.x >= bounds.width && velocity.x > 0.0) || (target.x <= 0.0 && velocity.x < 0.0) {
        particle.reflect_horizontal();
        stats.axis_bounces += 1;
    }
    if (target.y >= bounds.height && velocity.y > 0.0) || (target.y <= 0.0 && velocity.y < 0.0) {
        particle.reflect_vertical();
        stats.axis_bounces += 1;
    }

    for wall in walls {
        if wall.is_crossed_by(origin, target) {
            particle.reflect_off_surface(wall.angle());
            stats.wall_bounces += 1;
        }
    }

    particle.move_by(dt);
    let clipped = bounds.clamp(particle.position());
    particle.x = clipped.x;
    particle.y = clipped.y;
    particle.generation += 1;

    stats
}
