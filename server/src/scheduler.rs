//! Fixed-rate tick loop.
//!
//! Each cycle runs one step, measures how long it took and sleeps for whatever
//! is left of the period. Missed time is never caught up: a step that overruns
//! simply skips the sleep, which lowers the effective rate.

use crate::engine::Engine;
use crate::world::World;
use log::{debug, info};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Time left to sleep after a step that took `elapsed`.
pub fn sleep_budget(period: Duration, elapsed: Duration) -> Duration {
    period.saturating_sub(elapsed)
}

/// Counters owned by the scheduler.
#[derive(Debug, Clone)]
pub struct TickStats {
    pub tick: u64,
    pub overruns: u64,
    window_start: Instant,
    window_ticks: u32,
    last_rate: f64,
}

impl TickStats {
    fn new() -> Self {
        Self {
            tick: 0,
            overruns: 0,
            window_start: Instant::now(),
            window_ticks: 0,
            last_rate: 0.0,
        }
    }

    /// Effective ticks per second measured over the last reporting window.
    pub fn effective_rate(&self) -> f64 {
        self.last_rate
    }

    fn close_window(&mut self) {
        let secs = self.window_start.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.last_rate = self.window_ticks as f64 / secs;
        }
        self.window_start = Instant::now();
        self.window_ticks = 0;
    }
}

pub struct TickScheduler {
    period: Duration,
    report_every: u64,
    stats: TickStats,
}

impl TickScheduler {
    pub fn new(tick_rate: u32) -> Self {
        Self::with_period(Duration::from_secs_f64(1.0 / tick_rate.max(1) as f64))
    }

    pub fn with_period(period: Duration) -> Self {
        Self {
            period,
            report_every: 300,
            stats: TickStats::new(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn stats(&self) -> &TickStats {
        &self.stats
    }

    /// Runs one step and sleeps out the rest of the period.
    /// Returns false if `step` asked to stop.
    pub fn run_tick<F>(&mut self, step: &mut F) -> bool
    where
        F: FnMut(u64) -> bool,
    {
        let started = Instant::now();
        self.stats.tick += 1;
        let keep_going = step(self.stats.tick);
        let elapsed = started.elapsed();

        if elapsed > self.period {
            self.stats.overruns += 1;
            debug!(
                "Tick {} overran its budget: {:?} > {:?}",
                self.stats.tick, elapsed, self.period
            );
        }

        self.stats.window_ticks += 1;
        if self.stats.tick % self.report_every == 0 {
            self.stats.close_window();
            debug!(
                "Tick {}: {:.1}Hz effective, {} overruns so far",
                self.stats.tick,
                self.stats.effective_rate(),
                self.stats.overruns
            );
        }

        let budget = sleep_budget(self.period, elapsed);
        if !budget.is_zero() {
            thread::sleep(budget);
        }
        keep_going
    }

    /// Runs at most `n` ticks. Returns how many ran.
    pub fn run_ticks<F>(&mut self, n: u64, mut step: F) -> u64
    where
        F: FnMut(u64) -> bool,
    {
        for ran in 1..=n {
            if !self.run_tick(&mut step) {
                return ran;
            }
        }
        n
    }

    /// Runs until `step` returns false.
    pub fn run_while<F>(&mut self, mut step: F)
    where
        F: FnMut(u64) -> bool,
    {
        while self.run_tick(&mut step) {}
    }
}

/// Starts the simulation thread: one engine pass per tick, then the tick number
/// is handed to the broadcaster. Stops once the broadcaster is gone.
pub fn spawn_simulation(
    world: Arc<World>,
    engine: Engine,
    tick_rate: u32,
    ticks: mpsc::UnboundedSender<u64>,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("tick-scheduler".to_string())
        .spawn(move || {
            let mut scheduler = TickScheduler::new(tick_rate);
            let dt = scheduler.period().as_secs_f64();
            info!(
                "Simulation running at {}Hz on {} workers",
                tick_rate,
                engine.workers()
            );

            scheduler.run_while(|tick| {
                let stats = engine.step_world(&world, dt);
                world.set_tick(tick);
                if stats.wall_bounces + stats.axis_bounces > 0 {
                    debug!(
                        "Tick {}: {} particles, {} edge bounces, {} wall bounces",
                        tick, stats.advanced, stats.axis_bounces, stats.wall_bounces
                    );
                }
                ticks.send(tick).is_ok()
            });

            info!("Simulation stopped after {} ticks", scheduler.stats().tick);
        })
}
