//! # Particle Sandbox Server
//!
//! Authoritative server for a shared 2D particle sandbox. It owns the only
//! copy of the world (particles and walls), advances it at a fixed tick rate
//! and streams the result to every connected client over plain TCP.
//!
//! ## Core Responsibilities
//!
//! ### Simulation
//! Particles move in straight lines, bounce off the canvas edges and off any
//! wall segment their next move would cross. They never collide with each
//! other, so a tick is an embarrassingly parallel pass over the population.
//!
//! ### Client Sessions
//! Each TCP connection becomes a session with its own id, its last reported
//! position and an outbound queue:
//! - `ID:<id>;` is the first thing a new client reads
//! - a full snapshot follows, then one snapshot per tick
//! - `MOVE:<x>,<y>` from one client becomes `C:<id>,<x>,<y>;` for all others
//! - when a client goes away the rest receive `DISCONNECTED_CLIENT:<id>;`
//!
//! ### Operator Console
//! Lines read from stdin add particles and walls or clear them while the
//! simulation is running.
//!
//! ## Architecture Design
//!
//! ### Threads and Tasks
//! The tick scheduler runs on its own OS thread and drives the physics engine,
//! which fans the particle population out over a rayon pool. After each tick
//! the scheduler notifies a tokio task that encodes and queues snapshots.
//! Every connection gets a reader and a writer running under one `select!`.
//!
//! ### Locking
//! Particles and walls live behind separate `parking_lot` locks, sessions
//! behind a `tokio` lock. No code path holds two of them at once.
//!
//! ### Backpressure
//! Outbound queues are bounded and filled with `try_send`, so a slow reader
//! loses snapshots instead of slowing down the tick or other clients.
//!
//! ## Module Organization
//!
//! - `world`: particle and wall collections plus the batch generators
//! - `engine`: parallel physics and collision pass
//! - `scheduler`: fixed-rate tick loop and the simulation thread
//! - `session_manager`: session registry and protocol operations
//! - `network`: TCP listener, per-connection loops and the broadcaster
//! - `console`: operator command parsing and execution
//! - `config`: command-line arguments and scene files
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::engine::Engine;
//! use server::network::Server;
//! use server::scheduler::spawn_simulation;
//! use server::session_manager::{SessionManager, SessionRegistry};
//! use server::world::World;
//! use shared::Bounds;
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let world = Arc::new(World::new(Bounds::default(), SessionRegistry::default()));
//!     world.add_particle(100.0, 100.0, 120.0, 30.0);
//!     world.add_wall(640.0, 100.0, 640.0, 620.0);
//!
//!     let manager = SessionManager::new(Arc::clone(&world));
//!     let server = Server::bind("127.0.0.1:12345", manager).await?;
//!
//!     let (ticks_tx, ticks_rx) = mpsc::unbounded_channel();
//!     spawn_simulation(Arc::clone(&world), Engine::new(0)?, 60, ticks_tx)?;
//!
//!     server.run(ticks_rx).await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod console;
pub mod engine;
pub mod network;
pub mod scheduler;
pub mod session_manager;
pub mod world;
