//! # Particle Sandbox Client
//!
//! Viewer for the shared particle sandbox. The client keeps a local mirror of
//! the world the server streams to it, draws it every frame and reports the
//! position of its own sprite whenever the player moves it.
//!
//! ## Architecture Overview
//!
//! ### Snapshot Mirror
//! The server is authoritative. Every `T:` record starts a fresh snapshot that
//! replaces the particles, walls and peer sprites seen so far. Peer moves that
//! arrive between snapshots (`C:`) are applied immediately.
//!
//! ### Extrapolation
//! Between snapshots the client keeps particles moving along their current
//! heading, so the picture stays smooth when frames outpace ticks. The next
//! snapshot overwrites whatever the extrapolation guessed.
//!
//! ### Background Networking
//! The socket lives on its own thread with a single-threaded tokio runtime.
//! The render loop exchanges messages with it through unbounded channels and
//! never blocks on I/O.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! - `ClientWorld`: particles, walls, peers and the own sprite position
//! - applying decoded server records
//! - extrapolation between snapshots
//!
//! ### Input Module (`input`)
//! - arrow/WASD keys to sprite displacement
//! - reconnect key edge detection
//!
//! ### Network Module (`network`)
//! - TCP connection with frame reassembly
//! - events out, MOVE commands in
//!
//! ### Rendering Module (`rendering`)
//! - particles, walls, sprites and a small status overlay (macroquad)
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::game::ClientWorld;
//! use client::network::{Connection, NetworkEvent};
//! use shared::Bounds;
//!
//! let mut connection = Connection::spawn("127.0.0.1:12345")?;
//! let mut world = ClientWorld::new(Bounds::default());
//!
//! loop {
//!     for event in connection.poll() {
//!         match event {
//!             NetworkEvent::Message(message) => world.apply(message),
//!             NetworkEvent::SnapshotEnd => {}
//!             NetworkEvent::Disconnected(_) => return Ok(()),
//!         }
//!     }
//!
//!     if let Some(report) = world.move_self(1.0, 0.0) {
//!         connection.send(report);
//!     }
//!     world.extrapolate(1.0 / 60.0);
//! #   break;
//! }
//! # Ok::<(), std::io::Error>(())
//! ```

pub mod game;
pub mod input;
pub mod network;
pub mod rendering;
