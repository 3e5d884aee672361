//! Command-line options and the optional JSON scene file.

use crate::world::World;
use clap::Parser;
use serde::Deserialize;
use shared::{Bounds, Wall, CANVAS_HEIGHT, CANVAS_WIDTH, DEFAULT_PORT, DEFAULT_TICK_RATE};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Multi-client particle sandbox server")]
pub struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value_t = DEFAULT_TICK_RATE)]
    pub tick_rate: u32,

    /// Canvas width in pixels
    #[arg(long, default_value_t = CANVAS_WIDTH)]
    pub width: f64,

    /// Canvas height in pixels
    #[arg(long, default_value_t = CANVAS_HEIGHT)]
    pub height: f64,

    /// Physics worker threads (0 = one per core)
    #[arg(short, long, default_value_t = 0)]
    pub workers: usize,

    /// Maximum concurrent clients (unlimited when omitted)
    #[arg(long)]
    pub max_clients: Option<usize>,

    /// JSON scene with particles and walls to load at startup
    #[arg(long)]
    pub scene: Option<PathBuf>,

    /// Do not read operator commands from stdin
    #[arg(long)]
    pub no_console: bool,
}

impl Args {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::new(self.width, self.height)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::Invalid("tick rate must be at least 1".into()));
        }
        if !(self.width > 0.0 && self.height > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "canvas must have a positive size, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read scene file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse scene file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct ParticleSeed {
    pub x: f64,
    pub y: f64,
    pub velocity: f64,
    pub angle: f64,
}

/// Initial world contents.
///
/// ```json
/// {
///   "particles": [{ "x": 100, "y": 100, "velocity": 20, "angle": 45 }],
///   "walls": [{ "x1": 300, "y1": 100, "x2": 300, "y2": 500 }]
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Scene {
    #[serde(default)]
    pub particles: Vec<ParticleSeed>,
    #[serde(default)]
    pub walls: Vec<Wall>,
}

impl Scene {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn apply(&self, world: &World) {
        for seed in &self.particles {
            world.add_particle(seed.x, seed.y, seed.velocity, seed.angle);
        }
        for wall in &self.walls {
            let (start, end) = (wall.start(), wall.end());
            world.add_wall(start.x, start.y, end.x, end.y);
        }
    }
}
