//! Operator console: world-editing commands read line by line from stdin.
//!
//! ```text
//! particle <x> <y> <velocity> <angle>
//! wall <x1> <y1> <x2> <y2>
//! line <n> <sx> <sy> <ex> <ey> <velocity> <angle>
//! spread <n> <x> <y> <start_angle> <end_angle> <velocity>
//! burst <n> <x> <y> <angle> <start_velocity> <end_velocity>
//! random <n>
//! clear particles | clear walls
//! status
//! ```

use crate::world::World;
use log::{info, warn};
use shared::Vector2;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Particle {
        x: f64,
        y: f64,
        velocity: f64,
        angle: f64,
    },
    Wall {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
    },
    Line {
        n: usize,
        start: Vector2,
        end: Vector2,
        velocity: f64,
        angle: f64,
    },
    Spread {
        n: usize,
        origin: Vector2,
        start_angle: f64,
        end_angle: f64,
        velocity: f64,
    },
    Burst {
        n: usize,
        origin: Vector2,
        angle: f64,
        start_velocity: f64,
        end_velocity: f64,
    },
    Random { n: usize },
    ClearParticles,
    ClearWalls,
    Status,
}

#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command `{0}`")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("invalid number `{0}`")]
    InvalidNumber(String),
}

fn numbers(args: &[&str], usage: &'static str, expected: usize) -> Result<Vec<f64>, CommandError> {
    if args.len() != expected {
        return Err(CommandError::Usage(usage));
    }
    args.iter()
        .map(|raw| match raw.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => Err(CommandError::InvalidNumber(raw.to_string())),
        })
        .collect()
}

fn count(raw: &str) -> Result<usize, CommandError> {
    raw.parse()
        .map_err(|_| CommandError::InvalidNumber(raw.to_string()))
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&name, args)) = words.split_first() else {
            return Err(CommandError::Empty);
        };

        match name.to_ascii_lowercase().as_str() {
            "particle" => {
                let v = numbers(args, "particle <x> <y> <velocity> <angle>", 4)?;
                Ok(Command::Particle {
                    x: v[0],
                    y: v[1],
                    velocity: v[2],
                    angle: v[3],
                })
            }
            "wall" => {
                let v = numbers(args, "wall <x1> <y1> <x2> <y2>", 4)?;
                Ok(Command::Wall {
                    x1: v[0],
                    y1: v[1],
                    x2: v[2],
                    y2: v[3],
                })
            }
            "line" => {
                const USAGE: &str = "line <n> <sx> <sy> <ex> <ey> <velocity> <angle>";
                let (n, rest) = args.split_first().ok_or(CommandError::Usage(USAGE))?;
                let v = numbers(rest, USAGE, 6)?;
                Ok(Command::Line {
                    n: count(n)?,
                    start: Vector2::new(v[0], v[1]),
                    end: Vector2::new(v[2], v[3]),
                    velocity: v[4],
                    angle: v[5],
                })
            }
            "spread" => {
                const USAGE: &str = "spread <n> <x> <y> <start_angle> <end_angle> <velocity>";
                let (n, rest) = args.split_first().ok_or(CommandError::Usage(USAGE))?;
                let v = numbers(rest, USAGE, 5)?;
                Ok(Command::Spread {
                    n: count(n)?,
                    origin: Vector2::new(v[0], v[1]),
                    start_angle: v[2],
                    end_angle: v[3],
                    velocity: v[4],
                })
            }
            "burst" => {
                const USAGE: &str = "burst <n> <x> <y> <angle> <start_velocity> <end_velocity>";
                let (n, rest) = args.split_first().ok_or(CommandError::Usage(USAGE))?;
                let v = numbers(rest, USAGE, 5)?;
                Ok(Command::Burst {
                    n: count(n)?,
                    origin: Vector2::new(v[0], v[1]),
                    angle: v[2],
                    start_velocity: v[3],
                    end_velocity: v[4],
                })
            }
            "random" => match args {
                [n] => Ok(Command::Random { n: count(n)? }),
                _ => Err(CommandError::Usage("random <n>")),
            },
            "clear" => match args {
                ["particles"] => Ok(Command::ClearParticles),
                ["walls"] => Ok(Command::ClearWalls),
                _ => Err(CommandError::Usage("clear particles | clear walls")),
            },
            "status" => Ok(Command::Status),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

/// Applies a command to the world and returns a one-line summary.
///
/// The world locks are taken on the blocking pool since the engine may be
/// holding the particle lock for a full step.
pub async fn execute(world: &Arc<World>, command: Command) -> String {
    let clients = world.sessions().read().await.len();
    match world.run_blocking(move |world| apply(world, command, clients)).await {
        Ok(summary) => summary,
        Err(e) => format!("command failed: {}", e),
    }
}

fn apply(world: &World, command: Command, clients: usize) -> String {
    match command {
        Command::Particle {
            x,
            y,
            velocity,
            angle,
        } => {
            let id = world.add_particle(x, y, velocity, angle);
            format!("added particle {}", id)
        }
        Command::Wall { x1, y1, x2, y2 } => {
            world.add_wall(x1, y1, x2, y2);
            format!("added wall ({}, {}) - ({}, {})", x1, y1, x2, y2)
        }
        Command::Line {
            n,
            start,
            end,
            velocity,
            angle,
        } => {
            let ids = world.add_particles_along_line(n, start, end, velocity, angle);
            format!("added {} particles along a line", ids.len())
        }
        Command::Spread {
            n,
            origin,
            start_angle,
            end_angle,
            velocity,
        } => {
            let ids = world.add_particles_angle_spread(n, origin, start_angle, end_angle, velocity);
            format!("added {} particles with spread angles", ids.len())
        }
        Command::Burst {
            n,
            origin,
            angle,
            start_velocity,
            end_velocity,
        } => {
            let ids =
                world.add_particles_velocity_spread(n, origin, angle, start_velocity, end_velocity);
            format!("added {} particles with spread velocities", ids.len())
        }
        Command::Random { n } => {
            let ids = world.add_random_particles(n, &mut rand::thread_rng());
            format!("added {} random particles", ids.len())
        }
        Command::ClearParticles => format!("removed {} particles", world.clear_particles()),
        Command::ClearWalls => format!("removed {} walls", world.clear_walls()),
        Command::Status => {
            format!(
                "tick {}: {} particles, {} walls, {} clients",
                world.tick(),
                world.particle_count(),
                world.wall_count(),
                clients
            )
        }
    }
}

/// Reads commands until `input` hits end of file.
pub async fn run_console<R>(world: Arc<World>, input: R)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Command>() {
                    Ok(command) => info!("{}", execute(&world, command).await),
                    Err(e) => warn!("{}", e),
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Console input failed: {}", e);
                break;
            }
        }
    }
    info!("Operator console closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_manager::SessionRegistry;
    use shared::Bounds;

    fn test_world() -> Arc<World> {
        Arc::new(World::new(Bounds::new(200.0, 100.0), SessionRegistry::default()))
    }

    #[test]
    fn test_parse_single_commands() {
        assert_eq!(
            "particle 1 2 3 4".parse(),
            Ok(Command::Particle {
                x: 1.0,
                y: 2.0,
                velocity: 3.0,
                angle: 4.0
            })
        );
        assert_eq!(
            "WALL 0 0 10 10".parse(),
            Ok(Command::Wall {
                x1: 0.0,
                y1: 0.0,
                x2: 10.0,
                y2: 10.0
            })
        );
        assert_eq!("clear walls".parse(), Ok(Command::ClearWalls));
        assert_eq!("clear particles".parse(), Ok(Command::ClearParticles));
        assert_eq!("  status  ".parse(), Ok(Command::Status));
        assert_eq!("random 12".parse(), Ok(Command::Random { n: 12 }));
    }

    #[test]
    fn test_parse_batch_commands() {
        assert_eq!(
            "line 3 0 0 10 0 5 90".parse(),
            Ok(Command::Line {
                n: 3,
                start: Vector2::new(0.0, 0.0),
                end: Vector2::new(10.0, 0.0),
                velocity: 5.0,
                angle: 90.0
            })
        );
        assert_eq!(
            "spread 4 50 50 0 90 20".parse(),
            Ok(Command::Spread {
                n: 4,
                origin: Vector2::new(50.0, 50.0),
                start_angle: 0.0,
                end_angle: 90.0,
                velocity: 20.0
            })
        );
        assert_eq!(
            "burst 2 10 10 45 1 9".parse(),
            Ok(Command::Burst {
                n: 2,
                origin: Vector2::new(10.0, 10.0),
                angle: 45.0,
                start_velocity: 1.0,
                end_velocity: 9.0
            })
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<Command>(), Err(CommandError::Empty));
        assert!(matches!("explode".parse::<Command>(), Err(CommandError::Unknown(_))));
        assert!(matches!("particle 1 2".parse::<Command>(), Err(CommandError::Usage(_))));
        assert!(matches!("wall 1 2 x 4".parse::<Command>(), Err(CommandError::InvalidNumber(_))));
        assert!(matches!(
            "line -1 0 0 1 1 1 1".parse::<Command>(),
            Err(CommandError::InvalidNumber(_))
        ));
        assert!(matches!("line".parse::<Command>(), Err(CommandError::Usage(_))));
        assert!(matches!("clear everything".parse::<Command>(), Err(CommandError::Usage(_))));
        assert!(matches!(
            "particle 1 2 inf 4".parse::<Command>(),
            Err(CommandError::InvalidNumber(_))
        ));
    }

    #[tokio::test]
    async fn test_execute_commands() {
        let world = test_world();

        assert_eq!(
            execute(&world, "particle 10 10 5 0".parse().unwrap()).await,
            "added particle 1"
        );
        execute(&world, "wall 50 0 50 100".parse().unwrap()).await;
        execute(&world, "spread 3 20 20 0 180 10".parse().unwrap()).await;
        execute(&world, "random 5".parse().unwrap()).await;

        assert_eq!(world.particle_count(), 9);
        assert_eq!(world.wall_count(), 1);
        assert_eq!(
            execute(&world, Command::Status).await,
            "tick 0: 9 particles, 1 walls, 0 clients"
        );

        assert_eq!(execute(&world, Command::ClearParticles).await, "removed 9 particles");
        assert_eq!(execute(&world, Command::ClearWalls).await, "removed 1 walls");
    }

    #[tokio::test]
    async fn test_console_reads_until_eof() {
        let world = test_world();
        let input: &[u8] = b"particle 1 1 1 1\n\nbogus\nline 4 0 0 30 0 2 0\nwall 0 0 1 1\n";

        run_console(Arc::clone(&world), input).await;

        assert_eq!(world.particle_count(), 5);
        assert_eq!(world.wall_count(), 1);
    }
}
