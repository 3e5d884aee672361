use clap::Parser;
use log::{info, warn};
use server::config::{Args, Scene};
use server::console::run_console;
use server::engine::Engine;
use server::network::Server;
use server::scheduler::spawn_simulation;
use server::session_manager::{SessionManager, SessionRegistry};
use server::world::World;
use shared::Vector2;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::mpsc;

/// Parses the command line, loads the scene, then runs the simulation thread,
/// the TCP server and the operator console until Ctrl-C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    args.validate()?;

    let bounds = args.bounds();
    let spawn = Vector2::new(bounds.width / 2.0, bounds.height / 2.0);
    let world = Arc::new(World::new(
        bounds,
        SessionRegistry::new(args.max_clients, spawn),
    ));

    if let Some(path) = &args.scene {
        let scene = Scene::load(path)?;
        scene.apply(&world);
        info!(
            "Loaded scene {}: {} particles, {} walls",
            path.display(),
            world.particle_count(),
            world.wall_count()
        );
    }

    let engine = Engine::new(args.workers)?;
    let server = Server::bind(&args.address(), SessionManager::new(Arc::clone(&world))).await?;

    let (ticks_tx, ticks_rx) = mpsc::unbounded_channel();
    let simulation = spawn_simulation(Arc::clone(&world), engine, args.tick_rate, ticks_tx)?;

    if args.no_console {
        info!("Operator console disabled");
    } else {
        info!("Operator console ready, type commands on stdin");
        tokio::spawn(run_console(
            Arc::clone(&world),
            BufReader::new(tokio::io::stdin()),
        ));
    }

    tokio::select! {
        _ = server.run(ticks_rx) => {
            warn!("Server loop exited");
        }
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Shutting down");
        }
    }

    if simulation.is_finished() {
        warn!("Simulation thread stopped before shutdown");
    }

    Ok(())
}
