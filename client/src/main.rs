use clap::Parser;
use client::game::ClientWorld;
use client::input::{InputManager, DEFAULT_STEP};
use client::network::{Connection, NetworkEvent};
use client::rendering::Renderer;
use log::{error, info};
use macroquad::prelude::*;
use shared::{Bounds, CANVAS_HEIGHT, CANVAS_WIDTH, DEFAULT_PORT};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value_t = format!("127.0.0.1:{}", DEFAULT_PORT))]
    server: String,

    /// Window width
    #[arg(short = 'w', long, default_value_t = CANVAS_WIDTH as u32)]
    width: u32,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value_t = CANVAS_HEIGHT as u32)]
    height: u32,

    /// Pixels the own sprite moves per frame while a key is held
    #[arg(long, default_value_t = DEFAULT_STEP)]
    step: f64,
}

fn window_conf() -> Conf {
    let args = Args::parse();
    Conf {
        window_title: "Particle Sandbox".to_string(),
        window_width: args.width as i32,
        window_height: args.height as i32,
        window_resizable: false,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    info!("Controls: arrows/WASD to move, R to reconnect");

    let mut world = ClientWorld::new(Bounds::new(args.width as f64, args.height as f64));
    let mut input = InputManager::new(args.step);
    let mut renderer = Renderer::new(args.width, args.height);

    let mut connection = match Connection::spawn(&args.server) {
        Ok(connection) => connection,
        Err(e) => {
            error!("Failed to start network thread: {}", e);
            return;
        }
    };

    loop {
        for event in connection.poll() {
            match event {
                NetworkEvent::Message(message) => world.apply(message),
                NetworkEvent::SnapshotEnd => world.end_snapshot(),
                NetworkEvent::Disconnected(reason) => info!("Connection closed: {}", reason),
            }
        }

        let (reconnect, displacement) = input.update();

        if reconnect && !connection.is_connected() {
            // Reconnecting always yields a fresh identity from the server.
            world.reset();
            match Connection::spawn(&args.server) {
                Ok(fresh) => connection = fresh,
                Err(e) => error!("Failed to reconnect: {}", e),
            }
        }

        if let Some((dx, dy)) = displacement {
            if world.client_id.is_some() {
                if let Some(report) = world.move_self(dx, dy) {
                    connection.send(report);
                }
            }
        }

        world.extrapolate(get_frame_time() as f64);
        renderer.render(&world, connection.is_connected());

        if is_key_pressed(KeyCode::Escape) {
            break;
        }

        next_frame().await;
    }
}
