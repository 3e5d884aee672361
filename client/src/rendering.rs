use crate::game::ClientWorld;
use macroquad::prelude::*;
use shared::{Particle, Vector2, PARTICLE_SIZE, SPRITE_SIZE};

#[derive(Debug, Clone)]
pub struct UiConfig {
    pub client_id: Option<u32>,
    pub connected: bool,
    pub tick: u64,
    pub particle_count: usize,
    pub wall_count: usize,
    pub peer_count: usize,
}

pub struct Renderer {
    width: f32,
    height: f32,
}

impl Renderer {
    pub fn new(width: u32, height: u32) -> Self {
        Renderer {
            width: width as f32,
            height: height as f32,
        }
    }

    pub fn render(&mut self, world: &ClientWorld, connected: bool) {
        clear_background(Color::from_rgba(26, 26, 26, 255));

        self.draw_border();

        for wall in world.walls() {
            let (start, end) = (wall.start(), wall.end());
            draw_line(
                start.x as f32,
                start.y as f32,
                end.x as f32,
                end.y as f32,
                3.0,
                Color::from_rgba(200, 200, 200, 255),
            );
        }

        for particle in world.particles() {
            self.draw_particle(particle);
        }

        for (id, position) in world.peers() {
            self.draw_sprite(position, Color::from_rgba(255, 68, 68, 255));
            self.draw_sprite_id(id, position);
        }

        if let Some(id) = world.client_id {
            self.draw_sprite(world.position, GREEN);
            self.draw_sprite_id(id, world.position);
        }

        self.draw_ui(UiConfig {
            client_id: world.client_id,
            connected,
            tick: world.tick,
            particle_count: world.particles().len(),
            wall_count: world.walls().len(),
            peer_count: world.peer_count(),
        });
    }

    fn draw_border(&mut self) {
        draw_rectangle_lines(
            0.0,
            0.0,
            self.width,
            self.height,
            2.0,
            Color::from_rgba(68, 68, 68, 255),
        );
    }

    fn draw_particle(&mut self, particle: &Particle) {
        let x = particle.x as f32;
        let y = particle.y as f32;
        draw_circle(x, y, PARTICLE_SIZE / 2.0, Color::from_rgba(0, 170, 255, 255));

        // Short heading tick, scaled with speed.
        let velocity = particle.velocity().scale(0.05);
        if velocity.magnitude() > 1.0 {
            draw_line(
                x,
                y,
                x + velocity.x as f32,
                y + velocity.y as f32,
                1.0,
                YELLOW,
            );
        }
    }

    fn draw_sprite(&mut self, position: Vector2, color: Color) {
        let x = position.x as f32 - SPRITE_SIZE / 2.0;
        let y = position.y as f32 - SPRITE_SIZE / 2.0;
        draw_rectangle(x, y, SPRITE_SIZE, SPRITE_SIZE, color);
        draw_rectangle_lines(x, y, SPRITE_SIZE, SPRITE_SIZE, 2.0, WHITE);
    }

    fn draw_sprite_id(&mut self, id: u32, position: Vector2) {
        let label = id.to_string();
        draw_text(
            &label,
            position.x as f32 - 4.0,
            position.y as f32 + 5.0,
            16.0,
            WHITE,
        );
    }

    fn draw_ui(&mut self, config: UiConfig) {
        let connection_color = if config.connected && config.client_id.is_some() {
            GREEN
        } else {
            RED
        };
        draw_rectangle(10.0, 10.0, 8.0, 8.0, connection_color);

        let id_text = match config.client_id {
            Some(id) => format!("client {}", id),
            None => "connecting".to_string(),
        };
        draw_text(&id_text, 24.0, 18.0, 14.0, WHITE);

        let stats = format!(
            "tick {}  particles {}  walls {}  peers {}",
            config.tick, config.particle_count, config.wall_count, config.peer_count
        );
        draw_text(&stats, 10.0, 34.0, 14.0, WHITE);

        if !config.connected {
            draw_text("disconnected - press R to reconnect", 10.0, 50.0, 14.0, RED);
        }
    }
}
