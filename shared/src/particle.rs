use crate::Vector2;

/// Wraps an angle in degrees into `[0, 360)`.
pub fn normalize_degrees(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// A simulated point mass moving with constant speed along a heading.
///
/// The heading is the only thing that changes direction; the velocity vector is
/// always derived from `speed` and `heading`, so it can never drift out of sync.
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub id: u32,
    pub x: f64,
    pub y: f64,
    speed: f64,
    heading: f64,
    /// Number of engine steps applied to this particle.
    pub generation: u64,
}

impl Particle {
    pub fn new(id: u32, x: f64, y: f64, speed: f64, heading: f64) -> Self {
        Self {
            id,
            x,
            y,
            speed: speed.max(0.0),
            heading: normalize_degrees(heading),
            generation: 0,
        }
    }

    pub fn position(&self) -> Vector2 {
        Vector2::new(self.x, self.y)
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn set_speed(&mut self, speed: f64) {
        self.speed = speed.max(0.0);
    }

    /// Heading in degrees, always within `[0, 360)`.
    pub fn heading(&self) -> f64 {
        self.heading
    }

    pub fn set_heading(&mut self, heading: f64) {
        self.heading = normalize_degrees(heading);
    }

    pub fn velocity(&self) -> Vector2 {
        Vector2::from_degrees(self.heading).scale(self.speed)
    }

    /// Advances the position by `dt` seconds along the current heading.
    pub fn move_by(&mut self, dt: f64) {
        let next = self.predicted_position(dt);
        self.x = next.x;
        self.y = next.y;
    }

    /// Where the particle would be after `dt` seconds, without moving it.
    pub fn predicted_position(&self, dt: f64) -> Vector2 {
        self.position().add(&self.velocity().scale(dt))
    }

    /// Mirrors the heading across the vertical axis (bounce off a left/right edge).
    pub fn reflect_horizontal(&mut self) {
        self.set_heading(180.0 - self.heading);
    }

    /// Mirrors the heading across the horizontal axis (bounce off a top/bottom edge).
    pub fn reflect_vertical(&mut self) {
        self.set_heading(-self.heading);
    }

    /// Bounces off a surface lying along `surface_angle` degrees.
    ///
    /// The direction is reflected about the surface normal with `d' = d - 2(d.n)n`.
    /// Works on the unit direction so stationary particles still get a heading.
    pub fn reflect_off_surface(&mut self, surface_angle: f64) {
        let direction = Vector2::from_degrees(self.heading);
        let normal = Vector2::from_degrees(surface_angle + 90.0);
        let reflected = direction.sub(&normal.scale(2.0 * direction.dot(&normal)));
        self.set_heading(reflected.y.atan2(reflected.x).to_degrees());
    }
}
