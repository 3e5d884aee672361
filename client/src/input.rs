//! Keyboard sampling for the own sprite and the reconnect key.

use macroquad::prelude::*;

/// Pixels moved per frame while a direction key is held.
pub const DEFAULT_STEP: f64 = 5.0;

/// Turns held direction keys into a displacement of `step` pixels per axis.
pub fn movement(left: bool, right: bool, up: bool, down: bool, step: f64) -> Option<(f64, f64)> {
    let axis = |negative: bool, positive: bool| match (negative, positive) {
        (true, false) => -step,
        (false, true) => step,
        _ => 0.0,
    };

    let dx = axis(left, right);
    let dy = axis(up, down);
    if dx == 0.0 && dy == 0.0 {
        None
    } else {
        Some((dx, dy))
    }
}

pub struct InputManager {
    step: f64,
    prev_key_r: bool,
}

impl InputManager {
    pub fn new(step: f64) -> Self {
        Self {
            step,
            prev_key_r: false,
        }
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    /// Samples the keyboard once per frame.
    /// Returns (reconnect pressed, displacement to apply).
    pub fn update(&mut self) -> (bool, Option<(f64, f64)>) {
        let left = is_key_down(KeyCode::A) || is_key_down(KeyCode::Left);
        let right = is_key_down(KeyCode::D) || is_key_down(KeyCode::Right);
        let up = is_key_down(KeyCode::W) || is_key_down(KeyCode::Up);
        let down = is_key_down(KeyCode::S) || is_key_down(KeyCode::Down);

        let key_r = is_key_down(KeyCode::R);
        let reconnect = key_r && !self.prev_key_r;
        self.prev_key_r = key_r;

        (reconnect, movement(left, right, up, down, self.step))
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new(DEFAULT_STEP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_manager_creation() {
        let input_manager = InputManager::default();
        assert_eq!(input_manager.step(), DEFAULT_STEP);
        assert!(!input_manager.prev_key_r);
    }

    #[test]
    fn test_movement_directions() {
        assert_eq!(movement(false, false, false, false, 5.0), None);
        assert_eq!(movement(true, false, false, false, 5.0), Some((-5.0, 0.0)));
        assert_eq!(movement(false, true, true, false, 2.0), Some((2.0, -2.0)));
        assert_eq!(movement(false, false, false, true, 1.5), Some((0.0, 1.5)));
    }

    #[test]
    fn test_opposite_keys_cancel() {
        assert_eq!(movement(true, true, false, false, 5.0), None);
        assert_eq!(movement(true, true, true, false, 5.0), Some((0.0, -5.0)));
    }
}
