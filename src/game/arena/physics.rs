//! Fighter movement and collision geometry

use crate::game::ArenaInput;

pub const ARENA_WIDTH: f32 = 960.0;
pub const ARENA_HEIGHT: f32 = 540.0;
/// Fighters are kept this far from the arena edge
pub const WALL_MARGIN: f32 = 18.0;
/// Hitbox radius at scale 1.0
pub const BASE_RADIUS: f32 = 16.0;

/// Physics helpers for fighter motion
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Unit vector and length. Degenerate vectors return a zero direction.
    pub fn normalize(dx: f32, dy: f32) -> (f32, f32, f32) {
        let dist = (dx * dx + dy * dy).sqrt();
        if dist <= 0.0001 {
            return (0.0, 0.0, 0.0001);
        }
        (dx / dist, dy / dist, dist)
    }

    /// Direction requested by held movement keys
    pub fn input_direction(input: &ArenaInput) -> (f32, f32) {
        let dx = i8::from(input.right) - i8::from(input.left);
        let dy = i8::from(input.down) - i8::from(input.up);
        let (nx, ny, _) = Self::normalize(f32::from(dx), f32::from(dy));
        (nx, ny)
    }

    /// Integrate position and clamp it to the arena
    pub fn integrate(x: f32, y: f32, vx: f32, vy: f32, dt: f32) -> (f32, f32) {
        (
            (x + vx * dt).clamp(WALL_MARGIN, ARENA_WIDTH - WALL_MARGIN),
            (y + vy * dt).clamp(WALL_MARGIN, ARENA_HEIGHT - WALL_MARGIN),
        )
    }

    /// Whether a target circle is within `reach` of an attacker's center
    pub fn in_reach(ax: f32, ay: f32, tx: f32, ty: f32, reach: f32, target_radius: f32) -> bool {
        let (_, _, dist) = Self::normalize(tx - ax, ty - ay);
        dist <= reach + target_radius
    }

    /// Check collision between two bodies
    pub fn check_collision(x1: f32, y1: f32, radius1: f32, x2: f32, y2: f32, radius2: f32) -> bool {
        let dx = x2 - x1;
        let dy = y2 - y1;
        let combined_radius = radius1 + radius2;
        dx * dx + dy * dy <= combined_radius * combined_radius
    }

    /// Push two overlapping bodies apart
    /// Returns ((new_x1, new_y1), (new_x2, new_y2))
    pub fn resolve_collision(
        x1: f32,
        y1: f32,
        radius1: f32,
        x2: f32,
        y2: f32,
        radius2: f32,
    ) -> ((f32, f32), (f32, f32)) {
        let dx = x2 - x1;
        let dy = y2 - y1;
        let dist = (dx * dx + dy * dy).sqrt();

        if dist < 0.001 {
            // same position, push apart along x
            return ((x1 - radius1, y1), (x2 + radius2, y2));
        }

        let overlap = radius1 + radius2 - dist;
        if overlap <= 0.0 {
            return ((x1, y1), (x2, y2));
        }

        let nx = dx / dist;
        let ny = dy / dist;
        let push = overlap / 2.0 + 0.1;

        ((x1 - nx * push, y1 - ny * push), (x2 + nx * push, y2 + ny * push))
    }

    /// Clamp a point into the arena
    pub fn clamp_to_arena(x: f32, y: f32) -> (f32, f32) {
        (
            x.clamp(WALL_MARGIN, ARENA_WIDTH - WALL_MARGIN),
            y.clamp(WALL_MARGIN, ARENA_HEIGHT - WALL_MARGIN),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagonal_is_normalized() {
        let input = ArenaInput {
            up: true,
            right: true,
            ..ArenaInput::default()
        };
        let (nx, ny) = PhysicsSystem::input_direction(&input);
        assert!(((nx * nx + ny * ny) - 1.0).abs() < 1e-5);
        assert!(nx > 0.0 && ny < 0.0);
    }

    #[test]
    fn test_integrate_clamps() {
        let (x, y) = PhysicsSystem::integrate(20.0, 20.0, -1000.0, -1000.0, 1.0);
        assert_eq!((x, y), (WALL_MARGIN, WALL_MARGIN));
    }

    #[test]
    fn test_resolve_separates() {
        let ((x1, _), (x2, _)) = PhysicsSystem::resolve_collision(100.0, 100.0, 16.0, 110.0, 100.0, 16.0);
        assert!(!PhysicsSystem::check_collision(x1, 100.0, 16.0, x2, 100.0, 16.0));
    }
}
