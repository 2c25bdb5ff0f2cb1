//! Server-driven boss

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

use super::combat::{self, ULT_CHARGE_MAX};
use super::fighter::Fighter;
use super::physics::{PhysicsSystem, ARENA_HEIGHT, ARENA_WIDTH};
use crate::game::{ArenaInput, PlayerId};

/// Stable identity of the boss in snapshots and events
pub const BOSS_ID: PlayerId = Uuid::nil();
pub const BOSS_TEAM: u32 = 999;
const BOSS_HP_SCALE: f32 = 2.2;
const BOSS_SPEED_SCALE: f32 = 0.92;
/// Axis threshold before a movement key is held
const AXIS_DEADZONE: f32 = 0.15;

/// Build the boss fighter at the arena center
pub fn spawn_boss() -> Fighter {
    let character = combat::character(combat::BOSS_CHARACTER).unwrap_or(&combat::CHARACTERS[5]);
    let mut boss = Fighter::new(BOSS_ID, character.display_name, character);
    boss.is_boss = true;
    boss.team = BOSS_TEAM;
    boss.max_hp *= BOSS_HP_SCALE;
    boss.move_speed *= BOSS_SPEED_SCALE;
    boss.place(ARENA_WIDTH / 2.0, ARENA_HEIGHT / 2.0);
    boss.ult_charge = ULT_CHARGE_MAX;
    boss
}

/// Chases the nearest fighter, strafes and pulses attacks
#[derive(Debug, Clone)]
pub struct BossBrain {
    retarget_in: f32,
    burst_in: f32,
    target: Option<PlayerId>,
    strafe: f32,
}

impl BossBrain {
    pub fn new(rng: &mut ChaCha8Rng) -> Self {
        Self {
            retarget_in: 0.0,
            burst_in: rng.gen_range(1.0..=2.5),
            target: None,
            strafe: 1.0,
        }
    }

    /// Held-button frame for this step. `targets` are living human fighters.
    pub fn pick(&mut self, boss: &Fighter, targets: &[&Fighter], dt: f32, rng: &mut ChaCha8Rng) -> ArenaInput {
        if targets.is_empty() {
            return ArenaInput::default();
        }
        self.retarget_in -= dt;
        self.burst_in -= dt;

        let current = self
            .target
            .and_then(|id| targets.iter().find(|t| t.user_id == id).copied());
        let target = match current {
            Some(t) if self.retarget_in > 0.0 => t,
            _ => {
                let nearest = targets
                    .iter()
                    .copied()
                    .min_by(|a, b| {
                        let da = (a.x - boss.x).powi(2) + (a.y - boss.y).powi(2);
                        let db = (b.x - boss.x).powi(2) + (b.y - boss.y).powi(2);
                        da.total_cmp(&db)
                    })
                    .unwrap_or(targets[0]);
                self.target = Some(nearest.user_id);
                self.retarget_in = rng.gen_range(0.5..=1.3);
                self.strafe = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
                nearest
            }
        };

        let (nx, ny, dist) = PhysicsSystem::normalize(target.x - boss.x, target.y - boss.y);
        let move_x = nx * 0.8 - ny * self.strafe * 0.4;
        let move_y = ny * 0.8 + nx * self.strafe * 0.4;

        // pulse buttons so edge-triggered actions keep firing
        let basic = dist < 70.0 && rng.gen_bool(0.2);
        let special = dist < 110.0 && rng.gen_bool(0.03);
        let ult = dist < 130.0 && boss.ult_charge >= ULT_CHARGE_MAX && rng.gen_bool(0.02);
        let mut dash = dist > 150.0 && rng.gen_bool(0.03);
        if self.burst_in <= 0.0 {
            dash = true;
            self.burst_in = rng.gen_range(1.8..=3.0);
        }

        ArenaInput {
            seq: 0,
            up: move_y < -AXIS_DEADZONE,
            down: move_y > AXIS_DEADZONE,
            left: move_x < -AXIS_DEADZONE,
            right: move_x > AXIS_DEADZONE,
            dash,
            basic,
            special,
            ult,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_boss_stats() {
        let boss = spawn_boss();
        assert!(boss.is_boss);
        assert_eq!(boss.user_id, BOSS_ID);
        assert!((boss.max_hp - 180.0 * BOSS_HP_SCALE).abs() < 1e-3);
        assert_eq!(boss.hp, boss.max_hp);
    }

    #[test]
    fn test_boss_moves_toward_target() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut brain = BossBrain::new(&mut rng);
        let boss = spawn_boss();
        let mut target = Fighter::new(Uuid::new_v4(), "t", combat::character("simon").unwrap());
        target.place(boss.x + 300.0, boss.y);
        let input = brain.pick(&boss, &[&target], 0.033, &mut rng);
        assert!(input.right);
        assert!(!input.left);
    }

    #[test]
    fn test_no_targets_idle() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut brain = BossBrain::new(&mut rng);
        let input = brain.pick(&spawn_boss(), &[], 0.033, &mut rng);
        assert_eq!(input, ArenaInput::default());
    }
}
