//! Fighter state

use super::combat::{self, Character, CombatSystem};
use super::physics::BASE_RADIUS;
use crate::game::{ArenaInput, PlayerId};
use crate::ws::protocol::FighterSnapshot;

/// Actions pressed since the last simulation step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Edges {
    pub dash: bool,
    pub basic: bool,
    pub special: bool,
    pub ult: bool,
}

impl Edges {
    fn rising(prev: &ArenaInput, next: &ArenaInput) -> Self {
        Self {
            dash: next.dash && !prev.dash,
            basic: next.basic && !prev.basic,
            special: next.special && !prev.special,
            ult: next.ult && !prev.ult,
        }
    }

    fn merge(&mut self, other: Edges) {
        self.dash |= other.dash;
        self.basic |= other.basic;
        self.special |= other.special;
        self.ult |= other.ult;
    }
}

#[derive(Debug, Clone)]
pub struct Fighter {
    pub user_id: PlayerId,
    pub display_name: String,
    pub character: &'static Character,
    pub team: u32,
    pub is_boss: bool,
    /// False once the player has left a running match
    pub present: bool,

    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub hp: f32,
    pub max_hp: f32,
    pub move_speed: f32,
    pub damage_scale: f32,
    pub kb_resist: f32,
    pub hitbox_scale: f32,

    pub dash_cd: f32,
    pub dash_timer: f32,
    pub basic_cd: f32,
    pub special_cd: f32,
    pub ult_cd: f32,
    pub stun: f32,
    pub respawn: f32,
    pub ult_charge: f32,
    pub ult_buff: f32,
    pub speed_mult: f32,
    pub speed_timer: f32,
    pub alive: bool,

    pub kos: u32,
    pub deaths: u32,

    pub last_input_seq: u64,
    pub input: ArenaInput,
    pub pending: Edges,
}

impl Fighter {
    pub fn new(user_id: PlayerId, display_name: &str, character: &'static Character) -> Self {
        let mut fighter = Self {
            user_id,
            display_name: display_name.to_string(),
            character,
            team: 0,
            is_boss: false,
            present: true,
            x: 0.0,
            y: 0.0,
            vx: 0.0,
            vy: 0.0,
            hp: 0.0,
            max_hp: 0.0,
            move_speed: 0.0,
            damage_scale: 1.0,
            kb_resist: 1.0,
            hitbox_scale: 1.0,
            dash_cd: 0.0,
            dash_timer: 0.0,
            basic_cd: 0.0,
            special_cd: 0.0,
            ult_cd: 0.0,
            stun: 0.0,
            respawn: 0.0,
            ult_charge: 0.0,
            ult_buff: 0.0,
            speed_mult: 1.0,
            speed_timer: 0.0,
            alive: true,
            kos: 0,
            deaths: 0,
            last_input_seq: 0,
            input: ArenaInput::default(),
            pending: Edges::default(),
        };
        fighter.apply_character(character);
        fighter.hp = fighter.max_hp;
        fighter
    }

    pub fn apply_character(&mut self, character: &'static Character) {
        let stats = character.stats;
        self.character = character;
        self.max_hp = stats.hp;
        self.hp = self.hp.min(self.max_hp);
        self.move_speed = stats.speed;
        self.damage_scale = stats.damage;
        self.kb_resist = stats.knockback_resist;
        self.hitbox_scale = stats.hitbox_scale;
    }

    pub fn radius(&self) -> f32 {
        BASE_RADIUS * self.hitbox_scale
    }

    /// Record a newer input frame. Edges accumulate until the next step.
    pub fn latch(&mut self, input: ArenaInput) {
        self.pending.merge(Edges::rising(&self.input, &input));
        self.input = input;
    }

    /// Clear match progress before a new match
    pub fn reset_for_match(&mut self) {
        self.kos = 0;
        self.deaths = 0;
        self.ult_charge = 0.0;
        self.ult_buff = 0.0;
        self.speed_timer = 0.0;
        self.speed_mult = 1.0;
        self.dash_cd = 0.0;
        self.dash_timer = 0.0;
        self.basic_cd = 0.0;
        self.special_cd = 0.0;
        self.ult_cd = 0.0;
        self.pending = Edges::default();
        self.hitbox_scale = self.character.stats.hitbox_scale;
    }

    pub fn place(&mut self, x: f32, y: f32) {
        self.x = x;
        self.y = y;
        self.vx = 0.0;
        self.vy = 0.0;
        self.alive = true;
        self.respawn = 0.0;
        self.stun = 0.0;
        self.hp = self.max_hp;
    }

    /// Decay every cooldown and timed effect
    pub fn tick_timers(&mut self, dt: f32) {
        self.dash_cd = CombatSystem::tick_timer(self.dash_cd, dt);
        self.basic_cd = CombatSystem::tick_timer(self.basic_cd, dt);
        self.special_cd = CombatSystem::tick_timer(self.special_cd, dt);
        self.ult_cd = CombatSystem::tick_timer(self.ult_cd, dt);
        self.stun = CombatSystem::tick_timer(self.stun, dt);
        self.ult_buff = CombatSystem::tick_timer(self.ult_buff, dt);
        self.speed_timer = CombatSystem::tick_timer(self.speed_timer, dt);
        if self.speed_timer <= 0.0 {
            self.speed_mult = 1.0;
            self.hitbox_scale = self.character.stats.hitbox_scale;
        }
    }

    pub fn add_ult_charge(&mut self, amount: f32) {
        self.ult_charge = (self.ult_charge + amount).min(combat::ULT_CHARGE_MAX);
    }

    pub fn snapshot(&self) -> FighterSnapshot {
        FighterSnapshot {
            user_id: self.user_id,
            display_name: self.display_name.clone(),
            character_id: self.character.id.to_string(),
            team: self.team,
            x: self.x,
            y: self.y,
            vx: self.vx,
            vy: self.vy,
            hp: self.hp.max(0.0),
            max_hp: self.max_hp,
            alive: self.alive,
            dash_cd: self.dash_cd,
            basic_cd: self.basic_cd,
            special_cd: self.special_cd,
            ult_cd: self.ult_cd,
            stun: self.stun,
            respawn: self.respawn,
            ult_charge: self.ult_charge,
            kos: self.kos,
            deaths: self.deaths,
            last_input_seq: self.last_input_seq,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn jovan() -> Fighter {
        Fighter::new(Uuid::new_v4(), "j", combat::character("jovan").unwrap())
    }

    #[test]
    fn test_edges_only_on_press() {
        let mut f = jovan();
        f.latch(ArenaInput {
            seq: 1,
            basic: true,
            ..ArenaInput::default()
        });
        assert!(f.pending.basic);
        f.pending = Edges::default();
        // still held: no new edge
        f.latch(ArenaInput {
            seq: 2,
            basic: true,
            ..ArenaInput::default()
        });
        assert!(!f.pending.basic);
    }

    #[test]
    fn test_speed_timer_restores_hitbox() {
        let mut f = jovan();
        f.hitbox_scale = 0.7;
        f.speed_mult = 1.2;
        f.speed_timer = 0.1;
        f.tick_timers(0.2);
        assert_eq!(f.speed_mult, 1.0);
        assert_eq!(f.hitbox_scale, 1.0);
    }
}
