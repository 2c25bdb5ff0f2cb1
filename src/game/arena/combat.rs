//! Combat system - characters, move tuning, damage

/// Basic attack reach (center to target edge)
pub const BASIC_RANGE: f32 = 58.0;
pub const BASIC_DAMAGE: f32 = 8.0;
pub const BASIC_KNOCKBACK: f32 = 140.0;
pub const STUN_ON_HIT_SECS: f32 = 0.12;

pub const DASH_COOLDOWN_SECS: f32 = 1.2;
pub const DASH_DURATION_SECS: f32 = 0.16;
pub const DASH_SPEED: f32 = 520.0;
pub const BASIC_COOLDOWN_SECS: f32 = 0.35;
pub const SPECIAL_COOLDOWN_SECS: f32 = 3.0;
pub const ULT_COOLDOWN_SECS: f32 = 8.0;

pub const ULT_CHARGE_MAX: f32 = 100.0;
/// Passive ult charge per second
pub const ULT_CHARGE_RATE: f32 = 2.2;
/// Ult charge per point of damage dealt
pub const ULT_CHARGE_PER_DAMAGE: f32 = 0.8;
pub const ULT_CHARGE_PER_KO: f32 = 20.0;

/// Damage and knockback multipliers while an ultimate buff is active
pub const ULT_BUFF_DAMAGE: f32 = 1.18;
pub const ULT_BUFF_KNOCKBACK: f32 = 1.12;
pub const ULT_BUFF_SPEED: f32 = 1.18;

pub const RESPAWN_SECS: f32 = 2.0;

/// Base stats per character
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CharacterStats {
    pub hp: f32,
    pub speed: f32,
    pub damage: f32,
    pub knockback_resist: f32,
    pub hitbox_scale: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Character {
    pub id: &'static str,
    pub display_name: &'static str,
    pub stats: CharacterStats,
}

pub const CHARACTERS: [Character; 6] = [
    Character {
        id: "jovan",
        display_name: "Jovan",
        stats: CharacterStats {
            hp: 100.0,
            speed: 185.0,
            damage: 1.0,
            knockback_resist: 1.0,
            hitbox_scale: 1.0,
        },
    },
    Character {
        id: "big_t",
        display_name: "Big T",
        stats: CharacterStats {
            hp: 130.0,
            speed: 160.0,
            damage: 1.2,
            knockback_resist: 1.25,
            hitbox_scale: 1.18,
        },
    },
    Character {
        id: "simon",
        display_name: "Simon",
        stats: CharacterStats {
            hp: 90.0,
            speed: 225.0,
            damage: 0.9,
            knockback_resist: 0.9,
            hitbox_scale: 0.95,
        },
    },
    Character {
        id: "edward",
        display_name: "Edward",
        stats: CharacterStats {
            hp: 92.0,
            speed: 195.0,
            damage: 0.95,
            knockback_resist: 0.92,
            hitbox_scale: 0.82,
        },
    },
    Character {
        id: "griffin",
        display_name: "Griffin",
        stats: CharacterStats {
            hp: 115.0,
            speed: 155.0,
            damage: 1.28,
            knockback_resist: 1.05,
            hitbox_scale: 1.05,
        },
    },
    Character {
        id: "hannigan",
        display_name: "Mr. Hannigan",
        stats: CharacterStats {
            hp: 180.0,
            speed: 145.0,
            damage: 1.15,
            knockback_resist: 1.45,
            hitbox_scale: 1.22,
        },
    },
];

pub const DEFAULT_CHARACTER: &str = "jovan";
pub const BOSS_CHARACTER: &str = "hannigan";

/// Look up a character by id (case-insensitive)
pub fn character(id: &str) -> Option<&'static Character> {
    let id = id.trim();
    CHARACTERS.iter().find(|c| c.id.eq_ignore_ascii_case(id))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    Basic,
    Special,
    Ult,
}

impl MoveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MoveKind::Basic => "basic",
            MoveKind::Special => "special",
            MoveKind::Ult => "ult",
        }
    }
}

/// Area hit around the attacker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Strike {
    pub range: f32,
    /// Unscaled damage; the attacker's damage scale applies on top
    pub damage: f32,
    pub knockback: f32,
    pub stun: f32,
}

impl Strike {
    const fn new(range: f32, damage: f32, knockback: f32, stun: f32) -> Self {
        Self {
            range,
            damage,
            knockback,
            stun,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HitboxChange {
    /// Multiply the current scale, never going below `floor`
    Shrink { factor: f32, floor: f32 },
    Set(f32),
}

/// Timed speed multiplier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedMod {
    pub mult: f32,
    pub secs: f32,
}

/// What a move does to its user
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SelfEffect {
    pub velocity_scale: Option<f32>,
    pub hitbox: Option<HitboxChange>,
    pub speed: Option<SpeedMod>,
    pub ult_buff_secs: Option<f32>,
}

/// Full description of one move for one character
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveProfile {
    pub strike: Option<Strike>,
    pub on_self: SelfEffect,
    /// Slow applied to every target hit
    pub on_target: Option<SpeedMod>,
    /// Buff announcement for moves without a strike
    pub buff_name: Option<&'static str>,
}

impl MoveProfile {
    fn strike(strike: Strike) -> Self {
        Self {
            strike: Some(strike),
            on_self: SelfEffect::default(),
            on_target: None,
            buff_name: None,
        }
    }

    fn buff(name: &'static str, on_self: SelfEffect) -> Self {
        Self {
            strike: None,
            on_self,
            on_target: None,
            buff_name: Some(name),
        }
    }

    pub fn for_move(character_id: &str, kind: MoveKind) -> Self {
        let basic = Strike::new(BASIC_RANGE, BASIC_DAMAGE, BASIC_KNOCKBACK, STUN_ON_HIT_SECS);
        match (kind, character_id) {
            (MoveKind::Basic, _) => Self::strike(basic),

            (MoveKind::Special, "jovan") => Self {
                on_target: Some(SpeedMod { mult: 0.65, secs: 1.6 }),
                ..Self::strike(Strike::new(88.0, 9.0, 110.0, 0.28))
            },
            (MoveKind::Special, "big_t") => Self::strike(Strike::new(92.0, 18.0, 220.0, 0.24)),
            (MoveKind::Special, "simon") => Self {
                on_self: SelfEffect {
                    velocity_scale: Some(1.15),
                    ..SelfEffect::default()
                },
                ..Self::strike(Strike::new(76.0, 11.0, 145.0, STUN_ON_HIT_SECS))
            },
            (MoveKind::Special, "edward") => Self::buff(
                "Low Profile",
                SelfEffect {
                    hitbox: Some(HitboxChange::Shrink {
                        factor: 0.88,
                        floor: 0.68,
                    }),
                    speed: Some(SpeedMod { mult: 1.12, secs: 2.6 }),
                    ..SelfEffect::default()
                },
            ),
            (MoveKind::Special, "griffin") => Self {
                on_self: SelfEffect {
                    speed: Some(SpeedMod { mult: 0.88, secs: 1.1 }),
                    ..SelfEffect::default()
                },
                ..Self::strike(Strike::new(80.0, 22.0, 240.0, STUN_ON_HIT_SECS))
            },
            (MoveKind::Special, "hannigan") => Self::strike(Strike::new(110.0, 15.0, 180.0, 0.26)),
            (MoveKind::Special, _) => Self::strike(basic),

            (MoveKind::Ult, "jovan") => Self::buff(
                "Lock In",
                SelfEffect {
                    ult_buff_secs: Some(6.0),
                    ..SelfEffect::default()
                },
            ),
            (MoveKind::Ult, "big_t") => Self::strike(Strike::new(120.0, 30.0, 310.0, STUN_ON_HIT_SECS)),
            (MoveKind::Ult, "simon") => Self::buff(
                "Frame Advantage",
                SelfEffect {
                    ult_buff_secs: Some(5.0),
                    speed: Some(SpeedMod { mult: 1.35, secs: 5.0 }),
                    ..SelfEffect::default()
                },
            ),
            (MoveKind::Ult, "edward") => Self {
                on_self: SelfEffect {
                    hitbox: Some(HitboxChange::Set(0.7)),
                    speed: Some(SpeedMod { mult: 1.18, secs: 3.0 }),
                    ..SelfEffect::default()
                },
                ..Self::strike(Strike::new(95.0, 20.0, 210.0, STUN_ON_HIT_SECS))
            },
            (MoveKind::Ult, "griffin") => Self::strike(Strike::new(130.0, 34.0, 330.0, STUN_ON_HIT_SECS)),
            (MoveKind::Ult, "hannigan") => Self::strike(Strike::new(145.0, 28.0, 290.0, STUN_ON_HIT_SECS)),
            (MoveKind::Ult, _) => Self::strike(basic),
        }
    }
}

/// Combat helpers shared by fighters and the boss
pub struct CombatSystem;

impl CombatSystem {
    /// Decay a cooldown or timer toward zero
    pub fn tick_timer(value: f32, dt: f32) -> f32 {
        (value - dt).max(0.0)
    }

    /// Apply damage to health, returns (new_health, is_down)
    pub fn apply_damage(current_health: f32, damage: f32) -> (f32, bool) {
        let new_health = current_health - damage;
        (new_health, new_health <= 0.0)
    }

    /// Final damage of a strike, never below one point
    pub fn strike_damage(strike: &Strike, damage_scale: f32, ult_buffed: bool) -> f32 {
        let mut damage = strike.damage * damage_scale;
        if ult_buffed {
            damage *= ULT_BUFF_DAMAGE;
        }
        damage.max(1.0)
    }

    /// Impulse applied to a target, softened by its knockback resistance
    pub fn knockback_impulse(knockback: f32, ult_buffed: bool, target_resist: f32) -> f32 {
        let kb = if ult_buffed { knockback * ULT_BUFF_KNOCKBACK } else { knockback };
        (kb / target_resist.max(0.25)).max(50.0)
    }
}
