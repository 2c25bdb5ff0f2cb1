//! Arena: authoritative top-down brawler
//!
//! Fighters move from held-key input frames and fire actions on the rising
//! edge of a button. Inputs carry a client sequence number; anything at or
//! below the last applied sequence is dropped, so clients may resend freely.

mod boss;
mod combat;
mod fighter;
mod physics;

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub use boss::BOSS_ID;
pub use combat::{character, Character, MoveKind, CHARACTERS};
pub use fighter::Fighter;
pub use physics::{ARENA_HEIGHT, ARENA_WIDTH};

use self::boss::BossBrain;
use self::combat::{CombatSystem, HitboxChange, MoveProfile};
use self::physics::PhysicsSystem;
use super::{Action, EngineResult, GameEngine, GameKind, Outbox, Outcome, Phase, PlayerId, Standing};
use crate::error::{CoreError, CoreResult};
use crate::ws::protocol::{ArenaEvent, ArenaSnapshot, RoomEnd, ServerMsg, TimedArenaEvent};

/// Events older than this many ticks are left out of snapshots
const EVENT_WINDOW_TICKS: u64 = 3;
const EVENT_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArenaMode {
    Duel,
    Teams,
    Ffa,
    Boss,
    Practice,
}

impl ArenaMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArenaMode::Duel => "duel",
            ArenaMode::Teams => "teams",
            ArenaMode::Ffa => "ffa",
            ArenaMode::Boss => "boss",
            ArenaMode::Practice => "practice",
        }
    }

    pub fn min_players(&self) -> usize {
        match self {
            ArenaMode::Duel => 2,
            ArenaMode::Teams => 4,
            ArenaMode::Ffa => 2,
            ArenaMode::Boss | ArenaMode::Practice => 1,
        }
    }

    /// Player slots. FFA and boss rooms use the configured cap.
    pub fn max_players(&self, cap: usize) -> usize {
        match self {
            ArenaMode::Duel => 2,
            ArenaMode::Teams => 4,
            ArenaMode::Ffa | ArenaMode::Boss => cap.max(2),
            ArenaMode::Practice => 1,
        }
    }

    pub fn target_kos(&self) -> u32 {
        match self {
            ArenaMode::Duel => 5,
            ArenaMode::Teams => 7,
            ArenaMode::Ffa => 6,
            ArenaMode::Boss => 10,
            ArenaMode::Practice => 999,
        }
    }
}

impl fmt::Display for ArenaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArenaMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "duel" => Ok(ArenaMode::Duel),
            "teams" => Ok(ArenaMode::Teams),
            "ffa" => Ok(ArenaMode::Ffa),
            "boss" => Ok(ArenaMode::Boss),
            "practice" => Ok(ArenaMode::Practice),
            _ => Err(CoreError::Validation("unknown_mode")),
        }
    }
}

/// Addresses either a human fighter (by seat index) or the boss
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Human(usize),
    Boss,
}

pub struct ArenaEngine {
    room_id: String,
    mode: ArenaMode,
    phase: Phase,
    tick: u64,
    rng: ChaCha8Rng,
    match_seconds: f32,
    time_left: f32,
    max_players: usize,
    /// Human fighters in seat order
    fighters: Vec<Fighter>,
    ready: Vec<PlayerId>,
    boss: Option<Fighter>,
    brain: Option<BossBrain>,
    boss_down: bool,
    events: VecDeque<TimedArenaEvent>,
    result: Option<EngineResult>,
}

impl ArenaEngine {
    pub fn new(room_id: &str, mode: ArenaMode, match_seconds: u32, max_players: usize, seed: u64) -> Self {
        let match_seconds = match_seconds.clamp(60, 120) as f32;
        Self {
            room_id: room_id.to_string(),
            mode,
            phase: Phase::Waiting,
            tick: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
            match_seconds,
            time_left: match_seconds,
            max_players: mode.max_players(max_players),
            fighters: Vec::new(),
            ready: Vec::new(),
            boss: None,
            brain: None,
            boss_down: false,
            events: VecDeque::with_capacity(EVENT_BUFFER),
            result: None,
        }
    }

    pub fn mode(&self) -> ArenaMode {
        self.mode
    }

    pub fn fighter(&self, player: PlayerId) -> Option<&Fighter> {
        self.fighters.iter().find(|f| f.user_id == player)
    }

    pub fn boss(&self) -> Option<&Fighter> {
        self.boss.as_ref()
    }

    fn seat_of(&self, player: PlayerId) -> Option<usize> {
        self.fighters.iter().position(|f| f.user_id == player && f.present)
    }

    fn get(&self, slot: Slot) -> Option<&Fighter> {
        match slot {
            Slot::Human(i) => self.fighters.get(i),
            Slot::Boss => self.boss.as_ref(),
        }
    }

    fn get_mut(&mut self, slot: Slot) -> Option<&mut Fighter> {
        match slot {
            Slot::Human(i) => self.fighters.get_mut(i),
            Slot::Boss => self.boss.as_mut(),
        }
    }

    /// Every fighter taking part in the simulation
    fn active_slots(&self) -> Vec<Slot> {
        let mut slots: Vec<Slot> = self
            .fighters
            .iter()
            .enumerate()
            .filter(|(_, f)| f.present)
            .map(|(i, _)| Slot::Human(i))
            .collect();
        if self.boss.is_some() {
            slots.push(Slot::Boss);
        }
        slots
    }

    fn push_event(&mut self, event: ArenaEvent) {
        if self.events.len() == EVENT_BUFFER {
            self.events.pop_front();
        }
        self.events.push_back(TimedArenaEvent { tick: self.tick, event });
    }

    fn assign_teams(&mut self) {
        let teams = self.mode == ArenaMode::Teams;
        for (idx, fighter) in self.fighters.iter_mut().enumerate() {
            fighter.team = if teams { (idx % 2) as u32 } else { idx as u32 };
        }
    }

    fn spawn_point(&mut self, idx: usize) -> (f32, f32) {
        let mut points = [
            (110.0, 110.0),
            (ARENA_WIDTH - 110.0, ARENA_HEIGHT - 110.0),
            (ARENA_WIDTH - 110.0, 110.0),
            (110.0, ARENA_HEIGHT - 110.0),
            (ARENA_WIDTH / 2.0, 100.0),
            (ARENA_WIDTH / 2.0, ARENA_HEIGHT - 100.0),
        ];
        points.shuffle(&mut self.rng);
        points[idx % points.len()]
    }

    fn respawn(&mut self, idx: usize) {
        let (x, y) = self.spawn_point(idx);
        if let Some(f) = self.fighters.get_mut(idx) {
            f.place(x, y);
        }
    }

    fn try_start(&mut self, force: bool, out: &mut Outbox) -> bool {
        if self.phase != Phase::Waiting {
            return false;
        }
        let seated = self.fighters.len();
        let enough = seated >= self.mode.min_players();
        let all_ready = seated > 0 && self.fighters.iter().all(|f| self.ready.contains(&f.user_id));
        let ready_ok = force || self.mode == ArenaMode::Practice || all_ready;
        if !(enough && ready_ok) {
            return false;
        }

        self.events.clear();
        for idx in 0..self.fighters.len() {
            self.fighters[idx].reset_for_match();
            self.respawn(idx);
        }
        self.time_left = self.match_seconds;
        if self.mode == ArenaMode::Boss {
            self.boss = Some(boss::spawn_boss());
            self.brain = Some(BossBrain::new(&mut self.rng));
        }
        self.phase = Phase::Running;
        tracing::debug!(room_id = %self.room_id, mode = %self.mode, players = seated, "Arena match started");
        out.room(ServerMsg::ArenaStart {
            room_id: self.room_id.clone(),
            mode_name: self.mode.as_str().to_string(),
            time_left: self.time_left,
        });
        true
    }

    /// Living opponents of the fighter in `attacker`
    fn enemy_slots(&self, attacker: Slot) -> Vec<Slot> {
        let Some(a) = self.get(attacker) else {
            return Vec::new();
        };
        self.active_slots()
            .into_iter()
            .filter(|&slot| slot != attacker)
            .filter(|&slot| {
                let Some(t) = self.get(slot) else {
                    return false;
                };
                if !t.alive {
                    return false;
                }
                match self.mode {
                    ArenaMode::Boss => a.is_boss != t.is_boss,
                    ArenaMode::Teams => a.team != t.team,
                    _ => true,
                }
            })
            .collect()
    }

    fn knock_out(&mut self, victim: Slot, killer: Option<PlayerId>) {
        let boss_mode = self.mode == ArenaMode::Boss;
        let Some(v) = self.get_mut(victim) else {
            return;
        };
        v.alive = false;
        v.hp = 0.0;
        v.vx = 0.0;
        v.vy = 0.0;
        v.deaths += 1;
        // the human side is not revived in boss mode, so it can be wiped
        v.respawn = if boss_mode || v.is_boss { 0.0 } else { combat::RESPAWN_SECS };
        let victim_id = v.user_id;
        if v.is_boss {
            self.boss_down = true;
        }
        self.push_event(ArenaEvent::Ko {
            victim: victim_id,
            killer,
        });
    }

    fn attack(&mut self, slot: Slot, kind: MoveKind) {
        let Some(a) = self.get(slot) else {
            return;
        };
        if !a.alive {
            return;
        }
        let (attacker_id, ax, ay, damage_scale) = (a.user_id, a.x, a.y, a.damage_scale);
        let profile = MoveProfile::for_move(a.character.id, kind);

        if let Some(a) = self.get_mut(slot) {
            let effect = profile.on_self;
            if let Some(scale) = effect.velocity_scale {
                a.vx *= scale;
                a.vy *= scale;
            }
            match effect.hitbox {
                Some(HitboxChange::Shrink { factor, floor }) => a.hitbox_scale = (a.hitbox_scale * factor).max(floor),
                Some(HitboxChange::Set(scale)) => a.hitbox_scale = scale,
                None => {}
            }
            if let Some(speed) = effect.speed {
                a.speed_mult = speed.mult;
                a.speed_timer = speed.secs;
            }
            if let Some(secs) = effect.ult_buff_secs {
                a.ult_buff = secs;
            }
        }

        let Some(strike) = profile.strike else {
            if let Some(name) = profile.buff_name {
                self.push_event(ArenaEvent::Buff {
                    user_id: attacker_id,
                    name: name.to_string(),
                });
            }
            return;
        };
        let buffed = self.get(slot).map(|a| a.ult_buff > 0.0).unwrap_or(false);
        let damage = CombatSystem::strike_damage(&strike, damage_scale, buffed);

        let mut dealt = 0.0;
        let mut kos = 0;
        for target in self.enemy_slots(slot) {
            let Some(t) = self.get_mut(target) else {
                continue;
            };
            if !PhysicsSystem::in_reach(ax, ay, t.x, t.y, strike.range, t.radius()) {
                continue;
            }
            let (nx, ny, _) = PhysicsSystem::normalize(t.x - ax, t.y - ay);
            let impulse = CombatSystem::knockback_impulse(strike.knockback, buffed, t.kb_resist);
            let (hp, down) = CombatSystem::apply_damage(t.hp, damage);
            t.hp = hp;
            t.vx += nx * impulse;
            t.vy += ny * impulse;
            t.stun = t.stun.max(strike.stun);
            if let Some(slow) = profile.on_target {
                t.speed_timer = t.speed_timer.max(slow.secs);
                t.speed_mult = slow.mult;
            }
            let target_id = t.user_id;
            dealt += damage;
            self.push_event(ArenaEvent::Hit {
                attacker: attacker_id,
                target: target_id,
                damage,
            });
            if down {
                kos += 1;
                self.knock_out(target, Some(attacker_id));
            }
        }

        if dealt == 0.0 {
            self.push_event(ArenaEvent::Whiff {
                attacker: attacker_id,
                r#move: kind.as_str().to_string(),
            });
            return;
        }
        if let Some(a) = self.get_mut(slot) {
            a.add_ult_charge(dealt * combat::ULT_CHARGE_PER_DAMAGE);
            a.add_ult_charge(kos as f32 * combat::ULT_CHARGE_PER_KO);
            a.kos += kos;
        }
    }

    /// Fire every action pressed since the previous step
    fn handle_edges(&mut self, slot: Slot) {
        let Some(f) = self.get_mut(slot) else {
            return;
        };
        let edges = std::mem::take(&mut f.pending);
        if !f.alive || f.stun > 0.0 {
            return;
        }

        let mut fire = Vec::with_capacity(3);
        if edges.dash && f.dash_cd <= 0.0 {
            f.dash_cd = combat::DASH_COOLDOWN_SECS;
            f.dash_timer = combat::DASH_DURATION_SECS;
            let (mut nx, mut ny) = PhysicsSystem::input_direction(&f.input);
            if nx.abs() < 0.01 && ny.abs() < 0.01 {
                nx = 1.0;
                ny = 0.0;
            }
            f.vx = nx * combat::DASH_SPEED;
            f.vy = ny * combat::DASH_SPEED;
            let user_id = f.user_id;
            self.push_event(ArenaEvent::Dash { user_id });
        }

        let Some(f) = self.get_mut(slot) else {
            return;
        };
        if edges.basic && f.basic_cd <= 0.0 {
            f.basic_cd = combat::BASIC_COOLDOWN_SECS;
            fire.push(MoveKind::Basic);
        }
        if edges.special && f.special_cd <= 0.0 {
            f.special_cd = combat::SPECIAL_COOLDOWN_SECS;
            fire.push(MoveKind::Special);
        }
        if edges.ult && f.ult_cd <= 0.0 && (f.ult_charge >= combat::ULT_CHARGE_MAX || f.is_boss) {
            f.ult_cd = combat::ULT_COOLDOWN_SECS;
            f.ult_charge = 0.0;
            fire.push(MoveKind::Ult);
        }
        for kind in fire {
            self.attack(slot, kind);
        }
    }

    fn move_fighter(&mut self, slot: Slot, dt: f32) {
        let Some(f) = self.get_mut(slot) else {
            return;
        };
        if !f.alive {
            return;
        }
        if f.stun > 0.0 {
            f.vx *= 0.90;
            f.vy *= 0.90;
        } else if f.dash_timer > 0.0 {
            f.dash_timer = CombatSystem::tick_timer(f.dash_timer, dt);
            f.vx *= 0.96;
            f.vy *= 0.96;
        } else {
            let (nx, ny) = PhysicsSystem::input_direction(&f.input);
            let mut speed = f.move_speed * f.speed_mult;
            if f.ult_buff > 0.0 {
                speed *= combat::ULT_BUFF_SPEED;
            }
            f.vx = nx * speed;
            f.vy = ny * speed;
        }
        let (x, y) = PhysicsSystem::integrate(f.x, f.y, f.vx, f.vy, dt);
        f.x = x;
        f.y = y;
        f.add_ult_charge(dt * combat::ULT_CHARGE_RATE);
    }

    /// Keep living bodies from stacking on top of each other
    fn separate_bodies(&mut self) {
        let slots: Vec<Slot> = self
            .active_slots()
            .into_iter()
            .filter(|&s| self.get(s).map(|f| f.alive).unwrap_or(false))
            .collect();
        for i in 0..slots.len() {
            for j in (i + 1)..slots.len() {
                let (Some(a), Some(b)) = (self.get(slots[i]), self.get(slots[j])) else {
                    continue;
                };
                let (ax, ay, ar, bx, by, br) = (a.x, a.y, a.radius(), b.x, b.y, b.radius());
                if !PhysicsSystem::check_collision(ax, ay, ar, bx, by, br) {
                    continue;
                }
                let ((nax, nay), (nbx, nby)) = PhysicsSystem::resolve_collision(ax, ay, ar, bx, by, br);
                if let Some(a) = self.get_mut(slots[i]) {
                    (a.x, a.y) = PhysicsSystem::clamp_to_arena(nax, nay);
                }
                if let Some(b) = self.get_mut(slots[j]) {
                    (b.x, b.y) = PhysicsSystem::clamp_to_arena(nbx, nby);
                }
            }
        }
    }

    fn team_scores(&self) -> [u32; 2] {
        let mut scores = [0, 0];
        for f in &self.fighters {
            scores[(f.team % 2) as usize] += f.kos;
        }
        scores
    }

    fn highest_score(&self) -> u32 {
        if self.mode == ArenaMode::Teams {
            let [a, b] = self.team_scores();
            a.max(b)
        } else {
            self.fighters.iter().map(|f| f.kos).max().unwrap_or(0)
        }
    }

    fn check_end(&mut self, out: &mut Outbox) {
        match self.mode {
            ArenaMode::Practice => {}
            ArenaMode::Boss => {
                let mut humans = self.fighters.iter().filter(|f| f.present).peekable();
                let wiped = humans.peek().is_some() && humans.all(|f| !f.alive);
                if self.boss_down {
                    self.finish("boss_down", out);
                } else if wiped {
                    self.finish("player_wipe", out);
                } else if self.time_left <= 0.0 {
                    self.finish("time_limit", out);
                }
            }
            _ => {
                if self.highest_score() >= self.mode.target_kos() {
                    self.finish("target_kos", out);
                } else if self.time_left <= 0.0 {
                    self.finish("time_limit", out);
                }
            }
        }
    }

    fn winners(&self) -> Vec<PlayerId> {
        let present: Vec<&Fighter> = self.fighters.iter().filter(|f| f.present).collect();
        match self.mode {
            ArenaMode::Practice => Vec::new(),
            ArenaMode::Boss => {
                let humans_win = self.boss.as_ref().map(|b| !b.alive).unwrap_or(false);
                if humans_win {
                    present.iter().map(|f| f.user_id).collect()
                } else {
                    Vec::new()
                }
            }
            ArenaMode::Teams => {
                let scores = self.team_scores();
                let mut live_teams: Vec<u32> = present.iter().map(|f| f.team % 2).collect();
                live_teams.sort_unstable();
                live_teams.dedup();
                let best = live_teams.iter().map(|&t| scores[t as usize]).max().unwrap_or(0);
                let leaders: Vec<u32> = live_teams
                    .into_iter()
                    .filter(|&t| scores[t as usize] == best)
                    .collect();
                match leaders.as_slice() {
                    [team] => present
                        .iter()
                        .filter(|f| f.team % 2 == *team)
                        .map(|f| f.user_id)
                        .collect(),
                    _ => Vec::new(),
                }
            }
            ArenaMode::Duel | ArenaMode::Ffa => {
                let best = present.iter().map(|f| f.kos).max().unwrap_or(0);
                let leaders: Vec<PlayerId> = present
                    .iter()
                    .filter(|f| f.kos == best)
                    .map(|f| f.user_id)
                    .collect();
                if leaders.len() == 1 {
                    leaders
                } else {
                    Vec::new()
                }
            }
        }
    }

    fn build_result(&self, reason: &str) -> EngineResult {
        if self.mode == ArenaMode::Practice {
            return EngineResult {
                reason: reason.to_string(),
                standings: Vec::new(),
            };
        }
        let winners = self.winners();
        // boss mode: a lost fight is a loss for everyone
        let decisive = !winners.is_empty() || self.mode == ArenaMode::Boss;
        let standings = self
            .fighters
            .iter()
            .map(|f| {
                let outcome = if winners.contains(&f.user_id) {
                    Outcome::Win
                } else if decisive {
                    Outcome::Loss
                } else {
                    Outcome::Draw
                };
                Standing {
                    user_id: f.user_id,
                    outcome,
                    kos: f.kos,
                    deaths: f.deaths,
                }
            })
            .collect();
        EngineResult {
            reason: reason.to_string(),
            standings,
        }
    }

    fn finish(&mut self, reason: &str, out: &mut Outbox) {
        if self.phase == Phase::Ended {
            return;
        }
        self.phase = Phase::Ended;
        let result = self.build_result(reason);
        out.room(ServerMsg::ArenaEnd(RoomEnd {
            room_id: self.room_id.clone(),
            reason: reason.to_string(),
            status: None,
            winners: result.winners(),
            standings: result.standings.clone(),
        }));
        self.result = Some(result);
    }
}

impl GameEngine for ArenaEngine {
    fn kind(&self) -> GameKind {
        GameKind::Arena
    }

    fn phase(&self) -> Phase {
        self.phase
    }

    fn max_players(&self) -> usize {
        self.max_players
    }

    fn tick(&self) -> u64 {
        self.tick
    }

    fn seat(&mut self, player: PlayerId, display_name: &str, _out: &mut Outbox) -> Option<String> {
        if self.phase != Phase::Waiting
            || self.fighters.len() >= self.max_players
            || self.fighters.iter().any(|f| f.user_id == player)
        {
            return None;
        }
        let default = combat::character(combat::DEFAULT_CHARACTER).unwrap_or(&CHARACTERS[0]);
        self.fighters.push(Fighter::new(player, display_name, default));
        self.assign_teams();
        let idx = self.fighters.len() - 1;
        self.respawn(idx);
        Some(match self.mode {
            ArenaMode::Teams => format!("team_{}", idx % 2),
            _ => format!("p{}", idx + 1),
        })
    }

    fn unseat(&mut self, player: PlayerId, out: &mut Outbox) {
        self.ready.retain(|&p| p != player);
        match self.phase {
            Phase::Waiting => {
                self.fighters.retain(|f| f.user_id != player);
                self.assign_teams();
            }
            Phase::Running => {
                let Some(idx) = self.seat_of(player) else {
                    return;
                };
                let f = &mut self.fighters[idx];
                f.present = false;
                f.alive = false;
                let remaining = self.fighters.iter().filter(|f| f.present).count();
                if remaining < self.mode.min_players() {
                    self.finish("not_enough_players", out);
                }
            }
            Phase::Ended => {}
        }
    }

    fn apply_input(&mut self, player: PlayerId, action: Action, out: &mut Outbox) -> CoreResult<()> {
        let idx = self.seat_of(player).ok_or(CoreError::Validation("not_a_player"))?;
        if self.phase == Phase::Ended {
            return Err(CoreError::State("game_over"));
        }
        match action {
            Action::ArenaInput(input) => {
                let fighter = &mut self.fighters[idx];
                if input.seq <= fighter.last_input_seq {
                    tracing::trace!(user_id = %player, seq = input.seq, last = fighter.last_input_seq, "Dropping stale arena input");
                    return Ok(());
                }
                fighter.last_input_seq = input.seq;
                fighter.latch(input);
                Ok(())
            }
            Action::ArenaSelect { character_id } => {
                if self.phase != Phase::Waiting {
                    return Err(CoreError::State("match_running"));
                }
                let character = combat::character(&character_id).ok_or(CoreError::Validation("unknown_character"))?;
                let fighter = &mut self.fighters[idx];
                fighter.apply_character(character);
                fighter.hp = fighter.max_hp;
                Ok(())
            }
            Action::ArenaReady { ready } => {
                if self.phase != Phase::Waiting {
                    return Err(CoreError::State("match_running"));
                }
                self.ready.retain(|&p| p != player);
                if ready {
                    self.ready.push(player);
                }
                self.try_start(false, out);
                Ok(())
            }
            Action::ArenaStart => {
                if self.phase != Phase::Waiting {
                    return Err(CoreError::State("already_running"));
                }
                if self.try_start(true, out) {
                    Ok(())
                } else {
                    Err(CoreError::State("not_enough_players"))
                }
            }
            _ => Err(CoreError::Validation("unsupported_action")),
        }
    }

    fn step(&mut self, dt: f32, out: &mut Outbox) -> CoreResult<()> {
        match self.phase {
            Phase::Waiting => {
                self.try_start(false, out);
                return Ok(());
            }
            Phase::Ended => return Ok(()),
            Phase::Running => {}
        }
        self.tick += 1;
        self.time_left = (self.time_left - dt).max(0.0);

        if let (Some(boss), Some(brain)) = (self.boss.as_ref(), self.brain.as_mut()) {
            if boss.alive {
                let targets: Vec<&Fighter> = self.fighters.iter().filter(|f| f.present && f.alive).collect();
                let input = brain.pick(boss, &targets, dt, &mut self.rng);
                if let Some(boss) = self.boss.as_mut() {
                    boss.latch(input);
                }
            }
        }

        for slot in self.active_slots() {
            let mut respawn_now = false;
            {
                let Some(f) = self.get_mut(slot) else {
                    continue;
                };
                if !f.alive {
                    if f.respawn > 0.0 {
                        f.respawn = CombatSystem::tick_timer(f.respawn, dt);
                        respawn_now = f.respawn <= 0.0;
                    }
                } else {
                    f.tick_timers(dt);
                }
            }
            if respawn_now {
                if let Slot::Human(idx) = slot {
                    self.respawn(idx);
                }
                continue;
            }
            self.handle_edges(slot);
            self.move_fighter(slot, dt);
        }
        self.separate_bodies();
        self.check_end(out);
        Ok(())
    }

    fn serialize_state(&self) -> ServerMsg {
        let since = self.tick.saturating_sub(EVENT_WINDOW_TICKS);
        ServerMsg::ArenaState(ArenaSnapshot {
            room_id: self.room_id.clone(),
            mode_name: self.mode.as_str().to_string(),
            state: self.phase,
            tick: self.tick,
            time_left: self.time_left,
            target_kos: self.mode.target_kos(),
            players: self.fighters.iter().filter(|f| f.present).map(|f| f.user_id).collect(),
            ready: self.ready.clone(),
            fighters: self
                .fighters
                .iter()
                .filter(|f| f.present)
                .map(Fighter::snapshot)
                .collect(),
            boss: self.boss.as_ref().map(Fighter::snapshot),
            team_scores: (self.mode == ArenaMode::Teams).then(|| self.team_scores()),
            events: self.events.iter().filter(|e| e.tick >= since).cloned().collect(),
            width: ARENA_WIDTH,
            height: ARENA_HEIGHT,
        })
    }

    fn result(&self) -> Option<EngineResult> {
        self.result.clone()
    }

    fn force_end(&mut self, reason: &str, out: &mut Outbox) {
        self.finish(reason, out);
    }

    fn snapshot_hz(&self) -> f32 {
        20.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::ArenaInput;
    use uuid::Uuid;

    const DT: f32 = 1.0 / 30.0;

    fn ids() -> (PlayerId, PlayerId) {
        (Uuid::from_u128(1), Uuid::from_u128(2))
    }

    fn duel(seed: u64) -> (ArenaEngine, PlayerId, PlayerId) {
        let mut engine = ArenaEngine::new("a1", ArenaMode::Duel, 90, 6, seed);
        let (a, b) = ids();
        let mut out = Outbox::new();
        engine.seat(a, "a", &mut out);
        engine.seat(b, "b", &mut out);
        engine.apply_input(a, Action::ArenaStart, &mut out).unwrap();
        assert_eq!(engine.phase(), Phase::Running);
        (engine, a, b)
    }

    fn press(seq: u64) -> ArenaInput {
        ArenaInput {
            seq,
            right: true,
            basic: true,
            ..ArenaInput::default()
        }
    }

    fn face_off(engine: &mut ArenaEngine) {
        engine.fighters[0].place(400.0, 270.0);
        engine.fighters[1].place(430.0, 270.0);
    }

    #[test]
    fn test_duplicate_seq_is_idempotent() {
        let (mut once, a, _) = duel(9);
        let (mut twice, _, _) = duel(9);
        let mut out = Outbox::new();

        once.apply_input(a, Action::ArenaInput(press(1)), &mut out).unwrap();
        twice.apply_input(a, Action::ArenaInput(press(1)), &mut out).unwrap();
        twice.apply_input(a, Action::ArenaInput(press(1)), &mut out).unwrap();
        for _ in 0..5 {
            once.step(DT, &mut out).unwrap();
            twice.step(DT, &mut out).unwrap();
        }
        let lhs = serde_json::to_value(once.serialize_state()).unwrap();
        let rhs = serde_json::to_value(twice.serialize_state()).unwrap();
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn test_stale_seq_dropped() {
        let (mut engine, a, _) = duel(1);
        let mut out = Outbox::new();
        engine.apply_input(a, Action::ArenaInput(press(5)), &mut out).unwrap();
        let stale = ArenaInput {
            seq: 3,
            left: true,
            ..ArenaInput::default()
        };
        engine.apply_input(a, Action::ArenaInput(stale), &mut out).unwrap();
        let f = engine.fighter(a).unwrap();
        assert_eq!(f.last_input_seq, 5);
        assert!(f.input.right && !f.input.left);
    }

    #[test]
    fn test_basic_attack_hits_adjacent_fighter() {
        let (mut engine, a, b) = duel(2);
        face_off(&mut engine);
        let mut out = Outbox::new();
        engine.apply_input(a, Action::ArenaInput(press(1)), &mut out).unwrap();
        engine.step(DT, &mut out).unwrap();
        let target = engine.fighter(b).unwrap();
        assert!(target.hp < target.max_hp);
        assert!(target.stun > 0.0);
        assert!(engine
            .events
            .iter()
            .any(|e| matches!(e.event, ArenaEvent::Hit { attacker, .. } if attacker == a)));
    }

    #[test]
    fn test_held_button_fires_once() {
        let (mut engine, a, b) = duel(3);
        face_off(&mut engine);
        let mut out = Outbox::new();
        engine.apply_input(a, Action::ArenaInput(press(1)), &mut out).unwrap();
        engine.step(DT, &mut out).unwrap();
        let after_first = engine.fighter(b).unwrap().hp;
        // still held, cooldown long expired
        for seq in 2..40 {
            engine.apply_input(a, Action::ArenaInput(press(seq)), &mut out).unwrap();
            engine.step(DT, &mut out).unwrap();
        }
        assert_eq!(engine.fighter(b).unwrap().hp, after_first);
    }

    #[test]
    fn test_knockout_reaching_target_ends_match() {
        let (mut engine, a, b) = duel(4);
        face_off(&mut engine);
        engine.fighters[0].kos = 4;
        engine.fighters[1].hp = 1.0;
        let mut out = Outbox::new();
        engine.apply_input(a, Action::ArenaInput(press(1)), &mut out).unwrap();
        engine.step(DT, &mut out).unwrap();

        assert_eq!(engine.phase(), Phase::Ended);
        let result = engine.result().unwrap();
        assert_eq!(result.reason, "target_kos");
        assert_eq!(result.winners(), vec![a]);
        let loser = result.standings.iter().find(|s| s.user_id == b).unwrap();
        assert_eq!(loser.outcome, Outcome::Loss);
        assert_eq!(loser.deaths, 1);
    }

    #[test]
    fn test_time_limit_tie_is_draw() {
        let (mut engine, _, _) = duel(5);
        let mut out = Outbox::new();
        for _ in 0..(91 * 30) {
            engine.step(DT, &mut out).unwrap();
            if engine.phase() == Phase::Ended {
                break;
            }
        }
        let result = engine.result().unwrap();
        assert_eq!(result.reason, "time_limit");
        assert!(result.standings.iter().all(|s| s.outcome == Outcome::Draw));
    }

    #[test]
    fn test_ready_up_starts_match() {
        let mut engine = ArenaEngine::new("a2", ArenaMode::Duel, 90, 6, 1);
        let (a, b) = ids();
        let mut out = Outbox::new();
        engine.seat(a, "a", &mut out);
        engine.seat(b, "b", &mut out);
        engine.apply_input(a, Action::ArenaReady { ready: true }, &mut out).unwrap();
        engine.step(DT, &mut out).unwrap();
        assert_eq!(engine.phase(), Phase::Waiting);
        engine.apply_input(b, Action::ArenaReady { ready: true }, &mut out).unwrap();
        assert_eq!(engine.phase(), Phase::Running);
    }

    #[test]
    fn test_force_start_needs_min_players() {
        let mut engine = ArenaEngine::new("a3", ArenaMode::Duel, 90, 6, 1);
        let (a, _) = ids();
        let mut out = Outbox::new();
        engine.seat(a, "a", &mut out);
        assert_eq!(
            engine.apply_input(a, Action::ArenaStart, &mut out),
            Err(CoreError::State("not_enough_players"))
        );
    }

    #[test]
    fn test_select_locked_while_running() {
        let (mut engine, a, _) = duel(6);
        let err = engine
            .apply_input(a, Action::ArenaSelect { character_id: "simon".into() }, &mut Outbox::new())
            .unwrap_err();
        assert_eq!(err, CoreError::State("match_running"));

        let mut lobby = ArenaEngine::new("a4", ArenaMode::Ffa, 90, 6, 1);
        lobby.seat(a, "a", &mut Outbox::new());
        lobby
            .apply_input(a, Action::ArenaSelect { character_id: "Big_T".into() }, &mut Outbox::new())
            .unwrap();
        assert_eq!(lobby.fighter(a).unwrap().max_hp, 130.0);
        assert_eq!(
            lobby.apply_input(a, Action::ArenaSelect { character_id: "zed".into() }, &mut Outbox::new()),
            Err(CoreError::Validation("unknown_character"))
        );
    }

    #[test]
    fn test_teams_alternate() {
        let mut engine = ArenaEngine::new("a5", ArenaMode::Teams, 90, 6, 1);
        let mut out = Outbox::new();
        let labels: Vec<_> = (1..=4)
            .map(|i| engine.seat(Uuid::from_u128(i), "p", &mut out).unwrap())
            .collect();
        assert_eq!(labels, vec!["team_0", "team_1", "team_0", "team_1"]);
        assert!(engine.seat(Uuid::from_u128(9), "p", &mut out).is_none());
    }

    #[test]
    fn test_boss_wipe_is_loss() {
        let mut engine = ArenaEngine::new("a6", ArenaMode::Boss, 90, 6, 1);
        let (a, _) = ids();
        let mut out = Outbox::new();
        engine.seat(a, "a", &mut out);
        engine.apply_input(a, Action::ArenaStart, &mut out).unwrap();
        assert!(engine.boss().is_some());

        engine.knock_out(Slot::Human(0), Some(BOSS_ID));
        engine.step(DT, &mut out).unwrap();
        assert_eq!(engine.phase(), Phase::Ended);
        let result = engine.result().unwrap();
        assert_eq!(result.reason, "player_wipe");
        assert_eq!(result.standings[0].outcome, Outcome::Loss);
    }

    #[test]
    fn test_boss_down_is_win() {
        let mut engine = ArenaEngine::new("a7", ArenaMode::Boss, 90, 6, 1);
        let (a, b) = ids();
        let mut out = Outbox::new();
        engine.seat(a, "a", &mut out);
        engine.seat(b, "b", &mut out);
        engine.apply_input(a, Action::ArenaStart, &mut out).unwrap();
        engine.knock_out(Slot::Boss, Some(a));
        engine.step(DT, &mut out).unwrap();
        let result = engine.result().unwrap();
        assert_eq!(result.reason, "boss_down");
        assert_eq!(result.winners(), vec![a, b]);
    }

    #[test]
    fn test_duel_leaver_loses() {
        let (mut engine, a, b) = duel(8);
        engine.unseat(a, &mut Outbox::new());
        let result = engine.result().unwrap();
        assert_eq!(result.reason, "not_enough_players");
        assert_eq!(result.winners(), vec![b]);
    }

    #[test]
    fn test_practice_has_no_results() {
        let mut engine = ArenaEngine::new("a8", ArenaMode::Practice, 90, 6, 1);
        let (a, _) = ids();
        let mut out = Outbox::new();
        engine.seat(a, "a", &mut out);
        engine.step(DT, &mut out).unwrap();
        assert_eq!(engine.phase(), Phase::Running);
        engine.force_end("idle_timeout", &mut out);
        assert!(engine.result().unwrap().standings.is_empty());
    }
}
