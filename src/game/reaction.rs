//! Reaction duel: wait for the signal, press first

use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use super::{Action, EngineResult, GameEngine, GameKind, Outbox, Phase, PlayerId};
use crate::error::{CoreError, CoreResult};
use crate::ws::protocol::{ReactionSnapshot, RoomEnd, ServerMsg};

const COUNTDOWN_SECS: f32 = 1.5;
const ARMED_MIN_SECS: f32 = 1.0;
const ARMED_MAX_SECS: f32 = 5.0;
const GO_WINDOW_SECS: f32 = 2.0;
const RESOLVED_SECS: f32 = 1.2;
const WINS_NEEDED: u32 = 3;
const MAX_ROUNDS: u32 = 9;

/// Per-round phase. Presses before `Go` are false starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionPhase {
    Idle,
    Countdown,
    Armed,
    Go,
    Resolved,
}

pub struct ReactionEngine {
    room_id: String,
    phase: Phase,
    round_phase: ReactionPhase,
    phase_timer: f32,
    round: u32,
    tick: u64,
    rng: ChaCha8Rng,
    seats: Vec<PlayerId>,
    score: BTreeMap<PlayerId, u32>,
    result: Option<EngineResult>,
}

impl ReactionEngine {
    pub fn new(room_id: &str, seed: u64) -> Self {
        Self {
            room_id: room_id.to_string(),
            phase: Phase::Waiting,
            round_phase: ReactionPhase::Idle,
            phase_timer: 0.0,
            round: 0,
            tick: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
            seats: Vec::with_capacity(2),
            score: BTreeMap::new(),
            result: None,
        }
    }

    pub fn round_phase(&self) -> ReactionPhase {
        self.round_phase
    }

    pub fn score_of(&self, player: PlayerId) -> u32 {
        self.score.get(&player).copied().unwrap_or(0)
    }

    fn opponent(&self, player: PlayerId) -> Option<PlayerId> {
        self.seats.iter().copied().find(|&p| p != player)
    }

    fn start_round(&mut self, out: &mut Outbox) {
        self.round += 1;
        self.round_phase = ReactionPhase::Countdown;
        self.phase_timer = COUNTDOWN_SECS;
        out.room(ServerMsg::ReactionRoundStart {
            room_id: self.room_id.clone(),
            round: self.round,
        });
    }

    fn award(&mut self, player: PlayerId) {
        *self.score.entry(player).or_insert(0) += 1;
    }

    fn leader(&self) -> Option<PlayerId> {
        let (a, b) = match self.seats.as_slice() {
            [a, b] => (*a, *b),
            _ => return None,
        };
        match self.score_of(a).cmp(&self.score_of(b)) {
            std::cmp::Ordering::Greater => Some(a),
            std::cmp::Ordering::Less => Some(b),
            std::cmp::Ordering::Equal => None,
        }
    }

    fn check_race(&mut self, out: &mut Outbox) {
        if self.score.values().any(|&s| s >= WINS_NEEDED) {
            let winner = self.leader();
            self.finish("score", winner, out);
        }
    }

    fn resolve(&mut self, out: &mut Outbox) {
        self.round_phase = ReactionPhase::Resolved;
        self.phase_timer = RESOLVED_SECS;
        self.check_race(out);
    }

    fn finish(&mut self, reason: &str, winner: Option<PlayerId>, out: &mut Outbox) {
        if self.phase == Phase::Ended {
            return;
        }
        self.phase = Phase::Ended;
        let result = EngineResult::duel(reason, &self.seats, winner);
        out.room(ServerMsg::ReactionEnd(RoomEnd {
            room_id: self.room_id.clone(),
            reason: reason.to_string(),
            status: None,
            winners: result.winners(),
            standings: result.standings.clone(),
        }));
        self.result = Some(result);
    }
}

impl GameEngine for ReactionEngine {
    fn kind(&self) -> GameKind {
        GameKind::Reaction
    }

    fn phase(&self) -> Phase {
        self.phase
    }

    fn max_players(&self) -> usize {
        2
    }

    fn tick(&self) -> u64 {
        self.tick
    }

    fn seat(&mut self, player: PlayerId, _display_name: &str, out: &mut Outbox) -> Option<String> {
        if self.phase != Phase::Waiting || self.seats.len() >= 2 || self.seats.contains(&player) {
            return None;
        }
        self.seats.push(player);
        self.score.insert(player, 0);
        let label = format!("p{}", self.seats.len());
        if self.seats.len() == 2 {
            self.phase = Phase::Running;
            self.start_round(out);
        }
        Some(label)
    }

    fn unseat(&mut self, player: PlayerId, out: &mut Outbox) {
        if !self.seats.contains(&player) {
            return;
        }
        match self.phase {
            Phase::Waiting => {
                self.seats.retain(|&p| p != player);
                self.score.remove(&player);
            }
            Phase::Running => {
                let other = self.opponent(player);
                self.finish("player_left", other, out);
            }
            Phase::Ended => {}
        }
    }

    fn apply_input(&mut self, player: PlayerId, action: Action, out: &mut Outbox) -> CoreResult<()> {
        if action != Action::ReactionPress {
            return Err(CoreError::Validation("unsupported_action"));
        }
        if !self.seats.contains(&player) {
            return Err(CoreError::Validation("not_a_player"));
        }
        match self.phase {
            Phase::Waiting => return Err(CoreError::State("game_not_running")),
            Phase::Ended => return Err(CoreError::State("game_over")),
            Phase::Running => {}
        }

        match self.round_phase {
            ReactionPhase::Countdown | ReactionPhase::Armed => {
                // false start hands the round to the opponent
                if let Some(opp) = self.opponent(player) {
                    self.award(opp);
                }
                out.room(ServerMsg::ReactionFalseStart {
                    room_id: self.room_id.clone(),
                    user_id: player,
                });
                self.resolve(out);
                Ok(())
            }
            ReactionPhase::Go => {
                self.award(player);
                out.room(ServerMsg::ReactionRoundWin {
                    room_id: self.room_id.clone(),
                    user_id: player,
                });
                self.resolve(out);
                Ok(())
            }
            ReactionPhase::Idle | ReactionPhase::Resolved => Err(CoreError::State("round_resolved")),
        }
    }

    fn step(&mut self, dt: f32, out: &mut Outbox) -> CoreResult<()> {
        if self.phase != Phase::Running {
            return Ok(());
        }
        self.tick += 1;
        self.phase_timer -= dt;
        if self.phase_timer > 0.0 {
            return Ok(());
        }
        match self.round_phase {
            ReactionPhase::Countdown => {
                self.round_phase = ReactionPhase::Armed;
                self.phase_timer = self.rng.gen_range(ARMED_MIN_SECS..=ARMED_MAX_SECS);
            }
            ReactionPhase::Armed => {
                self.round_phase = ReactionPhase::Go;
                self.phase_timer = GO_WINDOW_SECS;
                out.room(ServerMsg::ReactionGo {
                    room_id: self.room_id.clone(),
                    round: self.round,
                });
            }
            ReactionPhase::Go => {
                out.room(ServerMsg::ReactionTimeout {
                    room_id: self.room_id.clone(),
                    round: self.round,
                });
                self.resolve(out);
            }
            ReactionPhase::Resolved => {
                if self.round >= MAX_ROUNDS {
                    let winner = self.leader();
                    self.finish("round_limit", winner, out);
                } else {
                    self.start_round(out);
                }
            }
            ReactionPhase::Idle => {}
        }
        Ok(())
    }

    fn serialize_state(&self) -> ServerMsg {
        ServerMsg::ReactionState(ReactionSnapshot {
            room_id: self.room_id.clone(),
            state: self.phase,
            tick: self.tick,
            phase: self.round_phase,
            phase_timer: self.phase_timer.max(0.0),
            round: self.round,
            players: self.seats.clone(),
            score: self.score.clone(),
        })
    }

    fn result(&self) -> Option<EngineResult> {
        self.result.clone()
    }

    fn force_end(&mut self, reason: &str, out: &mut Outbox) {
        let winner = self.leader();
        self.finish(reason, winner, out);
    }

    fn snapshot_hz(&self) -> f32 {
        5.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn running(seed: u64) -> (ReactionEngine, PlayerId, PlayerId) {
        let mut engine = ReactionEngine::new("r1", seed);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut out = Outbox::new();
        engine.seat(a, "a", &mut out);
        engine.seat(b, "b", &mut out);
        (engine, a, b)
    }

    fn advance_to(engine: &mut ReactionEngine, phase: ReactionPhase) {
        let mut out = Outbox::new();
        for _ in 0..1000 {
            if engine.round_phase() == phase {
                return;
            }
            engine.step(0.05, &mut out).unwrap();
        }
        panic!("never reached {:?}", phase);
    }

    #[test]
    fn test_false_start_always_loses_round() {
        for seed in 0..50 {
            let (mut engine, a, b) = running(seed);
            let mut out = Outbox::new();
            let steps = seed % 40;
            for _ in 0..steps {
                engine.step(0.05, &mut out).unwrap();
            }
            if engine.round_phase() == ReactionPhase::Go {
                continue;
            }
            engine.apply_input(a, Action::ReactionPress, &mut out).unwrap();
            assert_eq!(engine.score_of(a), 0);
            assert_eq!(engine.score_of(b), 1);
            assert_eq!(engine.round_phase(), ReactionPhase::Resolved);
        }
    }

    #[test]
    fn test_first_press_after_go_wins() {
        let (mut engine, a, b) = running(7);
        advance_to(&mut engine, ReactionPhase::Go);
        let mut out = Outbox::new();
        engine.apply_input(b, Action::ReactionPress, &mut out).unwrap();
        let late = engine.apply_input(a, Action::ReactionPress, &mut out);
        assert_eq!(late, Err(CoreError::State("round_resolved")));
        assert_eq!(engine.score_of(b), 1);
        assert_eq!(engine.score_of(a), 0);
    }

    #[test]
    fn test_race_to_three() {
        let (mut engine, a, _) = running(3);
        for _ in 0..3 {
            advance_to(&mut engine, ReactionPhase::Go);
            engine.apply_input(a, Action::ReactionPress, &mut Outbox::new()).unwrap();
        }
        assert_eq!(engine.phase(), Phase::Ended);
        assert_eq!(engine.result().unwrap().winners(), vec![a]);
    }

    #[test]
    fn test_go_window_expires_without_winner() {
        let (mut engine, a, b) = running(11);
        advance_to(&mut engine, ReactionPhase::Go);
        let mut out = Outbox::new();
        engine.step(GO_WINDOW_SECS + 0.01, &mut out).unwrap();
        assert_eq!(engine.round_phase(), ReactionPhase::Resolved);
        assert_eq!(engine.score_of(a) + engine.score_of(b), 0);
    }

    #[test]
    fn test_press_before_start_rejected() {
        let mut engine = ReactionEngine::new("r2", 1);
        let a = Uuid::new_v4();
        let mut out = Outbox::new();
        engine.seat(a, "a", &mut out);
        assert_eq!(
            engine.apply_input(a, Action::ReactionPress, &mut out),
            Err(CoreError::State("game_not_running"))
        );
    }
}
