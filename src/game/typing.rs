//! Typing duel: first to type the phrase verbatim takes the round

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::{Action, EngineResult, GameEngine, GameKind, Outbox, Phase, PlayerId};
use crate::error::{CoreError, CoreResult};
use crate::ws::protocol::{RoomEnd, ServerMsg, TypingSnapshot};

pub const PHRASES: [&str; 7] = [
    "resume bullets not paragraphs",
    "practice interview eye contact",
    "career fair speedrun any percent",
    "brainstorm first then draft",
    "lock in and cite sources",
    "sigma cover letter but polite",
    "cortisol stable submit early",
];

const ROUND_TIMEOUT_SECS: f32 = 18.0;
const WINS_NEEDED: u32 = 2;
const MAX_ROUNDS: u32 = 5;

pub struct TypingEngine {
    room_id: String,
    phase: Phase,
    tick: u64,
    rng: ChaCha8Rng,
    seats: Vec<PlayerId>,
    score: BTreeMap<PlayerId, u32>,
    round: u32,
    round_open: bool,
    timeout: f32,
    phrase: String,
    result: Option<EngineResult>,
}

impl TypingEngine {
    pub fn new(room_id: &str, seed: u64) -> Self {
        Self {
            room_id: room_id.to_string(),
            phase: Phase::Waiting,
            tick: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
            seats: Vec::with_capacity(2),
            score: BTreeMap::new(),
            round: 0,
            round_open: false,
            timeout: ROUND_TIMEOUT_SECS,
            phrase: String::new(),
            result: None,
        }
    }

    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn score_of(&self, player: PlayerId) -> u32 {
        self.score.get(&player).copied().unwrap_or(0)
    }

    fn start_round(&mut self, out: &mut Outbox) {
        self.round += 1;
        self.phrase = PHRASES
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(PHRASES[0])
            .to_string();
        self.round_open = true;
        self.timeout = ROUND_TIMEOUT_SECS;
        out.room(ServerMsg::TypingRound {
            room_id: self.room_id.clone(),
            round: self.round,
            phrase: self.phrase.clone(),
        });
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

    fn next_or_finish(&mut self, limit_reason: &str, out: &mut Outbox) {
        if self.score.values().any(|&s| s >= WINS_NEEDED) {
            let winner = self.leader();
            self.finish("score", winner, out);
        } else if self.round >= MAX_ROUNDS {
            let winner = self.leader();
            self.finish(limit_reason, winner, out);
        } else {
            self.start_round(out);
        }
    }

    fn finish(&mut self, reason: &str, winner: Option<PlayerId>, out: &mut Outbox) {
        if self.phase == Phase::Ended {
            return;
        }
        self.phase = Phase::Ended;
        self.round_open = false;
        let result = EngineResult::duel(reason, &self.seats, winner);
        out.room(ServerMsg::TypingEnd(RoomEnd {
            room_id: self.room_id.clone(),
            reason: reason.to_string(),
            status: None,
            winners: result.winners(),
            standings: result.standings.clone(),
        }));
        self.result = Some(result);
    }
}

impl GameEngine for TypingEngine {
    fn kind(&self) -> GameKind {
        GameKind::Typing
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
                let other = self.seats.iter().copied().find(|&p| p != player);
                self.finish("player_left", other, out);
            }
            Phase::Ended => {}
        }
    }

    fn apply_input(&mut self, player: PlayerId, action: Action, out: &mut Outbox) -> CoreResult<()> {
        let Action::TypingSubmit { text } = action else {
            return Err(CoreError::Validation("unsupported_action"));
        };
        if !self.seats.contains(&player) {
            return Err(CoreError::Validation("not_a_player"));
        }
        match self.phase {
            Phase::Waiting => return Err(CoreError::State("game_not_running")),
            Phase::Ended => return Err(CoreError::State("game_over")),
            Phase::Running => {}
        }
        if !self.round_open {
            return Err(CoreError::State("round_closed"));
        }

        if text != self.phrase {
            out.to(
                player,
                ServerMsg::TypingIncorrect {
                    room_id: self.room_id.clone(),
                },
            );
            return Ok(());
        }

        self.round_open = false;
        *self.score.entry(player).or_insert(0) += 1;
        out.room(ServerMsg::TypingRoundWin {
            room_id: self.room_id.clone(),
            user_id: player,
        });
        self.next_or_finish("round_limit", out);
        Ok(())
    }

    fn step(&mut self, dt: f32, out: &mut Outbox) -> CoreResult<()> {
        if self.phase != Phase::Running || !self.round_open {
            return Ok(());
        }
        self.tick += 1;
        self.timeout -= dt;
        if self.timeout <= 0.0 {
            self.round_open = false;
            out.room(ServerMsg::TypingRoundTimeout {
                room_id: self.room_id.clone(),
                round: self.round,
            });
            self.next_or_finish("time_limit", out);
        }
        Ok(())
    }

    fn serialize_state(&self) -> ServerMsg {
        ServerMsg::TypingState(TypingSnapshot {
            room_id: self.room_id.clone(),
            state: self.phase,
            tick: self.tick,
            round: self.round,
            players: self.seats.clone(),
            score: self.score.clone(),
            round_open: self.round_open,
            timeout: self.timeout.max(0.0),
            phrase: self.phrase.clone(),
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

    fn running() -> (TypingEngine, PlayerId, PlayerId) {
        let mut engine = TypingEngine::new("t1", 9);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut out = Outbox::new();
        engine.seat(a, "a", &mut out);
        engine.seat(b, "b", &mut out);
        assert!(!engine.phrase().is_empty());
        (engine, a, b)
    }

    #[test]
    fn test_exact_phrase_wins_round() {
        let (mut engine, a, _) = running();
        let phrase = engine.phrase().to_string();
        engine
            .apply_input(a, Action::TypingSubmit { text: phrase }, &mut Outbox::new())
            .unwrap();
        assert_eq!(engine.score_of(a), 1);
        assert_eq!(engine.round(), 2);
    }

    #[test]
    fn test_wrong_submission_changes_nothing() {
        let (mut engine, a, b) = running();
        let phrase = engine.phrase().to_string();
        let mut out = Outbox::new();
        for text in [format!("{} ", phrase), phrase.to_uppercase(), String::new()] {
            engine.apply_input(a, Action::TypingSubmit { text }, &mut out).unwrap();
        }
        assert_eq!(engine.score_of(a), 0);
        assert_eq!(engine.score_of(b), 0);
        assert_eq!(engine.round(), 1);
        assert_eq!(engine.phrase(), phrase);
        // feedback only reaches the submitter
        assert!(out
            .drain()
            .iter()
            .all(|d| matches!(d, crate::game::Delivery::To(p, ServerMsg::TypingIncorrect { .. }) if *p == a)));
    }

    #[test]
    fn test_race_to_two() {
        let (mut engine, _, b) = running();
        for _ in 0..2 {
            let phrase = engine.phrase().to_string();
            engine
                .apply_input(b, Action::TypingSubmit { text: phrase }, &mut Outbox::new())
                .unwrap();
        }
        assert_eq!(engine.phase(), Phase::Ended);
        assert_eq!(engine.result().unwrap().winners(), vec![b]);
    }

    #[test]
    fn test_timeouts_run_out_rounds() {
        let (mut engine, _, _) = running();
        let mut out = Outbox::new();
        for _ in 0..MAX_ROUNDS {
            engine.step(ROUND_TIMEOUT_SECS + 0.1, &mut out).unwrap();
        }
        assert_eq!(engine.phase(), Phase::Ended);
        let result = engine.result().unwrap();
        assert_eq!(result.reason, "time_limit");
        assert!(result.winners().is_empty());
    }
}
