//! Chess engine: seats, clocks, draw handling and terminal detection

mod board;

use std::collections::HashMap;

pub use board::{MoveError, PieceKind, Position, Side, Square};

use super::{Action, EngineResult, GameEngine, GameKind, Outbox, Phase, PlayerId};
use crate::error::{CoreError, CoreResult};
use crate::ws::protocol::{ChessClocks, ChessSnapshot, MoveRecord, RoomEnd, ServerMsg};

/// Moves kept in snapshots
const MOVE_LOG_TAIL: usize = 120;

/// Game status as shown to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ongoing,
    Checkmate,
    Resignation,
    Timeout,
    Draw,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ongoing => "ongoing",
            Status::Checkmate => "checkmate",
            Status::Resignation => "resignation",
            Status::Timeout => "timeout",
            Status::Draw => "draw",
        }
    }
}

pub struct ChessEngine {
    room_id: String,
    phase: Phase,
    tick: u64,
    position: Position,
    white: Option<PlayerId>,
    black: Option<PlayerId>,
    status: Status,
    winner: Option<Side>,
    draw_reason: Option<String>,
    end_reason: String,
    moves: Vec<MoveRecord>,
    /// Remaining think time per side, milliseconds
    white_ms: u64,
    black_ms: u64,
    /// Fractional milliseconds not yet charged to a clock
    pending_ms: f64,
    draw_offer: Option<Side>,
    repetitions: HashMap<String, u32>,
    repetition_limit: u32,
    result: Option<EngineResult>,
}

impl ChessEngine {
    pub fn new(room_id: &str, clock_ms: u64, repetition_limit: u32) -> Self {
        let position = Position::initial();
        let mut repetitions = HashMap::new();
        repetitions.insert(position.repetition_key(), 1);
        Self {
            room_id: room_id.to_string(),
            phase: Phase::Waiting,
            tick: 0,
            position,
            white: None,
            black: None,
            status: Status::Ongoing,
            winner: None,
            draw_reason: None,
            end_reason: String::new(),
            moves: Vec::new(),
            white_ms: clock_ms,
            black_ms: clock_ms,
            pending_ms: 0.0,
            draw_offer: None,
            repetitions,
            repetition_limit: repetition_limit.max(2),
            result: None,
        }
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn winner(&self) -> Option<Side> {
        self.winner
    }

    pub fn draw_reason(&self) -> Option<&str> {
        self.draw_reason.as_deref()
    }

    pub fn clock_ms(&self, side: Side) -> u64 {
        match side {
            Side::White => self.white_ms,
            Side::Black => self.black_ms,
        }
    }

    pub fn side_of(&self, player: PlayerId) -> Option<Side> {
        if self.white == Some(player) {
            Some(Side::White)
        } else if self.black == Some(player) {
            Some(Side::Black)
        } else {
            None
        }
    }

    fn seated(&self) -> Vec<PlayerId> {
        self.white.into_iter().chain(self.black).collect()
    }

    fn player_for(&self, side: Side) -> Option<PlayerId> {
        match side {
            Side::White => self.white,
            Side::Black => self.black,
        }
    }

    fn clock_mut(&mut self, side: Side) -> &mut u64 {
        match side {
            Side::White => &mut self.white_ms,
            Side::Black => &mut self.black_ms,
        }
    }

    /// Seat check shared by every chess action
    fn acting_side(&self, player: PlayerId) -> Result<Side, MoveError> {
        let side = self.side_of(player).ok_or(MoveError::NotAPlayer)?;
        if self.phase != Phase::Running {
            return Err(MoveError::GameNotRunning);
        }
        Ok(side)
    }

    /// Charge accumulated think time to the side to move
    fn charge_clock(&mut self, out: &mut Outbox) {
        let whole = self.pending_ms.floor();
        if whole < 1.0 {
            return;
        }
        self.pending_ms -= whole;
        let side = self.position.turn();
        let clock = self.clock_mut(side);
        *clock = clock.saturating_sub(whole as u64);
        if *clock == 0 {
            self.status = Status::Timeout;
            self.winner = Some(side.opponent());
            self.finish("timeout", out);
        }
    }

    fn play(&mut self, player: PlayerId, from: &str, to: &str, promotion: Option<&str>, out: &mut Outbox) -> Result<(), MoveError> {
        let side = self.acting_side(player)?;
        if side != self.position.turn() {
            return Err(MoveError::NotYourTurn);
        }
        let mv = self.position.resolve(from, to, promotion)?;

        // think time since the last step belongs to this move
        self.charge_clock(out);
        if self.phase == Phase::Ended {
            return Err(MoveError::GameOver);
        }

        self.position.apply_unchecked(&mv);
        self.draw_offer = None;
        let opponent = self.position.turn();
        let in_check = self.position.in_check(opponent);
        let mut uci = mv.uci();
        if in_check {
            uci.push('+');
        }
        self.moves.push(MoveRecord {
            ply: self.moves.len() as u32 + 1,
            uci: uci.clone(),
            side,
        });

        let key = self.position.repetition_key();
        let seen = {
            let count = self.repetitions.entry(key).or_insert(0);
            *count += 1;
            *count
        };

        if !self.position.has_legal_move() {
            if in_check {
                self.status = Status::Checkmate;
                self.winner = Some(side);
            } else {
                self.declare_draw("stalemate");
            }
        } else if self.position.insufficient_material() {
            self.declare_draw("insufficient_material");
        } else if seen >= self.repetition_limit {
            self.declare_draw("repetition");
        } else if self.position.halfmove() >= 100 {
            self.declare_draw("fifty_move");
        }

        out.room(ServerMsg::ChessMoveOk {
            room_id: self.room_id.clone(),
            uci,
            fen: self.position.fen(),
            status: self.status.as_str().to_string(),
        });
        if self.status != Status::Ongoing {
            let reason = self.status.as_str().to_string();
            self.finish(&reason, out);
        }
        Ok(())
    }

    fn declare_draw(&mut self, reason: &str) {
        self.status = Status::Draw;
        self.winner = None;
        self.draw_reason = Some(reason.to_string());
    }

    fn resign(&mut self, side: Side, reason: &str, out: &mut Outbox) {
        self.status = Status::Resignation;
        self.winner = Some(side.opponent());
        self.finish(reason, out);
    }

    fn offer_draw(&mut self, player: PlayerId, out: &mut Outbox) -> CoreResult<()> {
        let side = self.acting_side(player)?;
        if self.draw_offer == Some(side) {
            return Err(CoreError::Conflict("draw_already_offered"));
        }
        self.draw_offer = Some(side);
        out.room(ServerMsg::ChessDrawOffer {
            room_id: self.room_id.clone(),
            from: side,
        });
        Ok(())
    }

    fn accept_draw(&mut self, player: PlayerId, out: &mut Outbox) -> CoreResult<()> {
        let side = self.acting_side(player)?;
        match self.draw_offer {
            None => Err(CoreError::State("no_draw_offer")),
            Some(from) if from == side => Err(CoreError::Validation("cannot_accept_own_offer")),
            Some(_) => {
                self.declare_draw("agreed");
                self.finish("draw", out);
                Ok(())
            }
        }
    }

    fn finish(&mut self, reason: &str, out: &mut Outbox) {
        if self.phase == Phase::Ended {
            return;
        }
        self.phase = Phase::Ended;
        self.draw_offer = None;
        self.end_reason = reason.to_string();
        let winner = self.winner.and_then(|s| self.player_for(s));
        let result = EngineResult::duel(reason, &self.seated(), winner);
        out.room(ServerMsg::ChessEnd(RoomEnd {
            room_id: self.room_id.clone(),
            reason: reason.to_string(),
            status: Some(self.status.as_str().to_string()),
            winners: result.winners(),
            standings: result.standings.clone(),
        }));
        self.result = Some(result);
    }
}

impl GameEngine for ChessEngine {
    fn kind(&self) -> GameKind {
        GameKind::Chess
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

    fn seat(&mut self, player: PlayerId, _display_name: &str, _out: &mut Outbox) -> Option<String> {
        if self.phase != Phase::Waiting || self.side_of(player).is_some() {
            return None;
        }
        let side = if self.white.is_none() {
            self.white = Some(player);
            "white"
        } else if self.black.is_none() {
            self.black = Some(player);
            "black"
        } else {
            return None;
        };
        if self.white.is_some() && self.black.is_some() {
            self.phase = Phase::Running;
        }
        Some(side.to_string())
    }

    fn unseat(&mut self, player: PlayerId, out: &mut Outbox) {
        let Some(side) = self.side_of(player) else {
            return;
        };
        match self.phase {
            Phase::Waiting => match side {
                Side::White => self.white = None,
                Side::Black => self.black = None,
            },
            Phase::Running => self.resign(side, "player_left", out),
            Phase::Ended => {}
        }
    }

    fn apply_input(&mut self, player: PlayerId, action: Action, out: &mut Outbox) -> CoreResult<()> {
        match action {
            Action::ChessMove { from, to, promotion } => {
                self.play(player, &from, &to, promotion.as_deref(), out)?;
                Ok(())
            }
            Action::ChessResign => {
                let side = self.acting_side(player)?;
                self.resign(side, "resignation", out);
                Ok(())
            }
            Action::ChessOfferDraw => self.offer_draw(player, out),
            Action::ChessAcceptDraw => self.accept_draw(player, out),
            _ => Err(CoreError::Validation("unsupported_action")),
        }
    }

    fn step(&mut self, dt: f32, out: &mut Outbox) -> CoreResult<()> {
        if self.phase != Phase::Running {
            return Ok(());
        }
        self.tick += 1;
        self.pending_ms += f64::from(dt) * 1000.0;
        self.charge_clock(out);
        Ok(())
    }

    fn serialize_state(&self) -> ServerMsg {
        let tail = self.moves.len().saturating_sub(MOVE_LOG_TAIL);
        ServerMsg::ChessState(ChessSnapshot {
            room_id: self.room_id.clone(),
            state: self.phase,
            tick: self.tick,
            white: self.white,
            black: self.black,
            board: self.position.rows(),
            fen: self.position.fen(),
            turn: self.position.turn(),
            castle_rights: self.position.castle_rights(),
            ep: self.position.ep_square().map(|s| s.to_string()),
            status: self.status.as_str().to_string(),
            winner: self.winner,
            draw_reason: self.draw_reason.clone(),
            in_check: self.position.in_check(self.position.turn()),
            moves: self.moves[tail..].to_vec(),
            clocks: ChessClocks {
                white_ms: self.white_ms,
                black_ms: self.black_ms,
            },
            draw_offer_from: self.draw_offer,
        })
    }

    fn result(&self) -> Option<EngineResult> {
        self.result.clone()
    }

    fn force_end(&mut self, reason: &str, out: &mut Outbox) {
        if self.phase == Phase::Ended {
            return;
        }
        if self.status == Status::Ongoing {
            self.declare_draw(reason);
        }
        self.finish(reason, out);
    }

    fn snapshot_hz(&self) -> f32 {
        4.0
    }
}
