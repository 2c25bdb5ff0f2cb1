//! Game simulation modules
//!
//! Every game kind is an authoritative engine behind [`GameEngine`]. A room
//! owns exactly one boxed engine and serializes every call into it.

pub mod arena;
pub mod chess;
pub mod pong;
pub mod reaction;
pub mod snapshot;
pub mod typing;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::GameSettings;
use crate::error::{CoreError, CoreResult};
use crate::ws::protocol::ServerMsg;

pub use snapshot::SnapshotPacer;

/// Stable player identity
pub type PlayerId = Uuid;

/// The five game kinds hosted by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameKind {
    Arena,
    Chess,
    Pong,
    Reaction,
    Typing,
}

impl GameKind {
    pub const ALL: [GameKind; 5] = [
        GameKind::Arena,
        GameKind::Chess,
        GameKind::Pong,
        GameKind::Reaction,
        GameKind::Typing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GameKind::Arena => "arena",
            GameKind::Chess => "chess",
            GameKind::Pong => "pong",
            GameKind::Reaction => "reaction",
            GameKind::Typing => "typing",
        }
    }

    /// Whether clients get a fresh snapshot right after every accepted action
    pub fn snapshot_on_action(&self) -> bool {
        matches!(self, GameKind::Chess | GameKind::Reaction | GameKind::Typing)
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "arena" => Ok(GameKind::Arena),
            "chess" => Ok(GameKind::Chess),
            "pong" => Ok(GameKind::Pong),
            "reaction" => Ok(GameKind::Reaction),
            "typing" => Ok(GameKind::Typing),
            _ => Err(CoreError::Validation("unknown_room_kind")),
        }
    }
}

/// Lifecycle phase shared by rooms and engines. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Waiting,
    Running,
    Ended,
}

/// Per-player outcome of a finished match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Win,
    Loss,
    Draw,
}

/// One row of final standings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub user_id: PlayerId,
    pub outcome: Outcome,
    pub kos: u32,
    pub deaths: u32,
}

impl Standing {
    pub fn new(user_id: PlayerId, outcome: Outcome) -> Self {
        Self {
            user_id,
            outcome,
            kos: 0,
            deaths: 0,
        }
    }
}

/// Terminal output of an engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineResult {
    pub reason: String,
    pub standings: Vec<Standing>,
}

impl EngineResult {
    /// Standings for a two-seat game: `winner` wins, everyone else loses.
    /// `None` means a draw for both.
    pub fn duel(reason: &str, players: &[PlayerId], winner: Option<PlayerId>) -> Self {
        let standings = players
            .iter()
            .map(|&p| {
                let outcome = match winner {
                    Some(w) if w == p => Outcome::Win,
                    Some(_) => Outcome::Loss,
                    None => Outcome::Draw,
                };
                Standing::new(p, outcome)
            })
            .collect();
        Self {
            reason: reason.to_string(),
            standings,
        }
    }

    pub fn winners(&self) -> Vec<PlayerId> {
        self.standings
            .iter()
            .filter(|s| s.outcome == Outcome::Win)
            .map(|s| s.user_id)
            .collect()
    }
}

/// Arena input frame. Action flags are held-button states; the engine fires
/// an action on the rising edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaInput {
    pub seq: u64,
    #[serde(default)]
    pub up: bool,
    #[serde(default)]
    pub down: bool,
    #[serde(default)]
    pub left: bool,
    #[serde(default)]
    pub right: bool,
    #[serde(default)]
    pub dash: bool,
    #[serde(default)]
    pub basic: bool,
    #[serde(default)]
    pub special: bool,
    #[serde(default)]
    pub ult: bool,
}

/// Engine-level action routed from a client message
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    ArenaInput(ArenaInput),
    ArenaSelect { character_id: String },
    ArenaReady { ready: bool },
    ArenaStart,
    ChessMove {
        from: String,
        to: String,
        promotion: Option<String>,
    },
    ChessResign,
    ChessOfferDraw,
    ChessAcceptDraw,
    PongInput { up: bool, down: bool },
    ReactionPress,
    TypingSubmit { text: String },
}

impl Action {
    pub fn kind(&self) -> GameKind {
        match self {
            Action::ArenaInput(_)
            | Action::ArenaSelect { .. }
            | Action::ArenaReady { .. }
            | Action::ArenaStart => GameKind::Arena,
            Action::ChessMove { .. }
            | Action::ChessResign
            | Action::ChessOfferDraw
            | Action::ChessAcceptDraw => GameKind::Chess,
            Action::PongInput { .. } => GameKind::Pong,
            Action::ReactionPress => GameKind::Reaction,
            Action::TypingSubmit { .. } => GameKind::Typing,
        }
    }

    /// Wire name used in rejection events
    pub fn name(&self) -> &'static str {
        match self {
            Action::ArenaInput(_) => "arena_input",
            Action::ArenaSelect { .. } => "arena_select",
            Action::ArenaReady { .. } => "arena_ready",
            Action::ArenaStart => "arena_start",
            Action::ChessMove { .. } => "chess_move",
            Action::ChessResign => "chess_resign",
            Action::ChessOfferDraw => "chess_offer_draw",
            Action::ChessAcceptDraw => "chess_accept_draw",
            Action::PongInput { .. } => "pong_input",
            Action::ReactionPress => "reaction_press",
            Action::TypingSubmit { .. } => "typing_submit",
        }
    }
}

/// Destination of an engine event
#[derive(Debug, Clone)]
pub enum Delivery {
    /// Every room member
    Room(ServerMsg),
    /// One member only
    To(PlayerId, ServerMsg),
}

/// Events produced while an engine is borrowed. The room flushes them to
/// members in insertion order before releasing its lock.
#[derive(Debug, Default)]
pub struct Outbox {
    items: Vec<Delivery>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn room(&mut self, msg: ServerMsg) {
        self.items.push(Delivery::Room(msg));
    }

    pub fn to(&mut self, player: PlayerId, msg: ServerMsg) {
        self.items.push(Delivery::To(player, msg));
    }

    pub fn drain(&mut self) -> Vec<Delivery> {
        std::mem::take(&mut self.items)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// The authoritative engine interface
pub trait GameEngine: Send {
    fn kind(&self) -> GameKind;

    /// Current engine phase
    fn phase(&self) -> Phase;

    /// Player-slot budget
    fn max_players(&self) -> usize;

    /// Monotonic simulation tick counter
    fn tick(&self) -> u64;

    /// Seat a newly admitted player. Returns the seat label, if the kind has one.
    fn seat(&mut self, player: PlayerId, display_name: &str, out: &mut Outbox) -> Option<String>;

    /// Remove a seated player, applying the kind's forfeiture policy
    fn unseat(&mut self, player: PlayerId, out: &mut Outbox);

    /// Apply one client action. Rejections leave the engine unchanged.
    fn apply_input(&mut self, player: PlayerId, action: Action, out: &mut Outbox) -> CoreResult<()>;

    /// Advance the simulation by `dt` seconds
    fn step(&mut self, dt: f32, out: &mut Outbox) -> CoreResult<()>;

    /// Full snapshot of the engine state
    fn serialize_state(&self) -> ServerMsg;

    fn is_terminal(&self) -> bool {
        self.phase() == Phase::Ended
    }

    /// Final standings once terminal
    fn result(&self) -> Option<EngineResult>;

    /// Force the engine into its terminal phase, emitting its end event
    fn force_end(&mut self, reason: &str, out: &mut Outbox);

    /// Snapshot broadcast rate while running
    fn snapshot_hz(&self) -> f32;
}

/// Optional parameters supplied when a room is created
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomParams {
    pub mode_name: Option<String>,
    pub match_seconds: Option<u32>,
}

/// Construct a fresh engine for `kind`. Returns the normalised mode name
/// alongside the engine.
pub fn build_engine(
    kind: GameKind,
    room_id: &str,
    params: &RoomParams,
    settings: &GameSettings,
    seed: u64,
) -> (String, Box<dyn GameEngine>) {
    match kind {
        GameKind::Arena => {
            let mut mode = params
                .mode_name
                .as_deref()
                .and_then(|m| m.parse::<arena::ArenaMode>().ok())
                .unwrap_or(arena::ArenaMode::Ffa);
            if mode == arena::ArenaMode::Boss && !settings.boss_enabled {
                mode = arena::ArenaMode::Ffa;
            }
            let seconds = params.match_seconds.unwrap_or(settings.arena_match_seconds);
            let engine = arena::ArenaEngine::new(room_id, mode, seconds, settings.arena_max_players, seed);
            (mode.as_str().to_string(), Box::new(engine))
        }
        GameKind::Chess => {
            let engine = chess::ChessEngine::new(
                room_id,
                settings.chess_clock_secs * 1000,
                settings.chess_repetition_limit,
            );
            ("1v1".to_string(), Box::new(engine))
        }
        GameKind::Pong => ("1v1".to_string(), Box::new(pong::PongEngine::new(room_id, seed))),
        GameKind::Reaction => (
            "1v1".to_string(),
            Box::new(reaction::ReactionEngine::new(room_id, seed)),
        ),
        GameKind::Typing => (
            "1v1".to_string(),
            Box::new(typing::TypingEngine::new(room_id, seed)),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse() {
        assert_eq!(" Chess ".parse::<GameKind>(), Ok(GameKind::Chess));
        assert_eq!(
            "checkers".parse::<GameKind>(),
            Err(CoreError::Validation("unknown_room_kind"))
        );
    }

    #[test]
    fn test_duel_result() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let res = EngineResult::duel("score", &[a, b], Some(b));
        assert_eq!(res.winners(), vec![b]);
        assert_eq!(res.standings[0].outcome, Outcome::Loss);

        let draw = EngineResult::duel("draw", &[a, b], None);
        assert!(draw.winners().is_empty());
    }

    #[test]
    fn test_action_kind_routing() {
        assert_eq!(Action::ReactionPress.kind(), GameKind::Reaction);
        assert_eq!(Action::ChessResign.name(), "chess_resign");
    }
}
