//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorClass;
use crate::game::chess::Side;
use crate::game::reaction::ReactionPhase;
use crate::game::{ArenaInput, GameKind, Phase, Standing};

fn default_true() -> bool {
    true
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Enter a matchmaking queue
    QueueJoin {
        kind: String,
        #[serde(default)]
        mode: String,
    },

    /// Leave matchmaking. Missing fields widen the scope.
    QueueLeave {
        #[serde(default)]
        kind: Option<String>,
        #[serde(default)]
        mode: Option<String>,
    },

    /// Join (or create) a named room
    JoinRoom {
        kind: String,
        #[serde(default)]
        room_id: String,
        /// Arena mode for newly created arena rooms
        #[serde(default)]
        mode_name: Option<String>,
        #[serde(default)]
        match_seconds: Option<u32>,
    },

    LeaveRoom {
        kind: String,
        room_id: String,
    },

    RoomChat {
        room_key: String,
        text: String,
    },

    /// Ping for latency measurement
    Ping {
        t: u64,
    },

    GetLobby,

    ArenaInput(ArenaInput),
    ArenaSelect {
        character_id: String,
    },
    ArenaReady {
        #[serde(default = "default_true")]
        ready: bool,
    },
    ArenaStart,
    ArenaRestart,

    ChessMove {
        from: String,
        to: String,
        #[serde(default)]
        promotion: Option<String>,
    },
    ChessResign,
    ChessOfferDraw,
    ChessAcceptDraw,
    ChessRestart,

    PongInput {
        #[serde(default)]
        up: bool,
        #[serde(default)]
        down: bool,
    },
    PongRestart,

    ReactionPress,
    ReactionRestart,

    TypingSubmit {
        text: String,
    },
    TypingRestart,
}

impl ClientMsg {
    /// Wire name, echoed back in rejections
    pub fn name(&self) -> &'static str {
        match self {
            ClientMsg::QueueJoin { .. } => "queue_join",
            ClientMsg::QueueLeave { .. } => "queue_leave",
            ClientMsg::JoinRoom { .. } => "join_room",
            ClientMsg::LeaveRoom { .. } => "leave_room",
            ClientMsg::RoomChat { .. } => "room_chat",
            ClientMsg::Ping { .. } => "ping",
            ClientMsg::GetLobby => "get_lobby",
            ClientMsg::ArenaInput(_) => "arena_input",
            ClientMsg::ArenaSelect { .. } => "arena_select",
            ClientMsg::ArenaReady { .. } => "arena_ready",
            ClientMsg::ArenaStart => "arena_start",
            ClientMsg::ArenaRestart => "arena_restart",
            ClientMsg::ChessMove { .. } => "chess_move",
            ClientMsg::ChessResign => "chess_resign",
            ClientMsg::ChessOfferDraw => "chess_offer_draw",
            ClientMsg::ChessAcceptDraw => "chess_accept_draw",
            ClientMsg::ChessRestart => "chess_restart",
            ClientMsg::PongInput { .. } => "pong_input",
            ClientMsg::PongRestart => "pong_restart",
            ClientMsg::ReactionPress => "reaction_press",
            ClientMsg::ReactionRestart => "reaction_restart",
            ClientMsg::TypingSubmit { .. } => "typing_submit",
            ClientMsg::TypingRestart => "typing_restart",
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        user_id: Uuid,
        server_time: u64,
    },

    /// Pong response
    Pong {
        t: u64,
    },

    /// Transport-level error (bad frame)
    Error {
        code: String,
        message: String,
    },

    /// An action was refused; state is unchanged
    Rejected {
        code: ErrorClass,
        reason: String,
        action: String,
    },

    QueueStatus {
        kind: GameKind,
        mode: String,
        position: Option<usize>,
        size: usize,
        active: bool,
    },

    MatchFound {
        kind: GameKind,
        mode: String,
        room_id: String,
        room_key: String,
        players: Vec<Uuid>,
    },

    RoomJoined {
        kind: GameKind,
        room_id: String,
        room_key: String,
        seat: Option<String>,
        state: Phase,
    },

    RoomLeft {
        kind: GameKind,
        room_id: String,
        room_key: String,
        reason: String,
    },

    RoomRoster {
        room_key: String,
        state: Phase,
        players: Vec<Uuid>,
        spectators: Vec<Uuid>,
    },

    RoomChat {
        room_key: String,
        from_user_id: Uuid,
        from_name: String,
        text: String,
        created_at: i64,
    },

    LobbyState(LobbyState),

    ArenaState(ArenaSnapshot),
    ArenaStart {
        room_id: String,
        mode_name: String,
        time_left: f32,
    },
    ArenaEnd(RoomEnd),

    ChessState(ChessSnapshot),
    ChessMoveOk {
        room_id: String,
        uci: String,
        fen: String,
        status: String,
    },
    ChessDrawOffer {
        room_id: String,
        from: Side,
    },
    ChessEnd(RoomEnd),

    PongState(PongSnapshot),
    PongEnd(RoomEnd),

    ReactionState(ReactionSnapshot),
    ReactionRoundStart {
        room_id: String,
        round: u32,
    },
    ReactionGo {
        room_id: String,
        round: u32,
    },
    ReactionFalseStart {
        room_id: String,
        user_id: Uuid,
    },
    ReactionRoundWin {
        room_id: String,
        user_id: Uuid,
    },
    ReactionTimeout {
        room_id: String,
        round: u32,
    },
    ReactionEnd(RoomEnd),

    TypingState(TypingSnapshot),
    TypingRound {
        room_id: String,
        round: u32,
        phrase: String,
    },
    TypingRoundWin {
        room_id: String,
        user_id: Uuid,
    },
    TypingIncorrect {
        room_id: String,
    },
    TypingRoundTimeout {
        room_id: String,
        round: u32,
    },
    TypingEnd(RoomEnd),
}

impl ServerMsg {
    /// Kind-specific terminal event
    pub fn end(kind: GameKind, end: RoomEnd) -> Self {
        match kind {
            GameKind::Arena => ServerMsg::ArenaEnd(end),
            GameKind::Chess => ServerMsg::ChessEnd(end),
            GameKind::Pong => ServerMsg::PongEnd(end),
            GameKind::Reaction => ServerMsg::ReactionEnd(end),
            GameKind::Typing => ServerMsg::TypingEnd(end),
        }
    }

    /// Simulation tick carried by a state snapshot
    pub fn snapshot_tick(&self) -> Option<u64> {
        match self {
            ServerMsg::ArenaState(s) => Some(s.tick),
            ServerMsg::ChessState(s) => Some(s.tick),
            ServerMsg::PongState(s) => Some(s.tick),
            ServerMsg::ReactionState(s) => Some(s.tick),
            ServerMsg::TypingState(s) => Some(s.tick),
            _ => None,
        }
    }

    pub fn rejected(code: ErrorClass, reason: &str, action: &str) -> Self {
        ServerMsg::Rejected {
            code,
            reason: reason.to_string(),
            action: action.to_string(),
        }
    }
}

/// Terminal event payload shared by all kinds
#[derive(Debug, Clone, Serialize)]
pub struct RoomEnd {
    pub room_id: String,
    pub reason: String,
    /// Kind-specific terminal status (chess: checkmate, resignation, timeout, draw)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub winners: Vec<Uuid>,
    pub standings: Vec<Standing>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LobbyState {
    pub rooms: Vec<RoomSummary>,
    pub queues: Vec<QueueSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomSummary {
    pub room_key: String,
    pub kind: GameKind,
    pub room_id: String,
    pub mode: String,
    pub state: Phase,
    pub players: usize,
    pub spectators: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueSummary {
    pub kind: GameKind,
    pub mode: String,
    pub size: usize,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

/// Fighter state in an arena snapshot
#[derive(Debug, Clone, Serialize)]
pub struct FighterSnapshot {
    pub user_id: Uuid,
    pub display_name: String,
    pub character_id: String,
    pub team: u32,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub hp: f32,
    pub max_hp: f32,
    pub alive: bool,
    pub dash_cd: f32,
    pub basic_cd: f32,
    pub special_cd: f32,
    pub ult_cd: f32,
    pub stun: f32,
    pub respawn: f32,
    pub ult_charge: f32,
    pub kos: u32,
    pub deaths: u32,
    /// Last processed input sequence
    pub last_input_seq: u64,
}

/// Arena combat events since the previous snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArenaEvent {
    Hit {
        attacker: Uuid,
        target: Uuid,
        damage: f32,
    },
    Ko {
        victim: Uuid,
        killer: Option<Uuid>,
    },
    Whiff {
        attacker: Uuid,
        r#move: String,
    },
    Dash {
        user_id: Uuid,
    },
    Buff {
        user_id: Uuid,
        name: String,
    },
}

/// Arena event stamped with the tick it happened on
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimedArenaEvent {
    pub tick: u64,
    #[serde(flatten)]
    pub event: ArenaEvent,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArenaSnapshot {
    pub room_id: String,
    pub mode_name: String,
    pub state: Phase,
    pub tick: u64,
    pub time_left: f32,
    pub target_kos: u32,
    pub players: Vec<Uuid>,
    pub ready: Vec<Uuid>,
    pub fighters: Vec<FighterSnapshot>,
    pub boss: Option<FighterSnapshot>,
    pub team_scores: Option<[u32; 2]>,
    pub events: Vec<TimedArenaEvent>,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoveRecord {
    pub ply: u32,
    pub uci: String,
    pub side: Side,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ChessClocks {
    pub white_ms: u64,
    pub black_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChessSnapshot {
    pub room_id: String,
    pub state: Phase,
    pub tick: u64,
    pub white: Option<Uuid>,
    pub black: Option<Uuid>,
    /// Eight rank strings, rank 8 first; '.' marks an empty square
    pub board: Vec<String>,
    pub fen: String,
    pub turn: Side,
    pub castle_rights: String,
    pub ep: Option<String>,
    pub status: String,
    pub winner: Option<Side>,
    pub draw_reason: Option<String>,
    pub in_check: bool,
    pub moves: Vec<MoveRecord>,
    pub clocks: ChessClocks,
    pub draw_offer_from: Option<Side>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PongSnapshot {
    pub room_id: String,
    pub state: Phase,
    pub tick: u64,
    pub players: Vec<Uuid>,
    pub score: [u32; 2],
    pub ball: Vec2,
    pub left_y: f32,
    pub right_y: f32,
    pub paddle_h: f32,
    pub time_left: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReactionSnapshot {
    pub room_id: String,
    pub state: Phase,
    pub tick: u64,
    pub phase: ReactionPhase,
    pub phase_timer: f32,
    pub round: u32,
    pub players: Vec<Uuid>,
    pub score: BTreeMap<Uuid, u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypingSnapshot {
    pub room_id: String,
    pub state: Phase,
    pub tick: u64,
    pub round: u32,
    pub players: Vec<Uuid>,
    pub score: BTreeMap<Uuid, u32>,
    pub round_open: bool,
    pub timeout: f32,
    pub phrase: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_queue_join_without_mode() {
        let msg: ClientMsg = serde_json::from_str(r#"{"type":"queue_join","kind":"chess"}"#).unwrap();
        match msg {
            ClientMsg::QueueJoin { kind, mode } => {
                assert_eq!(kind, "chess");
                assert!(mode.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_arena_input_defaults() {
        let msg: ClientMsg =
            serde_json::from_str(r#"{"type":"arena_input","seq":7,"right":true,"basic":true}"#).unwrap();
        match msg {
            ClientMsg::ArenaInput(input) => {
                assert_eq!(input.seq, 7);
                assert!(input.right && input.basic);
                assert!(!input.up && !input.ult);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_unit_variant() {
        let msg: ClientMsg = serde_json::from_str(r#"{"type":"reaction_press"}"#).unwrap();
        assert!(matches!(msg, ClientMsg::ReactionPress));
        assert!(serde_json::from_str::<ClientMsg>(r#"{"type":"nope"}"#).is_err());
    }

    #[test]
    fn test_server_msg_shape() {
        let msg = ServerMsg::QueueStatus {
            kind: GameKind::Pong,
            mode: "1v1".into(),
            position: Some(1),
            size: 1,
            active: true,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "queue_status");
        assert_eq!(value["kind"], "pong");
        assert_eq!(value["position"], 1);
    }

    #[test]
    fn test_end_event_names() {
        let end = RoomEnd {
            room_id: "r1".into(),
            reason: "score".into(),
            status: None,
            winners: vec![],
            standings: vec![],
        };
        let value = serde_json::to_value(ServerMsg::end(GameKind::Typing, end)).unwrap();
        assert_eq!(value["type"], "typing_end");
        assert_eq!(value["reason"], "score");
        assert!(value.get("status").is_none());
    }
}
