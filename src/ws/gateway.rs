//! Protocol gateway
//!
//! Transport-agnostic dispatcher: one inbound message in, zero or more
//! events out through the hub. Rejections go back to the sender only.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};
use crate::game::{Action, GameKind, PlayerId, RoomParams};
use crate::matchmaking::MatchmakingService;
use crate::room::{Outbound, RoomKey, RoomRegistry};
use crate::util::ids::sanitize_room_id;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, LobbyState, ServerMsg};

/// Longest chat line, in characters
pub const MAX_CHAT_CHARS: usize = 400;

/// Review hook for chat lines. Returns the text to broadcast, possibly
/// rewritten, or a rejection reason.
pub trait ChatModeration: Send + Sync {
    fn review(&self, user: PlayerId, text: &str) -> Result<String, &'static str>;
}

/// Authenticated identity behind a socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: PlayerId,
    pub display_name: String,
}

#[derive(Clone)]
pub struct Gateway {
    registry: Arc<RoomRegistry>,
    matchmaking: Arc<MatchmakingService>,
    outbound: Arc<dyn Outbound>,
    moderation: Option<Arc<dyn ChatModeration>>,
}

impl Gateway {
    pub fn new(
        registry: Arc<RoomRegistry>,
        matchmaking: Arc<MatchmakingService>,
        outbound: Arc<dyn Outbound>,
        moderation: Option<Arc<dyn ChatModeration>>,
    ) -> Self {
        Self {
            registry,
            matchmaking,
            outbound,
            moderation,
        }
    }

    pub fn lobby(&self) -> LobbyState {
        LobbyState {
            rooms: self.registry.summaries(),
            queues: self.matchmaking.summaries(),
        }
    }

    /// Greet a freshly connected socket
    pub fn on_connect(&self, session: &Session) {
        self.outbound.send(
            session.user_id,
            ServerMsg::Welcome {
                user_id: session.user_id,
                server_time: unix_millis(),
            },
        );
        self.outbound.send(session.user_id, ServerMsg::LobbyState(self.lobby()));
    }

    /// Last socket of an identity closed
    pub fn on_disconnect(&self, user: PlayerId) {
        self.matchmaking.leave_all(user);
        self.registry.leave_all(user, "disconnected");
    }

    /// Parse and dispatch one text frame
    pub fn handle_text(&self, session: &Session, text: &str) {
        match serde_json::from_str::<ClientMsg>(text) {
            Ok(msg) => self.dispatch(session, msg),
            Err(e) => {
                warn!(user_id = %session.user_id, error = %e, "Failed to parse client message");
                self.outbound.send(
                    session.user_id,
                    ServerMsg::Error {
                        code: "invalid_json".to_string(),
                        message: e.to_string(),
                    },
                );
            }
        }
    }

    pub fn dispatch(&self, session: &Session, msg: ClientMsg) {
        let name = msg.name();
        debug!(user_id = %session.user_id, msg = name, "Dispatching client message");
        if let Err(e) = self.route(session, msg) {
            match &e {
                CoreError::Internal(detail) => {
                    warn!(user_id = %session.user_id, msg = name, detail = %detail, "Action hit an internal fault")
                }
                _ => debug!(user_id = %session.user_id, msg = name, reason = e.reason(), "Action rejected"),
            }
            self.outbound
                .send(session.user_id, ServerMsg::rejected(e.class(), e.reason(), name));
        }
    }

    fn route(&self, session: &Session, msg: ClientMsg) -> CoreResult<()> {
        let user = session.user_id;
        match msg {
            ClientMsg::Ping { t } => {
                self.outbound.send(user, ServerMsg::Pong { t });
                Ok(())
            }
            ClientMsg::GetLobby => {
                self.outbound.send(user, ServerMsg::LobbyState(self.lobby()));
                Ok(())
            }

            ClientMsg::QueueJoin { kind, mode } => {
                let kind: GameKind = kind.parse()?;
                self.matchmaking
                    .join(user, &session.display_name, kind, &mode)
                    .map(|_| ())
            }
            ClientMsg::QueueLeave { kind, mode } => {
                let kind = kind.as_deref().map(str::parse::<GameKind>).transpose()?;
                self.matchmaking.leave(user, kind, mode.as_deref());
                Ok(())
            }

            ClientMsg::JoinRoom {
                kind,
                room_id,
                mode_name,
                match_seconds,
            } => {
                let kind: GameKind = kind.parse()?;
                let key = RoomKey::new(kind, sanitize_room_id(&room_id));
                self.matchmaking.leave(user, Some(kind), None);
                let params = RoomParams {
                    mode_name,
                    match_seconds,
                };
                self.registry
                    .join(&key, &params, user, &session.display_name)
                    .map(|_| ())
            }
            ClientMsg::LeaveRoom { kind, room_id } => {
                let kind: GameKind = kind.parse()?;
                let key = match room_id.trim() {
                    "" => self
                        .registry
                        .room_of(user, kind)
                        .map(|room| room.key().clone())
                        .ok_or(CoreError::State("not_in_room"))?,
                    id => RoomKey::new(kind, sanitize_room_id(id)),
                };
                if self.registry.leave(&key, user, "left") {
                    Ok(())
                } else {
                    Err(CoreError::State("not_in_room"))
                }
            }
            ClientMsg::RoomChat { room_key, text } => self.chat(user, &room_key, &text),

            ClientMsg::ArenaInput(input) => self.act(user, Action::ArenaInput(input)),
            ClientMsg::ArenaSelect { character_id } => self.act(user, Action::ArenaSelect { character_id }),
            ClientMsg::ArenaReady { ready } => self.act(user, Action::ArenaReady { ready }),
            ClientMsg::ArenaStart => self.act(user, Action::ArenaStart),
            ClientMsg::ChessMove { from, to, promotion } => self.act(user, Action::ChessMove { from, to, promotion }),
            ClientMsg::ChessResign => self.act(user, Action::ChessResign),
            ClientMsg::ChessOfferDraw => self.act(user, Action::ChessOfferDraw),
            ClientMsg::ChessAcceptDraw => self.act(user, Action::ChessAcceptDraw),
            ClientMsg::PongInput { up, down } => self.act(user, Action::PongInput { up, down }),
            ClientMsg::ReactionPress => self.act(user, Action::ReactionPress),
            ClientMsg::TypingSubmit { text } => self.act(user, Action::TypingSubmit { text }),

            ClientMsg::ArenaRestart => self.restart(user, GameKind::Arena),
            ClientMsg::ChessRestart => self.restart(user, GameKind::Chess),
            ClientMsg::PongRestart => self.restart(user, GameKind::Pong),
            ClientMsg::ReactionRestart => self.restart(user, GameKind::Reaction),
            ClientMsg::TypingRestart => self.restart(user, GameKind::Typing),
        }
    }

    /// Route an engine action to the sender's room of the matching kind
    fn act(&self, user: PlayerId, action: Action) -> CoreResult<()> {
        let room = self
            .registry
            .room_of(user, action.kind())
            .ok_or(CoreError::State("not_in_room"))?;
        room.apply(user, action)
    }

    fn restart(&self, user: PlayerId, kind: GameKind) -> CoreResult<()> {
        self.registry.restart(user, kind).map(|_| ())
    }

    fn chat(&self, user: PlayerId, room_key: &str, text: &str) -> CoreResult<()> {
        let key: RoomKey = room_key.parse()?;
        let room = self.registry.get(&key).ok_or(CoreError::State("room_not_found"))?;
        let text: String = text.trim().chars().take(MAX_CHAT_CHARS).collect();
        if text.is_empty() {
            return Ok(());
        }
        let text = match &self.moderation {
            Some(hook) => hook.review(user, &text).map_err(CoreError::Validation)?,
            None => text,
        };
        room.chat(user, text, chrono::Utc::now().timestamp_millis())
    }
}
