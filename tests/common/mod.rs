//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use lan_arena_server::config::GameSettings;
use lan_arena_server::game::PlayerId;
use lan_arena_server::matchmaking::MatchmakingService;
use lan_arena_server::room::{Outbound, RoomDeps, RoomRegistry};
use lan_arena_server::store::{MatchResult, RatingLedger, ResultSink};
use lan_arena_server::ws::gateway::{Gateway, Session};
use lan_arena_server::ws::protocol::ServerMsg;

/// Outbound collaborator that keeps every message per identity
#[derive(Default)]
pub struct Recorder {
    sent: Mutex<Vec<(PlayerId, ServerMsg)>>,
}

impl Outbound for Recorder {
    fn send(&self, to: PlayerId, msg: ServerMsg) {
        self.sent.lock().push((to, msg));
    }
}

impl Recorder {
    /// Messages sent to `user` as JSON, in order
    pub fn json(&self, user: PlayerId) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .filter(|(to, _)| *to == user)
            .map(|(_, msg)| serde_json::to_value(msg).unwrap())
            .collect()
    }

    /// Wire types sent to `user`, in order
    pub fn types(&self, user: PlayerId) -> Vec<String> {
        self.json(user)
            .iter()
            .map(|v| v["type"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    /// Messages of one wire type sent to `user`
    pub fn of_type(&self, user: PlayerId, ty: &str) -> Vec<Value> {
        self.json(user).into_iter().filter(|v| v["type"] == ty).collect()
    }

    pub fn last_of_type(&self, user: PlayerId, ty: &str) -> Option<Value> {
        self.of_type(user, ty).pop()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

/// Sink that keeps every submission
#[derive(Default)]
pub struct Collected {
    pub results: Mutex<Vec<MatchResult>>,
}

impl ResultSink for Collected {
    fn submit(&self, result: MatchResult) {
        self.results.lock().push(result);
    }
}

pub struct Core {
    pub recorder: Arc<Recorder>,
    pub ledger: Arc<RatingLedger>,
    pub registry: Arc<RoomRegistry>,
    pub matchmaking: Arc<MatchmakingService>,
    pub gateway: Gateway,
}

pub const IDLE: Duration = Duration::from_secs(60);
pub const GRACE: Duration = Duration::from_secs(15);

pub fn core() -> Core {
    core_with(GameSettings::default())
}

pub fn core_with(settings: GameSettings) -> Core {
    let recorder = Arc::new(Recorder::default());
    let ledger = Arc::new(RatingLedger::new());
    let registry = Arc::new(RoomRegistry::new(
        RoomDeps {
            outbound: recorder.clone(),
            sink: ledger.clone(),
            settings: settings.clone(),
        },
        IDLE,
        GRACE,
    ));
    let matchmaking = Arc::new(MatchmakingService::new(
        registry.clone(),
        recorder.clone(),
        settings.queue_rules(),
    ));
    let gateway = Gateway::new(registry.clone(), matchmaking.clone(), recorder.clone(), None);
    Core {
        recorder,
        ledger,
        registry,
        matchmaking,
        gateway,
    }
}

pub fn session(name: &str) -> Session {
    Session {
        user_id: Uuid::new_v4(),
        display_name: name.to_string(),
    }
}

/// Dispatch a raw JSON frame through the gateway
pub fn send(core: &Core, who: &Session, frame: Value) {
    core.gateway.handle_text(who, &frame.to_string());
}
