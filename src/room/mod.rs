//! Rooms: one engine plus its membership
//!
//! Every mutation of a room, from a client message or a scheduler tick,
//! runs under the room's own lock, so snapshots leave in tick order. Events
//! are handed to [`Outbound`] while the lock is held; delivery itself never
//! blocks.

pub mod registry;
pub mod scheduler;

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, info};
use uuid::Uuid;

pub use registry::RoomRegistry;

use crate::config::GameSettings;
use crate::error::{CoreError, CoreResult};
use crate::game::{
    build_engine, Action, Delivery, GameEngine, GameKind, Outbox, Phase, PlayerId, RoomParams, SnapshotPacer,
};
use crate::store::{MatchResult, ResultSink};
use crate::util::ids::engine_seed;
use crate::util::time::step_delta;
use crate::ws::protocol::{RoomEnd, RoomSummary, ServerMsg};

/// Fire-and-forget delivery to connected identities
pub trait Outbound: Send + Sync {
    fn send(&self, to: PlayerId, msg: ServerMsg);
}

/// Stable identifier of a room: `kind:room_id`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomKey {
    pub kind: GameKind,
    pub room_id: String,
}

impl RoomKey {
    pub fn new(kind: GameKind, room_id: impl Into<String>) -> Self {
        Self {
            kind,
            room_id: room_id.into(),
        }
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.room_id)
    }
}

impl FromStr for RoomKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, room_id) = s.split_once(':').ok_or(CoreError::Validation("invalid_room_key"))?;
        if room_id.is_empty() {
            return Err(CoreError::Validation("invalid_room_key"));
        }
        Ok(Self::new(kind.parse()?, room_id))
    }
}

/// Collaborators shared by every room
#[derive(Clone)]
pub struct RoomDeps {
    pub outbound: Arc<dyn Outbound>,
    pub sink: Arc<dyn ResultSink>,
    pub settings: GameSettings,
}

#[derive(Debug, Clone)]
struct Member {
    user_id: PlayerId,
    name: String,
    seat: Option<String>,
}

/// Result of admitting an identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub as_player: bool,
    pub seat: Option<String>,
}

/// What the sweeper should do with a room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepAction {
    Keep,
    /// Empty for too long; end it. `remove` when nobody is left watching.
    EndIdle { remove: bool },
    Remove,
}

struct RoomInner {
    engine: Box<dyn GameEngine>,
    state: Phase,
    players: Vec<Member>,
    spectators: Vec<Member>,
    pacer: SnapshotPacer,
    last_step: Instant,
    empty_since: Option<Instant>,
    ended_at: Option<Instant>,
    published: bool,
}

impl RoomInner {
    fn is_player(&self, user: PlayerId) -> bool {
        self.players.iter().any(|m| m.user_id == user)
    }

    fn member(&self, user: PlayerId) -> Option<&Member> {
        self.players
            .iter()
            .chain(self.spectators.iter())
            .find(|m| m.user_id == user)
    }

    fn member_ids(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.players
            .iter()
            .chain(self.spectators.iter())
            .map(|m| m.user_id)
    }

    /// Room state follows the engine forward, never backward
    fn sync_state(&mut self) {
        self.state = self.state.max(self.engine.phase());
    }
}

pub struct Room {
    key: RoomKey,
    mode: String,
    match_id: Uuid,
    params: RoomParams,
    deps: RoomDeps,
    inner: Mutex<RoomInner>,
}

impl fmt::Debug for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Room")
            .field("key", &self.key)
            .field("mode", &self.mode)
            .field("match_id", &self.match_id)
            .finish_non_exhaustive()
    }
}

impl Room {
    pub fn new(key: RoomKey, params: RoomParams, deps: RoomDeps) -> Arc<Self> {
        let (mode, engine) = build_engine(key.kind, &key.room_id, &params, &deps.settings, engine_seed());
        Self::with_engine(key, mode, params, deps, engine)
    }

    fn with_engine(
        key: RoomKey,
        mode: String,
        params: RoomParams,
        deps: RoomDeps,
        engine: Box<dyn GameEngine>,
    ) -> Arc<Self> {
        let pacer = SnapshotPacer::new(engine.snapshot_hz());
        let now = Instant::now();
        Arc::new(Self {
            key,
            mode,
            match_id: Uuid::new_v4(),
            params,
            deps,
            inner: Mutex::new(RoomInner {
                engine,
                state: Phase::Waiting,
                players: Vec::new(),
                spectators: Vec::new(),
                pacer,
                last_step: now,
                empty_since: Some(now),
                ended_at: None,
                published: false,
            }),
        })
    }

    /// Fresh room under the same key and parameters
    pub fn successor(&self) -> Arc<Self> {
        Self::new(self.key.clone(), self.params.clone(), self.deps.clone())
    }

    pub fn key(&self) -> &RoomKey {
        &self.key
    }

    pub fn kind(&self) -> GameKind {
        self.key.kind
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub fn match_id(&self) -> Uuid {
        self.match_id
    }

    pub fn state(&self) -> Phase {
        self.inner.lock().state
    }

    pub fn is_ended(&self) -> bool {
        self.state() == Phase::Ended
    }

    pub fn is_player(&self, user: PlayerId) -> bool {
        self.inner.lock().is_player(user)
    }

    pub fn is_member(&self, user: PlayerId) -> bool {
        self.inner.lock().member(user).is_some()
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.inner.lock().players.iter().map(|m| m.user_id).collect()
    }

    /// Members in admission order, players first
    pub fn members(&self) -> Vec<(PlayerId, String)> {
        let inner = self.inner.lock();
        inner
            .players
            .iter()
            .chain(inner.spectators.iter())
            .map(|m| (m.user_id, m.name.clone()))
            .collect()
    }

    /// Current full snapshot
    pub fn snapshot(&self) -> ServerMsg {
        self.inner.lock().engine.serialize_state()
    }

    pub fn summary(&self) -> RoomSummary {
        let inner = self.inner.lock();
        RoomSummary {
            room_key: self.key.to_string(),
            kind: self.key.kind,
            room_id: self.key.room_id.clone(),
            mode: self.mode.clone(),
            state: inner.state,
            players: inner.players.len(),
            spectators: inner.spectators.len(),
        }
    }

    /// Admit `user` as a player while the room is waiting and a slot is
    /// free, otherwise as a spectator. Joining twice is a no-op that
    /// repeats the `room_joined` event.
    pub fn join(&self, user: PlayerId, name: &str) -> CoreResult<Admission> {
        let mut inner = self.inner.lock();
        if inner.state == Phase::Ended {
            return Err(CoreError::State("room_ended"));
        }
        let mut out = Outbox::new();

        let admission = if let Some(member) = inner.member(user) {
            Admission {
                as_player: inner.is_player(user),
                seat: member.seat.clone(),
            }
        } else {
            let has_slot = inner.engine.phase() == Phase::Waiting && inner.players.len() < inner.engine.max_players();
            let seat = if has_slot {
                inner.engine.seat(user, name, &mut out)
            } else {
                None
            };
            let member = Member {
                user_id: user,
                name: name.to_string(),
                seat: seat.clone(),
            };
            if seat.is_some() {
                inner.players.push(member);
                inner.empty_since = None;
            } else {
                inner.spectators.push(member);
            }
            Admission {
                as_player: seat.is_some(),
                seat,
            }
        };
        inner.sync_state();

        info!(
            room_key = %self.key,
            user_id = %user,
            as_player = admission.as_player,
            "Member joined room"
        );
        self.deps.outbound.send(
            user,
            ServerMsg::RoomJoined {
                kind: self.key.kind,
                room_id: self.key.room_id.clone(),
                room_key: self.key.to_string(),
                seat: admission.seat.clone(),
                state: inner.state,
            },
        );
        out.room(self.roster(&inner));
        out.to(user, inner.engine.serialize_state());
        self.flush(&inner, &mut out);
        self.settle(&mut inner);
        Ok(admission)
    }

    /// Remove `user` from the room. Returns false if they were not a member.
    pub fn leave(&self, user: PlayerId, reason: &str) -> bool {
        let mut inner = self.inner.lock();
        let mut out = Outbox::new();
        if inner.is_player(user) {
            inner.players.retain(|m| m.user_id != user);
            if inner.state != Phase::Ended {
                inner.engine.unseat(user, &mut out);
            }
            if inner.players.is_empty() {
                inner.empty_since = Some(Instant::now());
            }
        } else if inner.spectators.iter().any(|m| m.user_id == user) {
            inner.spectators.retain(|m| m.user_id != user);
        } else {
            return false;
        }
        inner.sync_state();

        info!(room_key = %self.key, user_id = %user, reason, "Member left room");
        self.deps.outbound.send(user, self.left_msg(reason));
        out.room(self.roster(&inner));
        self.flush(&inner, &mut out);
        self.settle(&mut inner);
        true
    }

    /// Route one engine action from `user`
    pub fn apply(&self, user: PlayerId, action: Action) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        if inner.state == Phase::Ended {
            return Err(CoreError::State("room_ended"));
        }
        let mut out = Outbox::new();
        let applied = catch_unwind(AssertUnwindSafe(|| inner.engine.apply_input(user, action, &mut out)));
        let outcome = match applied {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(room_key = %self.key, user_id = %user, "Engine panicked applying input");
                self.fault(&mut inner, &mut out);
                return Err(CoreError::Internal("engine panicked".into()));
            }
        };
        // a rejected action may still have moved the engine on (a flag falling)
        inner.sync_state();
        if outcome.is_ok() && self.key.kind.snapshot_on_action() {
            out.room(inner.engine.serialize_state());
        }
        self.flush(&inner, &mut out);
        self.settle(&mut inner);
        outcome
    }

    /// Broadcast a chat line from a member
    pub fn chat(&self, user: PlayerId, text: String, created_at: i64) -> CoreResult<()> {
        let inner = self.inner.lock();
        let from_name = inner
            .member(user)
            .map(|m| m.name.clone())
            .ok_or(CoreError::Validation("not_a_member"))?;
        let mut out = Outbox::new();
        out.room(ServerMsg::RoomChat {
            room_key: self.key.to_string(),
            from_user_id: user,
            from_name,
            text,
            created_at,
        });
        self.flush(&inner, &mut out);
        Ok(())
    }

    /// One scheduler tick. Skipped when a client action holds the lock;
    /// the next tick picks up the elapsed time.
    pub fn step(&self, now: Instant) {
        let Some(mut inner) = self.inner.try_lock() else {
            debug!(room_key = %self.key, "Room busy, skipping tick");
            return;
        };
        if inner.state == Phase::Ended {
            return;
        }
        let dt = step_delta(inner.last_step, now);
        inner.last_step = now;

        let mut out = Outbox::new();
        let stepped = catch_unwind(AssertUnwindSafe(|| inner.engine.step(dt, &mut out)));
        match stepped {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(room_key = %self.key, error = %e, "Engine step failed");
                self.fault(&mut inner, &mut out);
                return;
            }
            Err(_) => {
                error!(room_key = %self.key, "Engine panicked during step");
                self.fault(&mut inner, &mut out);
                return;
            }
        }
        inner.sync_state();
        if inner.state != Phase::Ended && inner.pacer.should_send(dt) {
            out.room(inner.engine.serialize_state());
        }
        self.flush(&inner, &mut out);
        self.settle(&mut inner);
    }

    /// Force the room into `ended`. No-op if it already ended.
    pub fn end(&self, reason: &str) {
        let mut inner = self.inner.lock();
        if inner.state == Phase::Ended {
            return;
        }
        let mut out = Outbox::new();
        let forced = catch_unwind(AssertUnwindSafe(|| inner.engine.force_end(reason, &mut out)));
        if forced.is_err() {
            error!(room_key = %self.key, "Engine panicked while ending");
            out.room(self.bare_end(reason));
        }
        self.flush(&inner, &mut out);
        self.finish(&mut inner, reason);
    }

    /// Detach every member. Returns them in admission order.
    pub fn close(&self, reason: &str) -> Vec<(PlayerId, String)> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let members: Vec<Member> = inner.players.drain(..).chain(inner.spectators.drain(..)).collect();
        for m in &members {
            self.deps.outbound.send(m.user_id, self.left_msg(reason));
        }
        members.into_iter().map(|m| (m.user_id, m.name)).collect()
    }

    pub fn sweep_action(&self, now: Instant, idle: Duration, grace: Duration) -> SweepAction {
        let inner = self.inner.lock();
        if let Some(ended_at) = inner.ended_at {
            return if now.saturating_duration_since(ended_at) >= grace {
                SweepAction::Remove
            } else {
                SweepAction::Keep
            };
        }
        match inner.empty_since {
            Some(since) if inner.players.is_empty() && now.saturating_duration_since(since) >= idle => {
                SweepAction::EndIdle {
                    remove: inner.spectators.is_empty(),
                }
            }
            _ => SweepAction::Keep,
        }
    }

    fn roster(&self, inner: &RoomInner) -> ServerMsg {
        ServerMsg::RoomRoster {
            room_key: self.key.to_string(),
            state: inner.state,
            players: inner.players.iter().map(|m| m.user_id).collect(),
            spectators: inner.spectators.iter().map(|m| m.user_id).collect(),
        }
    }

    fn left_msg(&self, reason: &str) -> ServerMsg {
        ServerMsg::RoomLeft {
            kind: self.key.kind,
            room_id: self.key.room_id.clone(),
            room_key: self.key.to_string(),
            reason: reason.to_string(),
        }
    }

    fn bare_end(&self, reason: &str) -> ServerMsg {
        ServerMsg::end(
            self.key.kind,
            RoomEnd {
                room_id: self.key.room_id.clone(),
                reason: reason.to_string(),
                status: None,
                winners: Vec::new(),
                standings: Vec::new(),
            },
        )
    }

    fn flush(&self, inner: &RoomInner, out: &mut Outbox) {
        for delivery in out.drain() {
            match delivery {
                Delivery::Room(msg) => {
                    for user in inner.member_ids() {
                        self.deps.outbound.send(user, msg.clone());
                    }
                }
                Delivery::To(user, msg) => self.deps.outbound.send(user, msg),
            }
        }
    }

    /// Finish the room if the engine reached its terminal phase
    fn settle(&self, inner: &mut RoomInner) {
        if inner.engine.is_terminal() && !inner.published {
            let reason = inner
                .engine
                .result()
                .map(|r| r.reason)
                .unwrap_or_else(|| "ended".to_string());
            self.finish(inner, &reason);
        }
    }

    fn fault(&self, inner: &mut RoomInner, out: &mut Outbox) {
        // the engine may be half-updated; drop its pending events
        out.drain();
        let forced = catch_unwind(AssertUnwindSafe(|| inner.engine.force_end("internal_error", out)));
        if forced.is_err() {
            out.drain();
            out.room(self.bare_end("internal_error"));
        }
        self.flush(inner, out);
        self.finish(inner, "internal_error");
    }

    /// Terminal transition: final snapshot, then exactly one published result
    fn finish(&self, inner: &mut RoomInner, reason: &str) {
        inner.state = Phase::Ended;
        if inner.published {
            return;
        }
        inner.published = true;
        inner.ended_at = Some(Instant::now());

        let mut out = Outbox::new();
        if let Ok(snapshot) = catch_unwind(AssertUnwindSafe(|| inner.engine.serialize_state())) {
            out.room(snapshot);
        }
        self.flush(inner, &mut out);

        let result = catch_unwind(AssertUnwindSafe(|| inner.engine.result())).ok().flatten();
        let (reason, standings) = match result {
            Some(r) => (r.reason, r.standings),
            None => (reason.to_string(), Vec::new()),
        };
        info!(room_key = %self.key, match_id = %self.match_id, reason = %reason, "Room ended");
        if standings.is_empty() {
            return;
        }
        self.deps.sink.submit(MatchResult {
            match_id: self.match_id,
            room_key: self.key.to_string(),
            kind: self.key.kind,
            mode: self.mode.clone(),
            reason,
            standings,
            finished_at: chrono::Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{EngineResult, Outcome, Standing};
    use crate::ws::protocol::ReactionSnapshot;

    #[derive(Default)]
    struct Log {
        sent: Mutex<Vec<(PlayerId, ServerMsg)>>,
        results: Mutex<Vec<MatchResult>>,
    }

    impl Outbound for Log {
        fn send(&self, to: PlayerId, msg: ServerMsg) {
            self.sent.lock().push((to, msg));
        }
    }

    impl ResultSink for Log {
        fn submit(&self, result: MatchResult) {
            self.results.lock().push(result);
        }
    }

    /// Two-seat engine that panics on demand
    struct Faulty {
        phase: Phase,
        seats: Vec<PlayerId>,
        panic_on_step: bool,
    }

    impl GameEngine for Faulty {
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
            0
        }
        fn seat(&mut self, player: PlayerId, _: &str, _: &mut Outbox) -> Option<String> {
            self.seats.push(player);
            if self.seats.len() == 2 {
                self.phase = Phase::Running;
            }
            None
        }
        fn unseat(&mut self, _: PlayerId, _: &mut Outbox) {}
        fn apply_input(&mut self, _: PlayerId, _: Action, _: &mut Outbox) -> CoreResult<()> {
            panic!("bad input path");
        }
        fn step(&mut self, _: f32, _: &mut Outbox) -> CoreResult<()> {
            if self.panic_on_step {
                panic!("bad step");
            }
            Ok(())
        }
        fn serialize_state(&self) -> ServerMsg {
            ServerMsg::ReactionState(ReactionSnapshot {
                room_id: "f".into(),
                state: self.phase,
                tick: 0,
                phase: crate::game::reaction::ReactionPhase::Countdown,
                phase_timer: 0.0,
                round: 0,
                players: self.seats.clone(),
                score: Default::default(),
            })
        }
        fn result(&self) -> Option<EngineResult> {
            (self.phase == Phase::Ended).then(|| EngineResult {
                reason: "internal_error".into(),
                standings: self.seats.iter().map(|&p| Standing::new(p, Outcome::Draw)).collect(),
            })
        }
        fn force_end(&mut self, _: &str, _: &mut Outbox) {
            self.phase = Phase::Ended;
        }
        fn snapshot_hz(&self) -> f32 {
            5.0
        }
    }

    fn faulty_room(log: &Arc<Log>, id: &str, panic_on_step: bool) -> Arc<Room> {
        let deps = RoomDeps {
            outbound: log.clone(),
            sink: log.clone(),
            settings: GameSettings::default(),
        };
        let engine = Faulty {
            phase: Phase::Waiting,
            seats: Vec::new(),
            panic_on_step,
        };
        Room::with_engine(
            RoomKey::new(GameKind::Reaction, id),
            "1v1".into(),
            RoomParams::default(),
            deps,
            Box::new(engine),
        )
    }

    #[test]
    fn test_panicking_step_ends_only_that_room() {
        let log = Arc::new(Log::default());
        let bad = faulty_room(&log, "bad", true);
        let good = faulty_room(&log, "good", false);
        for room in [&bad, &good] {
            room.join(Uuid::new_v4(), "a").unwrap();
            room.join(Uuid::new_v4(), "b").unwrap();
            assert_eq!(room.state(), Phase::Running);
        }

        let now = Instant::now();
        bad.step(now);
        good.step(now);

        assert_eq!(bad.state(), Phase::Ended);
        assert_eq!(good.state(), Phase::Running);
        let results = log.results.lock();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].reason, "internal_error");
        assert_eq!(results[0].room_key, "reaction:bad");
    }

    #[test]
    fn test_panicking_action_is_internal_fault() {
        let log = Arc::new(Log::default());
        let room = faulty_room(&log, "act", false);
        let a = Uuid::new_v4();
        room.join(a, "a").unwrap();
        room.join(Uuid::new_v4(), "b").unwrap();

        let err = room.apply(a, Action::ReactionPress).unwrap_err();
        assert_eq!(err.reason(), "internal_error");
        assert!(room.is_ended());
        assert_eq!(room.apply(a, Action::ReactionPress), Err(CoreError::State("room_ended")));

        // ending again publishes nothing new
        room.end("server_shutdown");
        assert_eq!(log.results.lock().len(), 1);
    }

    #[test]
    fn test_room_key_roundtrip() {
        let key = RoomKey::new(GameKind::Chess, "lab-1");
        assert_eq!(key.to_string(), "chess:lab-1");
        assert_eq!("chess:lab-1".parse::<RoomKey>(), Ok(key));
        assert_eq!(
            "chess".parse::<RoomKey>(),
            Err(CoreError::Validation("invalid_room_key"))
        );
        assert_eq!(
            "golf:x".parse::<RoomKey>(),
            Err(CoreError::Validation("unknown_room_kind"))
        );
    }
}
