//! Room registry
//!
//! Lock order: the room map, then a room, then the membership index. The
//! map lock is held while a room is created so at most one engine exists
//! per key.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::{Admission, Room, RoomDeps, RoomKey, SweepAction};
use crate::error::{CoreError, CoreResult};
use crate::game::{GameKind, Phase, PlayerId, RoomParams};
use crate::ws::protocol::RoomSummary;

pub struct RoomRegistry {
    rooms: Mutex<HashMap<RoomKey, Arc<Room>>>,
    /// identity -> the room it occupies for each kind
    memberships: DashMap<PlayerId, BTreeMap<GameKind, RoomKey>>,
    deps: RoomDeps,
    idle: Duration,
    grace: Duration,
}

impl RoomRegistry {
    pub fn new(deps: RoomDeps, idle: Duration, grace: Duration) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            memberships: DashMap::new(),
            deps,
            idle,
            grace,
        }
    }

    /// Existing non-ended room for `key`, or a fresh one
    pub fn create_or_get(&self, key: &RoomKey, params: &RoomParams) -> Arc<Room> {
        let mut rooms = self.rooms.lock();
        if let Some(room) = rooms.get(key) {
            if !room.is_ended() {
                return room.clone();
            }
        }
        let room = Room::new(key.clone(), params.clone(), self.deps.clone());
        info!(room_key = %key, mode = %room.mode(), match_id = %room.match_id(), "Room created");
        // an ended room still in its grace period gives way to the new one
        if let Some(old) = rooms.insert(key.clone(), room.clone()) {
            for (user, _) in old.close("room_closed") {
                self.forget(user, key);
            }
        }
        room
    }

    pub fn get(&self, key: &RoomKey) -> Option<Arc<Room>> {
        self.rooms.lock().get(key).cloned()
    }

    /// The room `user` occupies for `kind`
    pub fn room_of(&self, user: PlayerId, kind: GameKind) -> Option<Arc<Room>> {
        let key = self.memberships.get(&user)?.get(&kind).cloned()?;
        self.get(&key)
    }

    pub fn rooms(&self) -> Vec<Arc<Room>> {
        self.rooms.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rooms.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Join `key`, leaving any other room of the same kind first
    pub fn join(&self, key: &RoomKey, params: &RoomParams, user: PlayerId, name: &str) -> CoreResult<(Arc<Room>, Admission)> {
        if let Some(current) = self.membership(user, key.kind) {
            if &current != key {
                self.leave(&current, user, "switched_room");
            }
        }
        // a room may end between lookup and join; the retry gets a fresh one
        for _ in 0..2 {
            let room = self.create_or_get(key, params);
            match room.join(user, name) {
                Ok(admission) => {
                    let previous = self
                        .memberships
                        .entry(user)
                        .or_default()
                        .insert(key.kind, key.clone());
                    // a concurrent join of the same kind may have landed first
                    if let Some(previous) = previous.filter(|previous| previous != key) {
                        self.leave(&previous, user, "switched_room");
                    }
                    return Ok((room, admission));
                }
                Err(CoreError::State("room_ended")) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(CoreError::State("room_ended"))
    }

    pub fn leave(&self, key: &RoomKey, user: PlayerId, reason: &str) -> bool {
        let left = self.get(key).map(|room| room.leave(user, reason)).unwrap_or(false);
        self.forget(user, key);
        left
    }

    /// Leave every room `user` occupies
    pub fn leave_all(&self, user: PlayerId, reason: &str) {
        let keys: Vec<RoomKey> = self
            .memberships
            .get(&user)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        for key in keys {
            self.leave(&key, user, reason);
        }
        self.memberships.remove(&user);
    }

    pub fn end(&self, key: &RoomKey, reason: &str) -> CoreResult<()> {
        let room = self.get(key).ok_or(CoreError::State("room_not_found"))?;
        room.end(reason);
        Ok(())
    }

    /// Replace the ended room `user` occupies for `kind` with a fresh one,
    /// re-admitting its members in order
    pub fn restart(&self, user: PlayerId, kind: GameKind) -> CoreResult<Arc<Room>> {
        let old = self.room_of(user, kind).ok_or(CoreError::State("not_in_room"))?;
        if !old.is_member(user) {
            return Err(CoreError::Validation("not_a_member"));
        }
        if old.state() != Phase::Ended {
            return Err(CoreError::State("not_ended"));
        }
        let fresh = {
            let mut rooms = self.rooms.lock();
            match rooms.get(old.key()) {
                // someone else already restarted it
                Some(current) if !Arc::ptr_eq(current, &old) && !current.is_ended() => return Ok(current.clone()),
                _ => {}
            }
            let fresh = old.successor();
            rooms.insert(old.key().clone(), fresh.clone());
            fresh
        };
        info!(room_key = %old.key(), match_id = %fresh.match_id(), user_id = %user, "Room restarted");

        for (member, name) in old.close("restarted") {
            if self.membership(member, kind).as_ref() != Some(old.key()) {
                continue;
            }
            if let Err(e) = fresh.join(member, &name) {
                debug!(room_key = %old.key(), user_id = %member, error = %e, "Re-admission failed");
                self.forget(member, old.key());
            }
        }
        Ok(fresh)
    }

    /// Step every room, then reclaim idle and finished ones
    pub fn tick(&self, now: Instant) {
        for room in self.rooms() {
            room.step(now);
        }
        self.sweep(now);
    }

    pub fn sweep(&self, now: Instant) {
        for room in self.rooms() {
            match room.sweep_action(now, self.idle, self.grace) {
                SweepAction::Keep => {}
                SweepAction::EndIdle { remove } => {
                    room.end("idle_timeout");
                    if remove {
                        self.remove(&room);
                    }
                }
                SweepAction::Remove => self.remove(&room),
            }
        }
    }

    /// End every live room, used on shutdown
    pub fn drain(&self, reason: &str) {
        for room in self.rooms() {
            room.end(reason);
        }
    }

    /// Public listing, ordered by key
    pub fn summaries(&self) -> Vec<RoomSummary> {
        let mut rooms = self.rooms();
        rooms.sort_by(|a, b| a.key().cmp(b.key()));
        rooms.iter().map(|r| r.summary()).collect()
    }

    fn remove(&self, room: &Arc<Room>) {
        {
            let mut rooms = self.rooms.lock();
            let current = rooms.get(room.key()).is_some_and(|c| Arc::ptr_eq(c, room));
            if !current {
                return;
            }
            rooms.remove(room.key());
        }
        for (user, _) in room.close("room_closed") {
            self.forget(user, room.key());
        }
        info!(room_key = %room.key(), match_id = %room.match_id(), "Room removed");
    }

    fn membership(&self, user: PlayerId, kind: GameKind) -> Option<RoomKey> {
        self.memberships.get(&user)?.get(&kind).cloned()
    }

    fn forget(&self, user: PlayerId, key: &RoomKey) {
        if let Some(mut entry) = self.memberships.get_mut(&user) {
            if entry.get(&key.kind) == Some(key) {
                entry.remove(&key.kind);
            }
        }
        self.memberships.remove_if(&user, |_, m| m.is_empty());
    }
}
