//! Matchmaking service - manages queues and match creation
//!
//! Each (kind, mode) queue has its own lock, independent of any room. A
//! per-identity index enforces one queue per kind.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::queue::{MatchQueue, QueueEntry};
use crate::config::QueueRules;
use crate::error::{CoreError, CoreResult};
use crate::game::{GameKind, PlayerId, RoomParams};
use crate::room::{Outbound, RoomKey, RoomRegistry};
use crate::util::ids::random_room_id;
use crate::ws::protocol::{QueueSummary, ServerMsg};

type QueueKey = (GameKind, String);

/// Matchmaking service
pub struct MatchmakingService {
    queues: DashMap<QueueKey, Arc<Mutex<MatchQueue>>>,
    /// identity -> mode it is queued for, per kind
    queued: DashMap<PlayerId, BTreeMap<GameKind, String>>,
    registry: Arc<RoomRegistry>,
    outbound: Arc<dyn Outbound>,
    rules: QueueRules,
}

impl MatchmakingService {
    pub fn new(registry: Arc<RoomRegistry>, outbound: Arc<dyn Outbound>, rules: QueueRules) -> Self {
        Self {
            queues: DashMap::new(),
            queued: DashMap::new(),
            registry,
            outbound,
            rules,
        }
    }

    fn queue(&self, kind: GameKind, mode: &str) -> Arc<Mutex<MatchQueue>> {
        let needed = self.rules.players_needed(kind, mode).unwrap_or(2);
        self.queues
            .entry((kind, mode.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(MatchQueue::new(kind, mode, needed))))
            .clone()
    }

    /// Join the queue for (kind, mode). Returns the normalised mode.
    pub fn join(&self, user: PlayerId, name: &str, kind: GameKind, mode: &str) -> CoreResult<String> {
        let mode = self
            .rules
            .normalize_mode(kind, mode)
            .ok_or(CoreError::Validation("unknown_mode"))?;
        if kind == GameKind::Arena && mode == "boss" && !self.rules.boss_enabled() {
            return Err(CoreError::Conflict("boss_disabled"));
        }

        {
            let mut index = self.queued.entry(user).or_default();
            if index.contains_key(&kind) {
                return Err(CoreError::Conflict("already_queued"));
            }
            index.insert(kind, mode.clone());
        }

        let queue = self.queue(kind, &mode);
        let formed = {
            let mut q = queue.lock();
            let enqueued = q.enqueue(QueueEntry::new(user, name));
            if let Err(e) = enqueued {
                drop(q);
                self.unindex(user, kind);
                return Err(e);
            }
            info!(user_id = %user, kind = %kind, mode = %mode, queue_size = q.len(), "Joined matchmaking queue");
            q.try_form_match()
        };

        if let Some(entries) = formed {
            for entry in &entries {
                self.unindex(entry.user_id, kind);
            }
            self.create_match(kind, &mode, entries);
        }
        self.publish_status(&queue);
        Ok(mode)
    }

    /// Leave queues. `None` widens the filter: no kind leaves every queue,
    /// no mode leaves the kind's queue whatever its mode. Idempotent.
    pub fn leave(&self, user: PlayerId, kind: Option<GameKind>, mode: Option<&str>) {
        let targets: Vec<QueueKey> = self
            .queued
            .get(&user)
            .map(|index| {
                index
                    .iter()
                    .filter(|(k, _)| kind.map_or(true, |want| want == **k))
                    .filter(|(k, m)| {
                        mode.map_or(true, |want| {
                            self.rules.normalize_mode(**k, want).as_deref() == Some(m.as_str())
                        })
                    })
                    .map(|(k, m)| (*k, m.clone()))
                    .collect()
            })
            .unwrap_or_default();

        for (kind, mode) in targets {
            self.unindex(user, kind);
            let Some(queue) = self.queues.get(&(kind, mode.clone())).map(|q| q.clone()) else {
                continue;
            };
            let removed = queue.lock().dequeue(user).is_some();
            if !removed {
                continue;
            }
            debug!(user_id = %user, kind = %kind, mode = %mode, "Left matchmaking queue");
            self.outbound.send(
                user,
                ServerMsg::QueueStatus {
                    kind,
                    mode: mode.clone(),
                    position: None,
                    size: 0,
                    active: false,
                },
            );
            self.publish_status(&queue);
        }
    }

    /// Remove `user` from every queue (disconnect)
    pub fn leave_all(&self, user: PlayerId) {
        self.leave(user, None, None);
    }

    pub fn is_queued(&self, user: PlayerId, kind: GameKind) -> bool {
        self.queued.get(&user).is_some_and(|index| index.contains_key(&kind))
    }

    pub fn queue_size(&self, kind: GameKind, mode: &str) -> usize {
        self.queues
            .get(&(kind, mode.to_string()))
            .map(|q| q.lock().len())
            .unwrap_or(0)
    }

    pub fn total_queued(&self) -> usize {
        self.all_queues().iter().map(|q| q.lock().len()).sum()
    }

    /// Public listing of every known queue
    pub fn summaries(&self) -> Vec<QueueSummary> {
        let mut out: Vec<QueueSummary> = self
            .all_queues()
            .iter()
            .map(|q| {
                let q = q.lock();
                QueueSummary {
                    kind: q.kind(),
                    mode: q.mode().to_string(),
                    size: q.len(),
                }
            })
            .collect();
        out.sort_by(|a, b| (a.kind, &a.mode).cmp(&(b.kind, &b.mode)));
        out
    }

    /// Send position updates to everyone still waiting
    pub fn broadcast_status(&self) {
        for queue in self.all_queues() {
            self.publish_status(&queue);
        }
    }

    /// Empty every queue, used on shutdown
    pub fn clear(&self) {
        for queue in self.all_queues() {
            let (kind, mode, entries) = {
                let mut q = queue.lock();
                (q.kind(), q.mode().to_string(), q.clear())
            };
            for entry in entries {
                self.unindex(entry.user_id, kind);
                self.outbound.send(
                    entry.user_id,
                    ServerMsg::QueueStatus {
                        kind,
                        mode: mode.clone(),
                        position: None,
                        size: 0,
                        active: false,
                    },
                );
            }
        }
    }

    /// Periodic queue status broadcast
    pub async fn run(self: Arc<Self>, every: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.broadcast_status(),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("Queue status ticker stopped");
    }

    fn all_queues(&self) -> Vec<Arc<Mutex<MatchQueue>>> {
        self.queues.iter().map(|e| e.value().clone()).collect()
    }

    fn unindex(&self, user: PlayerId, kind: GameKind) {
        if let Some(mut index) = self.queued.get_mut(&user) {
            index.remove(&kind);
        }
        self.queued.remove_if(&user, |_, index| index.is_empty());
    }

    fn publish_status(&self, queue: &Mutex<MatchQueue>) {
        let (kind, mode, ids) = {
            let q = queue.lock();
            (q.kind(), q.mode().to_string(), q.ids())
        };
        let size = ids.len();
        for (i, user) in ids.into_iter().enumerate() {
            self.outbound.send(
                user,
                ServerMsg::QueueStatus {
                    kind,
                    mode: mode.clone(),
                    position: Some(i + 1),
                    size,
                    active: true,
                },
            );
        }
    }

    /// Put matched entries into a fresh room
    fn create_match(&self, kind: GameKind, mode: &str, entries: Vec<QueueEntry>) {
        let key = RoomKey::new(kind, random_room_id());
        let params = RoomParams {
            mode_name: Some(mode.to_string()),
            match_seconds: None,
        };
        let players: Vec<PlayerId> = entries.iter().map(|e| e.user_id).collect();
        info!(room_key = %key, mode, players = players.len(), "Match found");

        for entry in &entries {
            if let Some(room) = self.registry.room_of(entry.user_id, kind) {
                self.registry.leave(room.key(), entry.user_id, "matched");
            }
            self.outbound.send(
                entry.user_id,
                ServerMsg::MatchFound {
                    kind,
                    mode: mode.to_string(),
                    room_id: key.room_id.clone(),
                    room_key: key.to_string(),
                    players: players.clone(),
                },
            );
        }
        for entry in entries {
            if let Err(e) = self.registry.join(&key, &params, entry.user_id, &entry.display_name) {
                warn!(room_key = %key, user_id = %entry.user_id, error = %e, "Matched player could not join room");
            }
        }
    }
}
