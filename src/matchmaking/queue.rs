//! Matchmaking queue implementation

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::error::{CoreError, CoreResult};
use crate::game::{GameKind, PlayerId};

/// Identity waiting in a queue
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub user_id: PlayerId,
    pub display_name: String,
    pub queued_at: Instant,
}

impl QueueEntry {
    pub fn new(user_id: PlayerId, display_name: &str) -> Self {
        Self {
            user_id,
            display_name: display_name.to_string(),
            queued_at: Instant::now(),
        }
    }

    /// How long this entry has been waiting
    pub fn wait_time(&self) -> Duration {
        self.queued_at.elapsed()
    }
}

/// Strict FIFO queue for one (kind, mode)
#[derive(Debug)]
pub struct MatchQueue {
    kind: GameKind,
    mode: String,
    entries: VecDeque<QueueEntry>,
    /// Entries popped per match
    needed: usize,
}

impl MatchQueue {
    pub fn new(kind: GameKind, mode: &str, needed: usize) -> Self {
        Self {
            kind,
            mode: mode.to_string(),
            entries: VecDeque::new(),
            needed: needed.max(1),
        }
    }

    pub fn kind(&self) -> GameKind {
        self.kind
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub fn needed(&self) -> usize {
        self.needed
    }

    /// Add an entry at the back
    pub fn enqueue(&mut self, entry: QueueEntry) -> CoreResult<()> {
        if self.contains(&entry.user_id) {
            return Err(CoreError::Conflict("already_queued"));
        }
        self.entries.push_back(entry);
        Ok(())
    }

    /// Remove an entry wherever it is
    pub fn dequeue(&mut self, user_id: PlayerId) -> Option<QueueEntry> {
        let pos = self.entries.iter().position(|e| e.user_id == user_id)?;
        self.entries.remove(pos)
    }

    pub fn contains(&self, user_id: &PlayerId) -> bool {
        self.entries.iter().any(|e| &e.user_id == user_id)
    }

    /// 1-based position
    pub fn position(&self, user_id: &PlayerId) -> Option<usize> {
        self.entries.iter().position(|e| &e.user_id == user_id).map(|p| p + 1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Waiting identities, front first
    pub fn ids(&self) -> Vec<PlayerId> {
        self.entries.iter().map(|e| e.user_id).collect()
    }

    /// Pop exactly `needed` entries from the front once enough are waiting
    pub fn try_form_match(&mut self) -> Option<Vec<QueueEntry>> {
        if self.entries.len() < self.needed {
            return None;
        }
        Some(self.entries.drain(..self.needed).collect())
    }

    /// Empty the queue, returning everyone who was waiting
    pub fn clear(&mut self) -> Vec<QueueEntry> {
        self.entries.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_fifo_pops_exactly_needed() {
        let mut queue = MatchQueue::new(GameKind::Arena, "ffa", 3);
        let ids: Vec<PlayerId> = (0..4).map(|_| Uuid::new_v4()).collect();
        for (i, id) in ids.iter().enumerate() {
            queue.enqueue(QueueEntry::new(*id, "p")).unwrap();
            if i < 2 {
                assert!(queue.try_form_match().is_none());
            }
        }
        let matched = queue.try_form_match().unwrap();
        assert_eq!(matched.iter().map(|e| e.user_id).collect::<Vec<_>>(), ids[..3]);
        assert_eq!(queue.ids(), vec![ids[3]]);
        assert_eq!(queue.position(&ids[3]), Some(1));
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut queue = MatchQueue::new(GameKind::Chess, "1v1", 2);
        let id = Uuid::new_v4();
        queue.enqueue(QueueEntry::new(id, "a")).unwrap();
        assert_eq!(
            queue.enqueue(QueueEntry::new(id, "a")),
            Err(CoreError::Conflict("already_queued"))
        );
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_dequeue_idempotent() {
        let mut queue = MatchQueue::new(GameKind::Pong, "1v1", 2);
        let id = Uuid::new_v4();
        queue.enqueue(QueueEntry::new(id, "a")).unwrap();
        assert!(queue.dequeue(id).is_some());
        assert!(queue.dequeue(id).is_none());
        assert!(queue.is_empty());
    }
}
