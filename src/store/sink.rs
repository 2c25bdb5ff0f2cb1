//! Match result hand-off

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::{GameKind, Standing};

/// Terminal output of one room, published at most once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub match_id: Uuid,
    pub room_key: String,
    pub kind: GameKind,
    pub mode: String,
    pub reason: String,
    pub standings: Vec<Standing>,
    pub finished_at: DateTime<Utc>,
}

/// Destination for finished matches.
///
/// `submit` is called from inside a room's critical section, so
/// implementations must return promptly and push any I/O onto a task.
/// Submissions are idempotent by `match_id`.
pub trait ResultSink: Send + Sync {
    fn submit(&self, result: MatchResult);
}

/// Result delivery errors. Logged by the sink, never surfaced to rooms.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("sink rejected result (status {status}): {body}")]
    Api { status: u16, body: String },
}
