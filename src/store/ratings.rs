//! In-process rating ledger
//!
//! Keeps per-player stats and the cortisol rating. Lower cortisol is better:
//! a win lowers it by `25 + 5 * streak`, a loss raises it by 20, a draw
//! leaves it alone.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::sink::{MatchResult, ResultSink};
use crate::game::Outcome;

pub const START_CORTISOL: i32 = 1000;
pub const MIN_CORTISOL: i32 = 0;
pub const MAX_CORTISOL: i32 = 5000;
const WIN_BASE: i32 = 25;
const WIN_STREAK_BONUS: i32 = 5;
const LOSS_PENALTY: i32 = 20;

/// Aggregate stats for one player
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerStats {
    pub user_id: Uuid,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub kos: u32,
    pub deaths: u32,
    pub streak: u32,
    pub cortisol: i32,
}

impl PlayerStats {
    fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            wins: 0,
            losses: 0,
            draws: 0,
            kos: 0,
            deaths: 0,
            streak: 0,
            cortisol: START_CORTISOL,
        }
    }

    /// Apply one match outcome
    pub fn record(&mut self, outcome: Outcome, kos: u32, deaths: u32) {
        self.kos += kos;
        self.deaths += deaths;
        match outcome {
            Outcome::Win => {
                let delta = WIN_BASE + WIN_STREAK_BONUS * self.streak as i32;
                self.cortisol = (self.cortisol - delta).clamp(MIN_CORTISOL, MAX_CORTISOL);
                self.streak += 1;
                self.wins += 1;
            }
            Outcome::Loss => {
                self.cortisol = (self.cortisol + LOSS_PENALTY).clamp(MIN_CORTISOL, MAX_CORTISOL);
                self.streak = 0;
                self.losses += 1;
            }
            Outcome::Draw => self.draws += 1,
        }
    }

    pub fn tier(&self) -> &'static str {
        tier(self.cortisol)
    }
}

/// Display tier for a cortisol value
pub fn tier(cortisol: i32) -> &'static str {
    match cortisol {
        c if c <= 300 => "Zen",
        c if c <= 700 => "Calm",
        c if c <= 1200 => "Stable",
        _ => "Cooked",
    }
}

#[derive(Default)]
struct LedgerInner {
    stats: HashMap<Uuid, PlayerStats>,
    seen: HashSet<Uuid>,
    history: Vec<MatchResult>,
}

/// Default result sink. Applies results synchronously.
#[derive(Default)]
pub struct RatingLedger {
    inner: Mutex<LedgerInner>,
}

impl RatingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self, user_id: Uuid) -> Option<PlayerStats> {
        self.inner.lock().stats.get(&user_id).cloned()
    }

    /// Players ordered by cortisol, best first
    pub fn leaderboard(&self, limit: usize) -> Vec<PlayerStats> {
        let inner = self.inner.lock();
        let mut rows: Vec<PlayerStats> = inner.stats.values().cloned().collect();
        rows.sort_by(|a, b| a.cortisol.cmp(&b.cortisol).then(b.wins.cmp(&a.wins)));
        rows.truncate(limit);
        rows
    }

    /// Number of distinct matches applied
    pub fn matches_recorded(&self) -> usize {
        self.inner.lock().history.len()
    }
}

impl ResultSink for RatingLedger {
    fn submit(&self, result: MatchResult) {
        let mut inner = self.inner.lock();
        if !inner.seen.insert(result.match_id) {
            return;
        }
        for standing in &result.standings {
            inner
                .stats
                .entry(standing.user_id)
                .or_insert_with(|| PlayerStats::new(standing.user_id))
                .record(standing.outcome, standing.kos, standing.deaths);
        }
        info!(
            match_id = %result.match_id,
            room_key = %result.room_key,
            reason = %result.reason,
            players = result.standings.len(),
            "Match result recorded"
        );
        inner.history.push(result);
    }
}
