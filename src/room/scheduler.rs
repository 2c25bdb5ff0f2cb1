//! Shared tick scheduler
//!
//! One task wakes at the configured rate and steps every room. Rooms are
//! stepped one after another but each under its own lock, and a busy room
//! is skipped rather than waited on.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

use super::RoomRegistry;

pub fn spawn(registry: Arc<RoomRegistry>, tick: Duration, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(run(registry, tick, shutdown))
}

pub async fn run(registry: Arc<RoomRegistry>, tick: Duration, mut shutdown: watch::Receiver<bool>) {
    info!(tick_ms = tick.as_millis() as u64, "Room scheduler started");
    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => registry.tick(Instant::now()),
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("Room scheduler stopped");
}
