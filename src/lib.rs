//! LAN arena server core
//!
//! Authoritative real-time rooms for five LAN mini-games:
//! - Matchmaking queues and a room registry with one tick scheduler
//! - Arena, chess, pong, reaction and typing engines
//! - A JSON WebSocket gateway
//! - Match results fed to a rating ledger or a remote sink

pub mod app;
pub mod config;
pub mod error;
pub mod game;
pub mod http;
pub mod matchmaking;
pub mod room;
pub mod store;
pub mod util;
pub mod ws;

pub use app::AppState;
pub use config::Config;
pub use error::{CoreError, CoreResult};
