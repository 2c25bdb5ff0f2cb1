//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::game::GameKind;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// `json` switches the subscriber to JSON lines
    pub log_format: String,

    /// HS256 secret for identity token verification
    pub auth_jwt_secret: String,
    /// Allowed client origins for CORS (comma separated in the environment)
    pub client_origins: Vec<String>,

    /// Scheduler frequency
    pub tick_rate_hz: u32,
    /// Interval between queue position updates
    pub queue_status_interval: Duration,
    /// How long a room may sit without players before it is reclaimed
    pub room_idle: Duration,
    /// How long an ended room stays visible to spectators
    pub room_end_grace: Duration,

    /// Inbound messages per second per connection
    pub input_rate_limit: u32,
    /// Remote result sink. `None` keeps results in the in-process ledger
    pub result_sink_url: Option<String>,

    pub game: GameSettings,
}

/// Tunables handed to engines when rooms are created
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameSettings {
    pub arena_max_players: usize,
    pub arena_ffa_queue_size: usize,
    pub arena_match_seconds: u32,
    pub chess_clock_secs: u64,
    pub chess_repetition_limit: u32,
    pub boss_enabled: bool,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            arena_max_players: 6,
            arena_ffa_queue_size: 4,
            arena_match_seconds: 90,
            chess_clock_secs: 300,
            chess_repetition_limit: 3,
            boss_enabled: true,
        }
    }
}

impl GameSettings {
    /// Clamp values into the ranges the engines support
    pub fn normalized(mut self) -> Self {
        self.arena_max_players = self.arena_max_players.clamp(2, 12);
        self.arena_ffa_queue_size = self.arena_ffa_queue_size.clamp(3, self.arena_max_players.max(3));
        self.arena_match_seconds = self.arena_match_seconds.clamp(60, 120);
        self.chess_clock_secs = self.chess_clock_secs.max(1);
        self.chess_repetition_limit = self.chess_repetition_limit.max(2);
        self
    }

    pub fn queue_rules(&self) -> QueueRules {
        QueueRules {
            arena_ffa: self.arena_ffa_queue_size,
            boss_enabled: self.boss_enabled,
        }
    }
}

/// Players needed to form a match per (kind, mode)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueRules {
    arena_ffa: usize,
    boss_enabled: bool,
}

impl QueueRules {
    /// Lower-case and default the requested mode. Unknown modes yield `None`.
    pub fn normalize_mode(&self, kind: GameKind, mode: &str) -> Option<String> {
        let mode = mode.trim().to_ascii_lowercase();
        let mode = if mode.is_empty() || mode == "default" {
            match kind {
                GameKind::Arena => "duel".to_string(),
                _ => "1v1".to_string(),
            }
        } else {
            mode
        };
        self.players_needed(kind, &mode).map(|_| mode)
    }

    pub fn players_needed(&self, kind: GameKind, mode: &str) -> Option<usize> {
        match (kind, mode) {
            (GameKind::Arena, "duel") => Some(2),
            (GameKind::Arena, "teams") => Some(4),
            (GameKind::Arena, "ffa") => Some(self.arena_ffa),
            (GameKind::Arena, "boss") => Some(2),
            (GameKind::Arena, _) => None,
            (_, "1v1") => Some(2),
            _ => None,
        }
    }

    pub fn boss_enabled(&self) -> bool {
        self.boss_enabled
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // PORT wins over SERVER_ADDR when both are present
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let game = GameSettings {
            arena_max_players: parse_or("ARENA_MAX_PLAYERS", 6)?,
            arena_ffa_queue_size: parse_or("ARENA_FFA_QUEUE_SIZE", 4)?,
            arena_match_seconds: parse_or("ARENA_MATCH_SECONDS", 90)?,
            chess_clock_secs: parse_or("CHESS_CLOCK_SECS", 300)?,
            chess_repetition_limit: parse_or("CHESS_REPETITION_LIMIT", 3)?,
            boss_enabled: parse_bool_or("BOSS_ENABLED", true)?,
        }
        .normalized();

        let tick_rate_hz: u32 = parse_or("TICK_RATE_HZ", 30)?;

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),

            auth_jwt_secret: env::var("AUTH_JWT_SECRET")
                .map_err(|_| ConfigError::Missing("AUTH_JWT_SECRET"))?,
            client_origins: env::var("CLIENT_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:8080".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),

            tick_rate_hz: tick_rate_hz.clamp(1, 120),
            queue_status_interval: Duration::from_millis(parse_or("QUEUE_STATUS_INTERVAL_MS", 2000)?),
            room_idle: Duration::from_secs(parse_or("ROOM_IDLE_SECS", 60)?),
            room_end_grace: Duration::from_secs(parse_or("ROOM_END_GRACE_SECS", 15)?),

            input_rate_limit: parse_or::<u32>("INPUT_RATE_LIMIT", 60)?.max(1),
            result_sink_url: env::var("RESULT_SINK_URL").ok().filter(|s| !s.trim().is_empty()),

            game,
        })
    }

    /// Configuration with defaults, for tests and embedding
    pub fn with_secret(secret: &str) -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            auth_jwt_secret: secret.to_string(),
            client_origins: vec!["http://localhost:8080".to_string()],
            tick_rate_hz: 30,
            queue_status_interval: Duration::from_millis(2000),
            room_idle: Duration::from_secs(60),
            room_end_grace: Duration::from_secs(15),
            input_rate_limit: 60,
            result_sink_url: None,
            game: GameSettings::default(),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate_hz.max(1)))
    }
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        _ => Ok(default),
    }
}

fn parse_bool_or(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "" => Ok(default),
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid(key)),
        },
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
