//! Application state shared across routes

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::matchmaking::MatchmakingService;
use crate::room::{scheduler, Outbound, RoomDeps, RoomRegistry};
use crate::store::{HttpResultSink, RatingLedger, ResultSink};
use crate::ws::{ChatModeration, Gateway, Hub};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub hub: Arc<Hub>,
    pub registry: Arc<RoomRegistry>,
    pub matchmaking: Arc<MatchmakingService>,
    pub gateway: Gateway,
    pub sink: Arc<dyn ResultSink>,
    /// In-process ledger, when results are not sent to a remote sink
    pub ledger: Option<Arc<RatingLedger>>,
    shutdown: Arc<watch::Sender<bool>>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        match config.result_sink_url.clone() {
            Some(url) => {
                info!(url = %url, "Match results go to remote sink");
                Self::with_sink(config, Arc::new(HttpResultSink::new(&url)), None)
            }
            None => {
                let ledger = Arc::new(RatingLedger::new());
                Self::with_sink(config, ledger.clone(), Some(ledger))
            }
        }
    }

    pub fn with_sink(config: Config, sink: Arc<dyn ResultSink>, ledger: Option<Arc<RatingLedger>>) -> Self {
        let config = Arc::new(config);
        let hub = Arc::new(Hub::new());
        let outbound: Arc<dyn Outbound> = hub.clone();

        let registry = Arc::new(RoomRegistry::new(
            RoomDeps {
                outbound: outbound.clone(),
                sink: sink.clone(),
                settings: config.game.clone(),
            },
            config.room_idle,
            config.room_end_grace,
        ));

        let matchmaking = Arc::new(MatchmakingService::new(
            registry.clone(),
            outbound.clone(),
            config.game.queue_rules(),
        ));

        let gateway = Gateway::new(registry.clone(), matchmaking.clone(), outbound, None);

        Self {
            config,
            hub,
            registry,
            matchmaking,
            gateway,
            sink,
            ledger,
            shutdown: Arc::new(watch::channel(false).0),
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Install a chat moderation hook
    pub fn with_moderation(mut self, hook: Arc<dyn ChatModeration>) -> Self {
        self.gateway = Gateway::new(
            self.registry.clone(),
            self.matchmaking.clone(),
            self.hub.clone(),
            Some(hook),
        );
        self
    }

    /// Spawn the room scheduler and the queue status ticker
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        tasks.push(scheduler::spawn(
            self.registry.clone(),
            self.config.tick_interval(),
            self.shutdown.subscribe(),
        ));
        tasks.push(tokio::spawn(
            self.matchmaking
                .clone()
                .run(self.config.queue_status_interval, self.shutdown.subscribe()),
        ));
    }

    /// Stop background tasks, end every room and empty every queue
    pub async fn drain(&self) {
        self.shutdown.send_replace(true);
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        self.registry.drain("server_shutdown");
        self.matchmaking.clear();
        info!("Core drained");
    }
}
