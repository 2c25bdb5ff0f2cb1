//! HTTP result sink
//!
//! Posts finished matches to an external collector. Delivery happens on a
//! spawned task so rooms never wait on the network.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use reqwest::Client;
use tracing::{debug, error};
use uuid::Uuid;

use super::sink::{MatchResult, ResultSink, SinkError};

#[derive(Clone)]
pub struct HttpResultSink {
    client: Client,
    url: String,
    /// Match ids already handed to a delivery task
    sent: Arc<Mutex<HashSet<Uuid>>>,
}

impl HttpResultSink {
    pub fn new(url: &str) -> Self {
        Self {
            client: Client::new(),
            url: url.trim_end_matches('/').to_string(),
            sent: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// POST one result. The match id doubles as the idempotency key.
    pub async fn deliver(&self, result: &MatchResult) -> Result<(), SinkError> {
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Idempotency-Key", result.match_id.to_string())
            .json(result)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

impl ResultSink for HttpResultSink {
    fn submit(&self, result: MatchResult) {
        if !self.sent.lock().insert(result.match_id) {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!(match_id = %result.match_id, "No runtime available for result delivery");
            return;
        };
        let sink = self.clone();
        runtime.spawn(async move {
            match sink.deliver(&result).await {
                Ok(()) => debug!(match_id = %result.match_id, "Match result delivered"),
                Err(e) => error!(match_id = %result.match_id, error = %e, "Match result delivery failed"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{GameKind, Outcome, Standing};

    fn result() -> MatchResult {
        MatchResult {
            match_id: Uuid::new_v4(),
            room_key: "pong:p".into(),
            kind: GameKind::Pong,
            mode: "1v1".into(),
            reason: "score".into(),
            standings: vec![Standing::new(Uuid::new_v4(), Outcome::Win)],
            finished_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_submit_dedupes_by_match_id() {
        // nothing listens on the discard port; delivery fails and is only logged
        let sink = HttpResultSink::new("http://127.0.0.1:9/results/");
        assert_eq!(sink.url, "http://127.0.0.1:9/results");
        let result = result();
        tokio_test::block_on(async {
            sink.submit(result.clone());
            sink.submit(result.clone());
        });
        assert_eq!(sink.sent.lock().len(), 1);
    }

    #[test]
    fn test_submit_without_runtime_is_dropped() {
        let sink = HttpResultSink::new("http://127.0.0.1:9/results");
        sink.submit(result());
        assert_eq!(sink.sent.lock().len(), 1);
    }
}
