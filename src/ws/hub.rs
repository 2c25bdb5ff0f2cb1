//! Connection hub
//!
//! One outbound broadcast channel per identity. Every socket of that
//! identity subscribes to it; a lagging socket skips the oldest messages
//! instead of slowing anyone else down.

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::trace;

use crate::game::PlayerId;
use crate::room::Outbound;
use crate::ws::protocol::ServerMsg;

/// Per-identity outbound buffer
pub const OUTBOUND_CAPACITY: usize = 256;

struct Connection {
    tx: broadcast::Sender<ServerMsg>,
    sockets: usize,
}

#[derive(Default)]
pub struct Hub {
    conns: DashMap<PlayerId, Connection>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a socket for `user` and subscribe it to their stream
    pub fn connect(&self, user: PlayerId) -> broadcast::Receiver<ServerMsg> {
        let mut conn = self.conns.entry(user).or_insert_with(|| Connection {
            tx: broadcast::channel(OUTBOUND_CAPACITY).0,
            sockets: 0,
        });
        conn.sockets += 1;
        conn.tx.subscribe()
    }

    /// Drop one socket. Returns true when it was the identity's last one.
    pub fn disconnect(&self, user: PlayerId) -> bool {
        if let Some(mut conn) = self.conns.get_mut(&user) {
            conn.sockets = conn.sockets.saturating_sub(1);
        }
        self.conns.remove_if(&user, |_, conn| conn.sockets == 0).is_some()
    }

    pub fn is_online(&self, user: PlayerId) -> bool {
        self.conns.contains_key(&user)
    }

    /// Connected identities
    pub fn online(&self) -> usize {
        self.conns.len()
    }
}

impl Outbound for Hub {
    fn send(&self, to: PlayerId, msg: ServerMsg) {
        if let Some(conn) = self.conns.get(&to) {
            // no receivers only means every socket is mid-teardown
            if conn.tx.send(msg).is_err() {
                trace!(user_id = %to, "Dropped message for closing connection");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_sockets_share_stream() {
        let hub = Hub::new();
        let user = Uuid::new_v4();
        let mut a = hub.connect(user);
        let mut b = hub.connect(user);
        hub.send(user, ServerMsg::Pong { t: 7 });
        assert!(matches!(a.recv().await.unwrap(), ServerMsg::Pong { t: 7 }));
        assert!(matches!(b.recv().await.unwrap(), ServerMsg::Pong { t: 7 }));

        assert!(!hub.disconnect(user));
        assert!(hub.is_online(user));
        assert!(hub.disconnect(user));
        assert!(!hub.is_online(user));
    }

    #[tokio::test]
    async fn test_lagging_socket_skips_oldest() {
        let hub = Hub::new();
        let user = Uuid::new_v4();
        let mut rx = hub.connect(user);
        for t in 0..(OUTBOUND_CAPACITY as u64 + 10) {
            hub.send(user, ServerMsg::Pong { t });
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(10))
        ));
        assert!(matches!(rx.recv().await.unwrap(), ServerMsg::Pong { t: 10 }));
    }
}
