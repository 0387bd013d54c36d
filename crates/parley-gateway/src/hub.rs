use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_types::events::PushEvent;
use parley_types::models::UserId;

/// Outcome of a targeted send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Payload is in the connection's outbound buffer.
    Queued,
    /// User has no live connection; nothing happened.
    Offline,
    /// Buffer was full or the connection already gone, so it was dropped.
    Evicted,
}

/// Registry of live push channels, at most one per user. Cloning shares the
/// same registry.
#[derive(Clone)]
pub struct NotificationHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    /// user_id -> (conn_id, outbound sender)
    sessions: RwLock<HashMap<UserId, (Uuid, mpsc::Sender<String>)>>,
    buffer: usize,
}

impl NotificationHub {
    /// `buffer` is the per-connection outbound capacity, at least 1.
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                sessions: RwLock::new(HashMap::new()),
                buffer: buffer.max(1),
            }),
        }
    }

    /// Register a connection for `user_id`, replacing any previous one.
    /// The replaced connection sees its receiver end, which closes it.
    pub async fn register(&self, user_id: UserId) -> (Uuid, mpsc::Receiver<String>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.inner.buffer);
        let previous = self.inner.sessions.write().await.insert(user_id, (conn_id, tx));
        if let Some((old_conn, _)) = previous {
            info!("User {} reconnected, evicting connection {}", user_id, old_conn);
        }
        (conn_id, rx)
    }

    /// Remove the user's connection, but only if `conn_id` still owns it.
    pub async fn unregister(&self, user_id: UserId, conn_id: Uuid) {
        let mut sessions = self.inner.sessions.write().await;
        if let Some((current, _)) = sessions.get(&user_id) {
            if *current == conn_id {
                sessions.remove(&user_id);
            }
        }
    }

    /// Enqueue a payload without waiting. A saturated connection is evicted
    /// instead of buffering further.
    pub async fn send_to_user(&self, user_id: UserId, payload: String) -> Delivery {
        let mut sessions = self.inner.sessions.write().await;
        let Some((conn_id, tx)) = sessions.get(&user_id) else {
            return Delivery::Offline;
        };

        match tx.try_send(payload) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => {
                warn!("Push buffer full for user {} ({}), evicting", user_id, conn_id);
                sessions.remove(&user_id);
                Delivery::Evicted
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Push channel for user {} ({}) already closed", user_id, conn_id);
                sessions.remove(&user_id);
                Delivery::Evicted
            }
        }
    }

    /// Best-effort push of an event. Failures are logged and dropped.
    pub async fn notify(&self, user_id: UserId, event: &PushEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode push event for user {}: {}", user_id, e);
                return;
            }
        };

        if self.send_to_user(user_id, payload).await == Delivery::Evicted {
            warn!("Dropped push to user {}", user_id);
        }
    }

    pub async fn is_online(&self, user_id: UserId) -> bool {
        self.inner.sessions.read().await.contains_key(&user_id)
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    /// Close every live connection.
    pub async fn shutdown(&self) {
        let drained: Vec<_> = self.inner.sessions.write().await.drain().collect();
        info!("Notification hub closing {} connections", drained.len());
    }
}
