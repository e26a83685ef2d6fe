use std::collections::HashMap;
use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};
use tracing::trace;
use uuid::Uuid;

use courier_messaging::DeliverySink;
use courier_types::events::GatewayEvent;

type ConnectionMap = HashMap<Uuid, mpsc::UnboundedSender<GatewayEvent>>;

/// Registry of live connections, keyed by user. Each user id is that user's
/// channel; every open connection of the user receives the channel's events.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    /// user_id -> (conn_id -> sender)
    channels: RwLock<HashMap<Uuid, ConnectionMap>>,
}

/// A connection's membership in its user's channel.
pub struct Subscription {
    pub conn_id: Uuid,
    /// Direct line to this connection only (used for acks).
    pub tx: mpsc::UnboundedSender<GatewayEvent>,
    pub rx: mpsc::UnboundedReceiver<GatewayEvent>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a new connection to `user_id`'s channel.
    pub async fn register(&self, user_id: Uuid) -> Subscription {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .channels
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(conn_id, tx.clone());
        Subscription { conn_id, tx, rx }
    }

    /// Remove one connection. Other connections of the same user stay subscribed.
    pub async fn unregister(&self, user_id: Uuid, conn_id: Uuid) {
        let mut channels = self.inner.channels.write().await;
        if let Some(conns) = channels.get_mut(&user_id) {
            conns.remove(&conn_id);
            if conns.is_empty() {
                channels.remove(&user_id);
            }
        }
    }

    /// Send an event to every connection of `user_id`. Returns how many accepted it.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) -> usize {
        let channels = self.inner.channels.read().await;
        let Some(conns) = channels.get(&user_id) else {
            return 0;
        };
        conns
            .values()
            .filter(|tx| tx.send(event.clone()).is_ok())
            .count()
    }

    pub async fn connection_count(&self, user_id: Uuid) -> usize {
        self.inner
            .channels
            .read()
            .await
            .get(&user_id)
            .map_or(0, HashMap::len)
    }
}

#[async_trait]
impl DeliverySink for Dispatcher {
    async fn deliver(&self, user_id: Uuid, event: GatewayEvent) -> anyhow::Result<()> {
        let reached = self.send_to_user(user_id, event).await;
        if reached == 0 {
            bail!("user {} has no live connection", user_id);
        }
        trace!("delivered event to {} connection(s) of {}", reached, user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready(user_id: Uuid) -> GatewayEvent {
        GatewayEvent::Ready { user_id }
    }

    #[tokio::test]
    async fn fans_out_to_every_connection_of_a_user() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let mut first = dispatcher.register(user).await;
        let mut second = dispatcher.register(user).await;

        assert_eq!(dispatcher.send_to_user(user, ready(user)).await, 2);
        assert!(matches!(first.rx.recv().await, Some(GatewayEvent::Ready { .. })));
        assert!(matches!(second.rx.recv().await, Some(GatewayEvent::Ready { .. })));
    }

    #[tokio::test]
    async fn unregister_removes_only_that_connection() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let first = dispatcher.register(user).await;
        let second = dispatcher.register(user).await;

        dispatcher.unregister(user, first.conn_id).await;
        assert_eq!(dispatcher.connection_count(user).await, 1);

        dispatcher.unregister(user, second.conn_id).await;
        assert_eq!(dispatcher.connection_count(user).await, 0);
    }

    #[tokio::test]
    async fn deliver_to_offline_user_is_an_error() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        assert!(dispatcher.deliver(user, ready(user)).await.is_err());

        let mut sub = dispatcher.register(user).await;
        assert!(dispatcher.deliver(user, ready(user)).await.is_ok());
        assert!(sub.rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn closed_receivers_are_not_counted() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let Subscription { rx, .. } = dispatcher.register(user).await;
        drop(rx);
        assert_eq!(dispatcher.send_to_user(user, ready(user)).await, 0);
    }

    #[tokio::test]
    async fn concurrent_register_and_unregister() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let d = dispatcher.clone();
                tokio::spawn(async move {
                    let sub = d.register(user).await;
                    d.unregister(user, sub.conn_id).await;
                })
            })
            .collect();
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(dispatcher.connection_count(user).await, 0);
    }
}
