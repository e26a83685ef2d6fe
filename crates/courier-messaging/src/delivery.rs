use async_trait::async_trait;
use courier_types::events::GatewayEvent;
use uuid::Uuid;

/// Live push of message events to a user's channel.
///
/// Delivery is best-effort: an error means the event was dropped (for example
/// the user has no open connection). Callers log it and move on.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, user_id: Uuid, event: GatewayEvent) -> anyhow::Result<()>;
}

/// Sink that accepts and discards every event. Used when no live transport is wired.
pub struct NullSink;

#[async_trait]
impl DeliverySink for NullSink {
    async fn deliver(&self, _user_id: Uuid, _event: GatewayEvent) -> anyhow::Result<()> {
        Ok(())
    }
}
