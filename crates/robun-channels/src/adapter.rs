use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use robun_core::{InboundEvent, MessageBus, OutboundEvent, OutboundSubscriber, Result};

/// Trait implemented by each channel adapter.
///
/// `start` begins ingestion and must eventually publish an inbound event
/// for every accepted user message; `send` is the handler registered with
/// the bus for this channel's outbound events.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Channel name — the `channel` field on events, e.g. "telegram".
    fn name(&self) -> &str;

    /// Begin ingestion.
    async fn start(&self) -> Result<()>;

    /// Graceful shutdown.
    async fn stop(&self) -> Result<()>;

    /// Render and deliver one outbound event.
    async fn send(&self, event: OutboundEvent) -> Result<()>;
}

/// Bridge so any adapter can be registered directly as a bus subscriber.
pub struct AdapterSubscriber(pub Arc<dyn ChannelAdapter>);

#[async_trait]
impl OutboundSubscriber for AdapterSubscriber {
    async fn deliver(&self, event: OutboundEvent) -> Result<()> {
        self.0.send(event).await
    }
}

/// An in-process adapter that records everything it is asked to send and
/// can inject inbound events on demand. Used by runtime tests and as the
/// reference adapter implementation.
pub struct LoopbackChannel {
    name: String,
    bus: Arc<MessageBus>,
    pub sent: Mutex<Vec<OutboundEvent>>,
}

impl LoopbackChannel {
    pub fn new(name: impl Into<String>, bus: Arc<MessageBus>) -> Self {
        Self {
            name: name.into(),
            bus,
            sent: Mutex::new(vec![]),
        }
    }

    /// Inject a user message as if it arrived on the wire.
    pub fn inject(&self, sender_id: &str, chat_id: &str, content: &str) {
        self.bus
            .publish_inbound(InboundEvent::new(&self.name, sender_id, chat_id, content));
    }
}

#[async_trait]
impl ChannelAdapter for LoopbackChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    async fn send(&self, event: OutboundEvent) -> Result<()> {
        debug!(channel = %self.name, chat = %event.chat_id, "loopback send");
        self.sent.lock().await.push(event);
        Ok(())
    }
}
