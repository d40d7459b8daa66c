use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex as TokioMutex, Notify, RwLock, mpsc};
use tracing::{debug, warn};

use crate::error::{Result, RobunError};
use crate::event::{InboundEvent, OutboundEvent};

/// Handler registered for one channel's outbound events. Channel adapters
/// implement this; `deliver` renders and sends the event on the wire.
#[async_trait]
pub trait OutboundSubscriber: Send + Sync {
    async fn deliver(&self, event: OutboundEvent) -> Result<()>;
}

/// In-process broker between channel adapters and the agent loop.
///
/// Two queues: a multi-producer / single-consumer inbound queue (the agent
/// loop is the one logical consumer) and an outbound queue drained by a
/// single dispatcher that fans events out to per-channel subscribers.
/// Delivery is at-least-once within a process lifetime, FIFO per queue.
pub struct MessageBus {
    inbound_tx: mpsc::UnboundedSender<InboundEvent>,
    inbound_rx: TokioMutex<mpsc::UnboundedReceiver<InboundEvent>>,
    outbound_tx: mpsc::UnboundedSender<OutboundEvent>,
    outbound_rx: TokioMutex<mpsc::UnboundedReceiver<OutboundEvent>>,
    subscribers: RwLock<HashMap<String, Vec<Arc<dyn OutboundSubscriber>>>>,
    stopped: AtomicBool,
    stop_notify: Notify,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Self {
            inbound_tx,
            inbound_rx: TokioMutex::new(inbound_rx),
            outbound_tx,
            outbound_rx: TokioMutex::new(outbound_rx),
            subscribers: RwLock::new(HashMap::new()),
            stopped: AtomicBool::new(false),
            stop_notify: Notify::new(),
        }
    }

    /// Non-blocking append to the inbound queue. A waiting consumer is
    /// released immediately with this event.
    pub fn publish_inbound(&self, event: InboundEvent) {
        debug!(channel = %event.channel, chat = %event.chat_id, "inbound event");
        if self.inbound_tx.send(event).is_err() {
            warn!("inbound queue closed — event dropped");
        }
    }

    /// Receive the next inbound event, or fail with `Timeout` after the
    /// budget. Events are delivered exclusively: when more than one caller
    /// consumes, each event goes to exactly one of them.
    pub async fn consume_inbound(&self, timeout: Duration) -> Result<InboundEvent> {
        let mut rx = self.inbound_rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(event)) => Ok(event),
            Ok(None) => Err(RobunError::Bus("inbound queue closed".into())),
            Err(_) => Err(RobunError::Timeout),
        }
    }

    /// Append to the outbound queue.
    pub fn publish_outbound(&self, event: OutboundEvent) {
        debug!(channel = %event.channel, chat = %event.chat_id, "outbound event");
        if self.outbound_tx.send(event).is_err() {
            warn!("outbound queue closed — event dropped");
        }
    }

    /// Register a handler for one channel's outbound events. Multiple
    /// handlers per channel are allowed; all run in registration order.
    pub async fn subscribe_outbound(&self, channel: &str, handler: Arc<dyn OutboundSubscriber>) {
        self.subscribers
            .write()
            .await
            .entry(channel.to_string())
            .or_default()
            .push(handler);
    }

    /// Drain the outbound queue until `stop()`, invoking each event's
    /// subscribers sequentially. Handler errors are logged and do not abort
    /// the dispatcher. Events for channels with no subscriber are logged
    /// and dropped.
    pub async fn dispatch_outbound(&self) {
        let mut rx = self.outbound_rx.lock().await;
        loop {
            if self.stopped.load(Ordering::SeqCst) {
                return;
            }
            let event = tokio::select! {
                ev = rx.recv() => match ev {
                    Some(ev) => ev,
                    None => return,
                },
                _ = self.stop_notify.notified() => return,
            };

            let handlers = {
                let subs = self.subscribers.read().await;
                subs.get(&event.channel).cloned().unwrap_or_default()
            };
            if handlers.is_empty() {
                warn!(channel = %event.channel, "no subscriber for outbound channel — dropping event");
                continue;
            }
            for handler in handlers {
                if let Err(e) = handler.deliver(event.clone()).await {
                    warn!(channel = %event.channel, error = %e, "outbound handler failed");
                }
            }
        }
    }

    /// Cause the dispatcher to exit after the current event.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        // notify_one stores a permit, so a dispatcher that has not reached
        // its select yet still observes the stop.
        self.stop_notify.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        seen: Mutex<Vec<String>>,
        tag: String,
    }

    #[async_trait]
    impl OutboundSubscriber for Recorder {
        async fn deliver(&self, event: OutboundEvent) -> Result<()> {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.tag, event.content));
            Ok(())
        }
    }

    #[tokio::test]
    async fn inbound_fifo_and_timeout() {
        let bus = MessageBus::new();
        bus.publish_inbound(InboundEvent::new("cli", "u", "c", "one"));
        bus.publish_inbound(InboundEvent::new("cli", "u", "c", "two"));

        let a = bus.consume_inbound(Duration::from_millis(50)).await.unwrap();
        let b = bus.consume_inbound(Duration::from_millis(50)).await.unwrap();
        assert_eq!(a.content, "one");
        assert_eq!(b.content, "two");

        let err = bus.consume_inbound(Duration::from_millis(10)).await;
        assert!(matches!(err, Err(RobunError::Timeout)));
    }

    #[tokio::test]
    async fn outbound_ordered_per_channel() {
        let bus = Arc::new(MessageBus::new());
        let rec = Arc::new(Recorder {
            seen: Mutex::new(vec![]),
            tag: "a".into(),
        });
        bus.subscribe_outbound("cli", rec.clone()).await;

        bus.publish_outbound(OutboundEvent::new("cli", "c", "1"));
        bus.publish_outbound(OutboundEvent::new("cli", "c", "2"));
        bus.publish_outbound(OutboundEvent::new("cli", "c", "3"));

        let dispatcher = {
            let bus = bus.clone();
            tokio::spawn(async move { bus.dispatch_outbound().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        bus.stop();
        let _ = dispatcher.await;

        let seen = rec.seen.lock().unwrap().clone();
        assert_eq!(seen, vec!["a:1", "a:2", "a:3"]);
    }

    #[tokio::test]
    async fn multiple_handlers_run_in_registration_order() {
        let bus = Arc::new(MessageBus::new());
        let first = Arc::new(Recorder {
            seen: Mutex::new(vec![]),
            tag: "first".into(),
        });
        let second = Arc::new(Recorder {
            seen: Mutex::new(vec![]),
            tag: "second".into(),
        });
        bus.subscribe_outbound("tg", first.clone()).await;
        bus.subscribe_outbound("tg", second.clone()).await;

        bus.publish_outbound(OutboundEvent::new("tg", "c", "hi"));

        let dispatcher = {
            let bus = bus.clone();
            tokio::spawn(async move { bus.dispatch_outbound().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        bus.stop();
        let _ = dispatcher.await;

        assert_eq!(first.seen.lock().unwrap().len(), 1);
        assert_eq!(second.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unsubscribed_channel_drops_event() {
        let bus = Arc::new(MessageBus::new());
        bus.publish_outbound(OutboundEvent::new("nowhere", "c", "lost"));

        let dispatcher = {
            let bus = bus.clone();
            tokio::spawn(async move { bus.dispatch_outbound().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        bus.stop();
        // Dispatcher must not hang or panic on the unsubscribed channel.
        let _ = dispatcher.await;
    }
}
