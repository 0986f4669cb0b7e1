//! Event dispatch to application observers
//!
//! Observers are held in a copy-on-write list. A notification walks the
//! snapshot taken when it started, so subscribing or unsubscribing mid
//! delivery never disturbs the walk in progress.

use async_trait::async_trait;
use chrono::Utc;
use futures_util::FutureExt;
use parking_lot::RwLock;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::events::{
    ClientConnectedEvent, ClientDisconnectedEvent, ClientId, DisconnectReason, GatewayEvent,
    MessageReceivedEvent, NetworkMessage,
};

/// Application hook for gateway events.
///
/// Every callback defaults to doing nothing. A returned error or a panic is
/// logged and does not stop delivery to the remaining observers.
#[async_trait]
pub trait NetworkEventHandler: Send + Sync {
    async fn on_client_connected(&self, _event: &ClientConnectedEvent) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_client_disconnected(&self, _event: &ClientDisconnectedEvent) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_message_received(&self, _event: &MessageReceivedEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

type HandlerList = Arc<Vec<Arc<dyn NetworkEventHandler>>>;

fn same_handler(a: &Arc<dyn NetworkEventHandler>, b: &Arc<dyn NetworkEventHandler>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Fans events out to every subscribed observer
#[derive(Default)]
pub struct EventDispatcher {
    handlers: RwLock<HandlerList>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer. Returns `false` if this instance is already subscribed.
    pub fn subscribe(&self, handler: Arc<dyn NetworkEventHandler>) -> bool {
        let mut handlers = self.handlers.write();
        if handlers.iter().any(|h| same_handler(h, &handler)) {
            return false;
        }
        Arc::make_mut(&mut *handlers).push(handler);
        true
    }

    /// Remove an observer by instance. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, handler: &Arc<dyn NetworkEventHandler>) -> bool {
        let mut handlers = self.handlers.write();
        if !handlers.iter().any(|h| same_handler(h, handler)) {
            return false;
        }
        Arc::make_mut(&mut *handlers).retain(|h| !same_handler(h, handler));
        true
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    pub async fn notify_connected(&self, client_id: ClientId, endpoint: impl Into<String>) {
        let event = GatewayEvent::ClientConnected(ClientConnectedEvent {
            client_id,
            endpoint: endpoint.into(),
            connected_at: Utc::now(),
        });
        self.publish(&event).await;
    }

    pub async fn notify_disconnected(&self, client_id: ClientId, reason: DisconnectReason) {
        let event = GatewayEvent::ClientDisconnected(ClientDisconnectedEvent {
            client_id,
            reason,
            disconnected_at: Utc::now(),
        });
        self.publish(&event).await;
    }

    pub async fn notify_message(&self, message: NetworkMessage) {
        let event = GatewayEvent::MessageReceived(MessageReceivedEvent { message });
        self.publish(&event).await;
    }

    /// Deliver to each observer in subscription order, one at a time
    pub async fn publish(&self, event: &GatewayEvent) {
        let handlers: HandlerList = self.handlers.read().clone();
        debug!(
            kind = event.kind(),
            client_id = %event.client_id(),
            observers = handlers.len(),
            "Dispatching event"
        );

        for (index, handler) in handlers.iter().enumerate() {
            let outcome = AssertUnwindSafe(invoke(handler.as_ref(), event))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(
                    kind = event.kind(),
                    observer = index,
                    "Event handler failed: {:#}",
                    e
                ),
                Err(panic) => error!(
                    kind = event.kind(),
                    observer = index,
                    "Event handler panicked: {}",
                    panic_message(panic.as_ref())
                ),
            }
        }
    }
}

async fn invoke(handler: &dyn NetworkEventHandler, event: &GatewayEvent) -> anyhow::Result<()> {
    match event {
        GatewayEvent::ClientConnected(e) => handler.on_client_connected(e).await,
        GatewayEvent::ClientDisconnected(e) => handler.on_client_disconnected(e).await,
        GatewayEvent::MessageReceived(e) => handler.on_message_received(e).await,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Observer that forwards every event into an unbounded channel.
///
/// Lets a consumer drain events on its own task instead of inside the
/// polling loop.
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

impl ChannelHandler {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }

    fn forward(&self, event: GatewayEvent) -> anyhow::Result<()> {
        self.tx
            .send(event)
            .map_err(|_| anyhow::anyhow!("event receiver dropped"))
    }
}

#[async_trait]
impl NetworkEventHandler for ChannelHandler {
    async fn on_client_connected(&self, event: &ClientConnectedEvent) -> anyhow::Result<()> {
        self.forward(GatewayEvent::ClientConnected(event.clone()))
    }

    async fn on_client_disconnected(&self, event: &ClientDisconnectedEvent) -> anyhow::Result<()> {
        self.forward(GatewayEvent::ClientDisconnected(event.clone()))
    }

    async fn on_message_received(&self, event: &MessageReceivedEvent) -> anyhow::Result<()> {
        self.forward(GatewayEvent::MessageReceived(event.clone()))
    }
}
