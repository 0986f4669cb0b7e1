//! Gateway facade
//!
//! Wires the registry, dispatcher, router and lifecycle controller together
//! and turns transport callbacks into application events.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use tether_config::GatewayConfig;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn, Instrument};

use crate::dispatcher::{ChannelHandler, EventDispatcher, NetworkEventHandler};
use crate::error::Result;
use crate::events::{ClientId, DisconnectReason, GatewayEvent, NetworkMessage};
use crate::identity::IdentityRegistry;
use crate::lifecycle::LifecycleController;
use crate::router::{MessageRouter, TransportSlot};
use crate::transport::{
    ConnectionDecision, ConnectionRequest, DeliveryMethod, PeerHandle, TransportDisconnectReason,
    TransportFactory, TransportListener,
};

/// Application-facing contract of a running server
#[async_trait]
pub trait NetworkServer: Send + Sync {
    fn is_running(&self) -> bool;

    /// Snapshot of the identities connected right now
    fn connected_clients(&self) -> HashSet<ClientId>;

    async fn start(&self, port: u16) -> Result<()>;

    async fn stop(&self);

    async fn send_to_client(&self, client_id: ClientId, data: &[u8]);

    async fn send_to_all_clients(&self, data: &[u8]);

    async fn disconnect_client(&self, client_id: ClientId);

    fn subscribe(&self, handler: Arc<dyn NetworkEventHandler>);

    fn unsubscribe(&self, handler: &Arc<dyn NetworkEventHandler>);
}

struct GatewayInner {
    config: GatewayConfig,
    registry: Arc<IdentityRegistry>,
    dispatcher: Arc<EventDispatcher>,
    router: MessageRouter,
    lifecycle: LifecycleController,
}

/// The session gateway.
///
/// Cheap to clone; clones share one set of sessions and observers.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("config", &self.inner.config)
            .field("running", &self.inner.lifecycle.is_running())
            .field("clients", &self.inner.registry.len())
            .field("observers", &self.inner.dispatcher.handler_count())
            .finish()
    }
}

impl Gateway {
    /// Create a gateway that builds one transport per run from `factory`
    pub fn new(factory: Arc<dyn TransportFactory>, config: GatewayConfig) -> Self {
        let registry = Arc::new(IdentityRegistry::new());
        let dispatcher = Arc::new(EventDispatcher::new());
        let transport: TransportSlot = Arc::new(RwLock::new(None));

        let router = MessageRouter::new(Arc::clone(&registry), Arc::clone(&transport));
        let lifecycle = LifecycleController::new(
            config.clone(),
            factory,
            Arc::clone(&registry),
            Arc::clone(&dispatcher),
            transport,
        );

        Self {
            inner: Arc::new(GatewayInner {
                config,
                registry,
                dispatcher,
                router,
                lifecycle,
            }),
        }
    }

    /// Like [`Gateway::new`], rejecting an invalid configuration
    pub fn try_new(factory: Arc<dyn TransportFactory>, config: GatewayConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(factory, config))
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    pub fn router(&self) -> &MessageRouter {
        &self.inner.router
    }

    /// Start on the configured port
    pub async fn start_default(&self) -> Result<()> {
        let port = self.inner.config.port;
        NetworkServer::start(self, port).await
    }

    /// Subscribe a channel-backed observer and hand back its receiver.
    ///
    /// Dropping the receiver without unsubscribing makes every later
    /// delivery to it fail and get logged.
    pub fn event_receiver(&self) -> mpsc::UnboundedReceiver<GatewayEvent> {
        let (handler, rx) = ChannelHandler::new();
        self.inner.dispatcher.subscribe(handler);
        rx
    }

    pub fn observer_count(&self) -> usize {
        self.inner.dispatcher.handler_count()
    }
}

#[async_trait]
impl NetworkServer for Gateway {
    fn is_running(&self) -> bool {
        self.inner.lifecycle.is_running()
    }

    fn connected_clients(&self) -> HashSet<ClientId> {
        self.inner.registry.snapshot()
    }

    async fn start(&self, port: u16) -> Result<()> {
        let listener: Weak<GatewayInner> = Arc::downgrade(&self.inner);
        self.inner.lifecycle.start(port, listener).await
    }

    async fn stop(&self) {
        self.inner.lifecycle.stop().await
    }

    async fn send_to_client(&self, client_id: ClientId, data: &[u8]) {
        let outcome = self.inner.router.send_to(&client_id, data);
        trace!(client_id = %client_id, ?outcome, "Send to client");
    }

    async fn send_to_all_clients(&self, data: &[u8]) {
        self.inner.router.broadcast(data);
    }

    async fn disconnect_client(&self, client_id: ClientId) {
        self.inner.router.request_disconnect(&client_id);
    }

    fn subscribe(&self, handler: Arc<dyn NetworkEventHandler>) {
        if !self.inner.dispatcher.subscribe(handler) {
            debug!("Observer already subscribed");
        }
    }

    fn unsubscribe(&self, handler: &Arc<dyn NetworkEventHandler>) {
        self.inner.dispatcher.unsubscribe(handler);
    }
}

#[async_trait]
impl TransportListener for GatewayInner {
    async fn on_peer_connected(&self, peer: PeerHandle, endpoint: SocketAddr) {
        let client_id = ClientId::generate();
        let span = tether_observability::client_span(&client_id.to_string());

        async {
            if let Err(e) = self.registry.add_session(client_id, peer) {
                warn!("Ignoring connect callback: {}", e);
                return;
            }
            // stop may have flipped the flag while this callback was in flight
            if !self.lifecycle.is_running() {
                self.registry.remove_peer(peer);
                debug!(peer = %peer, "Discarding connect that raced with shutdown");
                return;
            }

            info!(peer = %peer, endpoint = %endpoint, "Client connected");
            self.dispatcher
                .notify_connected(client_id, endpoint.to_string())
                .await;
        }
        .instrument(span)
        .await
    }

    async fn on_peer_disconnected(&self, peer: PeerHandle, reason: TransportDisconnectReason) {
        let Some(client_id) = self.registry.remove_peer(peer) else {
            debug!(peer = %peer, ?reason, "Disconnect for unknown peer");
            return;
        };

        let reason = DisconnectReason::from(reason);
        info!(client_id = %client_id, %reason, "Client disconnected");
        self.dispatcher.notify_disconnected(client_id, reason).await;
    }

    async fn on_message(&self, peer: PeerHandle, data: Vec<u8>, delivery: DeliveryMethod) {
        let Some(client_id) = self.registry.resolve_identity(peer) else {
            debug!(peer = %peer, bytes = data.len(), "Dropping message from unknown peer");
            return;
        };

        trace!(client_id = %client_id, bytes = data.len(), ?delivery, "Message received");
        let message = NetworkMessage::new(data, client_id, Utc::now());
        self.dispatcher.notify_message(message).await;
    }

    async fn on_network_error(&self, endpoint: Option<SocketAddr>, error: &str) {
        match endpoint {
            Some(endpoint) => warn!(endpoint = %endpoint, "Network error: {}", error),
            None => warn!("Network error: {}", error),
        }
    }

    fn on_connection_request(&self, request: &ConnectionRequest) -> ConnectionDecision {
        let decision = if self.config.accept_connections {
            ConnectionDecision::Accept
        } else {
            ConnectionDecision::Reject
        };
        debug!(endpoint = %request.endpoint, ?decision, "Connection request");
        decision
    }

    fn on_latency_update(&self, peer: PeerHandle, latency_ms: u32) {
        trace!(peer = %peer, latency_ms, "Latency update");
    }

    fn on_unconnected_message(&self, endpoint: SocketAddr, data: &[u8]) {
        trace!(endpoint = %endpoint, bytes = data.len(), "Ignoring unconnected message");
    }
}
