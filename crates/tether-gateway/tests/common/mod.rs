#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::time::Duration;
use tether_config::GatewayConfig;
use tether_gateway::memory::MemoryNetwork;
use tether_gateway::{
    ClientConnectedEvent, ClientDisconnectedEvent, ClientId, Gateway, GatewayEvent,
    MessageReceivedEvent, NetworkEventHandler,
};
use tokio::sync::mpsc::UnboundedReceiver;

pub fn fast_config() -> GatewayConfig {
    GatewayConfig {
        tick_interval_ms: 1,
        ..GatewayConfig::default()
    }
}

pub fn gateway() -> (Gateway, MemoryNetwork) {
    gateway_with(fast_config())
}

pub fn gateway_with(config: GatewayConfig) -> (Gateway, MemoryNetwork) {
    let network = MemoryNetwork::new();
    let gateway = Gateway::new(network.factory(), config);
    (gateway, network)
}

pub fn endpoint(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

/// Poll `check` until it holds, failing the test after five seconds
pub async fn wait_until<F: Fn() -> bool>(check: F) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not met within 5s");
}

pub async fn next_event(rx: &mut UnboundedReceiver<GatewayEvent>) -> GatewayEvent {
    match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
        Ok(Some(event)) => event,
        Ok(None) => panic!("event channel closed"),
        Err(_) => panic!("no event within 5s"),
    }
}

pub async fn expect_connected(rx: &mut UnboundedReceiver<GatewayEvent>) -> ClientConnectedEvent {
    match next_event(rx).await {
        GatewayEvent::ClientConnected(e) => e,
        other => panic!("expected connect, got {:?}", other),
    }
}

pub async fn expect_disconnected(
    rx: &mut UnboundedReceiver<GatewayEvent>,
) -> ClientDisconnectedEvent {
    match next_event(rx).await {
        GatewayEvent::ClientDisconnected(e) => e,
        other => panic!("expected disconnect, got {:?}", other),
    }
}

pub async fn expect_message(rx: &mut UnboundedReceiver<GatewayEvent>) -> MessageReceivedEvent {
    match next_event(rx).await {
        GatewayEvent::MessageReceived(e) => e,
        other => panic!("expected message, got {:?}", other),
    }
}

/// Nothing further arrives within a few polling ticks
pub async fn expect_quiet(rx: &mut UnboundedReceiver<GatewayEvent>) {
    tokio::time::sleep(Duration::from_millis(30)).await;
    if let Ok(event) = rx.try_recv() {
        panic!("unexpected event {:?}", event);
    }
}

/// Records every event it sees
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<GatewayEvent>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<GatewayEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn connected_ids(&self) -> Vec<ClientId> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                GatewayEvent::ClientConnected(e) => Some(e.client_id),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl NetworkEventHandler for Recorder {
    async fn on_client_connected(&self, event: &ClientConnectedEvent) -> anyhow::Result<()> {
        self.events
            .lock()
            .push(GatewayEvent::ClientConnected(event.clone()));
        Ok(())
    }

    async fn on_client_disconnected(&self, event: &ClientDisconnectedEvent) -> anyhow::Result<()> {
        self.events
            .lock()
            .push(GatewayEvent::ClientDisconnected(event.clone()));
        Ok(())
    }

    async fn on_message_received(&self, event: &MessageReceivedEvent) -> anyhow::Result<()> {
        self.events
            .lock()
            .push(GatewayEvent::MessageReceived(event.clone()));
        Ok(())
    }
}
