//! Peer transport abstraction
//!
//! The gateway never touches sockets. It drives a [`Transport`] by polling it
//! once per tick and reacting to the [`TransportEvent`]s it hands back.

use async_trait::async_trait;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tether_config::GatewayConfig;

/// Transport-level handle for one peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerHandle(u32);

impl PeerHandle {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryMethod {
    Unreliable,
    ReliableUnordered,
    Sequenced,
    ReliableOrdered,
    ReliableSequenced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Outgoing,
    Connected,
    ShutdownRequested,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportDisconnectReason {
    ConnectionFailed,
    Timeout,
    HostUnreachable,
    NetworkUnreachable,
    RemoteConnectionClose,
    DisconnectPeerCalled,
    ConnectionRejected,
    InvalidProtocol,
    UnknownHost,
    Reconnect,
    PeerToPeerConnection,
    PeerNotFound,
}

/// Pending admission request from a remote endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRequest {
    pub id: u64,
    pub endpoint: SocketAddr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionDecision {
    Accept,
    Reject,
}

/// Everything a transport can report back from one poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    PeerConnected {
        peer: PeerHandle,
        endpoint: SocketAddr,
    },
    PeerDisconnected {
        peer: PeerHandle,
        reason: TransportDisconnectReason,
    },
    MessageReceived {
        peer: PeerHandle,
        data: Vec<u8>,
        delivery: DeliveryMethod,
    },
    NetworkError {
        endpoint: Option<SocketAddr>,
        error: String,
    },
    ConnectionRequest(ConnectionRequest),
    LatencyUpdate {
        peer: PeerHandle,
        latency_ms: u32,
    },
    UnconnectedMessage {
        endpoint: SocketAddr,
        data: Vec<u8>,
    },
}

/// Tuning passed to a transport when it is created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    pub update_interval: Duration,
    pub ping_interval: Duration,
    pub disconnect_timeout: Duration,
    pub broadcast_receive_enabled: bool,
    pub unconnected_messages_enabled: bool,
}

impl From<&GatewayConfig> for TransportOptions {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            update_interval: config.tick_interval(),
            ping_interval: config.ping_interval(),
            disconnect_timeout: config.disconnect_timeout(),
            broadcast_receive_enabled: config.broadcast_receive_enabled,
            unconnected_messages_enabled: config.unconnected_messages_enabled,
        }
    }
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self::from(&GatewayConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Port {0} is already in use")]
    AddressInUse(u16),

    #[error("Transport is already started")]
    AlreadyStarted,

    #[error("{0}")]
    Other(String),
}

/// A started transport instance.
///
/// Implementations must be callable from any thread. All calls are expected
/// to return promptly; delivery happens asynchronously inside the transport.
pub trait Transport: Send + Sync {
    fn start(&self, port: u16) -> Result<(), TransportError>;

    fn stop(&self);

    /// Drain whatever happened since the previous poll
    fn poll_events(&self) -> Vec<TransportEvent>;

    fn send(&self, peer: PeerHandle, data: &[u8], delivery: DeliveryMethod);

    /// Ask the transport to drop a peer. The matching
    /// [`TransportEvent::PeerDisconnected`] arrives on a later poll.
    fn disconnect(&self, peer: PeerHandle);

    fn connection_state(&self, peer: PeerHandle) -> ConnectionState;

    fn respond(&self, request: &ConnectionRequest, decision: ConnectionDecision);
}

/// Builds one transport per gateway run
pub trait TransportFactory: Send + Sync {
    fn create(&self, options: &TransportOptions) -> Arc<dyn Transport>;
}

/// Receiver of decoded transport callbacks
#[async_trait]
pub trait TransportListener: Send + Sync {
    async fn on_peer_connected(&self, peer: PeerHandle, endpoint: SocketAddr);

    async fn on_peer_disconnected(&self, peer: PeerHandle, reason: TransportDisconnectReason);

    async fn on_message(&self, peer: PeerHandle, data: Vec<u8>, delivery: DeliveryMethod);

    async fn on_network_error(&self, endpoint: Option<SocketAddr>, error: &str);

    fn on_connection_request(&self, request: &ConnectionRequest) -> ConnectionDecision;

    fn on_latency_update(&self, _peer: PeerHandle, _latency_ms: u32) {}

    fn on_unconnected_message(&self, _endpoint: SocketAddr, _data: &[u8]) {}
}

/// Route one polled event to the matching listener callback
pub async fn dispatch_event(
    transport: &dyn Transport,
    listener: &dyn TransportListener,
    event: TransportEvent,
) {
    match event {
        TransportEvent::PeerConnected { peer, endpoint } => {
            listener.on_peer_connected(peer, endpoint).await
        }
        TransportEvent::PeerDisconnected { peer, reason } => {
            listener.on_peer_disconnected(peer, reason).await
        }
        TransportEvent::MessageReceived {
            peer,
            data,
            delivery,
        } => listener.on_message(peer, data, delivery).await,
        TransportEvent::NetworkError { endpoint, error } => {
            listener.on_network_error(endpoint, &error).await
        }
        TransportEvent::ConnectionRequest(request) => {
            let decision = listener.on_connection_request(&request);
            transport.respond(&request, decision);
        }
        TransportEvent::LatencyUpdate { peer, latency_ms } => {
            listener.on_latency_update(peer, latency_ms)
        }
        TransportEvent::UnconnectedMessage { endpoint, data } => {
            listener.on_unconnected_message(endpoint, &data)
        }
    }
}
