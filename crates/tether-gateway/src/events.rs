//! Client identities and the events delivered to observers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::transport::TransportDisconnectReason;

/// Application-level identity of one connection.
///
/// Generated by the gateway when a peer connects and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Fresh random identity
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for ClientId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Why a client went away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    UserRequested,
    Timeout,
    ConnectionLost,
    /// Only produced by the gateway itself when it stops
    ServerShutdown,
    Kicked,
}

impl From<TransportDisconnectReason> for DisconnectReason {
    fn from(reason: TransportDisconnectReason) -> Self {
        match reason {
            TransportDisconnectReason::DisconnectPeerCalled => DisconnectReason::UserRequested,
            TransportDisconnectReason::Timeout => DisconnectReason::Timeout,
            _ => DisconnectReason::ConnectionLost,
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DisconnectReason::UserRequested => "user_requested",
            DisconnectReason::Timeout => "timeout",
            DisconnectReason::ConnectionLost => "connection_lost",
            DisconnectReason::ServerShutdown => "server_shutdown",
            DisconnectReason::Kicked => "kicked",
        };
        f.write_str(s)
    }
}

/// A payload received from a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkMessage {
    data: Arc<[u8]>,
    sender_id: ClientId,
    timestamp: DateTime<Utc>,
}

impl NetworkMessage {
    pub fn new(data: impl Into<Arc<[u8]>>, sender_id: ClientId, timestamp: DateTime<Utc>) -> Self {
        Self {
            data: data.into(),
            sender_id,
            timestamp,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn sender_id(&self) -> ClientId {
        self.sender_id
    }

    /// Receipt time
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConnectedEvent {
    pub client_id: ClientId,
    /// Remote endpoint as reported by the transport
    pub endpoint: String,
    pub connected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientDisconnectedEvent {
    pub client_id: ClientId,
    pub reason: DisconnectReason,
    pub disconnected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageReceivedEvent {
    pub message: NetworkMessage,
}

/// Any event the gateway publishes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    ClientConnected(ClientConnectedEvent),
    ClientDisconnected(ClientDisconnectedEvent),
    MessageReceived(MessageReceivedEvent),
}

impl GatewayEvent {
    /// Short name used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayEvent::ClientConnected(_) => "client_connected",
            GatewayEvent::ClientDisconnected(_) => "client_disconnected",
            GatewayEvent::MessageReceived(_) => "message_received",
        }
    }

    pub fn client_id(&self) -> ClientId {
        match self {
            GatewayEvent::ClientConnected(e) => e.client_id,
            GatewayEvent::ClientDisconnected(e) => e.client_id,
            GatewayEvent::MessageReceived(e) => e.message.sender_id(),
        }
    }
}
