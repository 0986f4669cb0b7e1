//! Message routing
//!
//! Translates identity-addressed sends into transport sends. Anything that
//! cannot be delivered right now is skipped without error.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::events::ClientId;
use crate::identity::IdentityRegistry;
use crate::transport::{ConnectionState, DeliveryMethod, PeerHandle, Transport};

/// Transport of the current run, empty while the gateway is idle
pub(crate) type TransportSlot = Arc<RwLock<Option<Arc<dyn Transport>>>>;

/// What happened to a single addressed send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent(PeerHandle),
    /// No live session for the identity
    UnknownClient,
    /// Session exists but the peer is not in the connected state
    NotConnected(PeerHandle),
    /// Gateway is not running
    Offline,
}

#[derive(Clone)]
pub struct MessageRouter {
    registry: Arc<IdentityRegistry>,
    transport: TransportSlot,
    delivery: DeliveryMethod,
}

impl MessageRouter {
    pub(crate) fn new(registry: Arc<IdentityRegistry>, transport: TransportSlot) -> Self {
        Self {
            registry,
            transport,
            delivery: DeliveryMethod::ReliableOrdered,
        }
    }

    fn current_transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.read().clone()
    }

    /// Send to one client over the reliable ordered channel
    pub fn send_to(&self, client_id: &ClientId, data: &[u8]) -> SendOutcome {
        let Some(transport) = self.current_transport() else {
            return SendOutcome::Offline;
        };
        let Some(peer) = self.registry.resolve_peer(client_id) else {
            debug!(client_id = %client_id, "Dropping send to unknown client");
            return SendOutcome::UnknownClient;
        };

        if transport.connection_state(peer) != ConnectionState::Connected {
            debug!(client_id = %client_id, peer = %peer, "Dropping send to peer that is not connected");
            return SendOutcome::NotConnected(peer);
        }

        transport.send(peer, data, self.delivery);
        trace!(client_id = %client_id, bytes = data.len(), "Sent message");
        SendOutcome::Sent(peer)
    }

    /// Send to every session in a snapshot of the registry.
    ///
    /// Returns how many peers the payload was handed to.
    pub fn broadcast(&self, data: &[u8]) -> usize {
        let Some(transport) = self.current_transport() else {
            return 0;
        };

        let mut sent = 0;
        for (_, peer) in self.registry.snapshot_pairs() {
            if transport.connection_state(peer) == ConnectionState::Connected {
                transport.send(peer, data, self.delivery);
                sent += 1;
            }
        }

        trace!(recipients = sent, bytes = data.len(), "Broadcast message");
        sent
    }

    /// Ask the transport to drop a client.
    ///
    /// The session itself is removed later, when the transport reports the
    /// disconnect. Returns `false` when there was nothing to disconnect.
    pub fn request_disconnect(&self, client_id: &ClientId) -> bool {
        let Some(transport) = self.current_transport() else {
            return false;
        };
        let Some(peer) = self.registry.resolve_peer(client_id) else {
            debug!(client_id = %client_id, "Ignoring disconnect for unknown client");
            return false;
        };

        transport.disconnect(peer);
        debug!(client_id = %client_id, peer = %peer, "Requested disconnect");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryNetwork;
    use crate::transport::{TransportFactory, TransportOptions};

    fn started(network: &MemoryNetwork) -> (MessageRouter, Arc<IdentityRegistry>) {
        let transport = network.factory().create(&TransportOptions::default());
        transport.start(7000).unwrap();

        let registry = Arc::new(IdentityRegistry::new());
        let slot: TransportSlot = Arc::new(RwLock::new(Some(transport)));
        (MessageRouter::new(Arc::clone(&registry), slot), registry)
    }

    #[test]
    fn test_send_to_connected_client() {
        let network = MemoryNetwork::new();
        let (router, registry) = started(&network);
        let peer = network.connect_peer("127.0.0.1:5000".parse().unwrap()).unwrap();
        let client = ClientId::generate();
        registry.add_session(client, peer).unwrap();

        assert_eq!(router.send_to(&client, b"hello"), SendOutcome::Sent(peer));

        let sent = network.sent_packets();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].peer, peer);
        assert_eq!(sent[0].data, b"hello");
        assert_eq!(sent[0].delivery, DeliveryMethod::ReliableOrdered);
    }

    #[test]
    fn test_unknown_client_never_reaches_transport() {
        let network = MemoryNetwork::new();
        let (router, _registry) = started(&network);

        assert_eq!(
            router.send_to(&ClientId::generate(), b"x"),
            SendOutcome::UnknownClient
        );
        assert!(!router.request_disconnect(&ClientId::generate()));
        assert!(network.sent_packets().is_empty());
        assert!(network.disconnect_requests().is_empty());
    }

    #[test]
    fn test_peer_not_connected_is_skipped() {
        let network = MemoryNetwork::new();
        let (router, registry) = started(&network);
        let peer = network.connect_peer("127.0.0.1:5000".parse().unwrap()).unwrap();
        let client = ClientId::generate();
        registry.add_session(client, peer).unwrap();
        network.set_connection_state(peer, ConnectionState::ShutdownRequested);

        assert_eq!(router.send_to(&client, b"x"), SendOutcome::NotConnected(peer));
        assert_eq!(router.broadcast(b"x"), 0);
        assert!(network.sent_packets().is_empty());
    }

    #[test]
    fn test_offline_router_does_nothing() {
        let registry = Arc::new(IdentityRegistry::new());
        let router = MessageRouter::new(Arc::clone(&registry), Arc::new(RwLock::new(None)));
        let client = ClientId::generate();
        registry.add_session(client, PeerHandle::new(1)).unwrap();

        assert_eq!(router.send_to(&client, b"x"), SendOutcome::Offline);
        assert_eq!(router.broadcast(b"x"), 0);
        assert!(!router.request_disconnect(&client));
    }

    #[test]
    fn test_broadcast_reaches_each_connected_peer_once() {
        let network = MemoryNetwork::new();
        let (router, registry) = started(&network);

        let mut peers = Vec::new();
        for port in 5000..5003 {
            let peer = network
                .connect_peer(format!("127.0.0.1:{}", port).parse().unwrap())
                .unwrap();
            registry.add_session(ClientId::generate(), peer).unwrap();
            peers.push(peer);
        }

        assert_eq!(router.broadcast(b"all"), 3);

        let mut targets: Vec<_> = network.sent_packets().into_iter().map(|p| p.peer).collect();
        targets.sort();
        assert_eq!(targets, peers);
    }

    #[test]
    fn test_request_disconnect_leaves_session_in_place() {
        let network = MemoryNetwork::new();
        let (router, registry) = started(&network);
        let peer = network.connect_peer("127.0.0.1:5000".parse().unwrap()).unwrap();
        let client = ClientId::generate();
        registry.add_session(client, peer).unwrap();

        assert!(router.request_disconnect(&client));
        assert_eq!(network.disconnect_requests(), vec![peer]);
        assert!(registry.contains(&client));
    }
}
