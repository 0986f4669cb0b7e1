//! In-process transport
//!
//! [`MemoryNetwork`] plays the remote side: it injects connects, messages and
//! drops, and records what the gateway sends. Each gateway run gets a fresh
//! [`MemoryTransport`] from the factory. Transports left over from earlier
//! runs go inert.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::transport::{
    ConnectionDecision, ConnectionRequest, ConnectionState, DeliveryMethod, PeerHandle, Transport,
    TransportDisconnectReason, TransportError, TransportEvent, TransportFactory, TransportOptions,
};

/// One payload handed to [`Transport::send`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPacket {
    pub peer: PeerHandle,
    pub data: Vec<u8>,
    pub delivery: DeliveryMethod,
}

#[derive(Debug, Default)]
struct NetworkState {
    generation: u64,
    options: Option<TransportOptions>,
    occupied_ports: HashSet<u16>,
    bound_port: Option<u16>,
    running: bool,
    next_peer: u32,
    next_request: u64,
    peers: HashMap<PeerHandle, ConnectionState>,
    pending: VecDeque<TransportEvent>,
    sent: Vec<SentPacket>,
    disconnect_requests: Vec<PeerHandle>,
    decisions: Vec<(ConnectionRequest, ConnectionDecision)>,
    polls: usize,
}

impl NetworkState {
    fn allocate_peer(&mut self, endpoint: SocketAddr) -> PeerHandle {
        self.next_peer += 1;
        let peer = PeerHandle::new(self.next_peer);
        self.peers.insert(peer, ConnectionState::Connected);
        self.pending
            .push_back(TransportEvent::PeerConnected { peer, endpoint });
        peer
    }
}

/// Control handle for the simulated remote side
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn factory(&self) -> Arc<dyn TransportFactory> {
        Arc::new(MemoryTransportFactory {
            network: self.clone(),
        })
    }

    /// Make later starts on `port` fail as if another process held it
    pub fn occupy_port(&self, port: u16) {
        self.state.lock().occupied_ports.insert(port);
    }

    pub fn release_port(&self, port: u16) {
        self.state.lock().occupied_ports.remove(&port);
    }

    /// Simulate a remote peer completing its handshake
    pub fn connect_peer(&self, endpoint: SocketAddr) -> Option<PeerHandle> {
        let mut state = self.state.lock();
        if !state.running {
            return None;
        }
        Some(state.allocate_peer(endpoint))
    }

    /// Queue an admission request. Accepting it connects a new peer.
    pub fn request_connection(&self, endpoint: SocketAddr) -> Option<u64> {
        let mut state = self.state.lock();
        if !state.running {
            return None;
        }
        state.next_request += 1;
        let id = state.next_request;
        state
            .pending
            .push_back(TransportEvent::ConnectionRequest(ConnectionRequest { id, endpoint }));
        Some(id)
    }

    /// Simulate the remote side going away
    pub fn drop_peer(&self, peer: PeerHandle, reason: TransportDisconnectReason) -> bool {
        let mut state = self.state.lock();
        if !state.running || state.peers.remove(&peer).is_none() {
            return false;
        }
        state
            .pending
            .push_back(TransportEvent::PeerDisconnected { peer, reason });
        true
    }

    /// Simulate a reliable ordered payload arriving from `peer`
    pub fn deliver(&self, peer: PeerHandle, data: &[u8]) -> bool {
        let mut state = self.state.lock();
        if !state.running || !state.peers.contains_key(&peer) {
            return false;
        }
        state.pending.push_back(TransportEvent::MessageReceived {
            peer,
            data: data.to_vec(),
            delivery: DeliveryMethod::ReliableOrdered,
        });
        true
    }

    pub fn raise_error(&self, endpoint: Option<SocketAddr>, error: impl Into<String>) {
        self.inject(TransportEvent::NetworkError {
            endpoint,
            error: error.into(),
        });
    }

    /// Queue an arbitrary event, bypassing any bookkeeping
    pub fn inject(&self, event: TransportEvent) {
        self.state.lock().pending.push_back(event);
    }

    pub fn set_connection_state(&self, peer: PeerHandle, connection: ConnectionState) {
        self.state.lock().peers.insert(peer, connection);
    }

    pub fn sent_packets(&self) -> Vec<SentPacket> {
        self.state.lock().sent.clone()
    }

    pub fn disconnect_requests(&self) -> Vec<PeerHandle> {
        self.state.lock().disconnect_requests.clone()
    }

    pub fn connection_decisions(&self) -> Vec<(ConnectionRequest, ConnectionDecision)> {
        self.state.lock().decisions.clone()
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn bound_port(&self) -> Option<u16> {
        self.state.lock().bound_port
    }

    /// Options the most recent transport was created with
    pub fn last_options(&self) -> Option<TransportOptions> {
        self.state.lock().options.clone()
    }

    pub fn transports_created(&self) -> u64 {
        self.state.lock().generation
    }

    pub fn pending_events(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn poll_count(&self) -> usize {
        self.state.lock().polls
    }
}

pub struct MemoryTransportFactory {
    network: MemoryNetwork,
}

impl MemoryTransportFactory {
    pub fn new(network: MemoryNetwork) -> Self {
        Self { network }
    }
}

impl TransportFactory for MemoryTransportFactory {
    fn create(&self, options: &TransportOptions) -> Arc<dyn Transport> {
        let mut state = self.network.state.lock();
        state.generation += 1;
        state.options = Some(options.clone());
        Arc::new(MemoryTransport {
            state: Arc::clone(&self.network.state),
            generation: state.generation,
        })
    }
}

pub struct MemoryTransport {
    state: Arc<Mutex<NetworkState>>,
    generation: u64,
}

impl MemoryTransport {
    /// Run `f` only if this is still the newest transport
    fn with_state<R>(&self, f: impl FnOnce(&mut NetworkState) -> R) -> Option<R> {
        let mut state = self.state.lock();
        (state.generation == self.generation).then(|| f(&mut state))
    }
}

impl Transport for MemoryTransport {
    fn start(&self, port: u16) -> Result<(), TransportError> {
        self.with_state(|state| {
            if state.running {
                return Err(TransportError::AlreadyStarted);
            }
            if state.occupied_ports.contains(&port) {
                return Err(TransportError::AddressInUse(port));
            }
            state.running = true;
            state.bound_port = Some(port);
            state.peers.clear();
            state.pending.clear();
            Ok(())
        })
        .unwrap_or_else(|| Err(TransportError::Other("transport was superseded".to_string())))
    }

    fn stop(&self) {
        self.with_state(|state| {
            state.running = false;
            state.bound_port = None;
            state.peers.clear();
            state.pending.clear();
        });
    }

    fn poll_events(&self) -> Vec<TransportEvent> {
        self.with_state(|state| {
            if !state.running {
                return Vec::new();
            }
            state.polls += 1;
            state.pending.drain(..).collect()
        })
        .unwrap_or_default()
    }

    fn send(&self, peer: PeerHandle, data: &[u8], delivery: DeliveryMethod) {
        self.with_state(|state| {
            if state.running && state.peers.contains_key(&peer) {
                state.sent.push(SentPacket {
                    peer,
                    data: data.to_vec(),
                    delivery,
                });
            }
        });
    }

    fn disconnect(&self, peer: PeerHandle) {
        self.with_state(|state| {
            state.disconnect_requests.push(peer);
            if state.running && state.peers.remove(&peer).is_some() {
                state.pending.push_back(TransportEvent::PeerDisconnected {
                    peer,
                    reason: TransportDisconnectReason::DisconnectPeerCalled,
                });
            }
        });
    }

    fn connection_state(&self, peer: PeerHandle) -> ConnectionState {
        self.with_state(|state| state.peers.get(&peer).copied())
            .flatten()
            .unwrap_or(ConnectionState::Disconnected)
    }

    fn respond(&self, request: &ConnectionRequest, decision: ConnectionDecision) {
        self.with_state(|state| {
            state.decisions.push((request.clone(), decision));
            if decision == ConnectionDecision::Accept && state.running {
                state.allocate_peer(request.endpoint);
            }
        });
    }
}
