//! Identity registry
//!
//! Bidirectional mapping between client identities and transport peers.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

use crate::events::ClientId;
use crate::transport::PeerHandle;

#[derive(Debug, Default)]
struct Sessions {
    by_client: HashMap<ClientId, PeerHandle>,
    by_peer: HashMap<PeerHandle, ClientId>,
}

/// Tracks live sessions.
///
/// Both directions sit behind one lock, so every reader observes either
/// both halves of a pair or neither.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    sessions: RwLock<Sessions>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pair. Neither side may already be present.
    pub fn add_session(&self, client_id: ClientId, peer: PeerHandle) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write();

        if let Some(existing) = sessions.by_client.get(&client_id) {
            return Err(SessionError::DuplicateClient {
                client_id,
                peer: *existing,
            });
        }
        if let Some(existing) = sessions.by_peer.get(&peer) {
            return Err(SessionError::DuplicatePeer {
                peer,
                client_id: *existing,
            });
        }

        sessions.by_client.insert(client_id, peer);
        sessions.by_peer.insert(peer, client_id);
        Ok(())
    }

    /// Remove a session by identity, returning its peer
    pub fn remove_session(&self, client_id: &ClientId) -> Option<PeerHandle> {
        let mut sessions = self.sessions.write();
        let peer = sessions.by_client.remove(client_id)?;
        sessions.by_peer.remove(&peer);
        Some(peer)
    }

    /// Resolve and remove in one step. A second call for the same peer
    /// returns `None`.
    pub fn remove_peer(&self, peer: PeerHandle) -> Option<ClientId> {
        let mut sessions = self.sessions.write();
        let client_id = sessions.by_peer.remove(&peer)?;
        sessions.by_client.remove(&client_id);
        Some(client_id)
    }

    pub fn resolve_identity(&self, peer: PeerHandle) -> Option<ClientId> {
        self.sessions.read().by_peer.get(&peer).copied()
    }

    pub fn resolve_peer(&self, client_id: &ClientId) -> Option<PeerHandle> {
        self.sessions.read().by_client.get(client_id).copied()
    }

    pub fn contains(&self, client_id: &ClientId) -> bool {
        self.sessions.read().by_client.contains_key(client_id)
    }

    /// Point-in-time copy of the live identities
    pub fn snapshot(&self) -> HashSet<ClientId> {
        self.sessions.read().by_client.keys().copied().collect()
    }

    /// Point-in-time copy of every live pair
    pub fn snapshot_pairs(&self) -> Vec<(ClientId, PeerHandle)> {
        self.sessions
            .read()
            .by_client
            .iter()
            .map(|(client_id, peer)| (*client_id, *peer))
            .collect()
    }

    /// Take every live pair out in one step, leaving the registry empty
    pub fn drain(&self) -> Vec<(ClientId, PeerHandle)> {
        let mut sessions = self.sessions.write();
        sessions.by_peer.clear();
        sessions.by_client.drain().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().by_client.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the two directions mirror each other exactly
    pub fn is_consistent(&self) -> bool {
        let sessions = self.sessions.read();
        sessions.by_client.len() == sessions.by_peer.len()
            && sessions
                .by_client
                .iter()
                .all(|(client_id, peer)| sessions.by_peer.get(peer) == Some(client_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Client {client_id} is already bound to {peer}")]
    DuplicateClient { client_id: ClientId, peer: PeerHandle },

    #[error("{peer} is already bound to client {client_id}")]
    DuplicatePeer { peer: PeerHandle, client_id: ClientId },
}
