//! Tether Gateway - session layer over an unreliable peer transport
//!
//! Maps transport peers to stable client identities, fans connection and
//! message events out to application observers, and routes outbound
//! payloads back to the right peer.

mod dispatcher;
mod error;
mod events;
mod gateway;
mod identity;
mod lifecycle;
pub mod memory;
mod router;
pub mod transport;

pub use dispatcher::{ChannelHandler, EventDispatcher, NetworkEventHandler};
pub use error::{GatewayError, Result};
pub use events::{
    ClientConnectedEvent, ClientDisconnectedEvent, ClientId, DisconnectReason, GatewayEvent,
    MessageReceivedEvent, NetworkMessage,
};
pub use gateway::{Gateway, NetworkServer};
pub use identity::{IdentityRegistry, SessionError};
pub use router::{MessageRouter, SendOutcome};
pub use transport::{PeerHandle, Transport, TransportFactory};
