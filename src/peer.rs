//! Node-to-node links
//!
//! Two nodes share one multiplexed connection. The dialling side runs a
//! [`PeerClient`] that reconnects with [`Backoff`] and watches the remote's
//! pings; the accepting side serves the connection through a
//! [`PeerAcceptor`] and probes it with pings of its own. Once the accepting
//! side has sent `confirm`, both ends register a [`PeerLink`] with their
//! broker and exchange `subscribe`/`unsubscribe`/`event` frames.

pub mod backoff;
pub mod connector;
pub mod error;
pub mod frame;
pub(crate) mod link;
pub mod peer_client;
pub mod peer_socket;
mod tunnel;

pub use backoff::Backoff;
pub use connector::{ConnectRequest, MemoryNetwork, PeerConnector};
pub use error::PeerConnectionError;
pub use frame::PeerFrame;
pub use link::{LinkDirection, PeerLink};
pub use peer_client::{PeerClient, PeerClientHandle, PeerState};
pub use peer_socket::{PeerAcceptor, PeerHealth, PeerSocketHandle};
