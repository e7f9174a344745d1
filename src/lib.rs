//! # fleetbus
//!
//! A topic-routed event fabric for fleets of IoT nodes. Each node runs a
//! local publish/subscribe bus, serves client sessions over a multiplexed
//! event protocol and relays events to and from peer nodes.
//!
//! ## Features
//!
//! - **Pattern topics**: `[server/]type/id/stream` with `*`, `**` and
//!   `{regex}` segments, plus `?<ql>` filters and projections
//! - **Refcounted upstream interest**: one local listener and at most one
//!   peer `subscribe` per distinct topic, however many clients ask for it
//! - **Peer mesh**: reconnecting outbound links with backoff and jitter,
//!   ping/pong liveness, no echo of relayed events
//! - **Device queries**: `query/<ql>` topics backed by a [`Registry`]
//! - **Graceful Shutdown**: [`NodeRuntime::shutdown`] drains sessions and
//!   links before stopping the broker
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fleetbus::{MemoryTransport, Node, NodeConfig};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (node, runtime) = Node::start(NodeConfig::new("hub"), None)?;
//!
//!     // Serve a client over an in-process transport
//!     let (server, _client) = MemoryTransport::pair();
//!     node.accept_client_with_topics(
//!         Box::new(server),
//!         vec!["hub/led/*/state".to_string()],
//!     )
//!     .await?;
//!
//!     node.publish_stream("led", "led-1", "state", json!({"on": true}));
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod node;
pub mod peer;
pub mod pubsub;
pub mod query;
pub mod registry;
pub mod routing;
pub mod runtime;
pub mod session;
pub(crate) mod sync;
pub mod topic;
pub mod transport;

// === Core Public API ===
pub use config::{NodeConfig, NodeSettings, PeerClientConfig, PeerSettings};
pub use error::{FleetError, Result};
pub use node::Node;
pub use runtime::NodeRuntime;

pub use peer::{
	MemoryNetwork, PeerAcceptor, PeerClientHandle, PeerConnector, PeerState,
};
pub use pubsub::{PubSub, PublishedEvent};
pub use query::Query;
pub use registry::{DeviceRecord, MemoryRegistry, Registry};
pub use session::{ClientFrame, ClientRequest, ClientSessionHandle};
pub use topic::{Topic, TopicError, TopicPath};
pub use transport::{MemoryTransport, Transport, TransportEvent};

/// Prelude module for convenient imports
///
/// ```rust
/// use fleetbus::prelude::*;
/// ```
pub mod prelude {
	//! Essential types for most fleetbus applications

	pub use crate::{
		FleetError, MemoryNetwork, MemoryTransport, Node, NodeConfig,
		NodeRuntime, PeerClientConfig, Result, Topic, Transport,
	};
}
