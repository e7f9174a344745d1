//! Node-local publish/subscribe
//!
//! [`PubSub`] fans every publication out to the listeners whose topic
//! matches it. Listeners are in-process callbacks or push sinks (long-lived
//! outbound streams such as a peer link). Push sinks on the same connection
//! receive a given publication at most once, via [`SendCache`].

mod event_bus;
mod listener;
pub mod send_cache;


use std::sync::Arc;

use arcstr::ArcStr;
use serde_json::Value;

pub use event_bus::PubSub;
pub use listener::{
	ChannelSink, EventHandler, Listener, ListenerId, PushSink, SinkClosed,
};
pub use send_cache::{DEFAULT_SEND_CACHE_SIZE, SendCache};

/// Shared event payload. Identity (not equality) is what the send cache
/// deduplicates on.
pub type EventData = Arc<Value>;

/// Where a publication entered this node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Origin {
	Local,
	/// Relayed from the named peer
	Peer(ArcStr),
}

/// One publication as seen by listeners.
#[derive(Debug, Clone)]
pub struct PublishedEvent {
	/// Concrete, percent-decoded topic
	pub topic: ArcStr,
	/// Milliseconds since the Unix epoch
	pub timestamp: u64,
	pub data: EventData,
	pub origin: Origin,
}

impl PublishedEvent {
	pub fn is_local(&self) -> bool {
		self.origin == Origin::Local
	}
}
