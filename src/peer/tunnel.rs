use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arcstr::ArcStr;
use percent_encoding::percent_decode_str;
use serde_json::Value;
use tracing::{debug, trace, warn};

use super::frame::PeerFrame;
use super::link::PeerLink;
use crate::codec::{FrameCodec, JsonCodec};
use crate::pubsub::{
	Listener, ListenerId, Origin, PublishedEvent, PubSub, PushSink, SinkClosed,
};
use crate::routing::{BrokerMetrics, EventBrokerHandle};
use crate::topic::{Topic, TopicPath};
use crate::transport::{ConnectionId, Transport, TransportError};

/// Frames the connection task acts on itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Inbound {
	Handled,
	Ping(u64),
	Pong(u64),
	Confirm { connection_id: String, name: String },
}

/// Forwards local events to the peer as `event` frames.
#[derive(Debug)]
pub(crate) struct PeerSink {
	connection_id: ConnectionId,
	link: PeerLink,
	metrics: Arc<BrokerMetrics>,
	closed: AtomicBool,
}

impl PushSink for PeerSink {
	fn connection_id(&self) -> ConnectionId {
		self.connection_id
	}

	fn push(&self, event: &PublishedEvent) -> Result<(), SinkClosed> {
		if self.is_closed() {
			return Err(SinkClosed);
		}
		let frame = PeerFrame::Event {
			topic: event.topic.to_string(),
			timestamp: event.timestamp,
			data: Value::clone(&event.data),
		};
		if !self.link.send(frame) {
			return Err(SinkClosed);
		}
		self.metrics.record_peer_forward();
		Ok(())
	}

	fn accepts_origin(&self, origin: &Origin) -> bool {
		*origin == Origin::Local
	}

	fn close(&self) {
		self.closed.store(true, Ordering::Release);
	}

	fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire)
	}
}

/// Frame handling shared by both ends of a peer connection: the remote's
/// subscriptions become push sinks on the local `PubSub`, and its events are
/// republished locally when this side asked for them.
pub(crate) struct PeerTunnel {
	pubsub: Arc<PubSub>,
	metrics: Arc<BrokerMetrics>,
	link: PeerLink,
	connection_id: ConnectionId,
	sinks: HashMap<ArcStr, ListenerId>,
}

impl PeerTunnel {
	pub fn new(
		broker: &EventBrokerHandle,
		link: PeerLink,
		connection_id: ConnectionId,
	) -> Self {
		Self {
			pubsub: Arc::clone(broker.pubsub()),
			metrics: Arc::clone(broker.context().metrics()),
			link,
			connection_id,
			sinks: HashMap::new(),
		}
	}

	pub fn link(&self) -> &PeerLink {
		&self.link
	}

	/// Decodes and handles one text frame. Undecodable frames are logged and
	/// skipped.
	pub fn handle_text(&mut self, text: &str) -> Option<Inbound> {
		match FrameCodec::<PeerFrame>::decode(&JsonCodec, text) {
			| Ok(frame) => Some(self.handle(frame)),
			| Err(err) => {
				warn!(
					peer = %self.link.name(),
					error = %err,
					"Dropping malformed peer frame"
				);
				None
			}
		}
	}

	pub fn handle(&mut self, frame: PeerFrame) -> Inbound {
		match frame {
			| PeerFrame::Subscribe { topic } => {
				self.add_remote_interest(&topic);
				Inbound::Handled
			}
			| PeerFrame::Unsubscribe { topic } => {
				self.remove_remote_interest(&topic);
				Inbound::Handled
			}
			| PeerFrame::Event {
				topic,
				timestamp,
				data,
			} => {
				self.relay(&topic, timestamp, data);
				Inbound::Handled
			}
			| PeerFrame::Ping { timestamp } => Inbound::Ping(timestamp),
			| PeerFrame::Pong { timestamp } => Inbound::Pong(timestamp),
			| PeerFrame::Confirm {
				connection_id,
				name,
			} => Inbound::Confirm {
				connection_id,
				name,
			},
		}
	}

	fn add_remote_interest(&mut self, key: &str) {
		if self.sinks.contains_key(key) {
			debug!(peer = %self.link.name(), topic = %key, "Duplicate subscribe");
			return;
		}
		let topic = match Topic::parse(key) {
			| Ok(topic) => Arc::new(topic),
			| Err(err) => {
				warn!(
					peer = %self.link.name(),
					topic = %key,
					error = %err,
					"Peer subscribed to an invalid topic"
				);
				return;
			}
		};
		let sink = Arc::new(PeerSink {
			connection_id: self.connection_id,
			link: self.link.clone(),
			metrics: Arc::clone(&self.metrics),
			closed: AtomicBool::new(false),
		});
		let id =
			self.pubsub.subscribe(Arc::clone(&topic), Listener::sink(sink));
		debug!(peer = %self.link.name(), topic = %topic, "Peer subscribed");
		self.sinks.insert(topic.key().clone(), id);
	}

	fn remove_remote_interest(&mut self, key: &str) {
		match self.sinks.remove(key) {
			| Some(id) => {
				self.pubsub.unsubscribe(key, id);
				debug!(peer = %self.link.name(), topic = %key, "Peer unsubscribed");
			}
			| None => {
				warn!(
					peer = %self.link.name(),
					topic = %key,
					"Peer unsubscribed from a topic it never subscribed to"
				);
			}
		}
	}

	fn relay(&self, topic: &str, timestamp: u64, data: Value) {
		let decoded = percent_decode_str(topic).decode_utf8_lossy();
		let path = TopicPath::new(decoded.as_ref());
		if !self.link.accepts(&path) {
			self.metrics.record_peer_discard();
			trace!(peer = %self.link.name(), topic = %path, "Unrequested event");
			return;
		}
		self.metrics.record_peer_relay();
		self.pubsub.relay(
			path.path(),
			Arc::new(data),
			timestamp,
			Origin::Peer(self.link.name().clone()),
		);
	}

	/// Removes every push sink this connection installed.
	pub fn teardown(&mut self) {
		for (key, id) in self.sinks.drain() {
			self.pubsub.unsubscribe(&key, id);
		}
	}

	pub fn remote_interest(&self) -> usize {
		self.sinks.len()
	}
}

impl Drop for PeerTunnel {
	fn drop(&mut self) {
		self.teardown();
	}
}

pub(crate) async fn send_frame(
	transport: &mut dyn Transport,
	frame: &PeerFrame,
) -> Result<(), TransportError> {
	let text = JsonCodec
		.encode(frame)
		.map_err(|err| TransportError::Io(err.to_string()))?;
	transport.send(text).await
}
