use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::sync::mpsc;

use super::{Origin, PublishedEvent};
use crate::transport::ConnectionId;

/// Handle returned by [`PubSub::subscribe`](super::PubSub::subscribe);
/// allocation order is delivery order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

pub type EventHandler = Arc<dyn Fn(&PublishedEvent) + Send + Sync>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Push sink is closed")]
pub struct SinkClosed;

/// A long-lived outbound stream bound to one connection.
pub trait PushSink: Send + Sync + fmt::Debug {
	fn connection_id(&self) -> ConnectionId;

	fn push(&self, event: &PublishedEvent) -> Result<(), SinkClosed>;

	/// Whether events with this origin may be pushed. Peer links refuse
	/// relayed events so they never travel back out over the mesh.
	fn accepts_origin(&self, _origin: &Origin) -> bool {
		true
	}

	/// Stops the sink. Idempotent.
	fn close(&self);

	fn is_closed(&self) -> bool;
}

#[derive(Clone)]
pub enum Listener {
	/// In-process callback; sees every matching event.
	Callback(EventHandler),
	/// Outbound stream; deduplicated per connection through the send cache.
	Sink(Arc<dyn PushSink>),
}

impl Listener {
	pub fn callback<F>(handler: F) -> Self
	where F: Fn(&PublishedEvent) + Send + Sync + 'static {
		Listener::Callback(Arc::new(handler))
	}

	pub fn sink(sink: Arc<dyn PushSink>) -> Self {
		Listener::Sink(sink)
	}
}

impl fmt::Debug for Listener {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			| Listener::Callback(_) => f.write_str("Listener::Callback"),
			| Listener::Sink(sink) => {
				f.debug_tuple("Listener::Sink").field(sink).finish()
			}
		}
	}
}

/// Push sink backed by an unbounded channel, for streaming responses that
/// are drained by their own task.
#[derive(Debug)]
pub struct ChannelSink {
	connection_id: ConnectionId,
	sender: mpsc::UnboundedSender<PublishedEvent>,
	closed: AtomicBool,
}

impl ChannelSink {
	pub fn new(
		connection_id: ConnectionId,
	) -> (Arc<Self>, mpsc::UnboundedReceiver<PublishedEvent>) {
		let (sender, receiver) = mpsc::unbounded_channel();
		let sink = Arc::new(Self {
			connection_id,
			sender,
			closed: AtomicBool::new(false),
		});
		(sink, receiver)
	}
}

impl PushSink for ChannelSink {
	fn connection_id(&self) -> ConnectionId {
		self.connection_id
	}

	fn push(&self, event: &PublishedEvent) -> Result<(), SinkClosed> {
		if self.is_closed() {
			return Err(SinkClosed);
		}
		self.sender.send(event.clone()).map_err(|_| SinkClosed)
	}

	fn close(&self) {
		self.closed.store(true, Ordering::Release);
	}

	fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire) || self.sender.is_closed()
	}
}
