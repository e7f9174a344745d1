use async_trait::async_trait;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use super::{ConnectionId, Transport, TransportError, TransportEvent};

/// One end of an in-process duplex. Closing either end surfaces
/// [`TransportEvent::Closed`] on the other once its buffered frames are
/// drained.
#[derive(Debug)]
pub struct MemoryTransport {
	id: ConnectionId,
	outbound: Option<UnboundedSender<String>>,
	inbound: UnboundedReceiver<String>,
	closed: bool,
}

impl MemoryTransport {
	pub fn pair() -> (Self, Self) {
		let (a_tx, a_rx) = unbounded_channel();
		let (b_tx, b_rx) = unbounded_channel();
		let a = Self {
			id: ConnectionId::next(),
			outbound: Some(a_tx),
			inbound: b_rx,
			closed: false,
		};
		let b = Self {
			id: ConnectionId::next(),
			outbound: Some(b_tx),
			inbound: a_rx,
			closed: false,
		};
		(a, b)
	}

	pub fn is_closed(&self) -> bool {
		self.closed
	}
}

#[async_trait]
impl Transport for MemoryTransport {
	fn connection_id(&self) -> ConnectionId {
		self.id
	}

	async fn send(&mut self, frame: String) -> Result<(), TransportError> {
		let outbound =
			self.outbound.as_ref().ok_or(TransportError::Closed)?;
		outbound.send(frame).map_err(|_| TransportError::Closed)
	}

	async fn next_event(&mut self) -> TransportEvent {
		if self.closed {
			return TransportEvent::Closed;
		}
		match self.inbound.recv().await {
			| Some(frame) => TransportEvent::Message(frame),
			| None => TransportEvent::Closed,
		}
	}

	async fn close(&mut self) {
		self.closed = true;
		self.outbound.take();
		self.inbound.close();
	}
}
