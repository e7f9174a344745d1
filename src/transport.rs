//! Bidirectional text-frame connections
//!
//! Both the client event protocol and the peer link run over a
//! [`Transport`]: an ordered, message-oriented duplex such as a WebSocket.
//! The crate ships an in-process [`MemoryTransport`]; network transports
//! implement the same trait.

pub mod memory;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryTransport;

/// Process-unique identity of one transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
	pub fn next() -> Self {
		static NEXT: AtomicU64 = AtomicU64::new(1);
		Self(NEXT.fetch_add(1, Ordering::Relaxed))
	}

	pub fn as_u64(&self) -> u64 {
		self.0
	}
}

impl fmt::Display for ConnectionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "conn-{}", self.0)
	}
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
	#[error("Connection closed")]
	Closed,

	#[error("Transport I/O failure: {0}")]
	Io(String),
}

/// What a transport yields when read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
	Message(String),
	Error(TransportError),
	Closed,
}

#[async_trait]
pub trait Transport: Send + 'static {
	fn connection_id(&self) -> ConnectionId;

	async fn send(&mut self, frame: String) -> Result<(), TransportError>;

	/// Next inbound event. Must be cancel-safe: it is polled inside
	/// `tokio::select!` loops.
	async fn next_event(&mut self) -> TransportEvent;

	/// Closes the connection. Idempotent.
	async fn close(&mut self);
}
