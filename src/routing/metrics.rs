use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by the broker and the peer links of one node.
#[derive(Debug, Default)]
pub struct BrokerMetrics {
	deliveries: AtomicU64,
	deliveries_dropped: AtomicU64,
	peer_events_forwarded: AtomicU64,
	peer_events_relayed: AtomicU64,
	peer_events_discarded: AtomicU64,
	peer_connections: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
	/// Events queued to client sessions
	pub deliveries: u64,
	/// Events dropped because a client queue was full
	pub deliveries_dropped: u64,
	/// Event frames pushed to peers
	pub peer_events_forwarded: u64,
	/// Peer events republished locally
	pub peer_events_relayed: u64,
	/// Peer events nobody on this side had asked for
	pub peer_events_discarded: u64,
	/// Peer links accepted since start
	pub peer_connections: u64,
}

impl BrokerMetrics {
	pub(crate) fn record_delivery(&self) {
		self.deliveries.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_dropped_delivery(&self) {
		self.deliveries_dropped.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_peer_forward(&self) {
		self.peer_events_forwarded.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_peer_relay(&self) {
		self.peer_events_relayed.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_peer_discard(&self) {
		self.peer_events_discarded.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_peer_connection(&self) {
		self.peer_connections.fetch_add(1, Ordering::Relaxed);
	}

	pub fn snapshot(&self) -> MetricsSnapshot {
		MetricsSnapshot {
			deliveries: self.deliveries.load(Ordering::Relaxed),
			deliveries_dropped: self.deliveries_dropped.load(Ordering::Relaxed),
			peer_events_forwarded: self
				.peer_events_forwarded
				.load(Ordering::Relaxed),
			peer_events_relayed: self.peer_events_relayed.load(Ordering::Relaxed),
			peer_events_discarded: self
				.peer_events_discarded
				.load(Ordering::Relaxed),
			peer_connections: self.peer_connections.load(Ordering::Relaxed),
		}
	}
}
