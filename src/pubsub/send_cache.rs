use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::pubsub::EventData;
use crate::transport::ConnectionId;

pub const DEFAULT_SEND_CACHE_SIZE: usize = 100;

/// Remembers which payloads were already pushed to each connection so that
/// overlapping push subscriptions deliver a publication once.
///
/// Payloads are compared by identity: the same `Arc` reached the connection
/// through another subscription. A later publication of an equal value is a
/// new payload and is not suppressed.
#[derive(Debug)]
pub struct SendCache {
	capacity: usize,
	entries: HashMap<ConnectionId, VecDeque<EventData>>,
}

impl SendCache {
	pub fn new(capacity: usize) -> Self {
		Self {
			capacity: capacity.max(1),
			entries: HashMap::new(),
		}
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}

	pub fn contains(
		&self,
		connection: ConnectionId,
		payload: &EventData,
	) -> bool {
		self.entries
			.get(&connection)
			.is_some_and(|sent| sent.iter().any(|p| Arc::ptr_eq(p, payload)))
	}

	/// Records `payload` for `connection`. Returns `false` when it was
	/// already recorded, meaning the push must be skipped.
	pub fn record(
		&mut self,
		connection: ConnectionId,
		payload: &EventData,
	) -> bool {
		let sent = self.entries.entry(connection).or_default();
		if sent.iter().any(|p| Arc::ptr_eq(p, payload)) {
			return false;
		}
		if sent.len() == self.capacity {
			sent.pop_front();
		}
		sent.push_back(Arc::clone(payload));
		true
	}

	pub fn purge(&mut self, connection: ConnectionId) {
		self.entries.remove(&connection);
	}

	pub fn len(&self, connection: ConnectionId) -> usize {
		self.entries.get(&connection).map_or(0, VecDeque::len)
	}

	pub fn connections(&self) -> usize {
		self.entries.len()
	}
}

impl Default for SendCache {
	fn default() -> Self {
		Self::new(DEFAULT_SEND_CACHE_SIZE)
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn payload(n: u64) -> EventData {
		Arc::new(json!({ "n": n }))
	}

	#[test]
	fn test_duplicate_payload_is_rejected_once_recorded() {
		let mut cache = SendCache::default();
		let conn = ConnectionId::next();
		let data = payload(1);

		assert!(cache.record(conn, &data));
		assert!(!cache.record(conn, &data));
		assert!(cache.contains(conn, &data));

		// equal value, different publication
		assert!(cache.record(conn, &payload(1)));
	}

	#[test]
	fn test_connections_are_independent() {
		let mut cache = SendCache::default();
		let (a, b) = (ConnectionId::next(), ConnectionId::next());
		let data = payload(1);

		assert!(cache.record(a, &data));
		assert!(cache.record(b, &data));
		assert_eq!(cache.connections(), 2);
	}

	#[test]
	fn test_bounded_per_connection() {
		let mut cache = SendCache::default();
		let conn = ConnectionId::next();
		let payloads: Vec<_> = (0 .. 150).map(payload).collect();
		for data in &payloads {
			assert!(cache.record(conn, data));
		}

		assert_eq!(cache.len(conn), DEFAULT_SEND_CACHE_SIZE);
		// oldest 50 were evicted, newest 100 retained
		assert!(!cache.contains(conn, &payloads[49]));
		assert!(cache.contains(conn, &payloads[50]));
		assert!(cache.contains(conn, &payloads[149]));
	}

	#[test]
	fn test_purge_forgets_connection() {
		let mut cache = SendCache::default();
		let conn = ConnectionId::next();
		let data = payload(7);
		cache.record(conn, &data);
		cache.purge(conn);

		assert_eq!(cache.len(conn), 0);
		assert!(cache.record(conn, &data));
	}
}
