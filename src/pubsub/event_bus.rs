use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use arcstr::ArcStr;
use lru::LruCache;
use percent_encoding::percent_decode_str;
use tracing::{debug, trace};

use super::listener::{Listener, ListenerId};
use super::send_cache::SendCache;
use super::{EventData, Origin, PublishedEvent};
use crate::clock::now_millis;
use crate::sync::lock;
use crate::topic::{Topic, TopicPath};
use crate::transport::ConnectionId;

struct TopicBucket {
	topic: Arc<Topic>,
	listeners: Vec<(ListenerId, Listener)>,
}

type Target = (ArcStr, ListenerId, Listener);

pub struct PubSub {
	buckets: Mutex<HashMap<ArcStr, TopicBucket>>,
	send_cache: Mutex<SendCache>,
	path_cache: Mutex<LruCache<ArcStr, Arc<TopicPath>>>,
	next_listener: AtomicU64,
	published: AtomicU64,
}

impl PubSub {
	pub fn new(topic_cache_size: usize, send_cache_size: usize) -> Self {
		let cache_size =
			NonZeroUsize::new(topic_cache_size).unwrap_or(NonZeroUsize::MIN);
		Self {
			buckets: Mutex::new(HashMap::new()),
			send_cache: Mutex::new(SendCache::new(send_cache_size)),
			path_cache: Mutex::new(LruCache::new(cache_size)),
			next_listener: AtomicU64::new(1),
			published: AtomicU64::new(0),
		}
	}

	/// Registers `listener` under `topic.key()`.
	pub fn subscribe(
		&self,
		topic: Arc<Topic>,
		listener: Listener,
	) -> ListenerId {
		let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
		let mut buckets = lock(&self.buckets);
		buckets
			.entry(topic.key().clone())
			.or_insert_with(|| TopicBucket {
				topic: Arc::clone(&topic),
				listeners: Vec::new(),
			})
			.listeners
			.push((id, listener));
		trace!(topic = %topic, listener = ?id, "Listener registered");
		id
	}

	/// Removes one listener. A removed push sink is closed and its send
	/// cache entries are dropped. Returns `false` for unknown listeners.
	pub fn unsubscribe(&self, topic_key: &str, id: ListenerId) -> bool {
		let removed = {
			let mut buckets = lock(&self.buckets);
			let Some(bucket) = buckets.get_mut(topic_key) else {
				return false;
			};
			let Some(pos) = bucket.listeners.iter().position(|(l, _)| *l == id)
			else {
				return false;
			};
			let (_, listener) = bucket.listeners.remove(pos);
			if bucket.listeners.is_empty() {
				buckets.remove(topic_key);
			}
			listener
		};
		if let Listener::Sink(sink) = removed {
			sink.close();
			lock(&self.send_cache).purge(sink.connection_id());
		}
		true
	}

	/// Publishes a locally originated event. Returns how many listeners
	/// received it.
	pub fn publish(&self, topic: &str, data: EventData) -> usize {
		self.dispatch(topic, data, now_millis(), Origin::Local)
	}

	/// Publishes an event that arrived from a peer, keeping its timestamp.
	pub(crate) fn relay(
		&self,
		topic: &str,
		data: EventData,
		timestamp: u64,
		origin: Origin,
	) -> usize {
		self.dispatch(topic, data, timestamp, origin)
	}

	fn dispatch(
		&self,
		topic: &str,
		data: EventData,
		timestamp: u64,
		origin: Origin,
	) -> usize {
		let decoded = percent_decode_str(topic).decode_utf8_lossy();
		let path = self.topic_path(&decoded);
		let event = PublishedEvent {
			topic: path.path().clone(),
			timestamp,
			data,
			origin,
		};
		self.published.fetch_add(1, Ordering::Relaxed);

		// Snapshot under the lock, invoke outside it: listeners may
		// subscribe or publish re-entrantly.
		let mut targets: Vec<Target> = {
			let buckets = lock(&self.buckets);
			buckets
				.iter()
				.filter(|(_, bucket)| bucket.topic.matches_path(&path))
				.flat_map(|(key, bucket)| {
					bucket
						.listeners
						.iter()
						.map(move |(id, l)| (key.clone(), *id, l.clone()))
				})
				.collect()
		};
		targets.sort_by_key(|(_, id, _)| *id);

		let mut delivered = 0;
		let mut stale = Vec::new();
		for (key, id, listener) in targets {
			match listener {
				| Listener::Callback(handler) => {
					handler(&event);
					delivered += 1;
				}
				| Listener::Sink(sink) => {
					if !sink.accepts_origin(&event.origin) {
						continue;
					}
					let fresh = lock(&self.send_cache)
						.record(sink.connection_id(), &event.data);
					if !fresh {
						trace!(
							topic = %event.topic,
							connection = %sink.connection_id(),
							"Payload already pushed to connection"
						);
						continue;
					}
					match sink.push(&event) {
						| Ok(()) => delivered += 1,
						| Err(_) => stale.push((key, id)),
					}
				}
			}
		}

		for (key, id) in stale {
			debug!(topic = %key, listener = ?id, "Removing closed push sink");
			self.unsubscribe(&key, id);
		}
		delivered
	}

	fn topic_path(&self, topic: &str) -> Arc<TopicPath> {
		let mut cache = lock(&self.path_cache);
		if let Some(path) = cache.get(topic) {
			return Arc::clone(path);
		}
		let path = Arc::new(TopicPath::new(topic));
		cache.put(path.path().clone(), Arc::clone(&path));
		path
	}

	pub fn listener_count(&self, topic_key: &str) -> usize {
		lock(&self.buckets)
			.get(topic_key)
			.map_or(0, |bucket| bucket.listeners.len())
	}

	pub fn topic_count(&self) -> usize {
		lock(&self.buckets).len()
	}

	/// Total publications since start, local and relayed.
	pub fn published_count(&self) -> u64 {
		self.published.load(Ordering::Relaxed)
	}

	pub fn send_cache_len(&self, connection: ConnectionId) -> usize {
		lock(&self.send_cache).len(connection)
	}
}

impl Default for PubSub {
	fn default() -> Self {
		Self::new(100, super::DEFAULT_SEND_CACHE_SIZE)
	}
}

impl fmt::Debug for PubSub {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PubSub")
			.field("topics", &self.topic_count())
			.field("published", &self.published_count())
			.finish_non_exhaustive()
	}
}
