use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use arcstr::ArcStr;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::pubsub::PublishedEvent;
use crate::transport::ConnectionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub(crate) u64);

impl fmt::Display for ClientId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "client-{}", self.0)
	}
}

/// Per-session subscription identifier, as carried on the wire.
#[derive(
	Debug,
	Clone,
	Copy,
	PartialEq,
	Eq,
	Hash,
	PartialOrd,
	Ord,
	Serialize,
	Deserialize,
)]
#[serde(transparent)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// An event routed to one client subscription.
#[derive(Debug, Clone)]
pub struct Delivery {
	pub subscription_id: SubscriptionId,
	pub event: PublishedEvent,
}

/// What a client session hands the broker when it opens.
#[derive(Debug)]
pub struct ClientRegistration {
	pub connection_id: ConnectionId,
	/// Topics the client asked for when connecting
	pub queries: Vec<String>,
	pub deliveries: mpsc::Sender<Delivery>,
}

#[derive(Debug, Clone)]
pub(crate) struct ClientInterest {
	pub client: ClientId,
	pub subscription: SubscriptionId,
	pub deliveries: mpsc::Sender<Delivery>,
}

/// Client subscriptions by topic key. Written by the broker actor, read by
/// the delivery callbacks it installs in `PubSub`.
#[derive(Debug, Default)]
pub(crate) struct InterestIndex {
	by_topic: HashMap<ArcStr, Vec<ClientInterest>>,
}

pub(crate) type SharedInterest = Arc<RwLock<InterestIndex>>;

impl InterestIndex {
	pub fn insert(&mut self, key: ArcStr, interest: ClientInterest) {
		self.by_topic.entry(key).or_default().push(interest);
	}

	pub fn remove(
		&mut self,
		key: &str,
		client: ClientId,
		subscription: SubscriptionId,
	) -> bool {
		let Some(interests) = self.by_topic.get_mut(key) else {
			return false;
		};
		let before = interests.len();
		interests
			.retain(|i| !(i.client == client && i.subscription == subscription));
		let removed = interests.len() != before;
		if interests.is_empty() {
			self.by_topic.remove(key);
		}
		removed
	}

	pub fn targets(&self, key: &str) -> &[ClientInterest] {
		self.by_topic.get(key).map_or(&[], Vec::as_slice)
	}

	pub fn len(&self) -> usize {
		self.by_topic.values().map(Vec::len).sum()
	}

	pub fn clear(&mut self) {
		self.by_topic.clear();
	}
}
