use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use arcstr::ArcStr;
use serde_json::json;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tracing::{Instrument, debug, error, info, trace, warn};

use super::error::BrokerError;
use super::interest::{
	ClientId, ClientInterest, ClientRegistration, Delivery, SharedInterest,
	SubscriptionId,
};
use super::metrics::BrokerMetrics;
use crate::context::NodeContext;
use crate::peer::{LinkDirection, PeerLink};
use crate::pubsub::{Listener, ListenerId, PubSub};
use crate::query::Query;
use crate::registry::{DeviceRecord, Registry};
use crate::sync::{read, write};
use crate::topic::{
	PEER_CONNECT_TOPIC, PEER_DISCONNECT_TOPIC, Topic, TopicKind,
};
use crate::transport::ConnectionId;

/// Interest in `topic` as served by the node named `server`. When `server`
/// is the local node the upstream is the local `PubSub`, otherwise the peer
/// link of that name.
#[derive(Debug, Clone)]
pub struct SubscribeQuery {
	pub topic: Arc<Topic>,
	pub server: ArcStr,
}

impl SubscribeQuery {
	pub fn new(topic: Arc<Topic>, server: impl Into<ArcStr>) -> Self {
		Self {
			topic,
			server: server.into(),
		}
	}
}

/// Point-in-time view of the broker's reference counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerSnapshot {
	/// Local upstream count per topic key
	pub local: BTreeMap<String, usize>,
	/// Per peer, upstream count per topic key
	pub peers: BTreeMap<String, BTreeMap<String, usize>>,
	/// Connected peer names
	pub links: Vec<String>,
	pub clients: usize,
	pub subscriptions: usize,
}

#[derive(Debug)]
pub(crate) enum Command {
	AddClient(ClientRegistration, oneshot::Sender<ClientId>),
	RemoveClient(ClientId, oneshot::Sender<()>),
	SubscribeClient {
		client: ClientId,
		subscription: SubscriptionId,
		topic: Arc<Topic>,
		reply: oneshot::Sender<Result<(), BrokerError>>,
	},
	UnsubscribeClient {
		client: ClientId,
		subscription: SubscriptionId,
		reply: oneshot::Sender<Result<(), BrokerError>>,
	},
	Subscribe(SubscribeQuery, oneshot::Sender<()>),
	Unsubscribe(SubscribeQuery, oneshot::Sender<()>),
	AddPeer(PeerLink, oneshot::Sender<bool>),
	RemovePeer {
		name: ArcStr,
		connection_id: ArcStr,
		reply: oneshot::Sender<bool>,
	},
	Snapshot(oneshot::Sender<BrokerSnapshot>),
}

struct LocalUpstream {
	topic: Arc<Topic>,
	count: usize,
	listener: ListenerId,
	observer: Option<JoinHandle<()>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ClientKey {
	connection_id: ConnectionId,
	queries: Vec<String>,
}

/// Interest in `topic` at one peer, kept while the peer is offline and
/// re-sent whenever a link to it comes up.
struct PeerUpstream {
	topic: Arc<Topic>,
	count: usize,
}

struct ClientSubscription {
	topic: Arc<Topic>,
	/// Peers this subscription holds a count on
	servers: Vec<ArcStr>,
}

struct ClientState {
	key: ClientKey,
	deliveries: mpsc::Sender<Delivery>,
	subscriptions: HashMap<SubscriptionId, ClientSubscription>,
}

/// Owns every reference count of one node. All mutations happen on the
/// actor task, so a count change and the upstream it creates or tears down
/// are one step.
pub struct EventBrokerActor {
	context: NodeContext,
	pubsub: Arc<PubSub>,
	registry: Option<Arc<dyn Registry>>,
	interest: SharedInterest,
	local: HashMap<ArcStr, LocalUpstream>,
	peer_counts: HashMap<ArcStr, HashMap<ArcStr, PeerUpstream>>,
	peers: HashMap<ArcStr, PeerLink>,
	clients: HashMap<ClientId, ClientState>,
	client_keys: HashMap<ClientKey, ClientId>,
	next_client_id: u64,
	command_rx: mpsc::Receiver<Command>,
	shutdown_rx: oneshot::Receiver<()>,
}

impl EventBrokerActor {
	pub fn spawn(
		context: NodeContext,
		pubsub: Arc<PubSub>,
		registry: Option<Arc<dyn Registry>>,
		command_capacity: usize,
	) -> (EventBrokerController, EventBrokerHandle) {
		let (command_tx, command_rx) = mpsc::channel(command_capacity.max(1));
		let (shutdown_tx, shutdown_rx) = oneshot::channel();
		let actor = Self {
			context: context.clone(),
			pubsub: Arc::clone(&pubsub),
			registry,
			interest: SharedInterest::default(),
			local: HashMap::new(),
			peer_counts: HashMap::new(),
			peers: HashMap::new(),
			clients: HashMap::new(),
			client_keys: HashMap::new(),
			next_client_id: 1,
			command_rx,
			shutdown_rx,
		};
		let span = context.span().clone();
		let join_handle = tokio::spawn(actor.run().instrument(span));

		let controller = EventBrokerController {
			shutdown_tx,
			join_handle,
		};
		let handle = EventBrokerHandle {
			command_tx,
			context,
			pubsub,
		};
		(controller, handle)
	}

	async fn run(mut self) {
		info!("EventBroker started");
		loop {
			tokio::select! {
				_ = &mut self.shutdown_rx => {
					info!("EventBroker: Shutdown signal received");
					break;
				}
				cmd = self.command_rx.recv() => {
					let Some(cmd) = cmd else {
						info!("EventBroker: Command channel closed, exiting");
						break;
					};
					self.handle_command(cmd);
				}
			}
		}
		self.cleanup();
		info!("EventBroker stopped");
	}

	fn handle_command(&mut self, cmd: Command) {
		match cmd {
			| Command::AddClient(registration, reply) => {
				let id = self.add_client(registration);
				let _ = reply.send(id);
			}
			| Command::RemoveClient(id, reply) => {
				self.remove_client(id);
				let _ = reply.send(());
			}
			| Command::SubscribeClient {
				client,
				subscription,
				topic,
				reply,
			} => {
				let result = self.subscribe_client(client, subscription, topic);
				let _ = reply.send(result);
			}
			| Command::UnsubscribeClient {
				client,
				subscription,
				reply,
			} => {
				let result = self.unsubscribe_client(client, subscription);
				let _ = reply.send(result);
			}
			| Command::Subscribe(query, reply) => {
				self.subscribe(query);
				let _ = reply.send(());
			}
			| Command::Unsubscribe(query, reply) => {
				self.unsubscribe(&query);
				let _ = reply.send(());
			}
			| Command::AddPeer(link, reply) => {
				let accepted = self.add_peer(link);
				let _ = reply.send(accepted);
			}
			| Command::RemovePeer {
				name,
				connection_id,
				reply,
			} => {
				let removed = self.remove_peer(&name, &connection_id);
				let _ = reply.send(removed);
			}
			| Command::Snapshot(reply) => {
				let _ = reply.send(self.snapshot());
			}
		}
	}

	fn add_client(&mut self, registration: ClientRegistration) -> ClientId {
		let mut queries = registration.queries;
		queries.sort();
		let key = ClientKey {
			connection_id: registration.connection_id,
			queries,
		};
		if let Some(id) = self.client_keys.get(&key) {
			debug!(client = %id, "Client already registered");
			return *id;
		}
		let id = ClientId(self.next_client_id);
		self.next_client_id += 1;
		debug!(
			client = %id,
			connection = %key.connection_id,
			"Client registered"
		);
		self.client_keys.insert(key.clone(), id);
		self.clients.insert(id, ClientState {
			key,
			deliveries: registration.deliveries,
			subscriptions: HashMap::new(),
		});
		id
	}

	fn remove_client(&mut self, id: ClientId) {
		let Some(state) = self.clients.remove(&id) else {
			debug!(client = %id, "Remove for unknown client");
			return;
		};
		self.client_keys.remove(&state.key);
		for (subscription_id, subscription) in state.subscriptions {
			self.release(id, subscription_id, &subscription);
		}
		debug!(client = %id, "Client removed");
	}

	fn subscribe_client(
		&mut self,
		client: ClientId,
		subscription: SubscriptionId,
		topic: Arc<Topic>,
	) -> Result<(), BrokerError> {
		let state = self
			.clients
			.get_mut(&client)
			.ok_or(BrokerError::UnknownClient(client))?;
		if state.subscriptions.contains_key(&subscription) {
			return Err(BrokerError::DuplicateSubscription {
				client,
				subscription,
			});
		}
		write(&self.interest).insert(topic.key().clone(), ClientInterest {
			client,
			subscription,
			deliveries: state.deliveries.clone(),
		});
		let servers: Vec<ArcStr> = self
			.peers
			.keys()
			.filter(|name| topic.matches_server(name))
			.cloned()
			.collect();
		state.subscriptions.insert(subscription, ClientSubscription {
			topic: Arc::clone(&topic),
			servers: servers.clone(),
		});

		self.subscribe_local(Arc::clone(&topic));
		for server in &servers {
			self.subscribe_peer(server, Arc::clone(&topic));
		}
		debug!(
			client = %client,
			subscription_id = %subscription,
			topic = %topic,
			"Client subscribed"
		);
		Ok(())
	}

	fn unsubscribe_client(
		&mut self,
		client: ClientId,
		subscription: SubscriptionId,
	) -> Result<(), BrokerError> {
		let state = self
			.clients
			.get_mut(&client)
			.ok_or(BrokerError::UnknownClient(client))?;
		let removed = state.subscriptions.remove(&subscription).ok_or(
			BrokerError::UnknownSubscription {
				client,
				subscription,
			},
		)?;
		self.release(client, subscription, &removed);
		debug!(
			client = %client,
			subscription_id = %subscription,
			topic = %removed.topic,
			"Client unsubscribed"
		);
		Ok(())
	}

	/// Drops one client subscription from the index and every upstream it
	/// holds.
	fn release(
		&mut self,
		client: ClientId,
		id: SubscriptionId,
		subscription: &ClientSubscription,
	) {
		let key = subscription.topic.key();
		write(&self.interest).remove(key, client, id);
		self.unsubscribe_local(key);
		for server in &subscription.servers {
			self.unsubscribe_peer(server, key);
		}
	}

	fn subscribe(&mut self, query: SubscribeQuery) {
		if query.server == *self.context.name() {
			self.subscribe_local(query.topic);
		} else {
			self.subscribe_peer(&query.server, query.topic);
		}
	}

	fn unsubscribe(&mut self, query: &SubscribeQuery) {
		let key = query.topic.key();
		if query.server == *self.context.name() {
			self.unsubscribe_local(key);
		} else {
			self.unsubscribe_peer(&query.server, key);
		}
	}

	fn subscribe_local(&mut self, topic: Arc<Topic>) {
		if let Some(upstream) = self.local.get_mut(topic.key().as_str()) {
			upstream.count += 1;
			trace!(topic = %topic, count = upstream.count, "Upstream shared");
			return;
		}
		let listener = delivery_listener(
			topic.key().clone(),
			Arc::clone(&self.interest),
			Arc::clone(self.context.metrics()),
		);
		let listener = self.pubsub.subscribe(Arc::clone(&topic), listener);
		let observer = self.spawn_query_observer(&topic);
		debug!(topic = %topic, "Local upstream created");
		self.local.insert(topic.key().clone(), LocalUpstream {
			topic,
			count: 1,
			listener,
			observer,
		});
	}

	fn unsubscribe_local(&mut self, key: &str) {
		let Some(upstream) = self.local.get_mut(key) else {
			warn!(topic = %key, "Unsubscribe without a local subscription");
			return;
		};
		upstream.count -= 1;
		if upstream.count > 0 {
			return;
		}
		if let Some(upstream) = self.local.remove(key) {
			self.pubsub.unsubscribe(key, upstream.listener);
			if let Some(observer) = upstream.observer {
				observer.abort();
			}
			debug!(topic = %upstream.topic, "Local upstream removed");
		}
	}

	/// Counts interest at `server` whether or not it is linked; `add_peer`
	/// sends what accumulated while it was away.
	fn subscribe_peer(&mut self, server: &ArcStr, topic: Arc<Topic>) {
		let upstream = self
			.peer_counts
			.entry(server.clone())
			.or_default()
			.entry(topic.key().clone())
			.or_insert_with(|| PeerUpstream {
				topic: Arc::clone(&topic),
				count: 0,
			});
		upstream.count += 1;
		if upstream.count > 1 {
			return;
		}
		match self.peers.get(server) {
			| Some(link) => {
				debug!(peer = %server, topic = %topic, "Subscribing at peer");
				link.subscribe(topic);
			}
			| None => {
				debug!(peer = %server, topic = %topic, "Peer not linked yet");
			}
		}
	}

	fn unsubscribe_peer(&mut self, server: &str, key: &str) {
		let Some(counts) = self.peer_counts.get_mut(server) else {
			warn!(peer = %server, topic = %key, "Unsubscribe for unknown peer");
			return;
		};
		let Some(upstream) = counts.get_mut(key) else {
			warn!(
				peer = %server,
				topic = %key,
				"Unsubscribe without a peer subscription"
			);
			return;
		};
		upstream.count -= 1;
		if upstream.count > 0 {
			return;
		}
		counts.remove(key);
		if counts.is_empty() {
			self.peer_counts.remove(server);
		}
		if let Some(link) = self.peers.get(server) {
			debug!(peer = %server, topic = %key, "Unsubscribing at peer");
			link.unsubscribe(key);
		}
	}

	fn add_peer(&mut self, link: PeerLink) -> bool {
		let name = link.name().clone();
		if let Some(current) = self.peers.get(&name) {
			if current.connection_id() == link.connection_id() {
				return true;
			}
			if !self.replaces(current, &link) {
				info!(
					peer = %name,
					connection_id = %link.connection_id(),
					"Rejecting concurrent peer link"
				);
				link.close();
				return false;
			}
			info!(
				peer = %name,
				old_connection_id = %current.connection_id(),
				connection_id = %link.connection_id(),
				"Replacing peer link"
			);
			current.close();
		}

		self.peers.insert(name.clone(), link.clone());
		self.adopt_client_interest(&name);
		let topics = match self.peer_counts.get(&name) {
			| Some(counts) => {
				for upstream in counts.values() {
					link.subscribe(Arc::clone(&upstream.topic));
				}
				counts.len()
			}
			| None => 0,
		};
		info!(
			peer = %name,
			connection_id = %link.connection_id(),
			direction = ?link.direction(),
			topics,
			"Peer connected"
		);
		self.context.metrics().record_peer_connection();
		self.pubsub.publish(
			PEER_CONNECT_TOPIC,
			Arc::new(json!({
				"peer": name.as_str(),
				"connectionId": link.connection_id().as_str(),
			})),
		);
		true
	}

	/// Takes a count at `name` for every client subscription whose topic
	/// can be served there and that does not hold one yet.
	fn adopt_client_interest(&mut self, name: &ArcStr) {
		let mut adopted = Vec::new();
		for state in self.clients.values_mut() {
			for subscription in state.subscriptions.values_mut() {
				if subscription.servers.contains(name)
					|| !subscription.topic.matches_server(name)
				{
					continue;
				}
				subscription.servers.push(name.clone());
				adopted.push(Arc::clone(&subscription.topic));
			}
		}
		for topic in adopted {
			self.subscribe_peer(name, topic);
		}
	}

	/// Whether `new` should take over from `current`. Links of the same
	/// direction are reconnects; for a crossed pair both nodes keep the link
	/// initiated by the node with the smaller name.
	fn replaces(&self, current: &PeerLink, new: &PeerLink) -> bool {
		if current.direction() == new.direction() {
			return true;
		}
		let local = self.context.name();
		let preferred = std::cmp::min(local.as_str(), new.name().as_str());
		let initiator = match new.direction() {
			| LinkDirection::Outbound => local.as_str(),
			| LinkDirection::Inbound => new.name().as_str(),
		};
		initiator == preferred
	}

	fn remove_peer(&mut self, name: &str, connection_id: &str) -> bool {
		let current = self
			.peers
			.get(name)
			.is_some_and(|link| link.connection_id().as_str() == connection_id);
		if !current {
			debug!(
				peer = %name,
				connection_id = %connection_id,
				"Ignoring removal of a stale peer link"
			);
			return false;
		}
		self.peers.remove(name);
		info!(peer = %name, connection_id = %connection_id, "Peer gone");
		self.pubsub.publish(
			PEER_DISCONNECT_TOPIC,
			Arc::new(json!({
				"peer": name,
				"connectionId": connection_id,
			})),
		);
		true
	}

	fn spawn_query_observer(
		&self,
		topic: &Arc<Topic>,
	) -> Option<JoinHandle<()>> {
		let TopicKind::Query(query_topic) = topic.kind() else {
			return None;
		};
		let Some(registry) = self.registry.clone() else {
			debug!(topic = %topic, "No registry, query topic stays passive");
			return None;
		};
		let query = Arc::clone(query_topic.query());
		let key = topic.key().clone();
		let pubsub = Arc::clone(&self.pubsub);
		let shutdown = self.context.shutdown_token().clone();
		Some(self.context.spawn(async move {
			tokio::select! {
				_ = shutdown.cancelled() => {}
				_ = observe_devices(registry, query, key, pubsub) => {}
			}
		}))
	}

	fn snapshot(&self) -> BrokerSnapshot {
		BrokerSnapshot {
			local: self
				.local
				.iter()
				.map(|(key, upstream)| (key.to_string(), upstream.count))
				.collect(),
			peers: self
				.peer_counts
				.iter()
				.map(|(name, counts)| {
					let counts = counts
						.iter()
						.map(|(key, upstream)| (key.to_string(), upstream.count))
						.collect();
					(name.to_string(), counts)
				})
				.collect(),
			links: {
				let mut links: Vec<String> =
					self.peers.keys().map(ToString::to_string).collect();
				links.sort();
				links
			},
			clients: self.clients.len(),
			subscriptions: read(&self.interest).len(),
		}
	}

	fn cleanup(&mut self) {
		for (key, upstream) in self.local.drain() {
			if let Some(observer) = upstream.observer {
				observer.abort();
			}
			self.pubsub.unsubscribe(&key, upstream.listener);
		}
		for (name, link) in self.peers.drain() {
			debug!(peer = %name, "Closing peer link");
			link.close();
		}
		self.peer_counts.clear();
		write(&self.interest).clear();
		self.clients.clear();
		self.client_keys.clear();
	}
}

/// PubSub callback for topic key `key`: one delivery per client
/// subscription registered under that key.
fn delivery_listener(
	key: ArcStr,
	interest: SharedInterest,
	metrics: Arc<BrokerMetrics>,
) -> Listener {
	Listener::callback(move |event| {
		let interest = read(&interest);
		for target in interest.targets(&key) {
			let delivery = Delivery {
				subscription_id: target.subscription,
				event: event.clone(),
			};
			match target.deliveries.try_send(delivery) {
				| Ok(()) => metrics.record_delivery(),
				| Err(TrySendError::Full(_)) => {
					metrics.record_dropped_delivery();
					warn!(
						client = %target.client,
						subscription_id = %target.subscription,
						topic = %event.topic,
						"Client queue full, event dropped"
					);
				}
				| Err(TrySendError::Closed(_)) => {
					trace!(
						client = %target.client,
						"Client session gone, skipping delivery"
					);
				}
			}
		}
	})
}

/// Publishes every device matching `query` under `key`, first the current
/// ones and then each later save.
async fn observe_devices(
	registry: Arc<dyn Registry>,
	query: Arc<Query>,
	key: ArcStr,
	pubsub: Arc<PubSub>,
) {
	let mut updates = registry.watch();
	match registry.find(&query).await {
		| Ok(devices) => {
			for device in &devices {
				publish_device(&pubsub, &key, &query, device);
			}
		}
		| Err(err) => {
			error!(topic = %key, error = ?err, "Device query failed");
		}
	}
	loop {
		match updates.recv().await {
			| Ok(device) => publish_device(&pubsub, &key, &query, &device),
			| Err(broadcast::error::RecvError::Lagged(skipped)) => {
				warn!(topic = %key, skipped, "Device observer lagged");
			}
			| Err(broadcast::error::RecvError::Closed) => {
				debug!(topic = %key, "Registry watch closed");
				break;
			}
		}
	}
}

fn publish_device(
	pubsub: &PubSub,
	key: &str,
	query: &Query,
	device: &DeviceRecord,
) {
	if let Some(data) = query.apply(&device.to_document()) {
		pubsub.publish(key, Arc::new(data));
	}
}

pub struct EventBrokerController {
	shutdown_tx: oneshot::Sender<()>,
	join_handle: JoinHandle<()>,
}

impl EventBrokerController {
	pub async fn shutdown(self) -> Result<(), JoinError> {
		let _ = self.shutdown_tx.send(()).inspect_err(|_| {
			warn!("EventBrokerController: Shutdown signal already sent");
		});
		self.join_handle.await.inspect_err(|e| {
			warn!(error = ?e, "EventBrokerController: Actor run failed");
		})
	}
}

/// Cloneable front of the broker actor.
#[derive(Debug, Clone)]
pub struct EventBrokerHandle {
	command_tx: mpsc::Sender<Command>,
	context: NodeContext,
	pubsub: Arc<PubSub>,
}

impl EventBrokerHandle {
	async fn request<R>(
		&self,
		build: impl FnOnce(oneshot::Sender<R>) -> Command,
	) -> Result<R, BrokerError> {
		let (tx, rx) = oneshot::channel();
		self.command_tx
			.send(build(tx))
			.await
			.map_err(|_| BrokerError::ChannelClosed)?;
		rx.await.map_err(|_| BrokerError::ResponseLost)
	}

	/// Registers a client. Registering the same connection with the same
	/// initial topics again returns the existing id.
	pub async fn add_client(
		&self,
		registration: ClientRegistration,
	) -> Result<ClientId, BrokerError> {
		self.request(|reply| Command::AddClient(registration, reply))
			.await
	}

	/// Releases every subscription of the client. No delivery is queued for
	/// it once this returns.
	pub async fn remove_client(&self, id: ClientId) -> Result<(), BrokerError> {
		self.request(|reply| Command::RemoveClient(id, reply)).await
	}

	pub async fn subscribe_client(
		&self,
		client: ClientId,
		subscription: SubscriptionId,
		topic: Arc<Topic>,
	) -> Result<(), BrokerError> {
		self.request(|reply| Command::SubscribeClient {
			client,
			subscription,
			topic,
			reply,
		})
		.await?
	}

	pub async fn unsubscribe_client(
		&self,
		client: ClientId,
		subscription: SubscriptionId,
	) -> Result<(), BrokerError> {
		self.request(|reply| Command::UnsubscribeClient {
			client,
			subscription,
			reply,
		})
		.await?
	}

	pub async fn subscribe(
		&self,
		query: SubscribeQuery,
	) -> Result<(), BrokerError> {
		self.request(|reply| Command::Subscribe(query, reply)).await
	}

	/// Unknown topic keys are logged and ignored.
	pub async fn unsubscribe(
		&self,
		query: SubscribeQuery,
	) -> Result<(), BrokerError> {
		self.request(|reply| Command::Unsubscribe(query, reply)).await
	}

	/// Returns `false` if the link lost against the current one and was
	/// closed.
	pub async fn add_peer(&self, link: PeerLink) -> Result<bool, BrokerError> {
		self.request(|reply| Command::AddPeer(link, reply)).await
	}

	/// Returns `false` if `connection_id` is not the current link of `name`.
	pub async fn remove_peer(
		&self,
		name: impl Into<ArcStr>,
		connection_id: impl Into<ArcStr>,
	) -> Result<bool, BrokerError> {
		let name = name.into();
		let connection_id = connection_id.into();
		self.request(|reply| Command::RemovePeer {
			name,
			connection_id,
			reply,
		})
		.await
	}

	pub async fn snapshot(&self) -> Result<BrokerSnapshot, BrokerError> {
		self.request(Command::Snapshot).await
	}

	pub fn pubsub(&self) -> &Arc<PubSub> {
		&self.pubsub
	}

	pub fn context(&self) -> &NodeContext {
		&self.context
	}

	pub fn node_name(&self) -> &ArcStr {
		self.context.name()
	}
}
