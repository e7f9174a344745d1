//! Node facade: one broker, its pub/sub bus and the sessions around it

use std::sync::Arc;

use arcstr::ArcStr;
use serde_json::Value;
use tracing::info;

use crate::config::{NodeConfig, PeerClientConfig};
use crate::context::NodeContext;
use crate::error::Result;
use crate::peer::{
	PeerAcceptor, PeerClient, PeerClientHandle, PeerConnector, PeerSocketHandle,
};
use crate::pubsub::PubSub;
use crate::registry::Registry;
use crate::routing::{
	BrokerSnapshot, EventBrokerActor, EventBrokerHandle, MetricsSnapshot,
};
use crate::runtime::NodeRuntime;
use crate::session::{ClientSession, ClientSessionHandle};
use crate::transport::Transport;

/// A running fleetbus node.
///
/// Cheap to clone. The paired [`NodeRuntime`] owns the node's lifetime and
/// must be shut down explicitly.
///
/// # Example
/// ```rust,no_run
/// use fleetbus::{Node, NodeConfig};
/// use serde_json::json;
///
/// # async fn run() -> fleetbus::Result<()> {
/// let (node, runtime) = Node::start(NodeConfig::new("hub"), None)?;
/// node.publish_stream("led", "led-1", "state", json!({"on": true}));
/// runtime.shutdown().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Node {
	config: Arc<NodeConfig>,
	broker: EventBrokerHandle,
	acceptor: PeerAcceptor,
}

impl Node {
	/// Validates `config` and spawns the node's broker. Must be called
	/// within a Tokio runtime.
	pub fn start(
		config: NodeConfig,
		registry: Option<Arc<dyn Registry>>,
	) -> Result<(Node, NodeRuntime)> {
		config.validate()?;
		let context = NodeContext::new(config.name.clone());
		let pubsub = Arc::new(PubSub::new(
			config.settings.topic_cache_size,
			config.settings.send_cache_size,
		));
		let (controller, broker) = EventBrokerActor::spawn(
			context.clone(),
			pubsub,
			registry,
			config.settings.command_channel_capacity,
		);
		let acceptor = PeerAcceptor::new(broker.clone(), config.peer.clone());
		info!(parent: context.span(), "Node started");

		let node = Node {
			config: Arc::new(config),
			broker,
			acceptor,
		};
		Ok((node, NodeRuntime::new(context, controller)))
	}

	pub fn name(&self) -> &ArcStr {
		&self.config.name
	}

	pub fn config(&self) -> &NodeConfig {
		&self.config
	}

	/// Publishes `data` on a concrete topic. Returns how many listeners
	/// received it.
	pub fn publish(&self, topic: &str, data: impl Into<Value>) -> usize {
		self.broker.pubsub().publish(topic, Arc::new(data.into()))
	}

	/// Publishes on this node's stream topic
	/// `<node>/<device_type>/<device_id>/<stream>`.
	pub fn publish_stream(
		&self,
		device_type: &str,
		device_id: &str,
		stream: &str,
		data: impl Into<Value>,
	) -> usize {
		let topic =
			format!("{}/{device_type}/{device_id}/{stream}", self.config.name);
		self.publish(&topic, data)
	}

	pub fn pubsub(&self) -> &Arc<PubSub> {
		self.broker.pubsub()
	}

	pub fn broker(&self) -> &EventBrokerHandle {
		&self.broker
	}

	pub fn metrics(&self) -> MetricsSnapshot {
		self.broker.context().metrics().snapshot()
	}

	pub async fn snapshot(&self) -> Result<BrokerSnapshot> {
		Ok(self.broker.snapshot().await?)
	}

	/// Serves the client event protocol on `transport`.
	pub async fn accept_client(
		&self,
		transport: Box<dyn Transport>,
	) -> Result<ClientSessionHandle> {
		self.accept_client_with_topics(transport, Vec::new()).await
	}

	/// Like [`Node::accept_client`], with topics subscribed up front as if
	/// the client had requested them.
	pub async fn accept_client_with_topics(
		&self,
		transport: Box<dyn Transport>,
		topics: Vec<String>,
	) -> Result<ClientSessionHandle> {
		let handle = ClientSession::start(
			self.broker.clone(),
			transport,
			topics,
			self.config.settings.delivery_channel_capacity,
		)
		.await?;
		Ok(handle)
	}

	pub fn peer_acceptor(&self) -> &PeerAcceptor {
		&self.acceptor
	}

	/// Serves an inbound peer upgrade for `target`
	/// (`/peers/<name>?connectionId=<id>`).
	pub fn accept_peer(
		&self,
		target: &str,
		transport: Box<dyn Transport>,
	) -> Result<PeerSocketHandle> {
		Ok(self.acceptor.accept(target, transport)?)
	}

	/// Starts a reconnecting outbound link to the node at `config.url`.
	pub fn link_peer(
		&self,
		config: PeerClientConfig,
		connector: Arc<dyn PeerConnector>,
	) -> PeerClientHandle {
		let span = self.broker.context().span();
		info!(parent: span, url = %config.url, "Linking peer");
		PeerClient::spawn(self.broker.clone(), config, connector)
	}
}
