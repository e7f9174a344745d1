//! Two-node meshes linked in process. `hub` always dials `cloud`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fleetbus::peer::{ConnectRequest, PeerConnectionError, PeerSocketHandle};
use fleetbus::{
	ClientFrame, MemoryNetwork, MemoryTransport, Node, NodeConfig, NodeRuntime,
	PeerClientConfig, PeerClientHandle, PeerConnector, PeerSettings, PeerState,
	Transport, TransportEvent,
};
use serde_json::{Value, json};

fn fast_settings() -> PeerSettings {
	PeerSettings {
		min_delay: Duration::from_millis(10),
		max_delay: Duration::from_millis(100),
		max_jitter: Duration::ZERO,
		ping_timeout: Duration::from_millis(500),
		probe_interval: Duration::from_millis(50),
		..PeerSettings::default()
	}
}

fn start(name: &str, peer: PeerSettings) -> (Node, NodeRuntime) {
	let mut config = NodeConfig::new(name);
	config.peer = peer;
	Node::start(config, None).unwrap()
}

fn cloud_url(settings: PeerSettings) -> PeerClientConfig {
	PeerClientConfig::from_url("mem://cloud")
		.unwrap()
		.with_settings(settings)
}

/// Polls `condition` until it holds, for at most two seconds.
async fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
	let polled = tokio::time::timeout(Duration::from_secs(2), async {
		while !condition() {
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
	})
	.await;
	assert!(polled.is_ok(), "timed out waiting for {what}");
}

struct TestClient {
	transport: MemoryTransport,
}

impl TestClient {
	async fn connect(node: &Node) -> Self {
		let (server, transport) = MemoryTransport::pair();
		node.accept_client(Box::new(server)).await.unwrap();
		Self { transport }
	}

	async fn subscribe(&mut self, topic: &str) {
		let request = json!({"type": "subscribe", "topic": topic});
		self.transport.send(request.to_string()).await.unwrap();
		assert!(matches!(
			self.recv().await,
			ClientFrame::SubscribeAck { .. }
		));
	}

	async fn recv(&mut self) -> ClientFrame {
		let event = tokio::time::timeout(
			Duration::from_secs(1),
			self.transport.next_event(),
		)
		.await
		.expect("no frame within a second");
		match event {
			| TransportEvent::Message(text) => serde_json::from_str(&text).unwrap(),
			| other => panic!("unexpected transport event {other:?}"),
		}
	}

	async fn recv_event(&mut self) -> (String, Value) {
		match self.recv().await {
			| ClientFrame::Event { topic, data, .. } => (topic, data),
			| other => panic!("expected event, got {other:?}"),
		}
	}

	async fn assert_silent(&mut self) {
		let event = tokio::time::timeout(
			Duration::from_millis(100),
			self.transport.next_event(),
		)
		.await;
		assert!(event.is_err(), "unexpected {event:?}");
	}
}

/// Upgrades straight into the remote node's acceptor and keeps the inbound
/// socket handles, so tests can cut a connection from the accepting side.
struct RecordingConnector {
	remote: Node,
	sockets: Mutex<Vec<PeerSocketHandle>>,
}

impl RecordingConnector {
	fn new(remote: &Node) -> Arc<Self> {
		Arc::new(Self {
			remote: remote.clone(),
			sockets: Mutex::new(Vec::new()),
		})
	}

	fn sockets(&self) -> Vec<PeerSocketHandle> {
		self.sockets.lock().unwrap().clone()
	}
}

#[async_trait]
impl PeerConnector for RecordingConnector {
	async fn connect(
		&self,
		request: &ConnectRequest,
	) -> Result<Box<dyn Transport>, PeerConnectionError> {
		let (local, remote) = MemoryTransport::pair();
		let socket = self
			.remote
			.peer_acceptor()
			.accept(&request.target(), Box::new(remote))?;
		self.sockets.lock().unwrap().push(socket);
		Ok(Box::new(local))
	}
}

struct Mesh {
	hub: Node,
	hub_runtime: NodeRuntime,
	cloud: Node,
	cloud_runtime: NodeRuntime,
	network: MemoryNetwork,
	link: PeerClientHandle,
}

impl Mesh {
	async fn start() -> Self {
		let (hub, hub_runtime) = start("hub", fast_settings());
		let (cloud, cloud_runtime) = start("cloud", fast_settings());
		let network = MemoryNetwork::new();
		network.register("cloud", cloud.peer_acceptor().clone());
		let link = hub.link_peer(
			cloud_url(fast_settings()),
			Arc::new(network.clone()),
		);
		assert_eq!(
			link.wait_for(PeerState::Connected).await,
			PeerState::Connected
		);
		Self {
			hub,
			hub_runtime,
			cloud,
			cloud_runtime,
			network,
			link,
		}
	}

	async fn shutdown(self) {
		self.link.close().await;
		self.hub_runtime.shutdown().await.unwrap();
		self.cloud_runtime.shutdown().await.unwrap();
	}
}

#[tokio::test]
async fn test_events_relay_across_the_link() {
	let mesh = Mesh::start().await;
	let mut client = TestClient::connect(&mesh.hub).await;
	client.subscribe("cloud/led/*/state").await;
	eventually("cloud to see the subscribe", || {
		mesh.cloud.pubsub().listener_count("cloud/led/*/state") == 1
	})
	.await;

	mesh.cloud
		.publish_stream("led", "led-1", "state", json!({"on": true}));
	let (topic, data) = client.recv_event().await;
	assert_eq!(topic, "cloud/led/led-1/state");
	assert_eq!(data, json!({"on": true}));

	let snapshot = mesh.hub.snapshot().await.unwrap();
	assert_eq!(snapshot.links, vec!["cloud".to_string()]);
	assert_eq!(mesh.cloud.metrics().peer_events_forwarded, 1);
	assert_eq!(mesh.hub.metrics().peer_events_relayed, 1);
	mesh.shutdown().await;
}

#[tokio::test]
async fn test_many_subscribers_share_one_upstream_subscribe() {
	let mesh = Mesh::start().await;
	let mut first = TestClient::connect(&mesh.hub).await;
	let mut second = TestClient::connect(&mesh.hub).await;
	first.subscribe("cloud/led/*/state").await;
	second.subscribe("cloud/led/*/state").await;
	eventually("cloud to see the subscribe", || {
		mesh.cloud.pubsub().listener_count("cloud/led/*/state") == 1
	})
	.await;

	let snapshot = mesh.hub.snapshot().await.unwrap();
	assert_eq!(snapshot.peers["cloud"]["cloud/led/*/state"], 2);

	mesh.cloud.publish_stream("led", "led-1", "state", 1);
	first.recv_event().await;
	second.recv_event().await;
	assert_eq!(mesh.cloud.metrics().peer_events_forwarded, 1);

	// Only the topic's own server is asked
	let mut local = TestClient::connect(&mesh.hub).await;
	local.subscribe("hub/led/*/state").await;
	tokio::time::sleep(Duration::from_millis(50)).await;
	assert_eq!(mesh.cloud.pubsub().listener_count("hub/led/*/state"), 0);
	mesh.shutdown().await;
}

#[tokio::test]
async fn test_relayed_events_are_not_echoed() {
	let mesh = Mesh::start().await;
	let mut on_hub = TestClient::connect(&mesh.hub).await;
	let mut on_cloud = TestClient::connect(&mesh.cloud).await;
	on_hub.subscribe("*/led/*/state").await;
	on_cloud.subscribe("*/led/*/state").await;
	eventually("both sides to see the subscribe", || {
		mesh.cloud.pubsub().listener_count("*/led/*/state") == 2
			&& mesh.hub.pubsub().listener_count("*/led/*/state") == 2
	})
	.await;

	mesh.cloud.publish_stream("led", "led-1", "state", "on");
	assert_eq!(on_cloud.recv_event().await.0, "cloud/led/led-1/state");
	assert_eq!(on_hub.recv_event().await.0, "cloud/led/led-1/state");
	on_cloud.assert_silent().await;
	on_hub.assert_silent().await;

	assert_eq!(mesh.cloud.metrics().peer_events_forwarded, 1);
	assert_eq!(mesh.hub.metrics().peer_events_forwarded, 0);
	mesh.shutdown().await;
}

#[tokio::test]
async fn test_unsubscribe_reaches_the_peer() {
	let mesh = Mesh::start().await;
	let mut client = TestClient::connect(&mesh.hub).await;
	client.subscribe("cloud/led/*/state").await;
	eventually("cloud to see the subscribe", || {
		mesh.cloud.pubsub().listener_count("cloud/led/*/state") == 1
	})
	.await;

	client
		.transport
		.send(json!({"type": "unsubscribe", "subscriptionId": 1}).to_string())
		.await
		.unwrap();
	assert!(matches!(
		client.recv().await,
		ClientFrame::UnsubscribeAck { .. }
	));
	eventually("cloud to drop the interest", || {
		mesh.cloud.pubsub().listener_count("cloud/led/*/state") == 0
	})
	.await;
	assert!(mesh.hub.snapshot().await.unwrap().peers.is_empty());
	mesh.shutdown().await;
}

#[tokio::test]
async fn test_reconnect_restores_interest() {
	let (hub, hub_runtime) = start("hub", fast_settings());
	let (cloud, cloud_runtime) = start("cloud", fast_settings());
	let connector = RecordingConnector::new(&cloud);
	let link = hub.link_peer(cloud_url(fast_settings()), connector.clone());
	link.wait_for(PeerState::Connected).await;

	let mut client = TestClient::connect(&hub).await;
	client.subscribe("cloud/led/*/state").await;
	eventually("cloud to see the subscribe", || {
		cloud.pubsub().listener_count("cloud/led/*/state") == 1
	})
	.await;

	connector.sockets()[0].close();
	eventually("a second connection", || {
		cloud.metrics().peer_connections == 2
	})
	.await;
	eventually("the subscribe to be replayed", || {
		connector.sockets().len() == 2
			&& cloud.pubsub().listener_count("cloud/led/*/state") == 1
	})
	.await;
	assert_eq!(link.state(), PeerState::Connected);

	cloud.publish_stream("led", "led-2", "state", "off");
	assert_eq!(client.recv_event().await.0, "cloud/led/led-2/state");

	link.close().await;
	hub_runtime.shutdown().await.unwrap();
	cloud_runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_peer_keeps_retrying() {
	let (hub, hub_runtime) = start("hub", fast_settings());
	let network = MemoryNetwork::new();
	let link = hub.link_peer(cloud_url(fast_settings()), Arc::new(network.clone()));
	tokio::time::sleep(Duration::from_millis(100)).await;
	assert_ne!(link.state(), PeerState::Connected);
	assert_ne!(link.state(), PeerState::Stopped);

	let (cloud, cloud_runtime) = start("cloud", fast_settings());
	network.register("cloud", cloud.peer_acceptor().clone());
	let connected = tokio::time::timeout(
		Duration::from_secs(2),
		link.wait_for(PeerState::Connected),
	)
	.await
	.unwrap();
	assert_eq!(connected, PeerState::Connected);

	link.close().await;
	hub_runtime.shutdown().await.unwrap();
	cloud_runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_silent_acceptor_triggers_ping_timeout() {
	let (hub, hub_runtime) = start("hub", fast_settings());
	let (cloud, cloud_runtime) = start("cloud", PeerSettings {
		probe_interval: Duration::from_secs(60),
		..fast_settings()
	});
	let network = MemoryNetwork::new();
	network.register("cloud", cloud.peer_acceptor().clone());
	let link = hub.link_peer(
		cloud_url(PeerSettings {
			ping_timeout: Duration::from_millis(100),
			..fast_settings()
		}),
		Arc::new(network),
	);
	link.wait_for(PeerState::Connected).await;

	eventually("the link to be re-established", || {
		cloud.metrics().peer_connections >= 2
	})
	.await;

	link.close().await;
	hub_runtime.shutdown().await.unwrap();
	cloud_runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_inbound_health_tracks_pongs() {
	let (hub, hub_runtime) = start("hub", fast_settings());
	let (cloud, cloud_runtime) = start("cloud", fast_settings());
	let connector = RecordingConnector::new(&cloud);
	let link = hub.link_peer(cloud_url(fast_settings()), connector.clone());
	link.wait_for(PeerState::Connected).await;

	let socket = connector.sockets()[0].clone();
	eventually("a pong", || socket.health().last_pong_ms.is_some()).await;
	assert_eq!(socket.health().missed_pongs, 0);

	link.close().await;
	tokio::time::timeout(Duration::from_secs(1), socket.closed())
		.await
		.unwrap();
	hub_runtime.shutdown().await.unwrap();
	cloud_runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_close_stops_the_client() {
	let mesh = Mesh::start().await;
	mesh.link.close().await;
	assert_eq!(mesh.link.state(), PeerState::Stopped);
	assert!(mesh.link.is_closed());

	let cloud = mesh.cloud.clone();
	for node in [&mesh.hub, &cloud] {
		let unlinked = tokio::time::timeout(Duration::from_secs(2), async {
			while !node.snapshot().await.unwrap().links.is_empty() {
				tokio::time::sleep(Duration::from_millis(10)).await;
			}
		})
		.await;
		assert!(unlinked.is_ok(), "{} still linked", node.name());
	}

	// No reconnect after close, even with the remote reachable
	mesh.network.register("cloud", cloud.peer_acceptor().clone());
	tokio::time::sleep(Duration::from_millis(100)).await;
	assert_eq!(cloud.metrics().peer_connections, 1);
	mesh.shutdown().await;
}
