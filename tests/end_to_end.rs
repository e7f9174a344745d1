//! Single-node tests driving the client event protocol through
//! [`Node::accept_client`] over in-memory transports.

use std::sync::Arc;
use std::time::Duration;

use fleetbus::{
	ClientFrame, DeviceRecord, FleetError, MemoryRegistry, MemoryTransport, Node,
	NodeConfig, NodeRuntime, Registry, Transport, TransportEvent,
};
use serde_json::{Value, json};

struct TestClient {
	transport: MemoryTransport,
}

impl TestClient {
	async fn connect(node: &Node) -> Self {
		let (server, transport) = MemoryTransport::pair();
		node.accept_client(Box::new(server)).await.unwrap();
		Self { transport }
	}

	async fn send(&mut self, request: Value) {
		self.transport.send(request.to_string()).await.unwrap();
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

	async fn assert_silent(&mut self) {
		let event = tokio::time::timeout(
			Duration::from_millis(50),
			self.transport.next_event(),
		)
		.await;
		assert!(event.is_err(), "unexpected {event:?}");
	}

	async fn subscribe(&mut self, topic: &str) -> ClientFrame {
		self.send(json!({"type": "subscribe", "topic": topic})).await;
		self.recv().await
	}
}

fn start(name: &str) -> (Node, NodeRuntime) {
	Node::start(NodeConfig::new(name), None).unwrap()
}

#[tokio::test]
async fn test_ack_precedes_events_and_others_stay_silent() {
	let (node, runtime) = start("hub");
	let mut leds = TestClient::connect(&node).await;
	let mut motion = TestClient::connect(&node).await;

	let ack = leds.subscribe("hub/led/*/state").await;
	assert!(matches!(
		&ack,
		ClientFrame::SubscribeAck { topic, .. } if topic == "hub/led/*/state"
	));
	assert!(matches!(
		motion.subscribe("hub/motion/*/state").await,
		ClientFrame::SubscribeAck { .. }
	));

	assert_eq!(
		node.publish_stream("led", "led-1", "state", json!({"on": true})),
		1
	);
	match leds.recv().await {
		| ClientFrame::Event {
			topic,
			subscription_id,
			data,
			..
		} => {
			assert_eq!(topic, "hub/led/led-1/state");
			assert_eq!(Some(subscription_id), ack.subscription_id());
			assert_eq!(data, json!({"on": true}));
		}
		| other => panic!("expected event, got {other:?}"),
	}
	motion.assert_silent().await;
	runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_limit_of_ten_with_fifteen_publishes() {
	let (node, runtime) = start("hub");
	let mut client = TestClient::connect(&node).await;
	client
		.send(json!({"type": "subscribe", "topic": "hub/led/*/state", "limit": 10}))
		.await;
	let id = client.recv().await.subscription_id().unwrap();

	for n in 0 .. 15 {
		node.publish_stream("led", "led-1", "state", json!(n));
	}

	for n in 0 .. 10 {
		match client.recv().await {
			| ClientFrame::Event { data, .. } => assert_eq!(data, json!(n)),
			| other => panic!("expected event {n}, got {other:?}"),
		}
	}
	assert!(matches!(
		client.recv().await,
		ClientFrame::UnsubscribeAck { subscription_id, .. } if subscription_id == id
	));
	client.assert_silent().await;
	assert!(node.snapshot().await.unwrap().local.is_empty());
	runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_overlapping_subscriptions_share_one_listener() {
	let (node, runtime) = start("hub");
	let mut first = TestClient::connect(&node).await;
	let mut second = TestClient::connect(&node).await;
	first.subscribe("hub/led/*/state").await;
	second.subscribe("hub/led/*/state").await;
	first.subscribe("hub/**").await;

	assert_eq!(node.pubsub().listener_count("hub/led/*/state"), 1);
	let snapshot = node.snapshot().await.unwrap();
	assert_eq!(snapshot.local.get("hub/led/*/state"), Some(&2));
	assert_eq!(snapshot.local.get("hub/**"), Some(&1));
	assert_eq!(snapshot.clients, 2);

	node.publish("hub/led/led-1/state", "on");
	let mut ids = vec![
		first.recv().await.subscription_id().unwrap(),
		first.recv().await.subscription_id().unwrap(),
	];
	ids.sort();
	ids.dedup();
	assert_eq!(ids.len(), 2);
	assert!(matches!(second.recv().await, ClientFrame::Event { .. }));
	runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_percent_encoded_publication() {
	let (node, runtime) = start("hub");
	let mut client = TestClient::connect(&node).await;
	client.subscribe("hub/led/{kitchen .*}/state").await;

	node.publish("hub/led/kitchen%20lamp/state", 1);
	match client.recv().await {
		| ClientFrame::Event { topic, .. } => {
			assert_eq!(topic, "hub/led/kitchen lamp/state")
		}
		| other => panic!("expected event, got {other:?}"),
	}
	runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_device_query_subscription() {
	let registry = Arc::new(MemoryRegistry::new());
	registry
		.save(DeviceRecord::new("led-1", "led").with_name("kitchen"))
		.await
		.unwrap();
	let (node, runtime) = Node::start(
		NodeConfig::new("hub"),
		Some(registry.clone() as Arc<dyn Registry>),
	)
	.unwrap();
	let mut client = TestClient::connect(&node).await;

	assert!(matches!(
		client.subscribe("query/select id where type = \"led\"").await,
		ClientFrame::SubscribeAck { .. }
	));
	match client.recv().await {
		| ClientFrame::Event { data, .. } => {
			assert_eq!(data, json!({"id": "led-1"}))
		}
		| other => panic!("expected device, got {other:?}"),
	}

	registry.save(DeviceRecord::new("fan-1", "fan")).await.unwrap();
	registry.save(DeviceRecord::new("led-2", "led")).await.unwrap();
	match client.recv().await {
		| ClientFrame::Event { data, .. } => {
			assert_eq!(data, json!({"id": "led-2"}))
		}
		| other => panic!("expected device, got {other:?}"),
	}
	runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_clients() {
	let (node, runtime) = start("hub");
	let mut client = TestClient::connect(&node).await;
	client.subscribe("hub/led/*/state").await;

	runtime.shutdown().await.unwrap();
	let event =
		tokio::time::timeout(Duration::from_secs(1), client.transport.next_event())
			.await
			.unwrap();
	assert_eq!(event, TransportEvent::Closed);

	let (server, _client) = MemoryTransport::pair();
	assert!(matches!(
		node.accept_client(Box::new(server)).await,
		Err(FleetError::Broker(_))
	));
}

#[tokio::test]
async fn test_invalid_configuration_is_rejected() {
	for name in ["", "hub/one"] {
		assert!(matches!(
			Node::start(NodeConfig::new(name), None),
			Err(FleetError::ConfigurationValue(_))
		));
	}

	let (node, runtime) = start("hub");
	let (server, _client) = MemoryTransport::pair();
	let rejected = node.accept_peer("/peers/hub?connectionId=abc", Box::new(server));
	assert!(matches!(rejected, Err(FleetError::PeerConnection(_))));
	runtime.shutdown().await.unwrap();
}
