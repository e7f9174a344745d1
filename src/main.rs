//! Two in-process nodes, `hub` and `cloud`, linked over a memory network.
//! A client connected to `hub` follows LED state published on `cloud`.
//!
//! ```bash
//! RUST_LOG=fleetbus=debug cargo run --bin fleetbus-demo
//! ```

use std::sync::Arc;
use std::time::Duration;

use fleetbus::{
	ClientFrame, MemoryNetwork, MemoryTransport, Node, NodeConfig,
	PeerClientConfig, PeerState, Transport, TransportEvent,
};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Tracing follows `RUST_LOG`; silent when it is unset.
fn setup_tracing() {
	if std::env::var("RUST_LOG").is_err() {
		return;
	}
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| "info".into());
	tracing_subscriber::registry()
		.with(filter)
		.with(tracing_subscriber::fmt::layer().with_target(true).compact())
		.init();
}

async fn next_frame(client: &mut MemoryTransport) -> Option<ClientFrame> {
	let event =
		tokio::time::timeout(Duration::from_secs(2), client.next_event()).await;
	match event {
		| Ok(TransportEvent::Message(text)) => serde_json::from_str(&text).ok(),
		| _ => None,
	}
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	setup_tracing();

	let network = MemoryNetwork::new();
	let (hub, hub_runtime) = Node::start(NodeConfig::new("hub"), None)?;
	let (cloud, cloud_runtime) = Node::start(NodeConfig::new("cloud"), None)?;
	network.register("cloud", cloud.peer_acceptor().clone());

	let link =
		hub.link_peer(PeerClientConfig::from_url("mem://cloud")?, Arc::new(network));
	let state = link.wait_for(PeerState::Connected).await;
	println!("hub -> cloud link: {state:?}");

	let (server, mut client) = MemoryTransport::pair();
	hub.accept_client(Box::new(server)).await?;
	client
		.send(
			json!({"type": "subscribe", "topic": "cloud/led/*/state", "limit": 3})
				.to_string(),
		)
		.await?;
	if let Some(ack) = next_frame(&mut client).await {
		println!("<- {ack:?}");
	}
	// Let the upstream subscribe reach the cloud node
	tokio::time::sleep(Duration::from_millis(100)).await;

	for (n, on) in [true, false, true, true].into_iter().enumerate() {
		let id = format!("led-{}", n % 2);
		let delivered =
			cloud.publish_stream("led", &id, "state", json!({"on": on}));
		println!("-> cloud/led/{id}/state on={on} ({delivered} listeners)");
	}
	while let Some(frame) = next_frame(&mut client).await {
		println!("<- {frame:?}");
		if matches!(frame, ClientFrame::UnsubscribeAck { .. }) {
			break;
		}
	}

	println!("hub metrics: {:?}", hub.metrics());
	println!("cloud metrics: {:?}", cloud.metrics());

	link.close().await;
	client.close().await;
	hub_runtime.shutdown().await?;
	cloud_runtime.shutdown().await?;
	Ok(())
}
