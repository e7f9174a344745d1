use std::time::Duration;

use arcstr::ArcStr;
use percent_encoding::percent_decode_str;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use url::form_urlencoded;

use super::error::PeerConnectionError;
use super::frame::PeerFrame;
use super::link::{LinkCommand, LinkDirection, PeerLink};
use super::tunnel::{Inbound, PeerTunnel, send_frame};
use crate::clock::now_millis;
use crate::config::PeerSettings;
use crate::routing::EventBrokerHandle;
use crate::transport::{Transport, TransportEvent};

const PEERS_PATH: &str = "/peers/";

/// Liveness of an inbound link as seen from the pings this node sends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerHealth {
	/// Consecutive probes that went unanswered
	pub missed_pongs: u32,
	pub last_pong_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct InboundRequest {
	name: ArcStr,
	connection_id: ArcStr,
}

fn parse_target(target: &str) -> Result<InboundRequest, PeerConnectionError> {
	let (path, query) = target.split_once('?').unwrap_or((target, ""));
	let raw_name = path.strip_prefix(PEERS_PATH).ok_or_else(|| {
		PeerConnectionError::invalid_request(target, "expected /peers/<name>")
	})?;
	let name = percent_decode_str(raw_name).decode_utf8_lossy();
	if name.is_empty() || name.contains('/') {
		return Err(PeerConnectionError::invalid_request(
			target,
			"invalid peer name",
		));
	}
	let connection_id = form_urlencoded::parse(query.as_bytes())
		.find(|(key, _)| key == "connectionId")
		.map(|(_, value)| value.into_owned())
		.filter(|value| !value.is_empty())
		.ok_or_else(|| {
			PeerConnectionError::invalid_request(target, "missing connectionId")
		})?;
	Ok(InboundRequest {
		name: ArcStr::from(name.as_ref()),
		connection_id: ArcStr::from(connection_id),
	})
}

/// Accepts peer upgrades for one node.
#[derive(Debug, Clone)]
pub struct PeerAcceptor {
	broker: EventBrokerHandle,
	settings: PeerSettings,
}

impl PeerAcceptor {
	pub fn new(broker: EventBrokerHandle, settings: PeerSettings) -> Self {
		Self { broker, settings }
	}

	/// Takes over an upgraded connection for `target`
	/// (`/peers/<name>?connectionId=<id>`) and starts serving it.
	pub fn accept(
		&self,
		target: &str,
		transport: Box<dyn Transport>,
	) -> Result<PeerSocketHandle, PeerConnectionError> {
		let request = parse_target(target)?;
		let context = self.broker.context();
		if request.name == *context.name() {
			return Err(PeerConnectionError::invalid_request(
				target,
				"peer name equals the local node name",
			));
		}
		if context.shutdown_token().is_cancelled() {
			return Err(PeerConnectionError::Handshake { status: 503 });
		}

		let (link, commands) = PeerLink::new(
			request.name.clone(),
			request.connection_id.clone(),
			LinkDirection::Inbound,
		);
		let (health_tx, health_rx) = watch::channel(PeerHealth::default());
		let tunnel = PeerTunnel::new(
			&self.broker,
			link.clone(),
			transport.connection_id(),
		);
		let socket = PeerSocket {
			broker: self.broker.clone(),
			probe_interval: self.settings.probe_interval,
			tunnel,
			commands,
			transport,
			health: health_tx,
		};
		debug!(
			peer = %request.name,
			connection_id = %request.connection_id,
			"Accepted peer connection"
		);
		context.spawn(socket.run());
		Ok(PeerSocketHandle {
			link,
			health: health_rx,
		})
	}
}

/// Observer of one inbound link.
#[derive(Debug, Clone)]
pub struct PeerSocketHandle {
	link: PeerLink,
	health: watch::Receiver<PeerHealth>,
}

impl PeerSocketHandle {
	pub fn link(&self) -> &PeerLink {
		&self.link
	}

	pub fn health(&self) -> PeerHealth {
		*self.health.borrow()
	}

	/// Resolves once the connection task has finished.
	pub async fn closed(&self) {
		let mut health = self.health.clone();
		while health.changed().await.is_ok() {}
	}

	pub fn close(&self) {
		self.link.close();
	}
}

struct PeerSocket {
	broker: EventBrokerHandle,
	probe_interval: Duration,
	tunnel: PeerTunnel,
	commands: mpsc::UnboundedReceiver<LinkCommand>,
	transport: Box<dyn Transport>,
	health: watch::Sender<PeerHealth>,
}

impl PeerSocket {
	async fn run(mut self) {
		let link = self.tunnel.link().clone();
		let confirm = PeerFrame::Confirm {
			connection_id: link.connection_id().to_string(),
			name: self.broker.node_name().to_string(),
		};
		if let Err(err) = send_frame(self.transport.as_mut(), &confirm).await {
			warn!(peer = %link.name(), error = %err, "Failed to confirm peer");
			self.transport.close().await;
			return;
		}
		match self.broker.add_peer(link.clone()).await {
			| Ok(true) => {}
			| Ok(false) => {
				self.transport.close().await;
				return;
			}
			| Err(err) => {
				warn!(peer = %link.name(), error = %err, "Broker unavailable");
				self.transport.close().await;
				return;
			}
		}

		self.serve(&link).await;

		self.tunnel.teardown();
		self.transport.close().await;
		match self
			.broker
			.remove_peer(link.name().clone(), link.connection_id().clone())
			.await
		{
			| Ok(_) => {}
			| Err(err) => {
				debug!(
					peer = %link.name(),
					error = %err,
					"Peer removal skipped"
				);
			}
		}
		info!(
			peer = %link.name(),
			connection_id = %link.connection_id(),
			"Inbound peer connection closed"
		);
	}

	async fn serve(&mut self, link: &PeerLink) {
		let shutdown = self.broker.context().shutdown_token().clone();
		let mut probe = tokio::time::interval_at(
			Instant::now() + self.probe_interval,
			self.probe_interval,
		);
		probe.set_missed_tick_behavior(MissedTickBehavior::Delay);
		let mut awaiting_pong = false;

		loop {
			tokio::select! {
				_ = shutdown.cancelled() => break,
				_ = probe.tick() => {
					if awaiting_pong {
						self.health.send_modify(|h| h.missed_pongs += 1);
						debug!(
							peer = %link.name(),
							missed_pongs = self.health.borrow().missed_pongs,
							"Peer missed a pong"
						);
					}
					awaiting_pong = true;
					let ping = PeerFrame::Ping { timestamp: now_millis() };
					let sent = send_frame(self.transport.as_mut(), &ping).await;
					if let Err(err) = sent {
						warn!(peer = %link.name(), error = %err, "Ping failed");
						break;
					}
				}
				command = self.commands.recv() => match command {
					| Some(LinkCommand::Frame(frame)) => {
						let sent = send_frame(self.transport.as_mut(), &frame).await;
						if let Err(err) = sent {
							warn!(
								peer = %link.name(),
								frame = frame.kind(),
								error = %err,
								"Peer send failed"
							);
							break;
						}
					}
					| Some(LinkCommand::Close) | None => break,
				},
				event = self.transport.next_event() => match event {
					| TransportEvent::Message(text) => {
						match self.tunnel.handle_text(&text) {
							| Some(Inbound::Ping(timestamp)) => {
								let pong = PeerFrame::Pong { timestamp };
								let transport = self.transport.as_mut();
								if send_frame(transport, &pong).await.is_err() {
									break;
								}
							}
							| Some(Inbound::Pong(_)) => {
								awaiting_pong = false;
								self.health.send_modify(|h| {
									h.missed_pongs = 0;
									h.last_pong_ms = Some(now_millis());
								});
							}
							| Some(Inbound::Confirm { .. }) => {
								debug!(peer = %link.name(), "Confirm on inbound link");
							}
							| Some(Inbound::Handled) | None => {}
						}
					}
					| TransportEvent::Error(err) => {
						warn!(
							peer = %link.name(),
							error = %err,
							"Peer transport error"
						);
						break;
					}
					| TransportEvent::Closed => break,
				},
			}
		}
	}
}
