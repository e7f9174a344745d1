use std::sync::Arc;
use std::time::Duration;

use arcstr::ArcStr;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use super::backoff::Backoff;
use super::connector::{ConnectRequest, PeerConnector};
use super::error::PeerConnectionError;
use super::frame::PeerFrame;
use super::link::{LinkCommand, LinkDirection, PeerLink};
use super::tunnel::{Inbound, PeerTunnel, send_frame};
use crate::codec::{FrameCodec, JsonCodec};
use crate::config::PeerClientConfig;
use crate::routing::EventBrokerHandle;
use crate::transport::{Transport, TransportError, TransportEvent};

/// Lifecycle of an outbound peer link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
	Disconnected,
	Connecting,
	Connected,
	/// Terminal; set after `close()`
	Stopped,
}

/// Why one connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
	/// Reconnect after backoff
	Lost,
	/// Stop for good
	Stopped,
}

/// Keeps one outbound link to a remote node alive, reconnecting with
/// backoff until closed.
pub struct PeerClient {
	broker: EventBrokerHandle,
	url: Url,
	protocol: String,
	ping_timeout: Duration,
	backoff: Backoff,
	connector: Arc<dyn PeerConnector>,
	state: watch::Sender<PeerState>,
	cancel: CancellationToken,
	retry_count: u32,
}

impl PeerClient {
	pub fn spawn(
		broker: EventBrokerHandle,
		config: PeerClientConfig,
		connector: Arc<dyn PeerConnector>,
	) -> PeerClientHandle {
		let cancel = broker.context().shutdown_token().child_token();
		let (state, state_rx) = watch::channel(PeerState::Disconnected);
		let client = Self {
			broker: broker.clone(),
			url: config.url.clone(),
			protocol: config.settings.transport_protocol.clone(),
			ping_timeout: config.settings.ping_timeout,
			backoff: Backoff::from_settings(&config.settings),
			connector,
			state,
			cancel: cancel.clone(),
			retry_count: 0,
		};
		broker.context().spawn(client.run());
		PeerClientHandle {
			url: config.url,
			state: state_rx,
			cancel,
		}
	}

	async fn run(mut self) {
		info!(peer_url = %self.url, "Peer client started");
		loop {
			let attempt = self.retry_count;
			let delay = self.backoff.delay(attempt);
			self.retry_count = self.retry_count.saturating_add(1);
			if !delay.is_zero() {
				debug!(
					peer_url = %self.url,
					attempt,
					delay_ms = delay.as_millis() as u64,
					"Waiting before reconnect"
				);
				tokio::select! {
					_ = self.cancel.cancelled() => break,
					_ = tokio::time::sleep(delay) => {}
				}
			}
			if self.cancel.is_cancelled() {
				break;
			}
			if self.connect_once().await == Outcome::Stopped {
				break;
			}
			self.set_state(PeerState::Disconnected);
		}
		self.set_state(PeerState::Stopped);
		info!(peer_url = %self.url, "Peer client stopped");
	}

	fn set_state(&self, state: PeerState) {
		self.state.send_replace(state);
	}

	async fn connect_once(&mut self) -> Outcome {
		self.set_state(PeerState::Connecting);
		let connection_id = ArcStr::from(Uuid::new_v4().to_string());
		let request = match ConnectRequest::new(
			&self.url,
			self.broker.node_name(),
			&connection_id,
			&self.protocol,
		) {
			| Ok(request) => request,
			| Err(err) => {
				error!(peer_url = %self.url, error = %err, "Unusable peer URL");
				return Outcome::Stopped;
			}
		};

		let connected = tokio::select! {
			_ = self.cancel.cancelled() => return Outcome::Stopped,
			result = self.connector.connect(&request) => result,
		};
		let mut transport = match connected {
			| Ok(transport) => transport,
			| Err(err) => {
				warn!(
					peer_url = %self.url,
					error = %err,
					error_type = err.error_type(),
					"Peer connection failed"
				);
				return Outcome::Lost;
			}
		};

		let confirmed =
			self.await_confirm(transport.as_mut(), &connection_id).await;
		let outcome = match confirmed {
			| Ok(name) => {
				self.serve(transport.as_mut(), name, connection_id).await
			}
			| Err(Some(err)) => {
				warn!(
					peer_url = %self.url,
					error = %err,
					"Peer handshake failed"
				);
				Outcome::Lost
			}
			| Err(None) => Outcome::Stopped,
		};
		transport.close().await;
		outcome
	}

	/// Waits for the remote's confirmation of `connection_id`. `Err(None)`
	/// means the client was closed meanwhile.
	async fn await_confirm(
		&self,
		transport: &mut dyn Transport,
		connection_id: &str,
	) -> Result<ArcStr, Option<PeerConnectionError>> {
		let timeout = self.ping_timeout;
		let deadline = tokio::time::sleep(timeout);
		tokio::pin!(deadline);
		loop {
			let event = tokio::select! {
				_ = self.cancel.cancelled() => return Err(None),
				_ = &mut deadline => {
					return Err(Some(PeerConnectionError::Timeout(timeout)));
				}
				event = transport.next_event() => event,
			};
			let text = match event {
				| TransportEvent::Message(text) => text,
				| TransportEvent::Error(err) => return Err(Some(err.into())),
				| TransportEvent::Closed => {
					return Err(Some(TransportError::Closed.into()));
				}
			};
			match FrameCodec::<PeerFrame>::decode(&JsonCodec, &text) {
				| Ok(PeerFrame::Confirm {
					connection_id: received,
					name,
				}) => {
					if received != connection_id {
						return Err(Some(PeerConnectionError::ConfirmMismatch {
							expected: connection_id.to_string(),
							received,
						}));
					}
					return Ok(ArcStr::from(name));
				}
				| Ok(PeerFrame::Ping { timestamp }) => {
					deadline.as_mut().reset(Instant::now() + timeout);
					send_frame(transport, &PeerFrame::Pong { timestamp })
						.await
						.map_err(|e| Some(e.into()))?;
				}
				| Ok(frame) => {
					debug!(
						frame = frame.kind(),
						"Frame before confirmation ignored"
					);
				}
				| Err(err) => {
					warn!(error = %err, "Dropping malformed peer frame");
				}
			}
		}
	}

	async fn serve(
		&mut self,
		transport: &mut dyn Transport,
		name: ArcStr,
		connection_id: ArcStr,
	) -> Outcome {
		let (link, mut commands) = PeerLink::new(
			name.clone(),
			connection_id.clone(),
			LinkDirection::Outbound,
		);
		let mut tunnel = PeerTunnel::new(
			&self.broker,
			link.clone(),
			transport.connection_id(),
		);
		match self.broker.add_peer(link.clone()).await {
			| Ok(true) => {}
			| Ok(false) => {
				debug!(peer = %name, "Outbound link lost to the inbound one");
				return Outcome::Lost;
			}
			| Err(err) => {
				debug!(peer = %name, error = %err, "Broker gone");
				return Outcome::Stopped;
			}
		}
		self.retry_count = 0;
		self.set_state(PeerState::Connected);
		info!(
			peer = %name,
			connection_id = %connection_id,
			"Peer link established"
		);

		let timeout = self.ping_timeout;
		let deadline = tokio::time::sleep(timeout);
		tokio::pin!(deadline);
		let outcome = loop {
			tokio::select! {
				_ = self.cancel.cancelled() => break Outcome::Stopped,
				_ = &mut deadline => {
					warn!(
						peer = %name,
						timeout_ms = timeout.as_millis() as u64,
						"Peer ping timeout, reconnecting"
					);
					break Outcome::Lost;
				}
				command = commands.recv() => match command {
					| Some(LinkCommand::Frame(frame)) => {
						if let Err(err) = send_frame(transport, &frame).await {
							warn!(
								peer = %name,
								frame = frame.kind(),
								error = %err,
								"Peer send failed"
							);
							break Outcome::Lost;
						}
					}
					| Some(LinkCommand::Close) | None => break Outcome::Lost,
				},
				event = transport.next_event() => match event {
					| TransportEvent::Message(text) => {
						match tunnel.handle_text(&text) {
							| Some(Inbound::Ping(timestamp)) => {
								deadline.as_mut().reset(Instant::now() + timeout);
								let pong = PeerFrame::Pong { timestamp };
								if send_frame(transport, &pong).await.is_err() {
									break Outcome::Lost;
								}
							}
							| Some(Inbound::Confirm { .. }) => {
								debug!(peer = %name, "Duplicate confirm ignored");
							}
							| Some(Inbound::Pong(_) | Inbound::Handled) | None => {}
						}
					}
					| TransportEvent::Error(err) => {
						warn!(peer = %name, error = %err, "Peer transport error");
						break Outcome::Lost;
					}
					| TransportEvent::Closed => {
						info!(peer = %name, "Peer closed the connection");
						break Outcome::Lost;
					}
				},
			}
		};

		tunnel.teardown();
		let removed = self.broker.remove_peer(name.clone(), connection_id).await;
		if let Err(err) = removed {
			debug!(peer = %name, error = %err, "Peer removal skipped");
		}
		outcome
	}
}

/// Control of a running [`PeerClient`].
#[derive(Debug, Clone)]
pub struct PeerClientHandle {
	url: Url,
	state: watch::Receiver<PeerState>,
	cancel: CancellationToken,
}

impl PeerClientHandle {
	pub fn url(&self) -> &Url {
		&self.url
	}

	pub fn state(&self) -> PeerState {
		*self.state.borrow()
	}

	/// Resolves when the client reaches `state`, or immediately if it
	/// already stopped.
	pub async fn wait_for(&self, state: PeerState) -> PeerState {
		let mut receiver = self.state.clone();
		let result = receiver
			.wait_for(|current| {
				*current == state || *current == PeerState::Stopped
			})
			.await
			.map(|current| *current);
		result.unwrap_or(PeerState::Stopped)
	}

	/// Stops reconnecting, closes the current connection and waits for the
	/// task to finish. Terminal.
	pub async fn close(&self) {
		self.cancel.cancel();
		self.wait_for(PeerState::Stopped).await;
	}

	pub fn is_closed(&self) -> bool {
		self.cancel.is_cancelled()
	}
}
