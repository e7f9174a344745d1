use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, trace, warn};

use super::error::ProtocolError;
use super::frame::{ClientFrame, ClientRequest};
use crate::clock::now_millis;
use crate::codec::{FrameCodec, JsonCodec};
use crate::routing::{
	BrokerError, ClientId, ClientRegistration, Delivery, EventBrokerHandle,
	SubscriptionId,
};
use crate::topic::Topic;
use crate::transport::{ConnectionId, Transport, TransportEvent};

struct SessionSubscription {
	topic: Arc<Topic>,
	limit: Option<u64>,
	matched: u64,
}

/// One client's multiplexed view of the node over a single transport.
///
/// Runs as one task: requests, deliveries and outbound frames are handled in
/// sequence, so a `subscribe-ack` always goes out before the first event of
/// its subscription.
pub struct ClientSession {
	broker: EventBrokerHandle,
	client_id: ClientId,
	transport: Box<dyn Transport>,
	deliveries: mpsc::Receiver<Delivery>,
	subscriptions: HashMap<SubscriptionId, SessionSubscription>,
	next_subscription: u64,
	cancel: CancellationToken,
}

impl ClientSession {
	/// Registers the client and starts serving `transport`. `topics` are
	/// subscribed before any request is read.
	pub async fn start(
		broker: EventBrokerHandle,
		transport: Box<dyn Transport>,
		topics: Vec<String>,
		delivery_capacity: usize,
	) -> Result<ClientSessionHandle, BrokerError> {
		let connection_id = transport.connection_id();
		let (deliveries_tx, deliveries) =
			mpsc::channel(delivery_capacity.max(1));
		let client_id = broker
			.add_client(ClientRegistration {
				connection_id,
				queries: topics.clone(),
				deliveries: deliveries_tx,
			})
			.await?;
		let cancel = broker.context().shutdown_token().child_token();
		let session = Self {
			broker: broker.clone(),
			client_id,
			transport,
			deliveries,
			subscriptions: HashMap::new(),
			next_subscription: 1,
			cancel: cancel.clone(),
		};
		let span = info_span!(
			parent: broker.context().span(),
			"session",
			client = %client_id,
			connection = %connection_id
		);
		broker.context().spawn(session.run(topics).instrument(span));
		Ok(ClientSessionHandle {
			client_id,
			connection_id,
			cancel,
		})
	}

	async fn run(mut self, topics: Vec<String>) {
		debug!("Client session started");
		for topic in topics {
			if !self.handle_subscribe(topic, None).await {
				self.finish().await;
				return;
			}
		}
		loop {
			tokio::select! {
				_ = self.cancel.cancelled() => break,
				delivery = self.deliveries.recv() => {
					let Some(delivery) = delivery else {
						debug!("Delivery channel closed");
						break;
					};
					if !self.deliver(delivery).await {
						break;
					}
				}
				event = self.transport.next_event() => match event {
					| TransportEvent::Message(text) => {
						if !self.handle_text(&text).await {
							break;
						}
					}
					| TransportEvent::Error(err) => {
						warn!(error = %err, "Client transport error");
						break;
					}
					| TransportEvent::Closed => break,
				},
			}
		}
		self.finish().await;
	}

	async fn finish(mut self) {
		if let Err(err) = self.broker.remove_client(self.client_id).await {
			debug!(error = %err, "Client removal skipped");
		}
		self.transport.close().await;
		info!(
			subscriptions = self.subscriptions.len(),
			"Client session closed"
		);
	}

	/// Returns `false` once the transport is unusable.
	async fn handle_text(&mut self, text: &str) -> bool {
		match ClientRequest::decode(text) {
			| Ok(ClientRequest::Subscribe { topic, limit }) => {
				self.handle_subscribe(topic, limit).await
			}
			| Ok(ClientRequest::Unsubscribe { subscription_id }) => {
				self.handle_unsubscribe(subscription_id).await
			}
			| Err(rejected) => {
				self.send_error(&rejected.error, rejected.topic).await
			}
		}
	}

	async fn handle_subscribe(
		&mut self,
		topic: String,
		limit: Option<u64>,
	) -> bool {
		match self.subscribe(&topic, limit).await {
			| Ok(subscription_id) => {
				self.send(&ClientFrame::SubscribeAck {
					timestamp: now_millis(),
					topic,
					subscription_id,
				})
				.await
			}
			| Err(err) => {
				debug!(topic = %topic, error = %err, "Subscribe rejected");
				self.send_error(&err, Some(topic)).await
			}
		}
	}

	async fn subscribe(
		&mut self,
		topic: &str,
		limit: Option<u64>,
	) -> Result<SubscriptionId, ProtocolError> {
		if limit == Some(0) {
			return Err(ProtocolError::InvalidLimit(0));
		}
		let topic = Arc::new(Topic::parse(topic)?);
		let subscription_id = SubscriptionId(self.next_subscription);
		self.next_subscription += 1;
		self.broker
			.subscribe_client(
				self.client_id,
				subscription_id,
				Arc::clone(&topic),
			)
			.await?;
		self.subscriptions.insert(subscription_id, SessionSubscription {
			topic,
			limit,
			matched: 0,
		});
		Ok(subscription_id)
	}

	async fn handle_unsubscribe(
		&mut self,
		subscription_id: SubscriptionId,
	) -> bool {
		match self.unsubscribe(subscription_id).await {
			| Ok(()) => {
				self.send(&ClientFrame::UnsubscribeAck {
					timestamp: now_millis(),
					subscription_id,
				})
				.await
			}
			| Err(err) => self.send_error(&err, None).await,
		}
	}

	async fn unsubscribe(
		&mut self,
		subscription_id: SubscriptionId,
	) -> Result<(), ProtocolError> {
		if self.subscriptions.remove(&subscription_id).is_none() {
			return Err(ProtocolError::UnknownSubscription(subscription_id));
		}
		self.broker
			.unsubscribe_client(self.client_id, subscription_id)
			.await?;
		Ok(())
	}

	async fn deliver(&mut self, delivery: Delivery) -> bool {
		let Delivery {
			subscription_id,
			event,
		} = delivery;
		let Some(subscription) = self.subscriptions.get_mut(&subscription_id)
		else {
			trace!(%subscription_id, "Delivery for a closed subscription");
			return true;
		};

		let data = match subscription.topic.stream_query() {
			| None => Value::clone(&event.data),
			| Some(query) => {
				let envelope = json!({
					"topic": event.topic.as_str(),
					"timestamp": event.timestamp,
					"data": event.data.as_ref(),
				});
				if !query.matches(&envelope) {
					return true;
				}
				if query.selects_all() {
					Value::clone(&event.data)
				} else {
					query.project(&envelope)
				}
			}
		};

		subscription.matched += 1;
		let exhausted = subscription
			.limit
			.is_some_and(|limit| subscription.matched >= limit);
		let frame = ClientFrame::Event {
			topic: event.topic.to_string(),
			timestamp: event.timestamp,
			subscription_id,
			data,
		};
		if !self.send(&frame).await {
			return false;
		}
		if exhausted {
			debug!(%subscription_id, "Subscription limit reached");
			return self.handle_unsubscribe(subscription_id).await;
		}
		true
	}

	async fn send_error(
		&mut self,
		error: &ProtocolError,
		topic: Option<String>,
	) -> bool {
		self.send(&ClientFrame::Error {
			code: error.code(),
			timestamp: now_millis(),
			topic,
			message: error.to_string(),
		})
		.await
	}

	async fn send(&mut self, frame: &ClientFrame) -> bool {
		let text = match JsonCodec.encode(frame) {
			| Ok(text) => text,
			| Err(err) => {
				warn!(error = %err, "Failed to encode client frame");
				return true;
			}
		};
		match self.transport.send(text).await {
			| Ok(()) => true,
			| Err(err) => {
				debug!(error = %err, "Client transport send failed");
				false
			}
		}
	}
}

/// Control of a running [`ClientSession`].
#[derive(Debug, Clone)]
pub struct ClientSessionHandle {
	client_id: ClientId,
	connection_id: ConnectionId,
	cancel: CancellationToken,
}

impl ClientSessionHandle {
	pub fn client_id(&self) -> ClientId {
		self.client_id
	}

	pub fn connection_id(&self) -> ConnectionId {
		self.connection_id
	}

	/// Ends the session; its subscriptions are released.
	pub fn close(&self) {
		self.cancel.cancel();
	}

	pub fn is_closed(&self) -> bool {
		self.cancel.is_cancelled()
	}
}
