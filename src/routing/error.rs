use thiserror::Error;

use super::interest::{ClientId, SubscriptionId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
	#[error("Broker command channel closed")]
	ChannelClosed,

	#[error("Broker dropped the response")]
	ResponseLost,

	#[error("Unknown client {0}")]
	UnknownClient(ClientId),

	#[error("Subscription {subscription} not found for {client}")]
	UnknownSubscription {
		client: ClientId,
		subscription: SubscriptionId,
	},

	#[error("Subscription {subscription} already exists for {client}")]
	DuplicateSubscription {
		client: ClientId,
		subscription: SubscriptionId,
	},
}

impl BrokerError {
	/// True when the broker itself is gone, as opposed to a rejected request.
	pub fn is_shutdown(&self) -> bool {
		matches!(self, BrokerError::ChannelClosed | BrokerError::ResponseLost)
	}
}
