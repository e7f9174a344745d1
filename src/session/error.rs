use thiserror::Error;

use crate::routing::{BrokerError, SubscriptionId};
use crate::topic::TopicError;

/// Errors reported to the client as `error` frames. None of them close the
/// connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
	#[error("Malformed frame: {0}")]
	Malformed(String),

	#[error(transparent)]
	Topic(#[from] TopicError),

	#[error("Invalid limit {0}, must be at least 1")]
	InvalidLimit(u64),

	#[error("Missing or invalid subscriptionId")]
	InvalidSubscriptionId,

	#[error("Subscription {0} not found")]
	UnknownSubscription(SubscriptionId),

	#[error("Broker failure: {0}")]
	Broker(#[from] BrokerError),
}

impl ProtocolError {
	/// Status code carried by the error frame.
	pub fn code(&self) -> u16 {
		match self {
			| Self::Malformed(_)
			| Self::Topic(_)
			| Self::InvalidLimit(_)
			| Self::InvalidSubscriptionId => 400,
			| Self::UnknownSubscription(_) => 405,
			| Self::Broker(BrokerError::UnknownSubscription { .. }) => 405,
			| Self::Broker(_) => 500,
		}
	}

	pub fn error_type(&self) -> &'static str {
		match self {
			| Self::Malformed(_) => "malformed",
			| Self::Topic(_) => "invalid_topic",
			| Self::InvalidLimit(_) => "invalid_limit",
			| Self::InvalidSubscriptionId => "invalid_subscription_id",
			| Self::UnknownSubscription(_) => "unknown_subscription",
			| Self::Broker(_) => "broker",
		}
	}
}
