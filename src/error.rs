use thiserror::Error;

use crate::peer::PeerConnectionError;
use crate::query::QueryError;
use crate::registry::RegistryError;
use crate::routing::BrokerError;
use crate::session::ProtocolError;
use crate::topic::TopicError;
use crate::transport::TransportError;

/// Errors surfaced by the public node API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FleetError {
	/// Invalid configuration parameter values
	#[error("Invalid configuration value: {0}")]
	ConfigurationValue(String),

	#[error("Invalid URL: {0}")]
	Url(#[from] url::ParseError),

	#[error("Topic error: {0}")]
	Topic(#[from] TopicError),

	#[error("Query error: {0}")]
	Query(#[from] QueryError),

	#[error("Broker error: {0}")]
	Broker(#[from] BrokerError),

	#[error("Peer connection error: {0}")]
	PeerConnection(#[from] PeerConnectionError),

	#[error("Protocol error: {0}")]
	Protocol(#[from] ProtocolError),

	#[error("Registry error: {0}")]
	Registry(#[from] RegistryError),

	#[error("Transport error: {0}")]
	Transport(#[from] TransportError),
}

impl FleetError {
	pub fn error_type(&self) -> &'static str {
		match self {
			| FleetError::ConfigurationValue(_) | FleetError::Url(_) => {
				"configuration"
			}
			| FleetError::Topic(err) => err.error_type(),
			| FleetError::Query(err) => err.error_type(),
			| FleetError::Broker(_) => "broker",
			| FleetError::PeerConnection(err) => err.error_type(),
			| FleetError::Protocol(err) => err.error_type(),
			| FleetError::Registry(_) => "registry",
			| FleetError::Transport(_) => "transport",
		}
	}
}

pub type Result<T> = std::result::Result<T, FleetError>;
