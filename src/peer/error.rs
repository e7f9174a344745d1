use std::time::Duration;

use thiserror::Error;

use crate::routing::BrokerError;
use crate::transport::TransportError;

/// Failures of one peer connection attempt. Never fatal to the link: the
/// dialling side logs them and reconnects with backoff.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeerConnectionError {
	#[error("Peer handshake rejected with status {status}")]
	Handshake { status: u16 },

	#[error("Invalid peer request '{target}': {reason}")]
	InvalidRequest { target: String, reason: String },

	#[error("Invalid peer URL: {0}")]
	Url(String),

	#[error("Peer transport failed: {0}")]
	Transport(#[from] TransportError),

	#[error("No confirmation or ping within {0:?}")]
	Timeout(Duration),

	#[error("Confirmation for connection {received}, expected {expected}")]
	ConfirmMismatch { expected: String, received: String },

	#[error("Broker unavailable: {0}")]
	Broker(#[from] BrokerError),
}

impl PeerConnectionError {
	pub fn invalid_request(
		target: impl Into<String>,
		reason: impl Into<String>,
	) -> Self {
		Self::InvalidRequest {
			target: target.into(),
			reason: reason.into(),
		}
	}

	pub fn error_type(&self) -> &'static str {
		match self {
			| Self::Handshake { .. } => "handshake",
			| Self::InvalidRequest { .. } => "invalid_request",
			| Self::Url(_) => "url",
			| Self::Transport(_) => "transport",
			| Self::Timeout(_) => "timeout",
			| Self::ConfirmMismatch { .. } => "confirm_mismatch",
			| Self::Broker(_) => "broker",
		}
	}
}
