use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frames exchanged over a peer link, one JSON object per transport
/// message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PeerFrame {
	/// Sender wants events matching `topic`
	Subscribe { topic: String },
	Unsubscribe { topic: String },
	Event {
		topic: String,
		timestamp: u64,
		data: Value,
	},
	Ping { timestamp: u64 },
	Pong { timestamp: u64 },
	/// First frame from the accepting side: echoes the connection id the
	/// initiator chose and names the acceptor.
	Confirm {
		#[serde(rename = "connectionId")]
		connection_id: String,
		name: String,
	},
}

impl PeerFrame {
	pub fn kind(&self) -> &'static str {
		match self {
			| PeerFrame::Subscribe { .. } => "subscribe",
			| PeerFrame::Unsubscribe { .. } => "unsubscribe",
			| PeerFrame::Event { .. } => "event",
			| PeerFrame::Ping { .. } => "ping",
			| PeerFrame::Pong { .. } => "pong",
			| PeerFrame::Confirm { .. } => "confirm",
		}
	}
}
