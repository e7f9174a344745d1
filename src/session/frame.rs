use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ProtocolError;
use crate::routing::SubscriptionId;

/// Frames a client sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientRequest {
	Subscribe {
		topic: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		limit: Option<u64>,
	},
	Unsubscribe {
		#[serde(rename = "subscriptionId")]
		subscription_id: SubscriptionId,
	},
}

/// A request that could not be decoded, with the topic it named if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRequest {
	pub error: ProtocolError,
	pub topic: Option<String>,
}

impl ClientRequest {
	/// Decodes one text frame. An `unsubscribe` without a numeric
	/// `subscriptionId` is rejected as such rather than as a malformed frame.
	pub fn decode(text: &str) -> Result<Self, RejectedRequest> {
		let value: Value = serde_json::from_str(text).map_err(|err| {
			RejectedRequest {
				error: ProtocolError::Malformed(err.to_string()),
				topic: None,
			}
		})?;
		let topic = value
			.get("topic")
			.and_then(Value::as_str)
			.map(str::to_string);
		let reject = |error| RejectedRequest {
			error,
			topic: topic.clone(),
		};

		if value.get("type").and_then(Value::as_str) == Some("unsubscribe")
			&& value.get("subscriptionId").and_then(Value::as_u64).is_none()
		{
			return Err(reject(ProtocolError::InvalidSubscriptionId));
		}
		let request: Self = serde_json::from_value(value)
			.map_err(|err| reject(ProtocolError::Malformed(err.to_string())))?;
		if let ClientRequest::Subscribe { limit: Some(0), .. } = request {
			return Err(reject(ProtocolError::InvalidLimit(0)));
		}
		Ok(request)
	}
}

/// Frames a session sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientFrame {
	SubscribeAck {
		timestamp: u64,
		topic: String,
		#[serde(rename = "subscriptionId")]
		subscription_id: SubscriptionId,
	},
	UnsubscribeAck {
		timestamp: u64,
		#[serde(rename = "subscriptionId")]
		subscription_id: SubscriptionId,
	},
	Event {
		topic: String,
		timestamp: u64,
		#[serde(rename = "subscriptionId")]
		subscription_id: SubscriptionId,
		data: Value,
	},
	Error {
		code: u16,
		timestamp: u64,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		topic: Option<String>,
		message: String,
	},
}

impl ClientFrame {
	pub fn subscription_id(&self) -> Option<SubscriptionId> {
		match self {
			| ClientFrame::SubscribeAck {
				subscription_id, ..
			}
			| ClientFrame::UnsubscribeAck {
				subscription_id, ..
			}
			| ClientFrame::Event {
				subscription_id, ..
			} => Some(*subscription_id),
			| ClientFrame::Error { .. } => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn test_decode_requests() {
		assert_eq!(
			ClientRequest::decode(
				r#"{"type":"subscribe","topic":"hub/led/*/state","limit":10}"#
			),
			Ok(ClientRequest::Subscribe {
				topic: "hub/led/*/state".into(),
				limit: Some(10),
			})
		);
		assert_eq!(
			ClientRequest::decode(r#"{"type":"unsubscribe","subscriptionId":4}"#),
			Ok(ClientRequest::Unsubscribe {
				subscription_id: SubscriptionId(4),
			})
		);
	}

	#[test]
	fn test_rejected_requests() {
		let cases = [
			("{", "malformed", None),
			(r#"{"type":"bogus"}"#, "malformed", None),
			(r#"{"type":"subscribe"}"#, "malformed", None),
			(
				r#"{"type":"subscribe","topic":"a/b/c","limit":-1}"#,
				"malformed",
				Some("a/b/c"),
			),
			(
				r#"{"type":"subscribe","topic":"a/b/c","limit":0}"#,
				"invalid_limit",
				Some("a/b/c"),
			),
			(r#"{"type":"unsubscribe"}"#, "invalid_subscription_id", None),
			(
				r#"{"type":"unsubscribe","subscriptionId":"x"}"#,
				"invalid_subscription_id",
				None,
			),
		];
		for (text, error_type, topic) in cases {
			let rejected = ClientRequest::decode(text).unwrap_err();
			assert_eq!(rejected.error.error_type(), error_type, "{text}");
			assert_eq!(rejected.error.code(), 400, "{text}");
			assert_eq!(rejected.topic.as_deref(), topic, "{text}");
		}
	}

	#[test]
	fn test_frame_wire_shape() {
		let frame = ClientFrame::Event {
			topic: "hub/led/1/state".into(),
			timestamp: 9,
			subscription_id: SubscriptionId(2),
			data: json!("on"),
		};
		assert_eq!(
			serde_json::to_value(&frame).unwrap(),
			json!({
				"type": "event",
				"topic": "hub/led/1/state",
				"timestamp": 9,
				"subscriptionId": 2,
				"data": "on",
			})
		);

		let error = ClientFrame::Error {
			code: 405,
			timestamp: 1,
			topic: None,
			message: "gone".into(),
		};
		assert_eq!(
			serde_json::to_value(&error).unwrap(),
			json!({"type": "error", "code": 405, "timestamp": 1, "message": "gone"})
		);
	}
}
