use std::fmt::{Debug, Display};

use serde::{Serialize, de::DeserializeOwned};

/// Text framing for everything that crosses a
/// [`Transport`](crate::transport::Transport).
pub trait FrameCodec<T>: Default + Clone + Send + Sync + 'static {
	type EncodeError: Debug + Display + Send + Sync + 'static;
	type DecodeError: Debug + Display + Send + Sync + 'static;

	fn encode(&self, frame: &T) -> Result<String, Self::EncodeError>;
	fn decode(&self, text: &str) -> Result<T, Self::DecodeError>;
}

#[derive(Debug, Clone, Default)]
pub struct JsonCodec;

impl JsonCodec {
	pub fn new() -> Self {
		Self
	}
}

impl<T> FrameCodec<T> for JsonCodec
where T: Serialize + DeserializeOwned + 'static
{
	type EncodeError = serde_json::Error;
	type DecodeError = serde_json::Error;

	fn encode(&self, frame: &T) -> Result<String, Self::EncodeError> {
		serde_json::to_string(frame)
	}

	fn decode(&self, text: &str) -> Result<T, Self::DecodeError> {
		serde_json::from_str(text)
	}
}
