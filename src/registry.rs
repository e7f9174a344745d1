//! Device registry consulted by `query/<ql>` subscriptions
//!
//! The broker runs one observer per active device-query topic: it publishes
//! every device currently matching the query and then every later change
//! that matches, until the last subscriber leaves.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::broadcast;

pub use memory::MemoryRegistry;

use crate::query::Query;

/// A device as stored in the registry. Extra properties are flattened into
/// the JSON document queries run against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
	pub id: String,
	#[serde(rename = "type")]
	pub device_type: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(flatten)]
	pub properties: Map<String, Value>,
}

impl DeviceRecord {
	pub fn new(id: impl Into<String>, device_type: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			device_type: device_type.into(),
			name: None,
			properties: Map::new(),
		}
	}

	pub fn with_name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());
		self
	}

	pub fn with_property(
		mut self,
		key: impl Into<String>,
		value: impl Into<Value>,
	) -> Self {
		self.properties.insert(key.into(), value.into());
		self
	}

	/// The document queries are evaluated against.
	pub fn to_document(&self) -> Value {
		serde_json::to_value(self).unwrap_or_default()
	}
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
	#[error("Registry unavailable: {0}")]
	Unavailable(String),

	#[error("Device record rejected: {0}")]
	Rejected(String),
}

#[async_trait]
pub trait Registry: Send + Sync + 'static {
	/// Devices whose document satisfies the query's `where` clause.
	async fn find(&self, query: &Query)
	-> Result<Vec<DeviceRecord>, RegistryError>;

	/// Inserts or replaces a device and notifies watchers.
	async fn save(&self, device: DeviceRecord) -> Result<(), RegistryError>;

	/// Stream of saved devices.
	fn watch(&self) -> broadcast::Receiver<DeviceRecord>;
}
