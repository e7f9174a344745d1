use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use super::{DeviceRecord, Registry, RegistryError};
use crate::query::Query;
use crate::sync::{read, write};

const WATCH_CAPACITY: usize = 256;

/// In-process registry keyed by device id.
#[derive(Debug)]
pub struct MemoryRegistry {
	devices: RwLock<BTreeMap<String, DeviceRecord>>,
	updates: broadcast::Sender<DeviceRecord>,
}

impl MemoryRegistry {
	pub fn new() -> Self {
		let (updates, _) = broadcast::channel(WATCH_CAPACITY);
		Self {
			devices: RwLock::new(BTreeMap::new()),
			updates,
		}
	}

	pub fn len(&self) -> usize {
		read(&self.devices).len()
	}

	pub fn is_empty(&self) -> bool {
		read(&self.devices).is_empty()
	}
}

impl Default for MemoryRegistry {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl Registry for MemoryRegistry {
	async fn find(
		&self,
		query: &Query,
	) -> Result<Vec<DeviceRecord>, RegistryError> {
		let devices = read(&self.devices);
		Ok(devices
			.values()
			.filter(|device| query.matches(&device.to_document()))
			.cloned()
			.collect())
	}

	async fn save(&self, device: DeviceRecord) -> Result<(), RegistryError> {
		if device.id.is_empty() {
			return Err(RegistryError::Rejected("empty device id".into()));
		}
		write(&self.devices).insert(device.id.clone(), device.clone());
		if self.updates.send(device).is_err() {
			debug!("Registry update had no watchers");
		}
		Ok(())
	}

	fn watch(&self) -> broadcast::Receiver<DeviceRecord> {
		self.updates.subscribe()
	}
}
