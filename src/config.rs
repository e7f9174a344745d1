//! Configuration for node and peer link initialization

use std::time::Duration;

use arcstr::ArcStr;
use url::Url;

use crate::error::FleetError;

/// Node-level capacities and cache sizes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSettings {
	/// Capacity of the broker command channel
	pub command_channel_capacity: usize,
	/// Size of the parsed topic cache (must be > 0)
	pub topic_cache_size: usize,
	/// Payloads remembered per push-sink connection
	pub send_cache_size: usize,
	/// Capacity of each client session's delivery queue
	pub delivery_channel_capacity: usize,
}

impl Default for NodeSettings {
	fn default() -> Self {
		Self {
			command_channel_capacity: 100,
			topic_cache_size: 100,
			send_cache_size: 100,
			delivery_channel_capacity: 500,
		}
	}
}

/// Timing of peer links, in both directions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSettings {
	/// First reconnect delay; doubled per failed attempt
	pub min_delay: Duration,
	/// Cap of the exponential part of the reconnect delay
	pub max_delay: Duration,
	/// Upper bound of the random delay added to every reconnect
	pub max_jitter: Duration,
	/// How long an outbound link waits for confirmation or the next ping
	pub ping_timeout: Duration,
	/// Ping period of inbound links
	pub probe_interval: Duration,
	/// Sent as the transport sub-protocol when dialling
	pub transport_protocol: String,
}

impl Default for PeerSettings {
	fn default() -> Self {
		Self {
			min_delay: Duration::from_millis(100),
			max_delay: Duration::from_secs(30),
			max_jitter: Duration::from_secs(1),
			ping_timeout: Duration::from_secs(30),
			probe_interval: Duration::from_secs(10),
			transport_protocol: "fleetbus-peer/1".to_string(),
		}
	}
}

/// Configuration for node creation
#[derive(Debug, Clone)]
pub struct NodeConfig {
	/// Node name; also the server segment of its stream topics
	pub name: ArcStr,
	pub settings: NodeSettings,
	pub peer: PeerSettings,
}

impl NodeConfig {
	/// # Example
	/// ```rust
	/// use fleetbus::NodeConfig;
	///
	/// let config = NodeConfig::new("hub");
	/// assert_eq!(config.settings.topic_cache_size, 100);
	/// ```
	pub fn new(name: impl Into<ArcStr>) -> Self {
		Self {
			name: name.into(),
			settings: NodeSettings::default(),
			peer: PeerSettings::default(),
		}
	}

	pub fn validate(&self) -> Result<(), FleetError> {
		if self.name.is_empty() {
			return Err(FleetError::ConfigurationValue(
				"node name must not be empty".to_string(),
			));
		}
		if self.name.contains('/') {
			return Err(FleetError::ConfigurationValue(format!(
				"node name '{}' must not contain '/'",
				self.name
			)));
		}
		if self.settings.topic_cache_size == 0 {
			return Err(FleetError::ConfigurationValue(
				"topic_cache_size must be greater than 0".to_string(),
			));
		}
		if self.settings.command_channel_capacity == 0
			|| self.settings.delivery_channel_capacity == 0
		{
			return Err(FleetError::ConfigurationValue(
				"channel capacities must be greater than 0".to_string(),
			));
		}
		if self.peer.min_delay > self.peer.max_delay {
			return Err(FleetError::ConfigurationValue(format!(
				"min_delay {:?} exceeds max_delay {:?}",
				self.peer.min_delay, self.peer.max_delay
			)));
		}
		if self.peer.ping_timeout.is_zero() || self.peer.probe_interval.is_zero()
		{
			return Err(FleetError::ConfigurationValue(
				"ping_timeout and probe_interval must be non-zero".to_string(),
			));
		}
		Ok(())
	}
}

const PEER_SCHEMES: [&str; 5] = ["ws", "wss", "http", "https", "mem"];

/// Configuration for one outbound peer link
#[derive(Debug, Clone)]
pub struct PeerClientConfig {
	/// Base URL of the remote node; `/peers/<name>` is appended
	pub url: Url,
	pub settings: PeerSettings,
}

impl PeerClientConfig {
	/// Parse configuration from URL string
	///
	/// Supports URLs with schemes: ws://, wss://, http://, https://, mem://
	///
	/// # Example
	/// ```rust
	/// use fleetbus::PeerClientConfig;
	///
	/// let config = PeerClientConfig::from_url("ws://cloud.example.com:1337")?;
	/// # Ok::<(), fleetbus::FleetError>(())
	/// ```
	pub fn from_url(url: &str) -> Result<Self, FleetError> {
		let url = Url::parse(url)?;
		if !PEER_SCHEMES.contains(&url.scheme()) {
			return Err(FleetError::ConfigurationValue(format!(
				"unsupported peer URL scheme '{}'",
				url.scheme()
			)));
		}
		if url.cannot_be_a_base() || url.host_str().is_none() {
			return Err(FleetError::ConfigurationValue(format!(
				"peer URL '{url}' has no host"
			)));
		}
		Ok(Self {
			url,
			settings: PeerSettings::default(),
		})
	}

	pub fn with_settings(mut self, settings: PeerSettings) -> Self {
		self.settings = settings;
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_validate() {
		assert!(NodeConfig::new("hub").validate().is_ok());

		let cases: Vec<(&str, Box<dyn Fn(&mut NodeConfig)>)> = vec![
			("empty name", Box::new(|c| c.name = ArcStr::new())),
			("slash in name", Box::new(|c| c.name = "a/b".into())),
			("zero cache", Box::new(|c| c.settings.topic_cache_size = 0)),
			(
				"zero delivery queue",
				Box::new(|c| c.settings.delivery_channel_capacity = 0),
			),
			(
				"inverted backoff",
				Box::new(|c| c.peer.min_delay = Duration::from_secs(60)),
			),
			(
				"zero ping timeout",
				Box::new(|c| c.peer.ping_timeout = Duration::ZERO),
			),
		];
		for (name, mutate) in cases {
			let mut config = NodeConfig::new("hub");
			mutate(&mut config);
			assert!(
				matches!(config.validate(), Err(FleetError::ConfigurationValue(_))),
				"{name} should be rejected"
			);
		}
	}

	#[test]
	fn test_peer_url() {
		for url in [
			"ws://cloud:1337",
			"wss://cloud.example.com",
			"http://10.0.0.2:8080/base",
			"mem://cloud",
		] {
			assert!(PeerClientConfig::from_url(url).is_ok(), "{url}");
		}
		assert!(matches!(
			PeerClientConfig::from_url("ftp://cloud"),
			Err(FleetError::ConfigurationValue(_))
		));
		assert!(matches!(
			PeerClientConfig::from_url("not a url"),
			Err(FleetError::Url(_))
		));
	}
}
