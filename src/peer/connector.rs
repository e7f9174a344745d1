use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arcstr::ArcStr;
use async_trait::async_trait;
use tracing::debug;
use url::Url;

use super::error::PeerConnectionError;
use super::peer_socket::PeerAcceptor;
use crate::sync::lock;
use crate::transport::{MemoryTransport, Transport};

/// Header carrying the peer protocol name on the upgrade request.
pub const PROTOCOL_HEADER: &str = "Sec-WebSocket-Protocol";

/// One outbound connection attempt.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
	/// `<base>/peers/<local name>?connectionId=<id>`
	pub url: Url,
	pub headers: Vec<(String, String)>,
	pub connection_id: ArcStr,
	pub local_name: ArcStr,
}

impl ConnectRequest {
	pub fn new(
		base: &Url,
		local_name: &ArcStr,
		connection_id: &ArcStr,
		protocol: &str,
	) -> Result<Self, PeerConnectionError> {
		let mut url = base.clone();
		if url.path().is_empty() {
			url.set_path("/");
		}
		url.path_segments_mut()
			.map_err(|_| {
				PeerConnectionError::Url(format!("{base} cannot be a base URL"))
			})?
			.pop_if_empty()
			.push("peers")
			.push(local_name);
		url.query_pairs_mut()
			.clear()
			.append_pair("connectionId", connection_id);
		Ok(Self {
			url,
			headers: vec![(PROTOCOL_HEADER.to_string(), protocol.to_string())],
			connection_id: connection_id.clone(),
			local_name: local_name.clone(),
		})
	}

	/// Path and query as received by the accepting node.
	pub fn target(&self) -> String {
		match self.url.query() {
			| Some(query) => format!("{}?{query}", self.url.path()),
			| None => self.url.path().to_string(),
		}
	}
}

/// Opens transports to remote nodes. Network stacks implement this over
/// their WebSocket client; [`MemoryNetwork`] wires nodes in one process.
#[async_trait]
pub trait PeerConnector: Send + Sync + 'static {
	async fn connect(
		&self,
		request: &ConnectRequest,
	) -> Result<Box<dyn Transport>, PeerConnectionError>;
}

/// In-process network: `mem://<host>` URLs reach the acceptor registered
/// under `<host>`.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
	nodes: Arc<Mutex<HashMap<String, PeerAcceptor>>>,
}

impl MemoryNetwork {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&self, host: impl Into<String>, acceptor: PeerAcceptor) {
		lock(&self.nodes).insert(host.into(), acceptor);
	}

	/// Later connection attempts to `host` fail until it is registered again.
	pub fn unregister(&self, host: &str) -> Option<PeerAcceptor> {
		lock(&self.nodes).remove(host)
	}
}

#[async_trait]
impl PeerConnector for MemoryNetwork {
	async fn connect(
		&self,
		request: &ConnectRequest,
	) -> Result<Box<dyn Transport>, PeerConnectionError> {
		let host = request.url.host_str().ok_or_else(|| {
			PeerConnectionError::Url(format!("{} has no host", request.url))
		})?;
		let acceptor = lock(&self.nodes)
			.get(host)
			.cloned()
			.ok_or(PeerConnectionError::Handshake { status: 404 })?;
		let (local, remote) = MemoryTransport::pair();
		acceptor.accept(&request.target(), Box::new(remote))?;
		debug!(host = %host, target = %request.target(), "In-memory upgrade");
		Ok(Box::new(local))
	}
}
