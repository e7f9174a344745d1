//! Per-node logging and task context

use std::future::Future;
use std::sync::Arc;

use arcstr::ArcStr;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, Span, info_span};

use crate::routing::BrokerMetrics;

/// Shared by every component of one node: its name, the tracing span all
/// of its tasks run in, its metrics, and the shutdown signal.
#[derive(Debug, Clone)]
pub struct NodeContext {
	name: ArcStr,
	span: Span,
	metrics: Arc<BrokerMetrics>,
	shutdown: CancellationToken,
	tasks: TaskTracker,
}

impl NodeContext {
	pub fn new(name: impl Into<ArcStr>) -> Self {
		let name = name.into();
		let span = info_span!("node", node = %name);
		Self {
			name,
			span,
			metrics: Arc::new(BrokerMetrics::default()),
			shutdown: CancellationToken::new(),
			tasks: TaskTracker::new(),
		}
	}

	pub fn name(&self) -> &ArcStr {
		&self.name
	}

	pub fn span(&self) -> &Span {
		&self.span
	}

	pub fn metrics(&self) -> &Arc<BrokerMetrics> {
		&self.metrics
	}

	/// Cancelled when the node shuts down.
	pub fn shutdown_token(&self) -> &CancellationToken {
		&self.shutdown
	}

	/// Spawns a tracked task inside the node span. Tracked tasks are awaited
	/// on shutdown.
	pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
	where
		F: Future + Send + 'static,
		F::Output: Send + 'static,
	{
		self.tasks.spawn(future.instrument(self.span.clone()))
	}

	pub(crate) fn tasks(&self) -> &TaskTracker {
		&self.tasks
	}
}
