//! Lifetime of a running node

use std::time::Duration;

use tracing::{Instrument, error, info, warn};

use crate::context::NodeContext;
use crate::error::Result;
use crate::routing::EventBrokerController;

const TASK_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Owns the broker actor and the node's tasks.
///
/// Call [`NodeRuntime::shutdown`] and await it before dropping.
pub struct NodeRuntime {
	context: NodeContext,
	controller: Option<EventBrokerController>,
}

impl NodeRuntime {
	pub(crate) fn new(
		context: NodeContext,
		controller: EventBrokerController,
	) -> Self {
		Self {
			context,
			controller: Some(controller),
		}
	}

	pub fn is_shutting_down(&self) -> bool {
		self.context.shutdown_token().is_cancelled()
	}

	/// Gracefully shutdown the node by:
	/// 1. Cancelling peer links, client sessions and query observers
	/// 2. Waiting up to 500ms for their tasks to finish
	/// 3. Stopping the broker, which closes whatever links remain
	pub async fn shutdown(mut self) -> Result<()> {
		let context = self.context.clone();
		let controller = self.controller.take();
		let span = context.span().clone();
		async move {
			info!("Node shutting down");
			context.shutdown_token().cancel();

			let tasks = context.tasks();
			tasks.close();
			if tokio::time::timeout(TASK_DRAIN_TIMEOUT, tasks.wait())
				.await
				.is_err()
			{
				warn!(remaining = tasks.len(), "Node tasks still running");
			}

			if let Some(controller) = controller {
				if let Err(e) = controller.shutdown().await {
					warn!(error = %e, "Failed to shutdown event broker");
				}
			}
			info!("Node shut down");
			Ok(())
		}
		.instrument(span)
		.await
	}
}

impl Drop for NodeRuntime {
	fn drop(&mut self) {
		if self.controller.is_some() {
			error!(
				node = %self.context.name(),
				"NodeRuntime dropped without calling shutdown(). Please call \
				 shutdown() and await its completion before dropping."
			);
		}
	}
}
