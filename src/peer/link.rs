use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arcstr::ArcStr;
use tokio::sync::mpsc;

use super::frame::PeerFrame;
use crate::sync::lock;
use crate::topic::{Topic, TopicPath};

/// Which side opened the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkDirection {
	/// This node dialled the peer
	Outbound,
	/// The peer dialled this node
	Inbound,
}

#[derive(Debug)]
pub(crate) enum LinkCommand {
	Frame(PeerFrame),
	Close,
}

/// Broker-facing handle of one confirmed peer connection.
///
/// Tracks the topics this node asked the peer for; inbound events outside
/// that set are discarded.
#[derive(Debug, Clone)]
pub struct PeerLink {
	inner: Arc<LinkInner>,
}

#[derive(Debug)]
struct LinkInner {
	name: ArcStr,
	connection_id: ArcStr,
	direction: LinkDirection,
	commands: mpsc::UnboundedSender<LinkCommand>,
	interest: Mutex<HashMap<ArcStr, Arc<Topic>>>,
}

impl PeerLink {
	pub(crate) fn new(
		name: ArcStr,
		connection_id: ArcStr,
		direction: LinkDirection,
	) -> (Self, mpsc::UnboundedReceiver<LinkCommand>) {
		let (commands, receiver) = mpsc::unbounded_channel();
		let link = Self {
			inner: Arc::new(LinkInner {
				name,
				connection_id,
				direction,
				commands,
				interest: Mutex::new(HashMap::new()),
			}),
		};
		(link, receiver)
	}

	/// Remote node name.
	pub fn name(&self) -> &ArcStr {
		&self.inner.name
	}

	pub fn connection_id(&self) -> &ArcStr {
		&self.inner.connection_id
	}

	pub fn direction(&self) -> LinkDirection {
		self.inner.direction
	}

	/// Sends a subscribe frame unless the topic is already requested.
	pub fn subscribe(&self, topic: Arc<Topic>) -> bool {
		let mut interest = lock(&self.inner.interest);
		if interest.contains_key(topic.key().as_str()) {
			return false;
		}
		let frame = PeerFrame::Subscribe {
			topic: topic.key().to_string(),
		};
		interest.insert(topic.key().clone(), topic);
		self.send(frame)
	}

	pub fn unsubscribe(&self, topic_key: &str) -> bool {
		if lock(&self.inner.interest).remove(topic_key).is_none() {
			return false;
		}
		self.send(PeerFrame::Unsubscribe {
			topic: topic_key.to_string(),
		})
	}

	/// Whether an inbound event on `path` was asked for.
	pub fn accepts(&self, path: &TopicPath) -> bool {
		lock(&self.inner.interest)
			.values()
			.any(|topic| topic.matches_path(path))
	}

	pub fn interest_count(&self) -> usize {
		lock(&self.inner.interest).len()
	}

	pub(crate) fn send(&self, frame: PeerFrame) -> bool {
		self.inner.commands.send(LinkCommand::Frame(frame)).is_ok()
	}

	/// Asks the connection task to close the transport.
	pub fn close(&self) {
		let _ = self.inner.commands.send(LinkCommand::Close);
	}

	pub fn is_closed(&self) -> bool {
		self.inner.commands.is_closed()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn topic(pattern: &str) -> Arc<Topic> {
		Arc::new(Topic::parse(pattern).unwrap())
	}

	#[test]
	fn test_subscribe_is_sent_once_per_topic() {
		let (link, mut commands) = PeerLink::new(
			"cloud".into(),
			"c-1".into(),
			LinkDirection::Outbound,
		);
		assert!(link.subscribe(topic("cloud/led/*/state")));
		assert!(!link.subscribe(topic("cloud/led/*/state")));
		assert_eq!(link.interest_count(), 1);

		assert!(matches!(
			commands.try_recv(),
			Ok(LinkCommand::Frame(PeerFrame::Subscribe { topic })) if topic == "cloud/led/*/state"
		));
		assert!(commands.try_recv().is_err());
	}

	#[test]
	fn test_accepts_only_requested_topics() {
		let (link, _commands) =
			PeerLink::new("cloud".into(), "c-1".into(), LinkDirection::Inbound);
		link.subscribe(topic("cloud/led/*/state"));

		assert!(link.accepts(&TopicPath::new("cloud/led/1/state")));
		assert!(!link.accepts(&TopicPath::new("cloud/led/1/power")));

		assert!(link.unsubscribe("cloud/led/*/state"));
		assert!(!link.unsubscribe("cloud/led/*/state"));
		assert!(!link.accepts(&TopicPath::new("cloud/led/1/state")));
	}

	#[test]
	fn test_closed_when_task_is_gone() {
		let (link, commands) =
			PeerLink::new("cloud".into(), "c-1".into(), LinkDirection::Inbound);
		drop(commands);
		assert!(link.is_closed());
		assert!(!link.subscribe(topic("cloud/led/*/state")));
	}
}
