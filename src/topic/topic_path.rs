use std::fmt;

use arcstr::{ArcStr, Substr};
use smallvec::SmallVec;

use super::topic_segment::split_concrete;

/// Prefix of the reserved peer lifecycle topics.
pub const PEER_TOPIC_PREFIX: &str = "_peer/";

/// A concrete, published topic split into its segments.
#[derive(Debug, Clone)]
pub struct TopicPath {
	path: ArcStr,
	segments: SmallVec<[Substr; 4]>,
}

impl TopicPath {
	pub fn new(path: impl Into<ArcStr>) -> Self {
		let path = path.into();
		let segments = split_concrete(&path);
		Self { path, segments }
	}

	pub fn path(&self) -> &ArcStr {
		&self.path
	}

	pub fn segments(&self) -> &[Substr] {
		&self.segments
	}

	pub fn len(&self) -> usize {
		self.segments.len()
	}

	pub fn is_empty(&self) -> bool {
		self.path.is_empty()
	}

	pub fn is_peer_event(&self) -> bool {
		self.path.starts_with(PEER_TOPIC_PREFIX)
	}
}

impl fmt::Display for TopicPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.path)
	}
}
