use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use arcstr::ArcStr;
use percent_encoding::percent_decode_str;
use smallvec::SmallVec;

use super::error::{TopicError, TopicResult, limits};
use super::query_topic::QueryTopic;
use super::topic_path::{PEER_TOPIC_PREFIX, TopicPath};
use super::topic_segment::{TopicSegment, scan_pattern};
use crate::query::Query;

type Segments = SmallVec<[TopicSegment; 4]>;

/// What a parsed topic selects.
#[derive(Debug, Clone)]
pub enum TopicKind {
	/// `[server/]type/id/stream` with wildcards and regex segments
	Stream(Segments),
	/// `_peer/<event>`
	Peer(Segments),
	/// `query/<ql>` or `query:<id>/<ql>`
	Query(QueryTopic),
}

/// A parsed subscription topic.
///
/// Two topics are the same subscription when their [`key`](Topic::key)s are
/// equal; the key is the original string including any `?<ql>` suffix.
#[derive(Debug, Clone)]
pub struct Topic {
	key: ArcStr,
	kind: TopicKind,
	stream_query: Option<Arc<Query>>,
}

impl Topic {
	pub fn parse(topic: impl Into<ArcStr>) -> TopicResult<Self> {
		let key: ArcStr = topic.into();
		if key.trim().is_empty() {
			return Err(TopicError::Empty);
		}
		if key.len() > limits::MAX_TOPIC_LENGTH {
			return Err(TopicError::limit(format!(
				"topic length {} exceeds {} bytes",
				key.len(),
				limits::MAX_TOPIC_LENGTH
			)));
		}

		if QueryTopic::is_query(&key) {
			let query = QueryTopic::parse(&key)?;
			return Ok(Self {
				key,
				kind: TopicKind::Query(query),
				stream_query: None,
			});
		}

		let scanned = scan_pattern(&key)?;
		if scanned.segments.len() > limits::MAX_TOPIC_DEPTH {
			return Err(TopicError::limit(format!(
				"topic depth {} exceeds {}",
				scanned.segments.len(),
				limits::MAX_TOPIC_DEPTH
			)));
		}
		let segments = scanned
			.segments
			.iter()
			.enumerate()
			.map(|(pos, range)| {
				TopicSegment::parse(key.substr(range.clone()), pos)
			})
			.collect::<TopicResult<Segments>>()?;

		let stream_query = match scanned.query_start {
			| Some(start) => {
				let raw = &key[start + 1 ..];
				let ql = percent_decode_str(raw).decode_utf8_lossy();
				Some(Arc::new(Query::parse(&ql)?))
			}
			| None => None,
		};

		let kind = if key.starts_with(PEER_TOPIC_PREFIX) {
			if segments.len() != 2 || stream_query.is_some() {
				return Err(TopicError::InvalidPeerTopic {
					topic: key.to_string(),
				});
			}
			TopicKind::Peer(segments)
		} else {
			let has_many =
				segments.iter().any(|s| matches!(s, TopicSegment::AnyMany));
			if segments.len() < limits::MIN_STREAM_SEGMENTS && !has_many {
				return Err(TopicError::too_few_segments(
					key.as_str(),
					segments.len(),
				));
			}
			TopicKind::Stream(segments)
		};

		Ok(Self {
			key,
			kind,
			stream_query,
		})
	}

	/// Identity of the subscription.
	pub fn key(&self) -> &ArcStr {
		&self.key
	}

	pub fn kind(&self) -> &TopicKind {
		&self.kind
	}

	/// Filter/projection applied to every matched event, from `?<ql>`.
	pub fn stream_query(&self) -> Option<&Arc<Query>> {
		self.stream_query.as_ref()
	}

	pub fn is_query(&self) -> bool {
		matches!(self.kind, TopicKind::Query(_))
	}

	pub fn is_peer_event(&self) -> bool {
		matches!(self.kind, TopicKind::Peer(_))
	}

	pub fn is_pattern(&self) -> bool {
		match &self.kind {
			| TopicKind::Stream(segments) | TopicKind::Peer(segments) => {
				segments.iter().any(TopicSegment::is_wildcard)
			}
			| TopicKind::Query(query) => !query.has_explicit_id(),
		}
	}

	/// Segments of a stream or peer topic.
	pub fn segments(&self) -> &[TopicSegment] {
		match &self.kind {
			| TopicKind::Stream(segments) | TopicKind::Peer(segments) => {
				segments.as_slice()
			}
			| TopicKind::Query(_) => &[],
		}
	}

	/// The leading server segment of a 4-segment topic.
	pub fn server_segment(&self) -> Option<&TopicSegment> {
		match &self.kind {
			| TopicKind::Stream(segments) if segments.len() == 4 => {
				segments.first()
			}
			| _ => None,
		}
	}

	pub fn device_type(&self) -> Option<&TopicSegment> {
		self.positional(0)
	}

	pub fn device_id(&self) -> Option<&TopicSegment> {
		self.positional(1)
	}

	pub fn stream_name(&self) -> Option<&TopicSegment> {
		self.positional(2)
	}

	/// Device-relative position, skipping the server segment of a 4-segment
	/// topic. Topics with `**` have no fixed positions.
	fn positional(&self, index: usize) -> Option<&TopicSegment> {
		let TopicKind::Stream(segments) = &self.kind else {
			return None;
		};
		if segments.iter().any(|s| matches!(s, TopicSegment::AnyMany)) {
			return None;
		}
		match segments.len() {
			| 3 => segments.get(index),
			| 4 => segments.get(index + 1),
			| _ => None,
		}
	}

	pub fn matches(&self, candidate: &str) -> bool {
		self.matches_path(&TopicPath::new(candidate))
	}

	pub fn matches_path(&self, candidate: &TopicPath) -> bool {
		match &self.kind {
			| TopicKind::Stream(segments) => {
				if candidate.is_peer_event()
					|| QueryTopic::is_query(candidate.path())
					|| candidate.len() < limits::MIN_STREAM_SEGMENTS
				{
					return false;
				}
				match_segments(segments, candidate.segments())
			}
			| TopicKind::Peer(segments) => {
				candidate.is_peer_event()
					&& match_segments(segments, candidate.segments())
			}
			| TopicKind::Query(query) => query.accepts(candidate.path()),
		}
	}

	/// Whether this topic should be forwarded to the peer called `name`.
	///
	/// Only topics that carry a server segment (4 segments, or any topic
	/// with `**`) are forwarded; the first segment is tested against the
	/// name. 3-segment topics are local to this node.
	pub fn matches_server(&self, name: &str) -> bool {
		let TopicKind::Stream(segments) = &self.kind else {
			return false;
		};
		let has_many =
			segments.iter().any(|s| matches!(s, TopicSegment::AnyMany));
		if segments.len() < 4 && !has_many {
			return false;
		}
		segments
			.first()
			.is_some_and(|first| first.matches_segment(name))
	}
}

/// Backtracking matcher; `**` consumes one or more segments and prefers
/// the longest span.
fn match_segments(
	pattern: &[TopicSegment],
	candidate: &[arcstr::Substr],
) -> bool {
	match pattern.split_first() {
		| None => candidate.is_empty(),
		| Some((TopicSegment::AnyMany, rest)) => {
			let min_rest = rest.len();
			if candidate.len() <= min_rest && !rest.is_empty() {
				return false;
			}
			(1 ..= candidate.len())
				.rev()
				.any(|take| match_segments(rest, &candidate[take ..]))
		}
		| Some((segment, rest)) => match candidate.split_first() {
			| Some((head, tail)) => {
				segment.matches_segment(head) && match_segments(rest, tail)
			}
			| None => false,
		},
	}
}

impl PartialEq for Topic {
	fn eq(&self, other: &Self) -> bool {
		self.key == other.key
	}
}

impl Eq for Topic {}

impl Hash for Topic {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.key.hash(state);
	}
}

impl fmt::Display for Topic {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.key)
	}
}

impl TryFrom<&str> for Topic {
	type Error = TopicError;

	fn try_from(value: &str) -> Result<Self, Self::Error> {
		Topic::parse(value)
	}
}
