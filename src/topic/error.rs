//! Error types for topic parsing and matching

use thiserror::Error;

use crate::query::QueryError;

/// Errors produced while parsing a subscription topic
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopicError {
	/// Empty topic is not valid
	#[error("Topic cannot be empty")]
	Empty,

	/// Stream topics need `<type>/<id>/<stream>` at the very least
	#[error(
		"Topic '{topic}' has {segments} segment(s), at least 3 are required"
	)]
	TooFewSegments { topic: String, segments: usize },

	/// `{` and `}` do not pair up
	#[error("Topic '{topic}' has unbalanced braces")]
	UnbalancedBraces { topic: String },

	/// Regex segment failed to compile
	#[error("Invalid regular expression '{pattern}' in topic: {details}")]
	InvalidRegex { pattern: String, details: String },

	/// A segment that is empty or mixes braces with literal text
	#[error("Invalid segment '{segment}' at position {position}")]
	InvalidSegment { segment: String, position: usize },

	/// Malformed `_peer/...` topic
	#[error("Invalid peer topic '{topic}': expected '_peer/<event>'")]
	InvalidPeerTopic { topic: String },

	/// Malformed `query/...` or `query:<id>/...` topic
	#[error("Invalid query topic '{topic}': {reason}")]
	InvalidQueryTopic { topic: String, reason: String },

	/// The `?<ql>` suffix or the device query did not parse
	#[error("Invalid query in topic: {0}")]
	Query(#[from] QueryError),

	/// Topic exceeds one of the [`limits`](super::limits)
	#[error("Topic exceeds limits: {details}")]
	Limit { details: String },
}

impl TopicError {
	pub fn too_few_segments(topic: impl Into<String>, segments: usize) -> Self {
		Self::TooFewSegments {
			topic: topic.into(),
			segments,
		}
	}

	pub fn unbalanced_braces(topic: impl Into<String>) -> Self {
		Self::UnbalancedBraces {
			topic: topic.into(),
		}
	}

	pub fn invalid_regex(
		pattern: impl Into<String>,
		details: impl ToString,
	) -> Self {
		Self::InvalidRegex {
			pattern: pattern.into(),
			details: details.to_string(),
		}
	}

	pub fn invalid_segment(segment: impl Into<String>, position: usize) -> Self {
		Self::InvalidSegment {
			segment: segment.into(),
			position,
		}
	}

	pub fn invalid_query_topic(
		topic: impl Into<String>,
		reason: impl Into<String>,
	) -> Self {
		Self::InvalidQueryTopic {
			topic: topic.into(),
			reason: reason.into(),
		}
	}

	pub fn limit(details: impl Into<String>) -> Self {
		Self::Limit {
			details: details.into(),
		}
	}

	/// Returns the error type for categorization
	pub fn error_type(&self) -> &'static str {
		match self {
			| TopicError::Empty => "empty_topic",
			| TopicError::TooFewSegments { .. } => "too_few_segments",
			| TopicError::UnbalancedBraces { .. } => "unbalanced_braces",
			| TopicError::InvalidRegex { .. } => "invalid_regex",
			| TopicError::InvalidSegment { .. } => "invalid_segment",
			| TopicError::InvalidPeerTopic { .. } => "invalid_peer_topic",
			| TopicError::InvalidQueryTopic { .. } => "invalid_query_topic",
			| TopicError::Query(_) => "invalid_query",
			| TopicError::Limit { .. } => "limit",
		}
	}
}

pub type TopicResult<T> = Result<T, TopicError>;

/// Hard limits applied while parsing topics
pub mod limits {
	/// Maximum length of a topic string in bytes
	pub const MAX_TOPIC_LENGTH: usize = 4096;
	/// Maximum number of `/`-separated segments
	pub const MAX_TOPIC_DEPTH: usize = 32;
	/// Minimum segments of a stream topic without `**`
	pub const MIN_STREAM_SEGMENTS: usize = 3;
}
