use std::fmt;
use std::sync::Arc;

use arcstr::ArcStr;
use percent_encoding::percent_decode_str;
use uuid::Uuid;

use super::error::{TopicError, TopicResult};
use crate::query::Query;

const ANONYMOUS_PREFIX: &str = "query/";
const IDENTIFIED_PREFIX: &str = "query:";

/// A device query topic: `query/<ql>` or `query:<id>/<ql>`.
///
/// A topic without an id gets a generated one, but it still matches any
/// publication carrying the same query text.
#[derive(Debug, Clone)]
pub struct QueryTopic {
	id: ArcStr,
	explicit_id: bool,
	ql: ArcStr,
	query: Arc<Query>,
}

/// Splits a query topic into its optional id and the raw (encoded) query.
fn split_parts(topic: &str) -> TopicResult<(Option<&str>, &str)> {
	if let Some(rest) = topic.strip_prefix(IDENTIFIED_PREFIX) {
		let (id, ql) = rest.split_once('/').ok_or_else(|| {
			TopicError::invalid_query_topic(topic, "missing query text")
		})?;
		if id.is_empty() {
			return Err(TopicError::invalid_query_topic(topic, "empty query id"));
		}
		Ok((Some(id), ql))
	} else if let Some(ql) = topic.strip_prefix(ANONYMOUS_PREFIX) {
		Ok((None, ql))
	} else {
		Err(TopicError::invalid_query_topic(
			topic,
			"expected 'query/' or 'query:<id>/' prefix",
		))
	}
}

impl QueryTopic {
	pub fn is_query(topic: &str) -> bool {
		topic.starts_with(ANONYMOUS_PREFIX)
			|| topic.starts_with(IDENTIFIED_PREFIX)
	}

	pub fn parse(topic: &str) -> TopicResult<Self> {
		let (id, raw_ql) = split_parts(topic)?;
		let ql = percent_decode_str(raw_ql).decode_utf8_lossy();
		if ql.trim().is_empty() {
			return Err(TopicError::invalid_query_topic(
				topic,
				"missing query text",
			));
		}
		let query = Query::parse(&ql)?;
		let (id, explicit_id) = match id {
			| Some(id) => (ArcStr::from(id), true),
			| None => (ArcStr::from(Uuid::new_v4().to_string()), false),
		};
		Ok(Self {
			id,
			explicit_id,
			ql: ArcStr::from(ql.as_ref()),
			query: Arc::new(query),
		})
	}

	pub fn format(id: &str, ql: &str) -> String {
		format!("{IDENTIFIED_PREFIX}{id}/{ql}")
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	pub fn has_explicit_id(&self) -> bool {
		self.explicit_id
	}

	/// Decoded query text.
	pub fn ql(&self) -> &str {
		&self.ql
	}

	pub fn query(&self) -> &Arc<Query> {
		&self.query
	}

	/// Whether a publication on `candidate` is meant for this subscription.
	/// An explicit id must match exactly; without one only the query text
	/// is compared.
	pub fn accepts(&self, candidate: &str) -> bool {
		let Ok((id, raw_ql)) = split_parts(candidate) else {
			return false;
		};
		let ql = percent_decode_str(raw_ql).decode_utf8_lossy();
		if ql != self.ql.as_str() {
			return false;
		}
		match id {
			| Some(id) => !self.explicit_id || id == self.id.as_str(),
			| None => !self.explicit_id,
		}
	}
}

impl fmt::Display for QueryTopic {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.explicit_id {
			write!(f, "{}", Self::format(&self.id, &self.ql))
		} else {
			write!(f, "{ANONYMOUS_PREFIX}{}", self.ql)
		}
	}
}
