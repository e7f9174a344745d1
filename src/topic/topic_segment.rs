use std::borrow::Cow;
use std::fmt;
use std::ops::Range;

use arcstr::{ArcStr, Substr};
use regex::Regex;
use smallvec::SmallVec;

use super::error::{TopicError, TopicResult};

/// One `/`-separated component of a subscription topic.
#[derive(Debug, Clone)]
pub enum TopicSegment {
	/// Exact text, with `\/` already unescaped
	Literal(Substr),
	/// `*`: exactly one segment
	Any,
	/// `**`: one or more segments
	AnyMany,
	/// `{regex}`: one segment matching the (unanchored) expression
	Pattern(Regex),
}

impl TopicSegment {
	pub(crate) fn parse(raw: Substr, position: usize) -> TopicResult<Self> {
		let segment = match raw.as_str() {
			| "" => return Err(TopicError::invalid_segment("", position)),
			| "*" => TopicSegment::Any,
			| "**" => TopicSegment::AnyMany,
			| s if s.starts_with('{') => {
				if s.len() < 2 || !s.ends_with('}') {
					return Err(TopicError::invalid_segment(s, position));
				}
				let inner = &s[1 .. s.len() - 1];
				if inner.is_empty() {
					return Err(TopicError::invalid_segment(s, position));
				}
				let regex = Regex::new(inner)
					.map_err(|err| TopicError::invalid_regex(inner, err))?;
				TopicSegment::Pattern(regex)
			}
			| s if s.contains(['{', '}']) => {
				return Err(TopicError::invalid_segment(s, position));
			}
			| s if s.contains("\\/") => TopicSegment::Literal(Substr::full(
				ArcStr::from(s.replace("\\/", "/")),
			)),
			| _ => TopicSegment::Literal(raw),
		};
		Ok(segment)
	}

	pub fn is_wildcard(&self) -> bool {
		!matches!(self, TopicSegment::Literal(_))
	}

	/// Tests a single concrete segment. `**` accepts any segment here, the
	/// span it covers is decided by the path matcher.
	pub fn matches_segment(&self, candidate: &str) -> bool {
		match self {
			| TopicSegment::Literal(text) => text.as_str() == candidate,
			| TopicSegment::Any | TopicSegment::AnyMany => true,
			| TopicSegment::Pattern(regex) => regex.is_match(candidate),
		}
	}

	pub fn as_pattern(&self) -> Cow<'_, str> {
		match self {
			| TopicSegment::Literal(text) if text.contains('/') => {
				Cow::Owned(text.replace('/', "\\/"))
			}
			| TopicSegment::Literal(text) => Cow::Borrowed(text.as_str()),
			| TopicSegment::Any => Cow::Borrowed("*"),
			| TopicSegment::AnyMany => Cow::Borrowed("**"),
			| TopicSegment::Pattern(regex) => {
				Cow::Owned(format!("{{{}}}", regex.as_str()))
			}
		}
	}
}

impl PartialEq for TopicSegment {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			| (TopicSegment::Literal(a), TopicSegment::Literal(b)) => {
				a.as_str() == b.as_str()
			}
			| (TopicSegment::Any, TopicSegment::Any)
			| (TopicSegment::AnyMany, TopicSegment::AnyMany) => true,
			| (TopicSegment::Pattern(a), TopicSegment::Pattern(b)) => {
				a.as_str() == b.as_str()
			}
			| _ => false,
		}
	}
}

impl Eq for TopicSegment {}

impl fmt::Display for TopicSegment {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.as_pattern())
	}
}

/// Result of scanning a subscription topic: segment byte ranges and the
/// offset of the `?` that opens the stream query, if any.
pub(crate) struct ScannedTopic {
	pub segments: SmallVec<[Range<usize>; 4]>,
	pub query_start: Option<usize>,
}

/// Splits a topic pattern on `/` outside of `{...}` groups. A backslash
/// escapes the next character, so `\/` stays inside its segment and `\{`
/// does not open a group.
pub(crate) fn scan_pattern(topic: &str) -> TopicResult<ScannedTopic> {
	let mut segments = SmallVec::new();
	let mut depth = 0usize;
	let mut start = 0;
	let mut escaped = false;

	for (idx, ch) in topic.char_indices() {
		if escaped {
			escaped = false;
			continue;
		}
		match ch {
			| '\\' => escaped = true,
			| '{' => depth += 1,
			| '}' => {
				depth = depth
					.checked_sub(1)
					.ok_or_else(|| TopicError::unbalanced_braces(topic))?;
			}
			| '/' if depth == 0 => {
				segments.push(start .. idx);
				start = idx + 1;
			}
			| '?' if depth == 0 => {
				segments.push(start .. idx);
				return Ok(ScannedTopic {
					segments,
					query_start: Some(idx),
				});
			}
			| _ => {}
		}
	}
	if depth != 0 {
		return Err(TopicError::unbalanced_braces(topic));
	}
	segments.push(start .. topic.len());
	Ok(ScannedTopic {
		segments,
		query_start: None,
	})
}

/// Splits a concrete topic on unescaped `/`.
pub(crate) fn split_concrete(path: &ArcStr) -> SmallVec<[Substr; 4]> {
	let mut segments = SmallVec::new();
	let mut start = 0;
	let mut escaped = false;
	for (idx, ch) in path.char_indices() {
		if escaped {
			escaped = false;
			continue;
		}
		match ch {
			| '\\' => escaped = true,
			| '/' => {
				segments.push(unescape(path.substr(start .. idx)));
				start = idx + 1;
			}
			| _ => {}
		}
	}
	segments.push(unescape(path.substr(start .. path.len())));
	segments
}

fn unescape(segment: Substr) -> Substr {
	if segment.contains("\\/") {
		Substr::full(ArcStr::from(segment.replace("\\/", "/")))
	} else {
		segment
	}
}
