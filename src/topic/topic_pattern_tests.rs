//! Tests for topic parsing and matching

use arcstr::{ArcStr, Substr};

use super::{Topic, TopicError, TopicKind, TopicSegment};

fn literal(text: &str) -> TopicSegment {
	TopicSegment::Literal(Substr::full(ArcStr::from(text)))
}

fn topic(pattern: &str) -> Topic {
	Topic::parse(pattern).expect("Pattern should be valid")
}

// Helper: every (candidate, expected) pair must agree with `matches`
fn check_matches(pattern: &str, cases: &[(&str, bool)]) {
	let parsed = topic(pattern);
	for (candidate, expected) in cases {
		assert_eq!(
			parsed.matches(candidate),
			*expected,
			"pattern '{pattern}' vs candidate '{candidate}'"
		);
	}
}

mod parse_tests {
	use super::*;

	#[test]
	fn test_literal_topic() {
		let parsed = topic("led/123/state");
		assert!(!parsed.is_pattern());
		assert_eq!(parsed.key().as_str(), "led/123/state");
		assert_eq!(parsed.segments().len(), 3);
		assert!(parsed.server_segment().is_none());
		assert_eq!(
			parsed.device_type(),
			Some(&literal("led"))
		);
	}

	#[test]
	fn test_server_topic_positions() {
		let parsed = topic("hub/led/*/state");
		assert!(parsed.is_pattern());
		assert_eq!(
			parsed.server_segment(),
			Some(&literal("hub"))
		);
		assert_eq!(parsed.device_id(), Some(&TopicSegment::Any));
		assert_eq!(
			parsed.stream_name(),
			Some(&literal("state"))
		);
	}

	#[test]
	fn test_empty_topic() {
		assert_eq!(Topic::parse(""), Err(TopicError::Empty));
		assert_eq!(Topic::parse("   "), Err(TopicError::Empty));
	}

	#[test]
	fn test_too_few_segments() {
		let err = Topic::parse("led/state").unwrap_err();
		assert_eq!(err.error_type(), "too_few_segments");
		// `**` lifts the minimum
		assert!(Topic::parse("led/**").is_ok());
	}

	#[test]
	fn test_unbalanced_braces() {
		for pattern in ["led/{^a/state", "led/a}/state", "led/{{x}/state"] {
			let err = Topic::parse(pattern).unwrap_err();
			assert_eq!(err.error_type(), "unbalanced_braces", "{pattern}");
		}
	}

	#[test]
	fn test_invalid_regex() {
		let err = Topic::parse("led/{[a-}/state").unwrap_err();
		assert!(matches!(err, TopicError::InvalidRegex { .. }));
	}

	#[test]
	fn test_invalid_segments() {
		assert!(matches!(
			Topic::parse("led//state"),
			Err(TopicError::InvalidSegment { position: 1, .. })
		));
		assert!(matches!(
			Topic::parse("led/a{b}/state"),
			Err(TopicError::InvalidSegment { .. })
		));
	}

	#[test]
	fn test_regex_keeps_slashes_inside_braces() {
		let parsed = topic("led/{^a/b$}/state");
		assert_eq!(parsed.segments().len(), 3);
		assert!(parsed.matches("led/a\\/b/state"));
	}

	#[test]
	fn test_escaped_slash_in_literal() {
		let parsed = topic("led/a\\/b/state");
		assert_eq!(parsed.segments().len(), 3);
		assert_eq!(parsed.segments()[1], literal("a/b"));
		assert_eq!(parsed.segments()[1].to_string(), "a\\/b");
	}

	#[test]
	fn test_stream_query_suffix() {
		let parsed = topic("led/*/state?where data = \"on\"");
		assert_eq!(parsed.segments().len(), 3);
		assert!(parsed.stream_query().is_some());
		assert!(parsed.matches("led/1/state"));
		// key keeps the query so filtered and unfiltered are distinct
		assert_ne!(parsed, topic("led/*/state"));
	}

	#[test]
	fn test_stream_query_percent_encoded() {
		let parsed = topic("led/*/state?where%20data%20%3E%205");
		assert!(parsed.stream_query().is_some());
	}

	#[test]
	fn test_invalid_stream_query() {
		let err = Topic::parse("led/*/state?where").unwrap_err();
		assert_eq!(err.error_type(), "invalid_query");
	}

	#[test]
	fn test_peer_topics() {
		let parsed = topic("_peer/connect");
		assert!(parsed.is_peer_event());
		assert!(matches!(parsed.kind(), TopicKind::Peer(_)));
		assert!(matches!(
			Topic::parse("_peer/connect/extra"),
			Err(TopicError::InvalidPeerTopic { .. })
		));
	}

	#[test]
	fn test_query_topics() {
		let parsed = topic("query/where type = \"led\"");
		let TopicKind::Query(query) = parsed.kind() else {
			panic!("expected query topic");
		};
		assert!(!query.has_explicit_id());
		assert_eq!(query.ql(), "where type = \"led\"");

		let parsed = topic("query:abc/where type = \"led\"");
		let TopicKind::Query(query) = parsed.kind() else {
			panic!("expected query topic");
		};
		assert_eq!(query.id(), "abc");
		assert!(query.has_explicit_id());

		assert!(Topic::parse("query:/where a = 1").is_err());
		assert!(Topic::parse("query/").is_err());
	}
}

mod matching_tests {
	use super::*;

	#[test]
	fn test_single_wildcard() {
		check_matches(
			"led/123/*",
			&[
				("led/123/state", true),
				("led/123/power", true),
				("led/1234/state", false),
				("led/123/state/extra", false),
			],
		);
	}

	#[test]
	fn test_regex_segment() {
		check_matches(
			"{^Det.+$}/led/*/state",
			&[
				("Detroit-123/led/1/state", true),
				("Detroit/led/1/state", true),
				("Chicago/led/1/state", false),
				("Det/led/1/state", false),
			],
		);
	}

	#[test]
	fn test_multi_wildcard() {
		check_matches(
			"led/**",
			&[
				("led/123/state", true),
				("led/a/b/c/d", true),
				("sensor/123/state", false),
			],
		);
		check_matches(
			"**/state",
			&[
				("led/123/state", true),
				("hub/led/123/state", true),
				("led/123/power", false),
			],
		);
		check_matches(
			"hub/**/state",
			&[
				("hub/led/123/state", true),
				("hub/led/state", true),
				("hub/state/x", false),
			],
		);
	}

	#[test]
	fn test_multi_wildcard_needs_one_segment() {
		check_matches(
			"led/123/state/**",
			&[("led/123/state", false), ("led/123/state/a", true)],
		);
	}

	#[test]
	fn test_stream_patterns_ignore_special_topics() {
		check_matches(
			"**",
			&[
				("led/1/state", true),
				("_peer/connect", false),
				("query/where a = 1/b/c", false),
			],
		);
	}

	#[test]
	fn test_peer_topic_matching() {
		check_matches(
			"_peer/*",
			&[
				("_peer/connect", true),
				("_peer/disconnect", true),
				("led/1/state", false),
			],
		);
		check_matches(
			"_peer/connect",
			&[("_peer/connect", true), ("_peer/disconnect", false)],
		);
	}

	#[test]
	fn test_query_topic_matching() {
		let ql = "where type = \"led\"";
		let anonymous = format!("query/{ql}");
		let identified = format!("query:xyz/{ql}");
		check_matches(
			&anonymous,
			&[
				(identified.as_str(), true),
				(anonymous.as_str(), true),
				("query:xyz/where type = \"sensor\"", false),
			],
		);

		let own = format!("query:abc/{ql}");
		let other = format!("query:other/{ql}");
		check_matches(&own, &[(own.as_str(), true), (other.as_str(), false)]);
	}

	#[test]
	fn test_query_topic_matches_encoded_publication() {
		check_matches(
			"query/where type = \"led\"",
			&[("query:1/where%20type%20%3D%20%22led%22", true)],
		);
	}

	#[test]
	fn test_matches_server() {
		let parsed = topic("hub/led/*/state");
		assert!(parsed.matches_server("hub"));
		assert!(!parsed.matches_server("cloud"));

		// local-only without a server segment
		assert!(!topic("led/*/state").matches_server("hub"));

		assert!(topic("*/led/1/state").matches_server("anything"));
		assert!(topic("**").matches_server("hub"));
		assert!(topic("{^Det}/led/*/state").matches_server("Detroit"));
		assert!(!topic("_peer/connect").matches_server("hub"));
		assert!(!topic("query/where a = 1").matches_server("hub"));
	}
}
