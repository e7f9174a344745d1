use serde_json::json;

use super::{Query, QueryError, Selection};

fn query(source: &str) -> Query {
	Query::parse(source).expect("Query should be valid")
}

// Helper: every (document, expected) pair must agree with `matches`
fn check_filter(source: &str, cases: &[(serde_json::Value, bool)]) {
	let parsed = query(source);
	for (document, expected) in cases {
		assert_eq!(
			parsed.matches(document),
			*expected,
			"query '{source}' vs {document}"
		);
	}
}

#[test]
fn test_select_star_with_where() {
	let parsed = query("select * where type = \"led\"");
	assert!(parsed.selects_all());
	assert!(parsed.filter().is_some());
	assert_eq!(parsed.source(), "select * where type = \"led\"");
}

#[test]
fn test_where_only() {
	let parsed = query("where type = 'led'");
	assert!(parsed.selects_all());
	assert!(parsed.matches(&json!({"type": "led"})));
}

#[test]
fn test_select_without_where_matches_everything() {
	let parsed = query("select id, data.level");
	assert!(matches!(parsed.selection(), Selection::Fields(f) if f.len() == 2));
	assert!(parsed.matches(&json!({})));
}

#[test]
fn test_keywords_are_case_insensitive() {
	check_filter(
		"SELECT * WHERE type = \"led\" AND NOT state = \"off\"",
		&[
			(json!({"type": "led", "state": "on"}), true),
			(json!({"type": "led", "state": "off"}), false),
		],
	);
}

#[test]
fn test_comparisons() {
	check_filter(
		"where level > 2 and level <= 10",
		&[
			(json!({"level": 2}), false),
			(json!({"level": 2.5}), true),
			(json!({"level": 10}), true),
			(json!({"level": 11}), false),
			(json!({"level": "5"}), false),
			(json!({}), false),
		],
	);
	check_filter(
		"where name != \"a\"",
		&[(json!({"name": "b"}), true), (json!({"name": "a"}), false)],
	);
	check_filter("where name <> 'a'", &[(json!({"name": "b"}), true)]);
	check_filter(
		"where name >= \"m\"",
		&[(json!({"name": "z"}), true), (json!({"name": "a"}), false)],
	);
	check_filter(
		"where level < -1.5",
		&[(json!({"level": -2}), true), (json!({"level": 0}), false)],
	);
}

#[test]
fn test_boolean_and_null_literals() {
	check_filter(
		"where online = true",
		&[(json!({"online": true}), true), (json!({"online": false}), false)],
	);
	check_filter(
		"where owner = null",
		&[(json!({}), true), (json!({"owner": "x"}), false)],
	);
}

#[test]
fn test_is_null() {
	check_filter(
		"where data.level is null",
		&[
			(json!({"data": {}}), true),
			(json!({"data": {"level": null}}), true),
			(json!({"data": {"level": 1}}), false),
		],
	);
	check_filter(
		"where data.level is not null",
		&[(json!({"data": {"level": 1}}), true), (json!({}), false)],
	);
}

#[test]
fn test_like() {
	check_filter(
		"where name like \"kitchen%\"",
		&[
			(json!({"name": "kitchen light"}), true),
			(json!({"name": "kitchen"}), true),
			(json!({"name": "the kitchen"}), false),
			(json!({"name": 5}), false),
		],
	);
	// regex metacharacters are literal
	check_filter(
		"where name like \"a.b%\"",
		&[(json!({"name": "a.b1"}), true), (json!({"name": "axb1"}), false)],
	);
}

#[test]
fn test_precedence_and_parentheses() {
	// and binds tighter than or
	check_filter(
		"where a = 1 or b = 1 and c = 1",
		&[
			(json!({"a": 1}), true),
			(json!({"b": 1}), false),
			(json!({"b": 1, "c": 1}), true),
		],
	);
	check_filter(
		"where (a = 1 or b = 1) and c = 1",
		&[(json!({"a": 1}), false), (json!({"a": 1, "c": 1}), true)],
	);
}

#[test]
fn test_projection() {
	let parsed = query("select data.level, id where data.level > 1");
	let document = json!({"id": "led-1", "data": {"level": 3, "x": 1}});
	assert_eq!(
		parsed.apply(&document),
		Some(json!({"data.level": 3, "id": "led-1"}))
	);
	assert_eq!(parsed.apply(&json!({"data": {"level": 0}})), None);

	let missing = query("select missing");
	assert_eq!(missing.project(&json!({})), json!({"missing": null}));
}

#[test]
fn test_parse_errors() {
	assert!(matches!(Query::parse(""), Err(QueryError::Empty)));
	assert!(matches!(Query::parse("   "), Err(QueryError::Empty)));
	let cases = [
		("where", "unexpected_end"),
		("where a", "unexpected_end"),
		("where a = ", "unexpected_end"),
		("where a = 1 b", "unexpected_token"),
		("where a == 1", "unexpected_token"),
		("where (a = 1", "unexpected_end"),
		("where a = \"open", "unterminated_string"),
		("where a = 1.2.3", "invalid_number"),
		("where a = #", "unexpected_char"),
		("select", "unexpected_end"),
		("hello", "unexpected_token"),
		("where a like 5", "unexpected_token"),
		("where a is 5", "unexpected_token"),
	];
	for (source, expected) in cases {
		let err = Query::parse(source).expect_err(source);
		assert_eq!(err.error_type(), expected, "{source}: {err}");
	}
}
