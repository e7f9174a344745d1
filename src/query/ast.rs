use std::fmt;

use regex::Regex;
use serde_json::Value;

/// Dotted path into a JSON document, e.g. `data.level`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
	pub fn parse(dotted: &str) -> Option<Self> {
		let parts: Vec<String> = dotted.split('.').map(str::to_owned).collect();
		if parts.iter().any(String::is_empty) {
			return None;
		}
		Some(Self(parts))
	}

	pub fn resolve<'a>(&self, value: &'a Value) -> Option<&'a Value> {
		self.0
			.iter()
			.try_fold(value, |current, key| current.as_object()?.get(key))
	}
}

impl fmt::Display for FieldPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0.join("."))
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
	Null,
	Bool(bool),
	Number(f64),
	Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
	Eq,
	Ne,
	Lt,
	Le,
	Gt,
	Ge,
}

#[derive(Debug, Clone)]
pub enum Selection {
	All,
	Fields(Vec<FieldPath>),
}

#[derive(Debug, Clone)]
pub enum Expr {
	And(Box<Expr>, Box<Expr>),
	Or(Box<Expr>, Box<Expr>),
	Not(Box<Expr>),
	Compare {
		field: FieldPath,
		op: CompareOp,
		value: Literal,
	},
	/// `field like "pat%"`, compiled to an anchored regex
	Like { field: FieldPath, pattern: Regex },
	IsNull { field: FieldPath, negated: bool },
}
