//! Device query language
//!
//! A small SQL-like language used by `query/<ql>` topics to select devices
//! from a registry and by the `?<ql>` suffix of stream topics to filter and
//! project events:
//!
//! ```text
//! select * where type = "led" and (state = "on" or level >= 0.5)
//! select data.level where data.level is not null
//! where name like "kitchen%"
//! ```

mod ast;
pub mod error;
mod eval;
mod lexer;
mod parser;

#[cfg(test)]
mod query_tests;

use std::fmt;

use arcstr::ArcStr;
use serde_json::{Map, Value};

pub use ast::{CompareOp, Expr, FieldPath, Literal, Selection};
pub use error::QueryError;

/// A parsed query.
#[derive(Debug, Clone)]
pub struct Query {
	source: ArcStr,
	selection: Selection,
	filter: Option<Expr>,
}

impl Query {
	pub fn parse(source: &str) -> Result<Self, QueryError> {
		let source = source.trim();
		if source.is_empty() {
			return Err(QueryError::Empty);
		}
		let tokens = lexer::tokenize(source)?;
		let (selection, filter) = parser::Parser::new(tokens).parse()?;
		Ok(Self {
			source: ArcStr::from(source),
			selection,
			filter,
		})
	}

	pub fn source(&self) -> &str {
		&self.source
	}

	pub fn selection(&self) -> &Selection {
		&self.selection
	}

	pub fn filter(&self) -> Option<&Expr> {
		self.filter.as_ref()
	}

	pub fn selects_all(&self) -> bool {
		matches!(self.selection, Selection::All)
	}

	/// True when there is no `where` clause or it holds for `document`.
	pub fn matches(&self, document: &Value) -> bool {
		self.filter.as_ref().is_none_or(|expr| expr.eval(document))
	}

	/// Applies the `select` list. `select *` returns the document as is;
	/// a field list builds an object keyed by the dotted paths.
	pub fn project(&self, document: &Value) -> Value {
		match &self.selection {
			| Selection::All => document.clone(),
			| Selection::Fields(fields) => {
				let projected: Map<String, Value> = fields
					.iter()
					.map(|field| {
						let value =
							field.resolve(document).cloned().unwrap_or_default();
						(field.to_string(), value)
					})
					.collect();
				Value::Object(projected)
			}
		}
	}

	/// Filter then project.
	pub fn apply(&self, document: &Value) -> Option<Value> {
		self.matches(document).then(|| self.project(document))
	}
}

impl fmt::Display for Query {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.source)
	}
}
