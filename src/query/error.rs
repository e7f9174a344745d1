use thiserror::Error;

/// Errors produced while parsing a query
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
	#[error("Query cannot be empty")]
	Empty,

	#[error("Unexpected character '{ch}' at offset {offset}")]
	UnexpectedChar { ch: char, offset: usize },

	#[error("Unterminated string literal starting at offset {offset}")]
	UnterminatedString { offset: usize },

	#[error("Invalid number literal '{literal}'")]
	InvalidNumber { literal: String },

	#[error("Expected {expected}, found '{found}'")]
	UnexpectedToken {
		expected: &'static str,
		found: String,
	},

	#[error("Expected {expected}, found end of query")]
	UnexpectedEnd { expected: &'static str },
}

impl QueryError {
	pub fn unexpected_token(expected: &'static str, found: impl ToString) -> Self {
		Self::UnexpectedToken {
			expected,
			found: found.to_string(),
		}
	}

	pub fn error_type(&self) -> &'static str {
		match self {
			| QueryError::Empty => "empty_query",
			| QueryError::UnexpectedChar { .. } => "unexpected_char",
			| QueryError::UnterminatedString { .. } => "unterminated_string",
			| QueryError::InvalidNumber { .. } => "invalid_number",
			| QueryError::UnexpectedToken { .. } => "unexpected_token",
			| QueryError::UnexpectedEnd { .. } => "unexpected_end",
		}
	}
}
