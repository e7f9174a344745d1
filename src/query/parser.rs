use regex::Regex;

use super::ast::{CompareOp, Expr, FieldPath, Literal, Selection};
use super::error::QueryError;
use super::lexer::Token;

/// Recursive descent over the token list.
///
/// ```text
/// query     := [select] [where]          (at least one)
/// select    := SELECT ('*' | path (',' path)*)
/// where     := WHERE or_expr
/// or_expr   := and_expr (OR and_expr)*
/// and_expr  := unary (AND unary)*
/// unary     := NOT unary | '(' or_expr ')' | predicate
/// predicate := path (cmp literal | LIKE string | IS [NOT] NULL)
/// ```
pub(crate) struct Parser {
	tokens: Vec<Token>,
	pos: usize,
}

impl Parser {
	pub fn new(tokens: Vec<Token>) -> Self {
		Self { tokens, pos: 0 }
	}

	pub fn parse(mut self) -> Result<(Selection, Option<Expr>), QueryError> {
		if self.tokens.is_empty() {
			return Err(QueryError::Empty);
		}

		let selection = if self.eat_keyword("select") {
			self.selection()?
		} else {
			Selection::All
		};

		let filter = if self.eat_keyword("where") {
			Some(self.or_expr()?)
		} else {
			None
		};

		if let Some(token) = self.peek() {
			return Err(QueryError::unexpected_token(
				"end of query",
				token,
			));
		}
		Ok((selection, filter))
	}

	fn peek(&self) -> Option<&Token> {
		self.tokens.get(self.pos)
	}

	fn next(&mut self) -> Option<Token> {
		let token = self.tokens.get(self.pos).cloned();
		if token.is_some() {
			self.pos += 1;
		}
		token
	}

	fn eat(&mut self, expected: &Token) -> bool {
		if self.peek() == Some(expected) {
			self.pos += 1;
			true
		} else {
			false
		}
	}

	fn eat_keyword(&mut self, keyword: &str) -> bool {
		if self.peek().is_some_and(|t| t.is_keyword(keyword)) {
			self.pos += 1;
			true
		} else {
			false
		}
	}

	fn expect_keyword(
		&mut self,
		keyword: &'static str,
	) -> Result<(), QueryError> {
		match self.next() {
			| Some(token) if token.is_keyword(keyword) => Ok(()),
			| Some(token) => Err(QueryError::unexpected_token(keyword, token)),
			| None => Err(QueryError::UnexpectedEnd { expected: keyword }),
		}
	}

	fn selection(&mut self) -> Result<Selection, QueryError> {
		if self.eat(&Token::Star) {
			return Ok(Selection::All);
		}
		let mut fields = vec![self.field()?];
		while self.eat(&Token::Comma) {
			fields.push(self.field()?);
		}
		Ok(Selection::Fields(fields))
	}

	fn field(&mut self) -> Result<FieldPath, QueryError> {
		match self.next() {
			| Some(Token::Word(word)) => FieldPath::parse(&word)
				.ok_or_else(|| QueryError::unexpected_token("field", word)),
			| Some(token) => Err(QueryError::unexpected_token("field", token)),
			| None => Err(QueryError::UnexpectedEnd { expected: "field" }),
		}
	}

	fn or_expr(&mut self) -> Result<Expr, QueryError> {
		let mut expr = self.and_expr()?;
		while self.eat_keyword("or") {
			let rhs = self.and_expr()?;
			expr = Expr::Or(Box::new(expr), Box::new(rhs));
		}
		Ok(expr)
	}

	fn and_expr(&mut self) -> Result<Expr, QueryError> {
		let mut expr = self.unary()?;
		while self.eat_keyword("and") {
			let rhs = self.unary()?;
			expr = Expr::And(Box::new(expr), Box::new(rhs));
		}
		Ok(expr)
	}

	fn unary(&mut self) -> Result<Expr, QueryError> {
		if self.eat_keyword("not") {
			return Ok(Expr::Not(Box::new(self.unary()?)));
		}
		if self.eat(&Token::LParen) {
			let expr = self.or_expr()?;
			if !self.eat(&Token::RParen) {
				return match self.next() {
					| Some(token) => Err(QueryError::unexpected_token(")", token)),
					| None => Err(QueryError::UnexpectedEnd { expected: ")" }),
				};
			}
			return Ok(expr);
		}
		self.predicate()
	}

	fn predicate(&mut self) -> Result<Expr, QueryError> {
		let field = self.field()?;

		if self.eat_keyword("is") {
			let negated = self.eat_keyword("not");
			self.expect_keyword("null")?;
			return Ok(Expr::IsNull { field, negated });
		}

		if self.eat_keyword("like") {
			return match self.next() {
				| Some(Token::Str(pattern)) => Ok(Expr::Like {
					field,
					pattern: like_to_regex(&pattern)?,
				}),
				| Some(token) => {
					Err(QueryError::unexpected_token("string pattern", token))
				}
				| None => Err(QueryError::UnexpectedEnd {
					expected: "string pattern",
				}),
			};
		}

		let op = match self.next() {
			| Some(Token::Eq) => CompareOp::Eq,
			| Some(Token::Ne) => CompareOp::Ne,
			| Some(Token::Lt) => CompareOp::Lt,
			| Some(Token::Le) => CompareOp::Le,
			| Some(Token::Gt) => CompareOp::Gt,
			| Some(Token::Ge) => CompareOp::Ge,
			| Some(token) => {
				return Err(QueryError::unexpected_token("operator", token));
			}
			| None => {
				return Err(QueryError::UnexpectedEnd {
					expected: "operator",
				});
			}
		};
		let value = self.literal()?;
		Ok(Expr::Compare { field, op, value })
	}

	fn literal(&mut self) -> Result<Literal, QueryError> {
		match self.next() {
			| Some(Token::Str(text)) => Ok(Literal::Str(text)),
			| Some(Token::Number(n)) => Ok(Literal::Number(n)),
			| Some(token) if token.is_keyword("true") => Ok(Literal::Bool(true)),
			| Some(token) if token.is_keyword("false") => {
				Ok(Literal::Bool(false))
			}
			| Some(token) if token.is_keyword("null") => Ok(Literal::Null),
			| Some(token) => Err(QueryError::unexpected_token("literal", token)),
			| None => Err(QueryError::UnexpectedEnd {
				expected: "literal",
			}),
		}
	}
}

/// `%` matches any run of characters; everything else is literal.
fn like_to_regex(pattern: &str) -> Result<Regex, QueryError> {
	let body = pattern
		.split('%')
		.map(regex::escape)
		.collect::<Vec<_>>()
		.join(".*");
	Regex::new(&format!("^(?s:{body})$"))
		.map_err(|_| QueryError::unexpected_token("like pattern", pattern))
}
