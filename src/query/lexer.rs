use std::fmt;

use super::error::QueryError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
	/// Bare word: a keyword or a dotted field path
	Word(String),
	Str(String),
	Number(f64),
	Star,
	Comma,
	LParen,
	RParen,
	Eq,
	Ne,
	Lt,
	Le,
	Gt,
	Ge,
}

impl Token {
	pub fn is_keyword(&self, keyword: &str) -> bool {
		matches!(self, Token::Word(word) if word.eq_ignore_ascii_case(keyword))
	}
}

impl fmt::Display for Token {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			| Token::Word(word) => f.write_str(word),
			| Token::Str(text) => write!(f, "\"{text}\""),
			| Token::Number(n) => write!(f, "{n}"),
			| Token::Star => f.write_str("*"),
			| Token::Comma => f.write_str(","),
			| Token::LParen => f.write_str("("),
			| Token::RParen => f.write_str(")"),
			| Token::Eq => f.write_str("="),
			| Token::Ne => f.write_str("!="),
			| Token::Lt => f.write_str("<"),
			| Token::Le => f.write_str("<="),
			| Token::Gt => f.write_str(">"),
			| Token::Ge => f.write_str(">="),
		}
	}
}

fn is_word_start(ch: char) -> bool {
	ch.is_ascii_alphabetic() || ch == '_'
}

fn is_word_char(ch: char) -> bool {
	ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-')
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, QueryError> {
	let mut tokens = Vec::new();
	let mut chars = source.char_indices().peekable();

	while let Some(&(offset, ch)) = chars.peek() {
		match ch {
			| c if c.is_whitespace() => {
				chars.next();
			}
			| '*' => {
				chars.next();
				tokens.push(Token::Star);
			}
			| ',' => {
				chars.next();
				tokens.push(Token::Comma);
			}
			| '(' => {
				chars.next();
				tokens.push(Token::LParen);
			}
			| ')' => {
				chars.next();
				tokens.push(Token::RParen);
			}
			| '=' => {
				chars.next();
				tokens.push(Token::Eq);
			}
			| '!' => {
				chars.next();
				match chars.next() {
					| Some((_, '=')) => tokens.push(Token::Ne),
					| _ => return Err(QueryError::UnexpectedChar { ch, offset }),
				}
			}
			| '<' | '>' => {
				chars.next();
				let or_equal = chars.next_if(|&(_, c)| c == '=').is_some();
				let not_equal =
					ch == '<' && chars.next_if(|&(_, c)| c == '>').is_some();
				tokens.push(match (ch, or_equal, not_equal) {
					| ('<', _, true) => Token::Ne,
					| ('<', true, _) => Token::Le,
					| ('<', false, _) => Token::Lt,
					| (_, true, _) => Token::Ge,
					| _ => Token::Gt,
				});
			}
			| '"' | '\'' => {
				chars.next();
				let mut text = String::new();
				let mut closed = false;
				while let Some((_, c)) = chars.next() {
					match c {
						| '\\' => {
							if let Some((_, escaped)) = chars.next() {
								text.push(escaped);
							}
						}
						| c if c == ch => {
							closed = true;
							break;
						}
						| c => text.push(c),
					}
				}
				if !closed {
					return Err(QueryError::UnterminatedString { offset });
				}
				tokens.push(Token::Str(text));
			}
			| c if c.is_ascii_digit() || c == '-' => {
				let mut literal = String::new();
				literal.push(c);
				chars.next();
				while let Some((_, c)) = chars.next_if(|&(_, c)| {
					c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+')
				}) {
					literal.push(c);
				}
				let value = literal
					.parse::<f64>()
					.map_err(|_| QueryError::InvalidNumber { literal })?;
				tokens.push(Token::Number(value));
			}
			| c if is_word_start(c) => {
				let mut word = String::new();
				while let Some((_, c)) = chars.next_if(|&(_, c)| is_word_char(c))
				{
					word.push(c);
				}
				tokens.push(Token::Word(word));
			}
			| _ => return Err(QueryError::UnexpectedChar { ch, offset }),
		}
	}
	Ok(tokens)
}
