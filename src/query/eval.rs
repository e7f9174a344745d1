use std::cmp::Ordering;

use serde_json::Value;

use super::ast::{CompareOp, Expr, Literal};

impl Expr {
	/// Evaluates the expression against a JSON document. Missing fields
	/// behave like `null`.
	pub fn eval(&self, document: &Value) -> bool {
		match self {
			| Expr::And(lhs, rhs) => lhs.eval(document) && rhs.eval(document),
			| Expr::Or(lhs, rhs) => lhs.eval(document) || rhs.eval(document),
			| Expr::Not(inner) => !inner.eval(document),
			| Expr::Compare { field, op, value } => {
				let actual = field.resolve(document).unwrap_or(&Value::Null);
				compare(actual, *op, value)
			}
			| Expr::Like { field, pattern } => field
				.resolve(document)
				.and_then(Value::as_str)
				.is_some_and(|text| pattern.is_match(text)),
			| Expr::IsNull { field, negated } => {
				let is_null = field.resolve(document).is_none_or(Value::is_null);
				is_null != *negated
			}
		}
	}
}

fn compare(actual: &Value, op: CompareOp, expected: &Literal) -> bool {
	match op {
		| CompareOp::Eq => equals(actual, expected),
		| CompareOp::Ne => !equals(actual, expected),
		| CompareOp::Lt => ordering(actual, expected) == Some(Ordering::Less),
		| CompareOp::Le => matches!(
			ordering(actual, expected),
			Some(Ordering::Less | Ordering::Equal)
		),
		| CompareOp::Gt => {
			ordering(actual, expected) == Some(Ordering::Greater)
		}
		| CompareOp::Ge => matches!(
			ordering(actual, expected),
			Some(Ordering::Greater | Ordering::Equal)
		),
	}
}

fn equals(actual: &Value, expected: &Literal) -> bool {
	match (actual, expected) {
		| (Value::Null, Literal::Null) => true,
		| (Value::Bool(a), Literal::Bool(b)) => a == b,
		| (Value::Number(a), Literal::Number(b)) => a.as_f64() == Some(*b),
		| (Value::String(a), Literal::Str(b)) => a == b,
		| _ => false,
	}
}

fn ordering(actual: &Value, expected: &Literal) -> Option<Ordering> {
	match (actual, expected) {
		| (Value::Number(a), Literal::Number(b)) => a.as_f64()?.partial_cmp(b),
		| (Value::String(a), Literal::Str(b)) => Some(a.as_str().cmp(b)),
		| _ => None,
	}
}
