use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::AnyModel;

/// Per-model sync filter. Pairs a model name with the predicate incoming
/// records must satisfy before they're reconciled.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SyncExpression {
	pub model_name: String,
	pub predicate: SyncPredicate,
}

impl SyncExpression {
	#[must_use]
	pub fn new(model_name: impl Into<String>, predicate: SyncPredicate) -> Self {
		Self {
			model_name: model_name.into(),
			predicate,
		}
	}
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum SyncPredicate {
	All,
	Field {
		field: String,
		operator: ComparisonOperator,
		value: Value,
	},
	And(Vec<SyncPredicate>),
	Or(Vec<SyncPredicate>),
	Not(Box<SyncPredicate>),
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComparisonOperator {
	Eq,
	Ne,
	Gt,
	Ge,
	Lt,
	Le,
	Contains,
	BeginsWith,
}

impl SyncPredicate {
	/// Evaluates the predicate against a type-erased instance. Missing fields
	/// never match (except through `Ne`/`Not`).
	#[must_use]
	pub fn evaluate(&self, model: &AnyModel) -> bool {
		match self {
			Self::All => true,
			Self::Field {
				field,
				operator,
				value,
			} => model
				.field(field)
				.is_some_and(|actual| operator.compare(actual, value)),
			Self::And(predicates) => predicates.iter().all(|p| p.evaluate(model)),
			Self::Or(predicates) => predicates.iter().any(|p| p.evaluate(model)),
			Self::Not(predicate) => !predicate.evaluate(model),
		}
	}
}

impl ComparisonOperator {
	fn compare(self, actual: &Value, expected: &Value) -> bool {
		match self {
			Self::Eq => actual == expected,
			Self::Ne => actual != expected,
			Self::Gt | Self::Ge | Self::Lt | Self::Le => {
				compare_ordered(actual, expected).is_some_and(|ordering| match self {
					Self::Gt => ordering.is_gt(),
					Self::Ge => ordering.is_ge(),
					Self::Lt => ordering.is_lt(),
					Self::Le => ordering.is_le(),
					_ => unreachable!(),
				})
			}
			Self::Contains => match (actual, expected) {
				(Value::String(actual), Value::String(expected)) => actual.contains(expected),
				(Value::Array(items), expected) => items.contains(expected),
				_ => false,
			},
			Self::BeginsWith => match (actual, expected) {
				(Value::String(actual), Value::String(expected)) => actual.starts_with(expected),
				_ => false,
			},
		}
	}
}

fn compare_ordered(actual: &Value, expected: &Value) -> Option<std::cmp::Ordering> {
	match (actual, expected) {
		(Value::Number(actual), Value::Number(expected)) => actual
			.as_f64()
			.zip(expected.as_f64())
			.and_then(|(a, b)| a.partial_cmp(&b)),
		(Value::String(actual), Value::String(expected)) => Some(actual.cmp(expected)),
		_ => None,
	}
}
