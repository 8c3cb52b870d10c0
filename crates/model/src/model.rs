use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Type-erased model instance, as delivered by the remote API or read back
/// from local storage. The `instance` payload is the full JSON object; `id`
/// is the value of the schema's primary key field, pulled out so routing and
/// metadata lookups don't need to reparse the payload.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AnyModel {
	pub model_name: String,
	pub id: String,
	pub instance: Value,
}

impl AnyModel {
	#[must_use]
	pub fn new(model_name: impl Into<String>, id: impl Into<String>, instance: Value) -> Self {
		Self {
			model_name: model_name.into(),
			id: id.into(),
			instance,
		}
	}

	/// Field accessor used by predicate evaluation. Returns `None` for
	/// missing fields or non-object instances.
	#[must_use]
	pub fn field(&self, name: &str) -> Option<&Value> {
		self.instance.as_object().and_then(|object| object.get(name))
	}
}
