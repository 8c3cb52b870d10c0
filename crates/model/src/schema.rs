use serde::{Deserialize, Serialize};

/// Static descriptor of a model type: field layout, primary key and auth
/// rules. Built once at startup from registered model definitions and shared
/// read-only (callers wrap it in an `Arc`) for the lifetime of the process.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ModelSchema {
	pub name: String,
	pub plural_name: Option<String>,
	pub primary_key: String,
	pub fields: Vec<ModelField>,
	pub auth_rules: Vec<AuthRule>,
}

impl ModelSchema {
	#[must_use]
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			plural_name: None,
			primary_key: "id".to_string(),
			fields: vec![ModelField {
				name: "id".to_string(),
				kind: FieldKind::Id,
				required: true,
				is_array: false,
			}],
			auth_rules: vec![],
		}
	}

	#[must_use]
	pub fn with_field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
		self.fields.push(ModelField {
			name: name.into(),
			kind,
			required: false,
			is_array: false,
		});
		self
	}

	#[must_use]
	pub fn field(&self, name: &str) -> Option<&ModelField> {
		self.fields.iter().find(|field| field.name == name)
	}
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ModelField {
	pub name: String,
	pub kind: FieldKind,
	pub required: bool,
	pub is_array: bool,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
	Id,
	String,
	Int,
	Float,
	Bool,
	DateTime,
	Json,
}

/// Opaque at this layer; auth evaluation belongs to the transport.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AuthRule {
	pub provider: String,
	pub operations: Vec<String>,
}
