use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationType {
	Create,
	Update,
	Delete,
}

/// A locally-sourced optimistic mutation queued for delivery to the remote
/// API. While one of these is pending for a model id, incoming remote records
/// for that id are dropped so the local write isn't clobbered before the
/// outbox confirms it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MutationEvent {
	pub id: String,
	pub model_id: String,
	pub model_name: String,
	pub json: String,
	pub mutation_type: MutationType,
	pub created_at: DateTime<Utc>,
	pub version: Option<i32>,
	pub in_process: bool,
}
