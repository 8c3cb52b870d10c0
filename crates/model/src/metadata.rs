use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sync bookkeeping for a single model instance.
///
/// `version` is monotonically non-decreasing per model id; reconciliation
/// rejects any incoming record that doesn't raise it. A `deleted = true` row
/// is a tombstone and is never physically removed from the metadata store, so
/// stale deletes and re-creates keep getting rejected after the record is
/// gone.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MutationSyncMetadata {
	pub model_id: String,
	pub model_name: String,
	pub deleted: bool,
	pub last_changed_at: DateTime<Utc>,
	pub version: i32,
}

impl MutationSyncMetadata {
	/// Composite key the metadata store is keyed by.
	#[must_use]
	pub fn identifier(model_name: &str, model_id: &str) -> String {
		format!("{model_name}|{model_id}")
	}

	#[must_use]
	pub fn id(&self) -> String {
		Self::identifier(&self.model_name, &self.model_id)
	}
}

/// Envelope pairing a model instance with the sync metadata used for
/// conflict resolution. This is the unit every queue in the sync engine
/// passes around.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MutationSync<M> {
	pub model: M,
	pub sync_metadata: MutationSyncMetadata,
}

impl<M> MutationSync<M> {
	pub const fn new(model: M, sync_metadata: MutationSyncMetadata) -> Self {
		Self {
			model,
			sync_metadata,
		}
	}
}
