use ds_model::{AnyModel, MutationEvent, MutationSyncMetadata};

use async_trait::async_trait;

/// Local storage capability consumed by the sync engine: metadata lookups,
/// pending-mutation lookups, and a transactional batch write. Query/save of
/// actual model rows outside a reconciliation batch belongs to the DataStore
/// proper, not to this subsystem.
#[async_trait]
pub trait StorageAdapter: Send + Sync + 'static {
	/// Sync metadata for the given model ids, in no particular order. Ids
	/// without a metadata row are simply absent from the result.
	async fn query_mutation_sync_metadata(
		&self,
		model_name: &str,
		model_ids: &[String],
	) -> Result<Vec<MutationSyncMetadata>, StorageError>;

	/// Locally-queued mutations for the given model ids that haven't been
	/// confirmed by the remote yet.
	async fn pending_mutation_events(
		&self,
		model_name: &str,
		model_ids: &[String],
	) -> Result<Vec<MutationEvent>, StorageError>;

	/// Applies the whole batch atomically: either every operation commits or
	/// none does. This is the engine's transaction-scoping primitive.
	async fn apply(&self, batch: Vec<StorageOp>) -> Result<(), StorageError>;

	/// Advisory classification: an ignorable error demotes the affected
	/// records to drops instead of tearing the event stream down.
	fn should_ignore_error(&self, error: &StorageError) -> bool {
		matches!(error, StorageError::NotFound(_))
	}
}

/// A single write inside a reconciliation batch. Deletes still write the
/// metadata row: the tombstone is what rejects stale re-creates later.
#[derive(Clone, Debug)]
pub enum StorageOp {
	Save {
		model: AnyModel,
		metadata: MutationSyncMetadata,
	},
	Delete {
		model_name: String,
		model_id: String,
		metadata: MutationSyncMetadata,
	},
}

impl StorageOp {
	#[must_use]
	pub fn metadata(&self) -> &MutationSyncMetadata {
		match self {
			Self::Save { metadata, .. } | Self::Delete { metadata, .. } => metadata,
		}
	}
}

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
	#[error("local storage is unavailable: {0}")]
	Unavailable(String),
	#[error("transaction failed: {0}")]
	Transaction(String),
	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
	#[error("record not found: {0}")]
	NotFound(String),
}
