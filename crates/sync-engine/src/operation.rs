use ds_model::{AnyModel, ModelSchema, MutationSync, MutationSyncMetadata};

use std::{collections::HashMap, mem, sync::Arc};

use async_channel as chan;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{
	events::{DropReason, ModelReconciliationQueueEvent},
	reconciler::{self, Disposition, DispositionOutcome},
	storage::{StorageAdapter, StorageError, StorageOp},
	Error,
};

pub(crate) type QueueEventsSender = chan::Sender<Result<ModelReconciliationQueueEvent, Error>>;

/// Reconciles one batch of incoming records with the stored sync metadata and
/// persists the winners, all inside a single storage transaction boundary.
/// Runs on a reconcile-and-save lane, so at most one of these touches a given
/// model's storage at a time.
pub(crate) struct ReconcileAndLocalSaveOperation {
	id: Uuid,
	schema: Arc<ModelSchema>,
	remote_models: Vec<MutationSync<AnyModel>>,
	storage: Arc<dyn StorageAdapter>,
	events_tx: QueueEventsSender,
}

impl ReconcileAndLocalSaveOperation {
	pub(crate) fn new(
		schema: Arc<ModelSchema>,
		remote_models: Vec<MutationSync<AnyModel>>,
		storage: Arc<dyn StorageAdapter>,
		events_tx: QueueEventsSender,
	) -> Self {
		Self {
			id: Uuid::new_v4(),
			schema,
			remote_models,
			storage,
			events_tx,
		}
	}

	pub(crate) fn model_name(&self) -> &str {
		&self.schema.name
	}

	#[instrument(
		skip(self),
		fields(
			operation_id = %self.id,
			model = %self.schema.name,
			batch_len = self.remote_models.len(),
		)
	)]
	pub(crate) async fn run(mut self) {
		let remote_models = mem::take(&mut self.remote_models);
		if remote_models.is_empty() {
			return;
		}

		if let Err(e) = self.reconcile(remote_models).await {
			if self.events_tx.send(Err(e)).await.is_err() {
				warn!("reconciliation failure lost: event channel closed");
			}
		}
	}

	async fn reconcile(&self, remote_models: Vec<MutationSync<AnyModel>>) -> Result<(), Error> {
		let model_ids = remote_models
			.iter()
			.map(|remote| remote.model.id.clone())
			.collect::<Vec<_>>();

		let pending = match self
			.storage
			.pending_mutation_events(&self.schema.name, &model_ids)
			.await
		{
			Ok(pending) => pending,
			Err(e) => return self.demote_or_fail(e, remote_models).await,
		};

		let (kept, blocked) = reconciler::filter_pending(remote_models, &pending);
		self.notify_dropped(blocked, &DropReason::PendingMutation)
			.await;

		if kept.is_empty() {
			return Ok(());
		}

		let kept_ids = kept
			.iter()
			.map(|remote| remote.model.id.clone())
			.collect::<Vec<_>>();

		let local_metadata = match self
			.storage
			.query_mutation_sync_metadata(&self.schema.name, &kept_ids)
			.await
		{
			Ok(metadata) => metadata,
			Err(e) => return self.demote_or_fail(e, kept).await,
		};

		let local_by_id = local_metadata
			.into_iter()
			.map(|metadata| (metadata.model_id.clone(), metadata))
			.collect::<HashMap<String, MutationSyncMetadata>>();

		let mut applied = Vec::with_capacity(kept.len());
		let mut batch = Vec::with_capacity(kept.len());

		for remote in kept {
			let local = local_by_id.get(&remote.model.id);
			match reconciler::disposition(remote, local) {
				DispositionOutcome::Apply(disposition) => {
					batch.push(storage_op(&disposition));
					applied.push(disposition.into_remote());
				}
				DispositionOutcome::Drop { model_name, reason } => {
					self.send(ModelReconciliationQueueEvent::MutationEventDropped {
						model_name,
						reason,
					})
					.await;
				}
			}
		}

		if batch.is_empty() {
			return Ok(());
		}

		match self.storage.apply(batch).await {
			Ok(()) => {
				for remote in applied {
					self.send(ModelReconciliationQueueEvent::MutationEvent(remote))
						.await;
				}
				Ok(())
			}
			Err(e) => self.demote_or_fail(e, applied).await,
		}
	}

	/// Ignorable storage failures demote the affected records to drops;
	/// anything else escalates to a terminating stream failure.
	async fn demote_or_fail(
		&self,
		error: StorageError,
		records: Vec<MutationSync<AnyModel>>,
	) -> Result<(), Error> {
		if self.storage.should_ignore_error(&error) {
			warn!(%error, dropped = records.len(), "ignorable storage error, dropping batch");
			self.notify_dropped(records, &DropReason::IgnorableStorage(error.to_string()))
				.await;
			Ok(())
		} else {
			Err(error.into())
		}
	}

	async fn notify_dropped(&self, records: Vec<MutationSync<AnyModel>>, reason: &DropReason) {
		for remote in records {
			self.send(ModelReconciliationQueueEvent::MutationEventDropped {
				model_name: remote.model.model_name,
				reason: reason.clone(),
			})
			.await;
		}
	}

	async fn send(&self, event: ModelReconciliationQueueEvent) {
		if self.events_tx.send(Ok(event)).await.is_err() {
			warn!("reconciliation event lost: event channel closed");
		}
	}
}

fn storage_op(disposition: &Disposition) -> StorageOp {
	match disposition {
		Disposition::Create(remote) | Disposition::Update(remote) => StorageOp::Save {
			model: remote.model.clone(),
			metadata: remote.sync_metadata.clone(),
		},
		Disposition::Delete(remote) => StorageOp::Delete {
			model_name: remote.model.model_name.clone(),
			model_id: remote.model.id.clone(),
			metadata: remote.sync_metadata.clone(),
		},
	}
}
