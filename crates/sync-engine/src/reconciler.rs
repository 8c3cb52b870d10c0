//! Pure conflict-resolution rules, applied per incoming record against the
//! locally stored sync metadata for the same model id.

use ds_model::{AnyModel, MutationEvent, MutationSync, MutationSyncMetadata, MutationType};

use std::collections::HashSet;

use crate::DropReason;

/// The local write a winning remote record turns into.
#[derive(Clone, Debug)]
pub enum Disposition {
	Create(MutationSync<AnyModel>),
	Update(MutationSync<AnyModel>),
	Delete(MutationSync<AnyModel>),
}

impl Disposition {
	#[must_use]
	pub const fn mutation_type(&self) -> MutationType {
		match self {
			Self::Create(_) => MutationType::Create,
			Self::Update(_) => MutationType::Update,
			Self::Delete(_) => MutationType::Delete,
		}
	}

	#[must_use]
	pub fn into_remote(self) -> MutationSync<AnyModel> {
		match self {
			Self::Create(remote) | Self::Update(remote) | Self::Delete(remote) => remote,
		}
	}
}

#[derive(Clone, Debug)]
pub enum DispositionOutcome {
	Apply(Disposition),
	Drop {
		model_name: String,
		reason: DropReason,
	},
}

/// Splits a remote batch into records safe to reconcile and records that
/// collide with a still-pending local mutation. Local intent wins until the
/// outbox drains and the remote echoes the confirmed version back.
#[must_use]
pub fn filter_pending(
	remote_models: Vec<MutationSync<AnyModel>>,
	pending_mutations: &[MutationEvent],
) -> (Vec<MutationSync<AnyModel>>, Vec<MutationSync<AnyModel>>) {
	if pending_mutations.is_empty() {
		return (remote_models, vec![]);
	}

	let pending_ids = pending_mutations
		.iter()
		.map(|mutation| mutation.model_id.as_str())
		.collect::<HashSet<_>>();

	remote_models
		.into_iter()
		.partition(|remote| !pending_ids.contains(remote.model.id.as_str()))
}

/// The version rule: an incoming record whose version doesn't exceed the
/// stored one is dropped (a tie is a no-op, not an error); it is applied
/// otherwise, or whenever no local metadata exists. Tombstoned metadata goes
/// through the same comparison, which is exactly what rejects stale
/// re-creates.
#[must_use]
pub fn disposition(
	remote: MutationSync<AnyModel>,
	local: Option<&MutationSyncMetadata>,
) -> DispositionOutcome {
	match local {
		None => DispositionOutcome::Apply(if remote.sync_metadata.deleted {
			Disposition::Delete(remote)
		} else {
			Disposition::Create(remote)
		}),
		Some(local) if remote.sync_metadata.version > local.version => {
			DispositionOutcome::Apply(if remote.sync_metadata.deleted {
				Disposition::Delete(remote)
			} else {
				Disposition::Update(remote)
			})
		}
		Some(local) => DispositionOutcome::Drop {
			model_name: remote.model.model_name,
			reason: DropReason::StaleVersion {
				incoming: remote.sync_metadata.version,
				stored: local.version,
			},
		},
	}
}
