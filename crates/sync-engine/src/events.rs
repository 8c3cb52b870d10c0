use ds_model::{AnyModel, MutationSync};

use crate::DisconnectReason;

/// Events published by a single model's reconciliation queue into the
/// coordinator's fan-in channel. Consumed exactly once.
#[derive(Clone, Debug)]
pub enum ModelReconciliationQueueEvent {
	Started,
	Paused,
	Connected {
		model_name: String,
	},
	Disconnected {
		model_name: String,
		reason: DisconnectReason,
	},
	MutationEvent(MutationSync<AnyModel>),
	MutationEventDropped {
		model_name: String,
		reason: DropReason,
	},
}

/// The coordinator-level event union the sync engine subscribes to.
/// `Initialized` fires once every registered model has reported connected or
/// an acceptable disconnect; it is re-checked on every ready signal, so
/// consumers may see it more than once.
#[derive(Clone, Debug)]
pub enum ReconciliationCoordinatorEvent {
	Started,
	Paused,
	Initialized,
	MutationEvent(MutationSync<AnyModel>),
	MutationEventDropped {
		model_name: String,
		reason: DropReason,
	},
}

/// Why an incoming record lost reconciliation. Informational: processing
/// continues, the caller may count these for telemetry.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
pub enum DropReason {
	#[error("incoming version {incoming} is not newer than stored version {stored}")]
	StaleVersion { incoming: i32, stored: i32 },
	#[error("a local mutation for this record is still pending")]
	PendingMutation,
	#[error("ignorable storage error: {0}")]
	IgnorableStorage(String),
}
