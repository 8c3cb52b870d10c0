//!
//! # DataStore sync engine
//!
//! The reconciliation half of an offline-first object store: remote
//! subscription deliveries and locally-queued mutation batches funnel into a
//! per-model reconciliation queue, get conflict-resolved against the stored
//! sync metadata, and the winning versions are persisted through a serialized
//! reconcile-and-save queue. A top-level coordinator owns one queue per
//! registered model schema and republishes a single event stream, including
//! the `Initialized` signal the outbound mutation engine waits on.
//!
//! Transports and local stores are capability traits ([`GraphQlTransport`],
//! [`StorageAdapter`]); the engine never talks to the wire or the disk
//! directly.

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod auth;
mod coordinator;
mod events;
mod operation;
mod queue;
mod reconciler;
mod save_queue;
mod storage;
mod subscription;
mod transport;

pub use auth::{AuthModeStrategy, AuthProvider};
pub use coordinator::{ModelReconciliationQueueFactory, ReconciliationCoordinator};
pub use events::{
	DropReason, ModelReconciliationQueueEvent, ReconciliationCoordinatorEvent,
};
pub use queue::{ModelReconciliationQueue, ModelReconciliationQueueParams};
pub use reconciler::{Disposition, DispositionOutcome};
pub use save_queue::ReconcileAndSaveQueue;
pub use storage::{StorageAdapter, StorageError, StorageOp};
pub use subscription::{IncomingSubscriptionEvent, IncomingSubscriptionEvents};
pub use transport::{
	DisconnectReason, GraphQlTransport, SubscriptionRequest, SubscriptionStream,
	SubscriptionTransportEvent, SubscriptionType, TransportError,
};

/// Unified error type for the sync engine. An `Err` item on an event stream
/// is terminal: the channel closes right after it and the caller is expected
/// to treat sync as down.
#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("storage error: {0}")]
	Storage(#[from] StorageError),
	#[error("transport error: {0}")]
	Transport(#[from] TransportError),
}
