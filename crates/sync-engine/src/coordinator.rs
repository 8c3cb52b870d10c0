use ds_model::{AnyModel, ModelSchema, MutationSync, SyncExpression};

use std::{
	collections::HashMap,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
	time::Duration,
};

use async_channel as chan;
use tokio::{spawn, sync::RwLock};
use tracing::{debug, error, instrument, trace, warn};

use crate::{
	events::{ModelReconciliationQueueEvent, ReconciliationCoordinatorEvent},
	queue::{ModelReconciliationQueue, ModelReconciliationQueueParams},
	save_queue::ReconcileAndSaveQueue,
	AuthModeStrategy, AuthProvider, Error, GraphQlTransport, StorageAdapter,
};

/// How long `reset` waits for in-flight reconcile-and-save work to drain
/// before tearing the coordinator down anyway.
const RESET_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub type ModelReconciliationQueueFactory =
	Arc<dyn Fn(ModelReconciliationQueueParams) -> ModelReconciliationQueue + Send + Sync>;

/// Owns one reconciliation queue per registered model schema, multiplexes
/// their event streams into a single coordinator-level stream, and tracks
/// per-model readiness: once every registered model has reported connected
/// (or an acceptable disconnect), `Initialized` is emitted for the sync
/// engine to begin draining outbound mutations.
///
/// The connection-status map is owned exclusively by the receiver loop task;
/// no other task can touch it, so concurrent ready signals from independent
/// subscription connections can't race each other.
pub struct ReconciliationCoordinator {
	queues: RwLock<HashMap<String, ModelReconciliationQueue>>,
	save_queue: Arc<ReconcileAndSaveQueue>,
	out_tx: chan::Sender<Result<ReconciliationCoordinatorEvent, Error>>,
	cancelled: Arc<AtomicBool>,
}

impl ReconciliationCoordinator {
	/// Builds one child queue per schema, skipping duplicate model names with
	/// a warning. Coordinator events are received on the returned channel; an
	/// `Err` item is terminal.
	#[must_use]
	pub fn new(
		schemas: Vec<Arc<ModelSchema>>,
		transport: Arc<dyn GraphQlTransport>,
		storage: Arc<dyn StorageAdapter>,
		sync_expressions: Vec<SyncExpression>,
		auth: Option<Arc<dyn AuthProvider>>,
		auth_mode: AuthModeStrategy,
		factory: Option<ModelReconciliationQueueFactory>,
	) -> (
		Self,
		chan::Receiver<Result<ReconciliationCoordinatorEvent, Error>>,
	) {
		let (out_tx, out_rx) = chan::unbounded();
		let (fan_in_tx, fan_in_rx) = chan::unbounded();

		let save_queue = Arc::new(ReconcileAndSaveQueue::new());
		let factory: ModelReconciliationQueueFactory =
			factory.unwrap_or_else(|| Arc::new(ModelReconciliationQueue::new));

		let mut queues = HashMap::new();

		for schema in schemas {
			if queues.contains_key(&schema.name) {
				warn!(
					model = %schema.name,
					"duplicate model registration, skipping reconciliation queue"
				);
				continue;
			}

			let predicate = sync_expressions
				.iter()
				.find(|expression| expression.model_name == schema.name)
				.map(|expression| expression.predicate.clone());

			let queue = (factory)(ModelReconciliationQueueParams {
				schema: Arc::clone(&schema),
				predicate,
				storage: Arc::clone(&storage),
				transport: Arc::clone(&transport),
				auth: auth.clone(),
				auth_mode,
				save_queue: Arc::clone(&save_queue),
				events_tx: fan_in_tx.clone(),
			});

			queues.insert(schema.name.clone(), queue);
		}

		// The loop's receiver is the only remaining handle once children
		// finish, so the task ends when the last sender drops.
		drop(fan_in_tx);

		spawn(run(fan_in_rx, out_tx.clone(), queues.len()));

		(
			Self {
				queues: RwLock::new(queues),
				save_queue,
				out_tx,
				cancelled: Arc::new(AtomicBool::new(false)),
			},
			out_rx,
		)
	}

	/// Starts every child queue. No-op after `cancel()`.
	pub async fn start(&self) {
		if self.cancelled.load(Ordering::Acquire) {
			return;
		}

		for queue in self.queues.read().await.values() {
			queue.start().await;
		}

		self.publish(ReconciliationCoordinatorEvent::Started).await;
	}

	/// Pauses every child queue. No-op after `cancel()`.
	pub async fn pause(&self) {
		if self.cancelled.load(Ordering::Acquire) {
			return;
		}

		for queue in self.queues.read().await.values() {
			queue.pause().await;
		}

		self.publish(ReconciliationCoordinatorEvent::Paused).await;
	}

	/// Routes a batch of remotely-sourced records to the matching child
	/// queue. A batch for an unregistered model name is logged and dropped.
	#[instrument(skip(self, remote_models), fields(batch_len = remote_models.len()))]
	pub async fn offer(&self, remote_models: Vec<MutationSync<AnyModel>>, model_name: &str) {
		if self.cancelled.load(Ordering::Acquire) {
			return;
		}

		if let Some(queue) = self.queues.read().await.get(model_name) {
			queue.enqueue(remote_models).await;
		} else {
			warn!("no reconciliation queue registered for offered records, dropping batch");
		}
	}

	/// Cancels every child queue, drops queued reconcile-and-save work, and
	/// closes the event stream. Idempotent; the coordinator is terminal
	/// afterwards.
	pub async fn cancel(&self) {
		if self.cancelled.swap(true, Ordering::AcqRel) {
			return;
		}

		let mut queues = self.queues.write().await;
		for (_, queue) in queues.drain() {
			queue.cancel();
		}

		self.save_queue.cancel_all().await;
		self.out_tx.close();
	}

	/// Teardown for lifecycle reset: cancels the children, waits for
	/// in-flight reconcile-and-save operations to actually finish (bounded by
	/// [`RESET_DRAIN_TIMEOUT`]), then cancels self.
	pub async fn reset(&self) {
		if self.cancelled.load(Ordering::Acquire) {
			return;
		}

		{
			let queues = self.queues.read().await;
			for queue in queues.values() {
				queue.cancel();
			}
		}

		if !self.save_queue.wait_until_idle(RESET_DRAIN_TIMEOUT).await {
			warn!(
				timeout = ?RESET_DRAIN_TIMEOUT,
				"reconcile-and-save queue did not drain before reset teardown"
			);
		}

		self.cancel().await;
	}

	/// The serialized persistence queue shared by every child. Exposed so
	/// callers can wait for quiescence during their own lifecycle changes.
	#[must_use]
	pub fn save_queue(&self) -> &Arc<ReconcileAndSaveQueue> {
		&self.save_queue
	}

	async fn publish(&self, event: ReconciliationCoordinatorEvent) {
		if self.out_tx.send(Ok(event)).await.is_err() {
			warn!("coordinator event lost: event channel closed");
		}
	}
}

/// Receiver loop: exclusive owner of the connection-status map.
async fn run(
	fan_in_rx: chan::Receiver<Result<ModelReconciliationQueueEvent, Error>>,
	out_tx: chan::Sender<Result<ReconciliationCoordinatorEvent, Error>>,
	total_models: usize,
) {
	let mut connection_status: HashMap<String, bool> = HashMap::new();

	while let Ok(event) = fan_in_rx.recv().await {
		match event {
			Ok(ModelReconciliationQueueEvent::Connected { model_name }) => {
				debug!(model = %model_name, "reconciliation queue connected");
				connection_status.insert(model_name, true);
				check_initialized(&connection_status, total_models, &out_tx).await;
			}

			Ok(ModelReconciliationQueueEvent::Disconnected { model_name, reason }) => {
				// Tolerated by construction: fatal disconnects arrive as Err.
				debug!(
					model = %model_name,
					?reason,
					"reconciliation queue disconnected, still counts as ready"
				);
				connection_status.insert(model_name, true);
				check_initialized(&connection_status, total_models, &out_tx).await;
			}

			Ok(ModelReconciliationQueueEvent::MutationEvent(remote)) => {
				forward(
					ReconciliationCoordinatorEvent::MutationEvent(remote),
					&out_tx,
				)
				.await;
			}

			Ok(ModelReconciliationQueueEvent::MutationEventDropped { model_name, reason }) => {
				forward(
					ReconciliationCoordinatorEvent::MutationEventDropped { model_name, reason },
					&out_tx,
				)
				.await;
			}

			Ok(
				ModelReconciliationQueueEvent::Started | ModelReconciliationQueueEvent::Paused,
			) => {
				// The coordinator announces its own lifecycle transitions.
				trace!("child lifecycle event");
			}

			Err(e) => {
				error!(%e, "reconciliation queue failed, terminating coordinator stream");
				if out_tx.send(Err(e)).await.is_err() {
					warn!("coordinator failure lost: event channel closed");
				}
				out_tx.close();
				return;
			}
		}
	}

	trace!("all reconciliation queues finished, coordinator loop ending");
}

async fn check_initialized(
	connection_status: &HashMap<String, bool>,
	total_models: usize,
	out_tx: &chan::Sender<Result<ReconciliationCoordinatorEvent, Error>>,
) {
	// Re-checked on every ready signal; consumers may legitimately observe
	// Initialized more than once per start cycle.
	if connection_status.len() == total_models {
		forward(ReconciliationCoordinatorEvent::Initialized, out_tx).await;
	}
}

async fn forward(
	event: ReconciliationCoordinatorEvent,
	out_tx: &chan::Sender<Result<ReconciliationCoordinatorEvent, Error>>,
) {
	if out_tx.send(Ok(event)).await.is_err() {
		warn!("coordinator event lost: event channel closed");
	}
}
