use ds_model::{AnyModel, ModelSchema, MutationSync, SyncPredicate};

use std::{
	collections::VecDeque,
	pin::pin,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
};

use async_channel as chan;
use futures::StreamExt;
use futures_concurrency::stream::Merge;
use tokio::spawn;
use tracing::{debug, instrument, trace, warn};

use crate::{
	events::ModelReconciliationQueueEvent,
	operation::{QueueEventsSender, ReconcileAndLocalSaveOperation},
	save_queue::ReconcileAndSaveQueue,
	subscription::{IncomingSubscriptionEvent, IncomingSubscriptionEvents},
	AuthModeStrategy, AuthProvider, Error, GraphQlTransport, StorageAdapter,
};

/// Everything a model reconciliation queue needs. Bundled so the coordinator
/// can hand construction to a factory override in tests.
pub struct ModelReconciliationQueueParams {
	pub schema: Arc<ModelSchema>,
	pub predicate: Option<SyncPredicate>,
	pub storage: Arc<dyn StorageAdapter>,
	pub transport: Arc<dyn GraphQlTransport>,
	pub auth: Option<Arc<dyn AuthProvider>>,
	pub auth_mode: AuthModeStrategy,
	pub save_queue: Arc<ReconcileAndSaveQueue>,
	pub events_tx: chan::Sender<Result<ModelReconciliationQueueEvent, Error>>,
}

/// Reconciliation for one model type: merges live subscription events with
/// locally-routed batches (initial sync pages, mutation responses) on a
/// single ordering channel, so records for the same id are never reconciled
/// out of arrival order.
///
/// Starts with subscription-event consumption suspended: deliveries buffer
/// until `start()` while `enqueue` batches reconcile immediately, which is
/// what lets the initial sync drain before live events apply.
pub struct ModelReconciliationQueue {
	model_name: String,
	cmd_tx: chan::Sender<Command>,
	cancelled: Arc<AtomicBool>,
}

enum Command {
	Start,
	Pause,
	Enqueue(Vec<MutationSync<AnyModel>>),
	Cancel,
}

impl ModelReconciliationQueue {
	#[must_use]
	pub fn new(params: ModelReconciliationQueueParams) -> Self {
		let ModelReconciliationQueueParams {
			schema,
			predicate,
			storage,
			transport,
			auth,
			auth_mode,
			save_queue,
			events_tx,
		} = params;

		let model_name = schema.name.clone();
		let (cmd_tx, cmd_rx) = chan::unbounded();

		// The per-model ordering channel, shared with the subscription
		// publisher.
		let (sub_tx, sub_rx) = chan::unbounded();

		let subscription = IncomingSubscriptionEvents::new(
			Arc::clone(&schema),
			transport,
			auth,
			auth_mode,
			sub_tx,
		);

		spawn(run(RunState {
			schema,
			predicate,
			storage,
			save_queue,
			events_tx,
			subscription,
			cmd_rx,
			sub_rx,
		}));

		Self {
			model_name,
			cmd_tx,
			cancelled: Arc::new(AtomicBool::new(false)),
		}
	}

	#[must_use]
	pub fn model_name(&self) -> &str {
		&self.model_name
	}

	/// Resumes subscription-event consumption, flushing anything buffered
	/// while paused. No-op after `cancel()`.
	pub async fn start(&self) {
		self.send_command(Command::Start).await;
	}

	/// Suspends subscription-event consumption without tearing down the
	/// underlying connection. `enqueue` batches still reconcile.
	pub async fn pause(&self) {
		self.send_command(Command::Pause).await;
	}

	/// Schedules a batch of remotely-sourced records (e.g. an initial sync
	/// page) for reconciliation in arrival order. No-op after `cancel()`.
	pub async fn enqueue(&self, remote_models: Vec<MutationSync<AnyModel>>) {
		self.send_command(Command::Enqueue(remote_models)).await;
	}

	/// Releases the subscription and makes the queue terminal: it never
	/// restarts, and every later call is a no-op. Idempotent.
	pub fn cancel(&self) {
		if self.cancelled.swap(true, Ordering::AcqRel) {
			return;
		}

		if self.cmd_tx.try_send(Command::Cancel).is_err() {
			trace!(model = %self.model_name, "reconciliation queue task already gone");
		}
	}

	async fn send_command(&self, command: Command) {
		if self.cancelled.load(Ordering::Acquire) {
			trace!(model = %self.model_name, "reconciliation queue cancelled, ignoring");
			return;
		}

		if self.cmd_tx.send(command).await.is_err() {
			warn!(model = %self.model_name, "reconciliation queue task already gone");
		}
	}
}

struct RunState {
	schema: Arc<ModelSchema>,
	predicate: Option<SyncPredicate>,
	storage: Arc<dyn StorageAdapter>,
	save_queue: Arc<ReconcileAndSaveQueue>,
	events_tx: QueueEventsSender,
	subscription: IncomingSubscriptionEvents,
	cmd_rx: chan::Receiver<Command>,
	sub_rx: chan::Receiver<IncomingSubscriptionEvent>,
}

#[instrument(skip_all, fields(model = %state.schema.name))]
async fn run(state: RunState) {
	enum StreamMessage {
		Command(Command),
		Subscription(IncomingSubscriptionEvent),
	}

	let RunState {
		schema,
		predicate,
		storage,
		save_queue,
		events_tx,
		subscription,
		cmd_rx,
		sub_rx,
	} = state;

	let model_name = schema.name.clone();

	let mut msg_stream = pin!((
		cmd_rx.map(StreamMessage::Command),
		sub_rx.map(StreamMessage::Subscription),
	)
		.merge());

	let mut started = false;
	let mut buffer = VecDeque::new();

	while let Some(msg) = msg_stream.next().await {
		match msg {
			StreamMessage::Command(Command::Start) => {
				started = true;
				publish(&events_tx, ModelReconciliationQueueEvent::Started).await;

				while let Some(remote) = buffer.pop_front() {
					submit(&schema, vec![remote], &storage, &save_queue, &events_tx).await;
				}
			}

			StreamMessage::Command(Command::Pause) => {
				started = false;
				publish(&events_tx, ModelReconciliationQueueEvent::Paused).await;
			}

			StreamMessage::Command(Command::Enqueue(batch)) => {
				submit(&schema, batch, &storage, &save_queue, &events_tx).await;
			}

			StreamMessage::Command(Command::Cancel) => {
				subscription.cancel();
				debug!("reconciliation queue cancelled");
				break;
			}

			StreamMessage::Subscription(IncomingSubscriptionEvent::Connected) => {
				publish(
					&events_tx,
					ModelReconciliationQueueEvent::Connected {
						model_name: model_name.clone(),
					},
				)
				.await;
			}

			StreamMessage::Subscription(IncomingSubscriptionEvent::Disconnected(reason)) => {
				publish(
					&events_tx,
					ModelReconciliationQueueEvent::Disconnected {
						model_name: model_name.clone(),
						reason,
					},
				)
				.await;
			}

			StreamMessage::Subscription(IncomingSubscriptionEvent::Mutation(remote)) => {
				if let Some(predicate) = &predicate {
					if !predicate.evaluate(&remote.model) {
						trace!(
							model_id = %remote.model.id,
							"record filtered out by sync expression"
						);
						continue;
					}
				}

				if started {
					submit(&schema, vec![remote], &storage, &save_queue, &events_tx).await;
				} else {
					buffer.push_back(remote);
				}
			}

			StreamMessage::Subscription(IncomingSubscriptionEvent::Failed(e)) => {
				subscription.cancel();
				if events_tx.send(Err(e)).await.is_err() {
					warn!("subscription failure lost: event channel closed");
				}
				break;
			}
		}
	}
}

async fn submit(
	schema: &Arc<ModelSchema>,
	remote_models: Vec<MutationSync<AnyModel>>,
	storage: &Arc<dyn StorageAdapter>,
	save_queue: &Arc<ReconcileAndSaveQueue>,
	events_tx: &QueueEventsSender,
) {
	save_queue
		.enqueue(ReconcileAndLocalSaveOperation::new(
			Arc::clone(schema),
			remote_models,
			Arc::clone(storage),
			events_tx.clone(),
		))
		.await;
}

async fn publish(events_tx: &QueueEventsSender, event: ModelReconciliationQueueEvent) {
	if events_tx.send(Ok(event)).await.is_err() {
		warn!("reconciliation queue event lost: event channel closed");
	}
}
