use ds_model::{AnyModel, ModelSchema, MutationEvent, MutationSync, MutationSyncMetadata};
use ds_sync_engine::{
	Error, GraphQlTransport, ReconciliationCoordinatorEvent, StorageAdapter, StorageError,
	StorageOp, SubscriptionRequest, SubscriptionStream, SubscriptionTransportEvent,
	SubscriptionType, TransportError,
};

use std::{
	collections::{HashMap, HashSet},
	sync::{Arc, Mutex},
	time::Duration,
};

use async_channel as chan;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::{sync::Semaphore, time::timeout};

pub fn schema(name: &str) -> Arc<ModelSchema> {
	Arc::new(ModelSchema::new(name))
}

pub fn remote(
	model_name: &str,
	id: &str,
	version: i32,
	deleted: bool,
) -> MutationSync<AnyModel> {
	MutationSync::new(
		AnyModel::new(model_name, id, json!({ "id": id, "title": "t" })),
		MutationSyncMetadata {
			model_id: id.to_string(),
			model_name: model_name.to_string(),
			deleted,
			last_changed_at: Utc::now(),
			version,
		},
	)
}

/// Drains the coordinator stream until an event matching `matches` arrives.
/// Panics on stream failure, stream close or a 2s timeout.
pub async fn wait_for_event(
	rx: &chan::Receiver<Result<ReconciliationCoordinatorEvent, Error>>,
	description: &str,
	matches: impl Fn(&ReconciliationCoordinatorEvent) -> bool,
) -> ReconciliationCoordinatorEvent {
	timeout(Duration::from_secs(2), async {
		loop {
			match rx
				.recv()
				.await
				.unwrap_or_else(|_| panic!("stream closed while waiting for {description}"))
			{
				Ok(event) if matches(&event) => return event,
				Ok(_) => {}
				Err(e) => panic!("stream failed while waiting for {description}: {e}"),
			}
		}
	})
	.await
	.unwrap_or_else(|_| panic!("timed out waiting for {description}"))
}

/// Asserts that no event matching `matches` shows up within 200ms.
pub async fn expect_silence(
	rx: &chan::Receiver<Result<ReconciliationCoordinatorEvent, Error>>,
	description: &str,
	matches: impl Fn(&ReconciliationCoordinatorEvent) -> bool,
) {
	let observed = timeout(Duration::from_millis(200), async {
		loop {
			match rx.recv().await {
				Ok(Ok(event)) if matches(&event) => return,
				Ok(_) => {}
				Err(_) => std::future::pending::<()>().await,
			}
		}
	})
	.await;

	assert!(observed.is_err(), "unexpectedly observed {description}");
}

pub enum FailMode {
	/// Next `apply` fails with an error the adapter classifies as ignorable.
	Ignorable,
	/// Next `apply` fails fatally.
	Fatal,
}

/// In-memory [`StorageAdapter`] with per-model write gates and scriptable
/// `apply` failures.
#[derive(Default)]
pub struct MemoryStorage {
	metadata: Mutex<HashMap<String, MutationSyncMetadata>>,
	models: Mutex<HashMap<String, AnyModel>>,
	pending: Mutex<HashMap<String, Vec<MutationEvent>>>,
	gates: Mutex<HashMap<String, Gate>>,
	fail_next_apply: Mutex<Option<FailMode>>,
}

#[derive(Clone)]
struct Gate {
	permits: Arc<Semaphore>,
	blocked_tx: chan::Sender<()>,
}

impl MemoryStorage {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn insert_metadata(&self, model_name: &str, model_id: &str, version: i32, deleted: bool) {
		self.metadata.lock().expect("poisoned").insert(
			MutationSyncMetadata::identifier(model_name, model_id),
			MutationSyncMetadata {
				model_id: model_id.to_string(),
				model_name: model_name.to_string(),
				deleted,
				last_changed_at: Utc::now(),
				version,
			},
		);
	}

	pub fn queue_pending(&self, model_name: &str, model_id: &str) {
		self.pending
			.lock()
			.expect("poisoned")
			.entry(model_name.to_string())
			.or_default()
			.push(MutationEvent {
				id: format!("pending-{model_id}"),
				model_id: model_id.to_string(),
				model_name: model_name.to_string(),
				json: "{}".to_string(),
				mutation_type: ds_model::MutationType::Update,
				created_at: Utc::now(),
				version: Some(1),
				in_process: false,
			});
	}

	pub fn stored_version(&self, model_name: &str, model_id: &str) -> Option<i32> {
		self.metadata
			.lock()
			.expect("poisoned")
			.get(&MutationSyncMetadata::identifier(model_name, model_id))
			.map(|metadata| metadata.version)
	}

	pub fn is_deleted(&self, model_name: &str, model_id: &str) -> bool {
		self.metadata
			.lock()
			.expect("poisoned")
			.get(&MutationSyncMetadata::identifier(model_name, model_id))
			.is_some_and(|metadata| metadata.deleted)
	}

	pub fn has_model(&self, model_name: &str, model_id: &str) -> bool {
		self.models
			.lock()
			.expect("poisoned")
			.contains_key(&MutationSyncMetadata::identifier(model_name, model_id))
	}

	/// Makes every `apply` for `model_name` block until [`Self::release`]. The
	/// returned receiver yields once per `apply` that reaches the gate, so
	/// tests can wait until the write is actually in flight.
	pub fn gate_model(&self, model_name: &str) -> chan::Receiver<()> {
		let (blocked_tx, blocked_rx) = chan::unbounded();

		self.gates.lock().expect("poisoned").insert(
			model_name.to_string(),
			Gate {
				permits: Arc::new(Semaphore::new(0)),
				blocked_tx,
			},
		);

		blocked_rx
	}

	pub fn release(&self, model_name: &str) {
		if let Some(gate) = self.gates.lock().expect("poisoned").get(model_name) {
			gate.permits.add_permits(1);
		}
	}

	pub fn fail_next_apply(&self, mode: FailMode) {
		*self.fail_next_apply.lock().expect("poisoned") = Some(mode);
	}
}

#[async_trait]
impl StorageAdapter for MemoryStorage {
	async fn query_mutation_sync_metadata(
		&self,
		model_name: &str,
		model_ids: &[String],
	) -> Result<Vec<MutationSyncMetadata>, StorageError> {
		let metadata = self.metadata.lock().expect("poisoned");

		Ok(model_ids
			.iter()
			.filter_map(|id| {
				metadata
					.get(&MutationSyncMetadata::identifier(model_name, id))
					.cloned()
			})
			.collect())
	}

	async fn pending_mutation_events(
		&self,
		model_name: &str,
		model_ids: &[String],
	) -> Result<Vec<MutationEvent>, StorageError> {
		let pending = self.pending.lock().expect("poisoned");

		Ok(pending
			.get(model_name)
			.map(|mutations| {
				mutations
					.iter()
					.filter(|mutation| model_ids.contains(&mutation.model_id))
					.cloned()
					.collect()
			})
			.unwrap_or_default())
	}

	async fn apply(&self, batch: Vec<StorageOp>) -> Result<(), StorageError> {
		if let Some(first) = batch.first() {
			let gate = self
				.gates
				.lock()
				.expect("poisoned")
				.get(&first.metadata().model_name)
				.cloned();

			if let Some(gate) = gate {
				drop(gate.blocked_tx.send(()).await);
				gate.permits.acquire().await.expect("gate closed").forget();
			}
		}

		match self.fail_next_apply.lock().expect("poisoned").take() {
			Some(FailMode::Ignorable) => {
				return Err(StorageError::NotFound("scripted miss".to_string()))
			}
			Some(FailMode::Fatal) => {
				return Err(StorageError::Unavailable("scripted outage".to_string()))
			}
			None => {}
		}

		let mut metadata = self.metadata.lock().expect("poisoned");
		let mut models = self.models.lock().expect("poisoned");

		for op in batch {
			match op {
				StorageOp::Save {
					model,
					metadata: record,
				} => {
					let key = record.id();
					models.insert(key.clone(), model);
					metadata.insert(key, record);
				}
				StorageOp::Delete {
					metadata: record, ..
				} => {
					let key = record.id();
					models.remove(&key);
					metadata.insert(key, record);
				}
			}
		}

		Ok(())
	}
}

type Item = Result<SubscriptionTransportEvent, TransportError>;

/// Subscription transport whose streams are backed by pre-registered channels,
/// one per (model, subscription type). Models without a script get a stream
/// that never yields.
#[derive(Default)]
pub struct MockTransport {
	streams: Mutex<HashMap<(String, SubscriptionType), chan::Receiver<Item>>>,
	denied: Mutex<HashSet<String>>,
}

/// Sender half of one model's three scripted subscription streams.
pub struct ModelScript {
	senders: HashMap<SubscriptionType, chan::Sender<Item>>,
}

impl ModelScript {
	/// Reports every stream connected, which is what makes the model count as
	/// ready.
	pub async fn connect_all(&self) {
		for sender in self.senders.values() {
			sender
				.send(Ok(SubscriptionTransportEvent::Connected))
				.await
				.expect("scripted stream dropped");
		}
	}

	pub async fn connect_one(&self, subscription_type: SubscriptionType) {
		self.senders[&subscription_type]
			.send(Ok(SubscriptionTransportEvent::Connected))
			.await
			.expect("scripted stream dropped");
	}

	pub async fn deliver(&self, record: MutationSync<AnyModel>) {
		self.senders[&SubscriptionType::OnUpdate]
			.send(Ok(SubscriptionTransportEvent::Data(record)))
			.await
			.expect("scripted stream dropped");
	}

	pub async fn fail(&self, error: TransportError) {
		self.senders[&SubscriptionType::OnCreate]
			.send(Err(error))
			.await
			.expect("scripted stream dropped");
	}
}

impl MockTransport {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Must run before the coordinator is constructed; queues subscribe during
	/// construction.
	pub fn script_model(&self, model_name: &str) -> ModelScript {
		let mut streams = self.streams.lock().expect("poisoned");
		let mut senders = HashMap::new();

		for subscription_type in SubscriptionType::ALL {
			let (tx, rx) = chan::unbounded();
			streams.insert((model_name.to_string(), subscription_type), rx);
			senders.insert(subscription_type, tx);
		}

		ModelScript { senders }
	}

	/// Makes every subscribe call for `model_name` fail with `Unauthorized`.
	pub fn deny_model(&self, model_name: &str) {
		self.denied
			.lock()
			.expect("poisoned")
			.insert(model_name.to_string());
	}
}

#[async_trait]
impl GraphQlTransport for MockTransport {
	async fn subscribe(
		&self,
		request: SubscriptionRequest,
	) -> Result<SubscriptionStream, TransportError> {
		let model_name = request.model_schema.name.clone();

		if self.denied.lock().expect("poisoned").contains(&model_name) {
			return Err(TransportError::Unauthorized);
		}

		Ok(
			match self
				.streams
				.lock()
				.expect("poisoned")
				.remove(&(model_name, request.subscription_type))
			{
				Some(rx) => Box::pin(rx),
				None => Box::pin(futures::stream::pending()),
			},
		)
	}
}
