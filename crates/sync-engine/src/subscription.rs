use ds_model::{AnyModel, ModelSchema, MutationSync};

use std::sync::{
	atomic::{AtomicBool, Ordering},
	Arc,
};

use async_channel as chan;
use futures::{stream::SelectAll, FutureExt, StreamExt};
use futures_concurrency::future::Race;
use tokio::spawn;
use tracing::{debug, instrument, warn};

use crate::{
	AuthModeStrategy, AuthProvider, DisconnectReason, Error, GraphQlTransport,
	SubscriptionRequest, SubscriptionTransportEvent, SubscriptionType, TransportError,
};

/// What a model reconciliation queue receives from its subscription
/// publisher, with raw transport details already folded away.
#[derive(Debug)]
pub enum IncomingSubscriptionEvent {
	/// All three subscriptions (create/update/delete) are established.
	Connected,
	Mutation(MutationSync<AnyModel>),
	/// Tolerated disconnect: no live subscription for this model, but the
	/// model still counts as ready and local reconciliation proceeds.
	Disconnected(DisconnectReason),
	/// Fatal. Terminal for the publisher and for the owning queue.
	Failed(Error),
}

/// Merges a model's onCreate/onUpdate/onDelete subscription streams into the
/// single ordered channel shared with the owning reconciliation queue.
pub struct IncomingSubscriptionEvents {
	stop_tx: chan::Sender<()>,
	cancelled: Arc<AtomicBool>,
}

impl IncomingSubscriptionEvents {
	#[must_use]
	pub fn new(
		schema: Arc<ModelSchema>,
		transport: Arc<dyn GraphQlTransport>,
		auth: Option<Arc<dyn AuthProvider>>,
		auth_mode: AuthModeStrategy,
		events_tx: chan::Sender<IncomingSubscriptionEvent>,
	) -> Self {
		let (stop_tx, stop_rx) = chan::bounded(1);

		spawn(run(schema, transport, auth, auth_mode, events_tx, stop_rx));

		Self {
			stop_tx,
			cancelled: Arc::new(AtomicBool::new(false)),
		}
	}

	/// Tears down the underlying transport subscriptions. Safe to call any
	/// number of times.
	pub fn cancel(&self) {
		if self.cancelled.swap(true, Ordering::AcqRel) {
			return;
		}

		// An error here just means the task already finished on its own.
		drop(self.stop_tx.try_send(()));
	}
}

#[instrument(skip_all, fields(model = %schema.name))]
async fn run(
	schema: Arc<ModelSchema>,
	transport: Arc<dyn GraphQlTransport>,
	auth: Option<Arc<dyn AuthProvider>>,
	auth_mode: AuthModeStrategy,
	events_tx: chan::Sender<IncomingSubscriptionEvent>,
	stop_rx: chan::Receiver<()>,
) {
	enum Race {
		Item(Option<Result<SubscriptionTransportEvent, TransportError>>),
		Stopped,
	}

	let mut streams = SelectAll::new();

	for subscription_type in SubscriptionType::ALL {
		match transport
			.subscribe(SubscriptionRequest {
				model_schema: Arc::clone(&schema),
				subscription_type,
				auth_mode,
				auth: auth.clone(),
			})
			.await
		{
			Ok(stream) => streams.push(stream),
			Err(e) => {
				deliver_failure(e, &events_tx).await;
				return;
			}
		}
	}

	let mut connected_streams = 0usize;

	loop {
		match (
			streams.next().map(Race::Item),
			stop_rx.recv().map(|_| Race::Stopped),
		)
			.race()
			.await
		{
			Race::Stopped => {
				debug!("subscription publisher cancelled");
				break;
			}

			Race::Item(None) => {
				debug!("all subscription streams completed");
				break;
			}

			Race::Item(Some(Ok(SubscriptionTransportEvent::Connected))) => {
				connected_streams += 1;
				if connected_streams == SubscriptionType::ALL.len() {
					send(IncomingSubscriptionEvent::Connected, &events_tx).await;
				}
			}

			Race::Item(Some(Ok(SubscriptionTransportEvent::Data(remote)))) => {
				send(IncomingSubscriptionEvent::Mutation(remote), &events_tx).await;
			}

			Race::Item(Some(Err(e))) => {
				deliver_failure(e, &events_tx).await;
				break;
			}
		}
	}
}

async fn deliver_failure(
	error: TransportError,
	events_tx: &chan::Sender<IncomingSubscriptionEvent>,
) {
	let event = match error.disconnect_reason() {
		Some(reason) => {
			debug!(?reason, "tolerated subscription disconnect");
			IncomingSubscriptionEvent::Disconnected(reason)
		}
		None => IncomingSubscriptionEvent::Failed(error.into()),
	};

	send(event, events_tx).await;
}

async fn send(
	event: IncomingSubscriptionEvent,
	events_tx: &chan::Sender<IncomingSubscriptionEvent>,
) {
	if events_tx.send(event).await.is_err() {
		warn!("subscription event lost: ordering channel closed");
	}
}
