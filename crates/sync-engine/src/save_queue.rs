use std::{
	collections::HashMap,
	sync::{
		atomic::{AtomicBool, AtomicUsize, Ordering},
		Arc,
	},
	time::Duration,
};

use async_channel as chan;
use tokio::{
	spawn,
	sync::{Mutex, Notify},
	time::{timeout_at, Instant},
};
use tracing::{trace, warn};

use crate::operation::ReconcileAndLocalSaveOperation;

/// Serializes local persistence writes per model while letting unrelated
/// models proceed concurrently: one lane (worker task) per model name,
/// strictly FIFO within a lane. Lane depth is unbounded; there is no
/// backpressure signal upstream.
///
/// An in-flight counter plus [`Notify`] gives [`Self::wait_until_idle`] a
/// real quiescence barrier, so `reset` can deterministically wait for
/// completion or a bounded timeout.
pub struct ReconcileAndSaveQueue {
	lanes: Mutex<HashMap<String, Lane>>,
	in_flight: Arc<InFlight>,
	cancelled: Arc<AtomicBool>,
}

struct Lane {
	ops_tx: chan::Sender<ReconcileAndLocalSaveOperation>,
}

#[derive(Default)]
struct InFlight {
	count: AtomicUsize,
	idle: Notify,
}

impl InFlight {
	fn decrement(&self) {
		if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
			self.idle.notify_waiters();
		}
	}
}

impl Default for ReconcileAndSaveQueue {
	fn default() -> Self {
		Self {
			lanes: Mutex::default(),
			in_flight: Arc::default(),
			cancelled: Arc::default(),
		}
	}
}

impl ReconcileAndSaveQueue {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub(crate) async fn enqueue(&self, operation: ReconcileAndLocalSaveOperation) {
		if self.cancelled.load(Ordering::Acquire) {
			trace!(
				model = operation.model_name(),
				"reconcile-and-save queue cancelled, dropping operation"
			);
			return;
		}

		let mut lanes = self.lanes.lock().await;
		let lane = lanes
			.entry(operation.model_name().to_string())
			.or_insert_with(|| self.spawn_lane(operation.model_name().to_string()));

		self.in_flight.count.fetch_add(1, Ordering::AcqRel);

		if lane.ops_tx.send(operation).await.is_err() {
			self.in_flight.decrement();
			warn!("reconcile-and-save lane closed, dropping operation");
		}
	}

	fn spawn_lane(&self, model_name: String) -> Lane {
		let (ops_tx, ops_rx) = chan::unbounded::<ReconcileAndLocalSaveOperation>();
		let in_flight = Arc::clone(&self.in_flight);
		let cancelled = Arc::clone(&self.cancelled);

		spawn(async move {
			while let Ok(operation) = ops_rx.recv().await {
				// Already-queued operations are discarded after cancellation;
				// the one currently running always finishes (storage writes
				// are never torn mid-transaction).
				if cancelled.load(Ordering::Acquire) {
					in_flight.decrement();
					continue;
				}

				operation.run().await;
				in_flight.decrement();
			}

			trace!(%model_name, "reconcile-and-save lane finished");
		});

		Lane { ops_tx }
	}

	/// Drops every queued operation and closes all lanes. Idempotent; the
	/// queue never accepts work again.
	pub async fn cancel_all(&self) {
		self.cancelled.store(true, Ordering::Release);

		let mut lanes = self.lanes.lock().await;
		for (_, lane) in lanes.drain() {
			lane.ops_tx.close();
		}
	}

	/// Waits until no operation is queued or running, or until `timeout`
	/// elapses. Returns whether quiescence was reached.
	pub async fn wait_until_idle(&self, timeout: Duration) -> bool {
		let deadline = Instant::now() + timeout;

		loop {
			let notified = self.in_flight.idle.notified();

			if self.in_flight.count.load(Ordering::Acquire) == 0 {
				return true;
			}

			if timeout_at(deadline, notified).await.is_err() {
				return self.in_flight.count.load(Ordering::Acquire) == 0;
			}
		}
	}
}
