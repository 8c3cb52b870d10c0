use ds_model::{AnyModel, ModelSchema, MutationSync};

use std::{fmt, pin::Pin, sync::Arc};

use async_trait::async_trait;
use futures::Stream;

use crate::{AuthModeStrategy, AuthProvider};

/// Stream of events for a single live subscription (one model, one mutation
/// kind). An `Err` item ends the subscription; whether that ends the whole
/// model's publisher depends on [`TransportError::disconnect_reason`].
pub type SubscriptionStream =
	Pin<Box<dyn Stream<Item = Result<SubscriptionTransportEvent, TransportError>> + Send>>;

/// GraphQL transport capability consumed by the sync engine. The wire
/// protocol (HTTP/WebSocket framing, reconnection, backoff) lives behind this
/// trait and is out of scope here.
#[async_trait]
pub trait GraphQlTransport: Send + Sync + 'static {
	async fn subscribe(
		&self,
		request: SubscriptionRequest,
	) -> Result<SubscriptionStream, TransportError>;
}

#[derive(Clone)]
pub struct SubscriptionRequest {
	pub model_schema: Arc<ModelSchema>,
	pub subscription_type: SubscriptionType,
	pub auth_mode: AuthModeStrategy,
	pub auth: Option<Arc<dyn AuthProvider>>,
}

impl fmt::Debug for SubscriptionRequest {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SubscriptionRequest")
			.field("model", &self.model_schema.name)
			.field("subscription_type", &self.subscription_type)
			.field("auth_mode", &self.auth_mode)
			.finish()
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SubscriptionType {
	OnCreate,
	OnUpdate,
	OnDelete,
}

impl SubscriptionType {
	pub const ALL: [Self; 3] = [Self::OnCreate, Self::OnUpdate, Self::OnDelete];
}

#[derive(Debug)]
pub enum SubscriptionTransportEvent {
	Connected,
	Data(MutationSync<AnyModel>),
}

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
	#[error("subscription is not authorized")]
	Unauthorized,
	#[error("subscription operation is disabled for this model")]
	OperationDisabled,
	#[error("connection failure: {0}")]
	Connection(String),
	#[error("malformed subscription payload: {0}")]
	Payload(String),
	#[error("auth token unavailable: {0}")]
	AuthToken(String),
}

impl TransportError {
	/// The two disconnect reasons that are tolerated: the model still counts
	/// toward coordinator readiness because local-mutation reconciliation can
	/// proceed without a live subscription. Everything else is fatal.
	#[must_use]
	pub const fn disconnect_reason(&self) -> Option<DisconnectReason> {
		match self {
			Self::Unauthorized => Some(DisconnectReason::Unauthorized),
			Self::OperationDisabled => Some(DisconnectReason::OperationDisabled),
			_ => None,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
	Unauthorized,
	OperationDisabled,
}
