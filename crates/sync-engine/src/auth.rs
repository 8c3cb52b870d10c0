use async_trait::async_trait;

use crate::TransportError;

/// Supplies the latest auth token for subscription requests. The engine never
/// inspects the token; it only hands it to the transport.
#[async_trait]
pub trait AuthProvider: Send + Sync + 'static {
	async fn latest_auth_token(&self) -> Result<String, TransportError>;
}

/// How the transport should pick an auth mode when a model carries more than
/// one auth rule.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AuthModeStrategy {
	#[default]
	Default,
	MultiAuth,
}
