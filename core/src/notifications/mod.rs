//! Push notification registration.
//!
//! Best effort by contract: every failure here is absorbed and logged,
//! because notification setup must never break the flow that triggered
//! it.

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sl_cloud_api::notifications::PushSubscription;
use thiserror::Error;
use tracing::{info, warn};

use crate::{session::Session, sync::StoryGateway};

/// Application server key of the production push deployment.
pub const DEFAULT_VAPID_PUBLIC_KEY: &str =
	"BCCs2eonMI-6H2ctvFaWg-UYdDv387Vno_bzUzALpB442r2lCnsHmtrx8biyPi_E-1fSGABK_Qs_GlvPoJJqxbk";

#[derive(Debug, Error)]
pub enum NotificationError {
	#[error("invalid application server key: {0}")]
	InvalidKey(#[from] base64::DecodeError),
	#[error("platform refused the push subscription: {0}")]
	Platform(String),
	#[error("subscription is missing its encryption keys")]
	MissingKeys,
	#[error(transparent)]
	Gateway(#[from] sl_cloud_api::Error),
}

/// Decodes a URL-safe base64 VAPID key into raw bytes: pad with `=` to a
/// multiple of 4, translate `-` to `+` and `_` to `/`, then decode with
/// the standard alphabet.
pub fn decode_vapid_key(key: &str) -> Result<Vec<u8>, NotificationError> {
	let mut normalized = key.replace('-', "+").replace('_', "/");
	while normalized.len() % 4 != 0 {
		normalized.push('=');
	}

	Ok(STANDARD.decode(normalized)?)
}

/// The platform side of push registration, implemented by the embedding
/// shell.
#[async_trait]
pub trait PushPlatform: Send + Sync {
	/// Obtains a push subscription for the given application server key.
	async fn subscribe(
		&self,
		application_server_key: &[u8],
	) -> Result<PushSubscription, NotificationError>;

	/// Returns the currently held subscription, if any.
	async fn subscription(&self) -> Option<PushSubscription>;

	/// Tears down the platform-side subscription.
	async fn unsubscribe(&self) -> bool;
}

pub struct NotificationRegistrar {
	gateway: Arc<dyn StoryGateway>,
	platform: Arc<dyn PushPlatform>,
	vapid_key: String,
}

impl NotificationRegistrar {
	pub fn new(gateway: Arc<dyn StoryGateway>, platform: Arc<dyn PushPlatform>) -> Self {
		Self {
			gateway,
			platform,
			vapid_key: DEFAULT_VAPID_PUBLIC_KEY.to_string(),
		}
	}

	pub fn with_vapid_key(mut self, key: impl Into<String>) -> Self {
		self.vapid_key = key.into();
		self
	}

	/// Registers for push notifications. Returns whether registration
	/// completed; failures are logged, never propagated.
	pub async fn enable(&self, session: &Session) -> bool {
		match self.try_enable(session).await {
			Ok(()) => {
				info!("push notifications enabled");
				true
			}
			Err(e) => {
				warn!("push notification setup failed: {e}");
				false
			}
		}
	}

	async fn try_enable(&self, session: &Session) -> Result<(), NotificationError> {
		let key = decode_vapid_key(&self.vapid_key)?;

		let subscription = self.platform.subscribe(&key).await?;
		if subscription.keys.p256dh.is_empty() || subscription.keys.auth.is_empty() {
			return Err(NotificationError::MissingKeys);
		}

		self.gateway
			.subscribe_push(&subscription, &session.token)
			.await?;

		Ok(())
	}

	/// Unregisters locally and upstream. Also best effort.
	pub async fn disable(&self, session: &Session) -> bool {
		let Some(subscription) = self.platform.subscription().await else {
			return false;
		};

		if !self.platform.unsubscribe().await {
			warn!("platform would not release the push subscription");
			return false;
		}

		match self
			.gateway
			.unsubscribe_push(&subscription.endpoint, &session.token)
			.await
		{
			Ok(()) => {
				info!("push notifications disabled");
				true
			}
			Err(e) => {
				warn!("server-side push unsubscribe failed: {e}");
				false
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::session::SessionUser;
	use crate::testing::{MockGateway, MockPushPlatform};
	use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
	use pretty_assertions::assert_eq;

	fn session() -> Session {
		Session {
			token: "token-123".to_string(),
			user: SessionUser {
				user_id: "user-1".to_string(),
				name: "Ayu".to_string(),
			},
		}
	}

	#[test]
	fn vapid_decoding_round_trips_url_safe_base64() {
		let bytes: Vec<u8> = (0..=255).map(|b| b as u8).collect();
		let encoded = URL_SAFE_NO_PAD.encode(&bytes);

		assert_eq!(decode_vapid_key(&encoded).unwrap(), bytes);
	}

	#[test]
	fn default_key_decodes_to_p256_point() {
		let decoded = decode_vapid_key(DEFAULT_VAPID_PUBLIC_KEY).unwrap();

		// An uncompressed P-256 public key: 0x04 then two 32-byte
		// coordinates.
		assert_eq!(decoded.len(), 65);
		assert_eq!(decoded[0], 0x04);
	}

	#[test]
	fn garbage_key_is_rejected() {
		assert!(matches!(
			decode_vapid_key("!!not base64!!"),
			Err(NotificationError::InvalidKey(_))
		));
	}

	#[tokio::test]
	async fn enable_forwards_subscription_to_gateway() {
		let gateway = MockGateway::new();
		let platform = MockPushPlatform::new();
		let registrar = NotificationRegistrar::new(gateway.clone(), platform);

		assert!(registrar.enable(&session()).await);

		let forwarded = gateway.subscriptions.lock().clone();
		assert_eq!(forwarded.len(), 1);
		assert_eq!(forwarded[0].endpoint, "https://push.example/endpoint");
	}

	#[tokio::test]
	async fn enable_absorbs_platform_refusal() {
		let gateway = MockGateway::new();
		let platform = MockPushPlatform::refusing();
		let registrar = NotificationRegistrar::new(gateway.clone(), platform);

		assert!(!registrar.enable(&session()).await);
		assert!(gateway.subscriptions.lock().is_empty());
	}

	#[tokio::test]
	async fn enable_rejects_subscription_without_keys() {
		let gateway = MockGateway::new();
		let platform = MockPushPlatform::without_keys();
		let registrar = NotificationRegistrar::new(gateway.clone(), platform);

		assert!(!registrar.enable(&session()).await);
		assert!(gateway.subscriptions.lock().is_empty());
	}

	#[tokio::test]
	async fn disable_tears_down_both_sides() {
		let gateway = MockGateway::new();
		let platform = MockPushPlatform::new();
		let registrar = NotificationRegistrar::new(gateway.clone(), platform.clone());

		registrar.enable(&session()).await;
		assert!(registrar.disable(&session()).await);

		assert!(platform.subscription().await.is_none());
		assert_eq!(
			*gateway.unsubscribed.lock(),
			vec!["https://push.example/endpoint".to_string()]
		);
	}

	#[tokio::test]
	async fn disable_without_subscription_is_a_noop() {
		let gateway = MockGateway::new();
		let registrar = NotificationRegistrar::new(gateway.clone(), MockPushPlatform::new());

		assert!(!registrar.disable(&session()).await);
		assert!(gateway.unsubscribed.lock().is_empty());
	}
}
