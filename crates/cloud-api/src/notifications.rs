use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{check, transport, Error, RequestConfig, WithAuth};

/// A platform push subscription, ready to be forwarded to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscription {
	pub endpoint: String,
	pub keys: SubscriptionKeys,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionKeys {
	pub p256dh: String,
	pub auth: String,
}

fn authenticated(config: &RequestConfig) -> Result<&str, Error> {
	config.token.as_deref().ok_or(Error::Remote {
		status: 401,
		message: "authentication required for notifications".to_string(),
	})
}

pub use subscribe::exec as subscribe;
pub mod subscribe {
	use super::*;

	pub async fn exec(config: RequestConfig, subscription: &PushSubscription) -> Result<(), Error> {
		let token = authenticated(&config)?;

		let response = config
			.client
			.post(format!("{}/notifications/subscribe", config.api_url))
			.json(&json!({
				"endpoint": subscription.endpoint,
				"keys": {
					"p256dh": subscription.keys.p256dh,
					"auth": subscription.keys.auth,
				},
			}))
			.with_auth(token)
			.send()
			.await
			.map_err(transport)?;

		check(response).await?;

		Ok(())
	}
}

pub use unsubscribe::exec as unsubscribe;
pub mod unsubscribe {
	use super::*;

	pub async fn exec(config: RequestConfig, endpoint: &str) -> Result<(), Error> {
		let token = authenticated(&config)?;

		let response = config
			.client
			.delete(format!("{}/notifications/subscribe", config.api_url))
			.json(&json!({ "endpoint": endpoint }))
			.with_auth(token)
			.send()
			.await
			.map_err(transport)?;

		check(response).await?;

		Ok(())
	}
}
