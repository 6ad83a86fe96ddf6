use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{check, transport, Error, RequestConfig};

/// Credentials handed back by a successful login. The caller owns
/// persistence; this crate never stores them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
	pub user_id: String,
	pub name: String,
	pub token: String,
}

pub use register::exec as register;
pub mod register {
	use super::*;

	pub async fn exec(
		config: RequestConfig,
		name: &str,
		email: &str,
		password: &str,
	) -> Result<(), Error> {
		let response = config
			.client
			.post(format!("{}/register", config.api_url))
			.json(&json!({
				"name": name,
				"email": email,
				"password": password,
			}))
			.send()
			.await
			.map_err(transport)?;

		check(response).await?;

		Ok(())
	}
}

pub use login::exec as login;
pub mod login {
	use super::*;

	#[derive(Deserialize)]
	#[serde(rename_all = "camelCase")]
	struct Response {
		login_result: LoginResult,
	}

	pub async fn exec(
		config: RequestConfig,
		email: &str,
		password: &str,
	) -> Result<LoginResult, Error> {
		let response = config
			.client
			.post(format!("{}/login", config.api_url))
			.json(&json!({
				"email": email,
				"password": password,
			}))
			.send()
			.await
			.map_err(transport)?;

		let body: Response = check(response)
			.await?
			.json()
			.await
			.map_err(|e| Error::Decode(e.to_string()))?;

		Ok(body.login_result)
	}
}
