pub mod auth;
pub mod notifications;
pub mod stories;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Base URL of the production story API deployment.
pub const DEFAULT_API_URL: &str = "https://story-api.dicoding.dev/v1";

#[derive(Clone)]
pub struct RequestConfig {
	pub client: reqwest::Client,
	pub api_url: String,
	pub token: Option<String>,
}

impl RequestConfig {
	pub fn new(api_url: impl Into<String>) -> Self {
		Self {
			client: reqwest::Client::new(),
			api_url: api_url.into(),
			token: None,
		}
	}

	pub fn with_token(mut self, token: Option<String>) -> Self {
		self.token = token;
		self
	}
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
	/// The server could not be reached at all (DNS failure, timeout,
	/// connection refused).
	#[error("network error: {0}")]
	Transport(String),
	/// The server answered with a non-success status.
	#[error("server rejected request ({status}): {message}")]
	Remote { status: u16, message: String },
	/// The response arrived but could not be interpreted.
	#[error("unexpected response payload: {0}")]
	Decode(String),
}

impl Error {
	pub fn status(&self) -> Option<u16> {
		match self {
			Error::Remote { status, .. } => Some(*status),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
	pub id: String,
	#[serde(default)]
	pub name: String,
	#[serde(default)]
	pub description: String,
	/// Either a hosted image URL, or a base64 data URI on locally
	/// authored copies whose upload is still pending.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub photo_url: Option<String>,
	pub created_at: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub lat: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub lon: Option<f64>,
	/// Only present on locally authored copies in the unsynced queue.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub synced: Option<bool>,
	/// Stamped by the local cache on every write.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cached_at: Option<DateTime<Utc>>,
}

/// A story submission before it reaches the server.
#[derive(Debug, Clone, Default)]
pub struct NewStory {
	pub description: String,
	pub lat: Option<f64>,
	pub lon: Option<f64>,
	pub photo: Option<StoryPhoto>,
}

#[derive(Debug, Clone)]
pub struct StoryPhoto {
	pub mime: String,
	pub bytes: Vec<u8>,
}

impl StoryPhoto {
	pub fn file_name(&self) -> String {
		let ext = self.mime.rsplit('/').next().unwrap_or("bin");
		format!("photo.{ext}")
	}
}

pub(crate) trait WithAuth {
	fn with_auth(self, token: &str) -> Self;
}

impl WithAuth for reqwest::RequestBuilder {
	fn with_auth(self, token: &str) -> Self {
		self.header("authorization", format!("Bearer {token}"))
	}
}

/// Extracts a story object from a detail response.
///
/// Deployments differ in how they wrap the payload, so the precedence is
/// fixed here and nowhere else: a `story` key wins over a `data` key, which
/// wins over a flat story object.
pub fn normalize_story_envelope(value: Value) -> Result<Story, Error> {
	let payload = match value {
		Value::Object(ref map) => {
			if let Some(nested) = map.get("story").filter(|v| v.is_object()) {
				nested.clone()
			} else if let Some(nested) = map.get("data").filter(|v| v.is_object()) {
				nested.clone()
			} else {
				value
			}
		}
		other => other,
	};

	serde_json::from_value(payload).map_err(|e| Error::Decode(e.to_string()))
}

pub(crate) fn transport(e: reqwest::Error) -> Error {
	Error::Transport(e.to_string())
}

pub(crate) async fn check(response: reqwest::Response) -> Result<reqwest::Response, Error> {
	let status = response.status();
	if status.is_success() {
		return Ok(response);
	}

	let body = response.text().await.unwrap_or_default();
	Err(remote_error(status, &body))
}

/// The API reports failures as `{"error": true, "message": "..."}`; fall
/// back to the status line when the body is something else.
pub(crate) fn remote_error(status: StatusCode, body: &str) -> Error {
	#[derive(Deserialize)]
	struct ApiMessage {
		message: String,
	}

	let message = serde_json::from_str::<ApiMessage>(body)
		.ok()
		.map(|m| m.message)
		.filter(|m| !m.is_empty())
		.unwrap_or_else(|| {
			status
				.canonical_reason()
				.unwrap_or("request failed")
				.to_string()
		});

	Error::Remote {
		status: status.as_u16(),
		message,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;
	use serde_json::json;

	fn story_json(id: &str) -> Value {
		json!({
			"id": id,
			"name": "Ayu",
			"description": "Sunset at the bay",
			"photoUrl": "https://example.com/photo.jpg",
			"createdAt": "2024-05-01T10:00:00Z",
			"lat": -6.2,
			"lon": 106.8,
		})
	}

	#[test]
	fn normalize_prefers_story_key() {
		let value = json!({
			"story": story_json("a"),
			"data": story_json("b"),
		});

		assert_eq!(normalize_story_envelope(value).unwrap().id, "a");
	}

	#[test]
	fn normalize_falls_back_to_data_key() {
		let value = json!({ "data": story_json("b") });

		assert_eq!(normalize_story_envelope(value).unwrap().id, "b");
	}

	#[test]
	fn normalize_accepts_flat_object() {
		assert_eq!(normalize_story_envelope(story_json("c")).unwrap().id, "c");
	}

	#[test]
	fn normalize_rejects_shapeless_payload() {
		let result = normalize_story_envelope(json!({ "error": true }));

		assert!(matches!(result, Err(Error::Decode(_))));
	}

	#[test]
	fn remote_error_takes_message_from_body() {
		let err = remote_error(StatusCode::BAD_REQUEST, r#"{"error":true,"message":"\"description\" is required"}"#);

		match err {
			Error::Remote { status, message } => {
				assert_eq!(status, 400);
				assert_eq!(message, "\"description\" is required");
			}
			other => panic!("unexpected error: {other:?}"),
		}
	}

	#[test]
	fn remote_error_falls_back_to_status_line() {
		let err = remote_error(StatusCode::INTERNAL_SERVER_ERROR, "<html>oops</html>");

		match err {
			Error::Remote { status, message } => {
				assert_eq!(status, 500);
				assert_eq!(message, "Internal Server Error");
			}
			other => panic!("unexpected error: {other:?}"),
		}
	}

	#[test]
	fn photo_file_name_follows_mime_subtype() {
		let photo = StoryPhoto { mime: "image/jpeg".into(), bytes: vec![1, 2, 3] };

		assert_eq!(photo.file_name(), "photo.jpeg");
	}
}
