use reqwest::multipart;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{check, normalize_story_envelope, transport, Error, NewStory, RequestConfig, Story, WithAuth};

pub use list::exec as list;
pub mod list {
	use super::*;

	#[derive(Deserialize)]
	#[serde(rename_all = "camelCase")]
	struct Response {
		#[serde(default)]
		list_story: Vec<Story>,
	}

	pub async fn exec(
		config: RequestConfig,
		page: u32,
		size: u32,
		with_location: bool,
	) -> Result<Vec<Story>, Error> {
		let mut request = config
			.client
			.get(format!("{}/stories", config.api_url))
			.query(&[
				("page", page.to_string()),
				("size", size.to_string()),
				("location", if with_location { "1" } else { "0" }.to_string()),
			]);

		if let Some(token) = &config.token {
			request = request.with_auth(token);
		}

		let response = check(request.send().await.map_err(transport)?).await?;

		let body: Response = response
			.json()
			.await
			.map_err(|e| Error::Decode(e.to_string()))?;

		debug!(count = body.list_story.len(), page, "fetched story page");

		Ok(body.list_story)
	}
}

pub use detail::exec as detail;
pub mod detail {
	use super::*;

	pub async fn exec(config: RequestConfig, id: &str) -> Result<Story, Error> {
		let mut request = config
			.client
			.get(format!("{}/stories/{id}", config.api_url));

		if let Some(token) = &config.token {
			request = request.with_auth(token);
		}

		let value: Value = check(request.send().await.map_err(transport)?)
			.await?
			.json()
			.await
			.map_err(|e| Error::Decode(e.to_string()))?;

		normalize_story_envelope(value)
	}
}

pub use create::exec as create;
pub mod create {
	use super::*;

	pub async fn exec(config: RequestConfig, story: &NewStory) -> Result<(), Error> {
		// Anonymous submissions go through the guest endpoint.
		let endpoint = if config.token.is_some() {
			"/stories"
		} else {
			"/stories/guest"
		};

		let mut form = multipart::Form::new().text("description", story.description.clone());

		if let Some(lat) = story.lat {
			form = form.text("lat", lat.to_string());
		}
		if let Some(lon) = story.lon {
			form = form.text("lon", lon.to_string());
		}
		if let Some(photo) = &story.photo {
			let part = multipart::Part::bytes(photo.bytes.clone())
				.file_name(photo.file_name())
				.mime_str(&photo.mime)
				.map_err(|e| Error::Decode(e.to_string()))?;
			form = form.part("photo", part);
		}

		let mut request = config
			.client
			.post(format!("{}{endpoint}", config.api_url))
			.multipart(form);

		if let Some(token) = &config.token {
			request = request.with_auth(token);
		}

		debug!(endpoint, "uploading story");

		check(request.send().await.map_err(transport)?).await?;

		Ok(())
	}
}
