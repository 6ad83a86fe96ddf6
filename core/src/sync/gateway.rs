//! Gateway seam between the sync engine and the story API.
//!
//! The engine only depends on the [`StoryGateway`] trait; production code
//! wires in [`CloudGateway`], tests inject a scripted double.

use async_trait::async_trait;
use sl_cloud_api::{
	auth::LoginResult, notifications::PushSubscription, Error as ApiError, NewStory,
	RequestConfig, Story,
};

#[async_trait]
pub trait StoryGateway: Send + Sync {
	async fn register(&self, name: &str, email: &str, password: &str) -> Result<(), ApiError>;

	async fn login(&self, email: &str, password: &str) -> Result<LoginResult, ApiError>;

	async fn list(
		&self,
		page: u32,
		size: u32,
		with_location: bool,
		token: Option<&str>,
	) -> Result<Vec<Story>, ApiError>;

	async fn detail(&self, id: &str, token: Option<&str>) -> Result<Story, ApiError>;

	async fn create(&self, story: &NewStory, token: Option<&str>) -> Result<(), ApiError>;

	async fn subscribe_push(
		&self,
		subscription: &PushSubscription,
		token: &str,
	) -> Result<(), ApiError>;

	async fn unsubscribe_push(&self, endpoint: &str, token: &str) -> Result<(), ApiError>;
}

/// The real gateway, backed by `sl-cloud-api` over HTTP.
pub struct CloudGateway {
	base: RequestConfig,
}

impl CloudGateway {
	pub fn new(api_url: impl Into<String>) -> Self {
		Self {
			base: RequestConfig::new(api_url),
		}
	}

	fn config(&self, token: Option<&str>) -> RequestConfig {
		self.base.clone().with_token(token.map(str::to_owned))
	}
}

#[async_trait]
impl StoryGateway for CloudGateway {
	async fn register(&self, name: &str, email: &str, password: &str) -> Result<(), ApiError> {
		sl_cloud_api::auth::register(self.config(None), name, email, password).await
	}

	async fn login(&self, email: &str, password: &str) -> Result<LoginResult, ApiError> {
		sl_cloud_api::auth::login(self.config(None), email, password).await
	}

	async fn list(
		&self,
		page: u32,
		size: u32,
		with_location: bool,
		token: Option<&str>,
	) -> Result<Vec<Story>, ApiError> {
		sl_cloud_api::stories::list(self.config(token), page, size, with_location).await
	}

	async fn detail(&self, id: &str, token: Option<&str>) -> Result<Story, ApiError> {
		sl_cloud_api::stories::detail(self.config(token), id).await
	}

	async fn create(&self, story: &NewStory, token: Option<&str>) -> Result<(), ApiError> {
		sl_cloud_api::stories::create(self.config(token), story).await
	}

	async fn subscribe_push(
		&self,
		subscription: &PushSubscription,
		token: &str,
	) -> Result<(), ApiError> {
		sl_cloud_api::notifications::subscribe(self.config(Some(token)), subscription).await
	}

	async fn unsubscribe_push(&self, endpoint: &str, token: &str) -> Result<(), ApiError> {
		sl_cloud_api::notifications::unsubscribe(self.config(Some(token)), endpoint).await
	}
}
