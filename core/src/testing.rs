//! Scripted doubles for the gateway and push-platform seams.
//!
//! Response queues are consumed front to back; an empty queue answers with
//! a transport error so a test that forgets to script a call fails loudly
//! instead of hanging on the network.

use std::{collections::VecDeque, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;
use sl_cloud_api::{
	auth::LoginResult,
	notifications::{PushSubscription, SubscriptionKeys},
	Error as ApiError, NewStory, Story,
};

use crate::{
	notifications::{NotificationError, PushPlatform},
	sync::StoryGateway,
};

#[derive(Default)]
pub struct MockGateway {
	pub list_results: Mutex<VecDeque<Result<Vec<Story>, ApiError>>>,
	pub detail_results: Mutex<VecDeque<Result<Story, ApiError>>>,
	pub create_results: Mutex<VecDeque<Result<(), ApiError>>>,
	pub login_results: Mutex<VecDeque<Result<LoginResult, ApiError>>>,

	/// Token attached to each list call, in call order.
	pub list_tokens: Mutex<Vec<Option<String>>>,
	/// `(id, token)` per detail call.
	pub detail_calls: Mutex<Vec<(String, Option<String>)>>,
	/// `(story, token)` per create call.
	pub created: Mutex<Vec<(NewStory, Option<String>)>>,
	pub subscriptions: Mutex<Vec<PushSubscription>>,
	pub unsubscribed: Mutex<Vec<String>>,
}

impl MockGateway {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn queue_list(&self, result: Result<Vec<Story>, ApiError>) {
		self.list_results.lock().push_back(result);
	}

	pub fn queue_detail(&self, result: Result<Story, ApiError>) {
		self.detail_results.lock().push_back(result);
	}

	pub fn queue_create(&self, result: Result<(), ApiError>) {
		self.create_results.lock().push_back(result);
	}

	pub fn queue_login(&self, result: Result<LoginResult, ApiError>) {
		self.login_results.lock().push_back(result);
	}

	fn next<T>(queue: &Mutex<VecDeque<Result<T, ApiError>>>) -> Result<T, ApiError> {
		queue
			.lock()
			.pop_front()
			.unwrap_or_else(|| Err(ApiError::Transport("no scripted response".to_string())))
	}
}

#[async_trait]
impl StoryGateway for MockGateway {
	async fn register(&self, _name: &str, _email: &str, _password: &str) -> Result<(), ApiError> {
		Ok(())
	}

	async fn login(&self, _email: &str, _password: &str) -> Result<LoginResult, ApiError> {
		Self::next(&self.login_results)
	}

	async fn list(
		&self,
		_page: u32,
		_size: u32,
		_with_location: bool,
		token: Option<&str>,
	) -> Result<Vec<Story>, ApiError> {
		self.list_tokens.lock().push(token.map(str::to_owned));
		Self::next(&self.list_results)
	}

	async fn detail(&self, id: &str, token: Option<&str>) -> Result<Story, ApiError> {
		self.detail_calls
			.lock()
			.push((id.to_string(), token.map(str::to_owned)));
		Self::next(&self.detail_results)
	}

	async fn create(&self, story: &NewStory, token: Option<&str>) -> Result<(), ApiError> {
		self.created
			.lock()
			.push((story.clone(), token.map(str::to_owned)));
		Self::next(&self.create_results)
	}

	async fn subscribe_push(
		&self,
		subscription: &PushSubscription,
		_token: &str,
	) -> Result<(), ApiError> {
		self.subscriptions.lock().push(subscription.clone());
		Ok(())
	}

	async fn unsubscribe_push(&self, endpoint: &str, _token: &str) -> Result<(), ApiError> {
		self.unsubscribed.lock().push(endpoint.to_string());
		Ok(())
	}
}

pub struct MockPushPlatform {
	refuse: bool,
	with_keys: bool,
	current: Mutex<Option<PushSubscription>>,
}

impl MockPushPlatform {
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			refuse: false,
			with_keys: true,
			current: Mutex::new(None),
		})
	}

	/// A platform where the user denied the notification permission.
	pub fn refusing() -> Arc<Self> {
		Arc::new(Self {
			refuse: true,
			with_keys: true,
			current: Mutex::new(None),
		})
	}

	/// A platform that hands out subscriptions without encryption keys.
	pub fn without_keys() -> Arc<Self> {
		Arc::new(Self {
			refuse: false,
			with_keys: false,
			current: Mutex::new(None),
		})
	}
}

#[async_trait]
impl PushPlatform for MockPushPlatform {
	async fn subscribe(
		&self,
		_application_server_key: &[u8],
	) -> Result<PushSubscription, NotificationError> {
		if self.refuse {
			return Err(NotificationError::Platform(
				"permission denied".to_string(),
			));
		}

		let keys = if self.with_keys {
			SubscriptionKeys {
				p256dh: "p256dh-key".to_string(),
				auth: "auth-key".to_string(),
			}
		} else {
			SubscriptionKeys {
				p256dh: String::new(),
				auth: String::new(),
			}
		};

		let subscription = PushSubscription {
			endpoint: "https://push.example/endpoint".to_string(),
			keys,
		};
		*self.current.lock() = Some(subscription.clone());

		Ok(subscription)
	}

	async fn subscription(&self) -> Option<PushSubscription> {
		self.current.lock().clone()
	}

	async fn unsubscribe(&self) -> bool {
		self.current.lock().take().is_some()
	}
}
