//! Network-or-cache orchestration and the offline write-behind queue.
//!
//! Reads prefer the network and degrade to the local cache; writes prefer
//! the network and degrade to a durable queue that is replayed after
//! reconnection. Gateway and store failures never cross this boundary
//! raw: callers get typed results with short human-readable messages.

mod gateway;
pub mod photo;

pub use gateway::{CloudGateway, StoryGateway};

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use sl_cloud_api::{Error as ApiError, NewStory, Story};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
	connectivity::ConnectivityMonitor,
	session::SessionStore,
	store::{FavoriteEntry, LocalStore, StoreError},
};

#[derive(Debug, Error)]
pub enum SyncError {
	#[error("story not found")]
	NotFound,
	#[error("{0}")]
	Unavailable(String),
	#[error("unable to save offline: {0}")]
	Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
	Network,
	Cache,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryFeed {
	pub stories: Vec<Story>,
	pub current_page: u32,
	pub has_more: bool,
	pub total_stories: usize,
	pub source: DataSource,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Submission {
	/// The server acknowledged the story immediately.
	Accepted { message: String },
	/// The story is persisted locally and will be replayed on reconnect.
	Queued { story: Story, message: String },
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
	pub replayed: usize,
	pub failed: usize,
	/// True when another drain was already running and this call did
	/// nothing.
	pub skipped: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteToggle {
	pub favorited: bool,
	pub message: String,
}

pub struct SyncEngine {
	store: Arc<LocalStore>,
	connectivity: Arc<ConnectivityMonitor>,
	session: Arc<SessionStore>,
	gateway: Arc<dyn StoryGateway>,
	drain_lock: tokio::sync::Mutex<()>,
	last_local_id: Mutex<i64>,
}

impl SyncEngine {
	pub fn new(
		store: Arc<LocalStore>,
		connectivity: Arc<ConnectivityMonitor>,
		session: Arc<SessionStore>,
		gateway: Arc<dyn StoryGateway>,
	) -> Self {
		Self {
			store,
			connectivity,
			session,
			gateway,
			drain_lock: tokio::sync::Mutex::new(()),
			last_local_id: Mutex::new(0),
		}
	}

	/// Fetches a story page, preferring the network and mirroring
	/// successful fetches into the cache. Offline, or when the fetch
	/// fails, the whole cache is served as a single page.
	pub async fn fetch_stories(
		&self,
		page: u32,
		page_size: u32,
		with_location: bool,
	) -> Result<StoryFeed, SyncError> {
		if self.connectivity.is_online() {
			match self.list_with_auth_retry(page, page_size, with_location).await {
				Ok(stories) => {
					if let Err(e) = self.store.save_stories(&stories).await {
						warn!("fetched stories could not be mirrored into the cache: {e}");
					}

					let has_more = stories.len() as u32 == page_size;
					return Ok(StoryFeed {
						total_stories: stories.len(),
						current_page: page,
						has_more,
						source: DataSource::Network,
						stories,
					});
				}
				Err(e) => warn!("story list fetch failed, serving cache instead: {e}"),
			}
		}

		self.feed_from_cache().await
	}

	/// Fetches a single story with the same network-then-cache policy. A
	/// locally queued story is also visible here, so a submission made
	/// offline can be opened before it ever reaches the server.
	pub async fn fetch_story_detail(&self, id: &str) -> Result<Story, SyncError> {
		if self.connectivity.is_online() {
			match self.detail_with_auth_retry(id).await {
				Ok(story) => {
					if let Err(e) = self.store.cache_story(&story).await {
						warn!("fetched story could not be mirrored into the cache: {e}");
					}
					return Ok(story);
				}
				Err(e) => warn!("story detail fetch failed, serving cache instead: {e}"),
			}
		}

		if let Some(story) = self.store.cached_story(id).await? {
			return Ok(story);
		}
		if let Some(story) = self.store.user_story(id).await? {
			return Ok(story);
		}

		Err(SyncError::NotFound)
	}

	/// Submits a story, immediately when online. Any upload failure falls
	/// through to the durable queue so mid-submission instability never
	/// drops user content.
	pub async fn submit_story(&self, story: NewStory) -> Result<Submission, SyncError> {
		if self.connectivity.is_online() {
			let token = self.session.token();
			match self.gateway.create(&story, token.as_deref()).await {
				Ok(()) => {
					info!("story accepted by the server");
					return Ok(Submission::Accepted {
						message: "Story shared successfully.".to_string(),
					});
				}
				Err(e) => warn!("immediate story upload failed, queueing locally: {e}"),
			}
		}

		let queued = self.queue_story(story).await?;
		info!(id = %queued.id, "story queued for later upload");

		Ok(Submission::Queued {
			story: queued,
			message: "You're offline. The story was saved and will be shared once you reconnect."
				.to_string(),
		})
	}

	/// Replays every unsynced story against the server. Each record is
	/// retried independently; a failure leaves it queued for the next
	/// drain. Overlapping invocations are ignored, which is safe because a
	/// completed drain leaves nothing for a second pass to duplicate.
	pub async fn drain_queue(&self) -> Result<DrainReport, SyncError> {
		let Ok(_guard) = self.drain_lock.try_lock() else {
			debug!("queue drain already in progress, skipping");
			return Ok(DrainReport {
				skipped: true,
				..DrainReport::default()
			});
		};

		let pending = self.store.unsynced_user_stories().await?;
		if pending.is_empty() {
			return Ok(DrainReport::default());
		}

		info!(pending = pending.len(), "replaying offline story queue");

		let token = self.session.token();
		let mut report = DrainReport::default();

		for record in pending {
			let upload = match rehydrate(&record) {
				Ok(upload) => upload,
				Err(e) => {
					warn!(id = %record.id, "queued story payload cannot be rebuilt: {e}");
					report.failed += 1;
					continue;
				}
			};

			match self.gateway.create(&upload, token.as_deref()).await {
				Ok(()) => match self.store.mark_user_story_synced(&record.id).await {
					Ok(_) => report.replayed += 1,
					Err(e) => {
						warn!(id = %record.id, "story uploaded but not marked synced: {e}");
						report.failed += 1;
					}
				},
				Err(e) => {
					warn!(id = %record.id, "replay failed, leaving story queued: {e}");
					report.failed += 1;
				}
			}
		}

		info!(
			replayed = report.replayed,
			failed = report.failed,
			"offline story queue drain finished"
		);

		Ok(report)
	}

	/// Adds or removes a story from favorites, returning the new
	/// membership state.
	pub async fn toggle_favorite(
		&self,
		id: &str,
		story: &Story,
	) -> Result<FavoriteToggle, SyncError> {
		if self.store.is_favorite(id).await? {
			self.store.remove_favorite(id).await?;
			Ok(FavoriteToggle {
				favorited: false,
				message: "Removed from favorites.".to_string(),
			})
		} else {
			self.store.add_favorite(story).await?;
			Ok(FavoriteToggle {
				favorited: true,
				message: "Added to favorites.".to_string(),
			})
		}
	}

	/// Pure membership lookup. Lookup failures read as "not favorited" so
	/// a toggle button can always render.
	pub async fn is_favorite(&self, id: &str) -> bool {
		match self.store.is_favorite(id).await {
			Ok(favorited) => favorited,
			Err(e) => {
				warn!("favorite lookup failed: {e}");
				false
			}
		}
	}

	pub async fn favorites(&self) -> Result<Vec<FavoriteEntry>, SyncError> {
		Ok(self.store.favorites().await?)
	}

	async fn feed_from_cache(&self) -> Result<StoryFeed, SyncError> {
		let stories = self.store.cached_stories().await?;
		if stories.is_empty() {
			return Err(SyncError::Unavailable(
				"No stories available. Check your connection and try again.".to_string(),
			));
		}

		// Cache reads are not paginated; the whole cache is the page.
		Ok(StoryFeed {
			total_stories: stories.len(),
			current_page: 1,
			has_more: false,
			source: DataSource::Cache,
			stories,
		})
	}

	/// Some deployments reject an expired bearer token with 401 instead of
	/// treating the request as anonymous, so a rejected token gets one
	/// anonymous retry before the cache fallback.
	async fn list_with_auth_retry(
		&self,
		page: u32,
		size: u32,
		with_location: bool,
	) -> Result<Vec<Story>, ApiError> {
		let token = self.session.token();
		match self
			.gateway
			.list(page, size, with_location, token.as_deref())
			.await
		{
			Err(ApiError::Remote { status: 401, .. }) if token.is_some() => {
				debug!("story list rejected with 401, retrying anonymously");
				self.gateway.list(page, size, with_location, None).await
			}
			other => other,
		}
	}

	async fn detail_with_auth_retry(&self, id: &str) -> Result<Story, ApiError> {
		let token = self.session.token();
		match self.gateway.detail(id, token.as_deref()).await {
			Err(ApiError::Remote { status: 401, .. }) if token.is_some() => {
				debug!("story detail rejected with 401, retrying anonymously");
				self.gateway.detail(id, None).await
			}
			other => other,
		}
	}

	async fn queue_story(&self, story: NewStory) -> Result<Story, SyncError> {
		let photo_url = story
			.photo
			.as_ref()
			.map(|photo| photo::encode_photo(&photo.bytes, &photo.mime));

		let record = Story {
			id: self.next_local_id(),
			name: self
				.session
				.session()
				.map(|session| session.user.name)
				.unwrap_or_else(|| "Guest".to_string()),
			description: story.description,
			photo_url,
			created_at: Utc::now(),
			lat: story.lat,
			lon: story.lon,
			synced: Some(false),
			cached_at: None,
		};

		self.store.put_user_story(&record).await?;

		Ok(record)
	}

	/// Timestamp-based ids, forced strictly increasing so two submissions
	/// in the same millisecond cannot collide.
	fn next_local_id(&self) -> String {
		let now = Utc::now().timestamp_millis();
		let mut last = self.last_local_id.lock();
		*last = now.max(*last + 1);
		last.to_string()
	}
}

/// Rebuilds the upload payload for a queued story, decoding the durable
/// photo string back into bytes.
fn rehydrate(record: &Story) -> Result<NewStory, photo::PhotoError> {
	let photo = record
		.photo_url
		.as_deref()
		.map(photo::decode_photo)
		.transpose()?;

	Ok(NewStory {
		description: record.description.clone(),
		lat: record.lat,
		lon: record.lon,
		photo,
	})
}
