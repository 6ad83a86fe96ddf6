//! Typed story operations layered over the generic collection surface.

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sl_cloud_api::Story;

use super::{
	remove_in_txn, upsert_in_txn, Collection, IndexTable, LocalStore, RecordTable, StoreError,
	INDEXES_TABLE,
};

/// A story pinned by the user, kept independently of the network cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteEntry {
	#[serde(flatten)]
	pub story: Story,
	pub added_at: DateTime<Utc>,
}

impl LocalStore {
	/// Mirrors a fetched page into the cache, stamping each record's
	/// `cachedAt`, then evicts the oldest entries beyond the cache cap.
	pub async fn save_stories(&self, stories: &[Story]) -> Result<(), StoreError> {
		let limit = self.cache_limit;
		let stamp = serde_json::to_value(Utc::now())?;
		let mut values = Vec::with_capacity(stories.len());
		for story in stories {
			values.push(serde_json::to_value(story)?);
		}

		self.run_blocking(move |db| {
			let txn = db.begin_write()?;
			{
				let mut records = txn.open_table(Collection::Stories.table())?;
				let mut indexes = txn.open_table(INDEXES_TABLE)?;

				for mut value in values {
					if let Some(object) = value.as_object_mut() {
						object.insert("cachedAt".to_string(), stamp.clone());
					}
					upsert_in_txn(&mut records, &mut indexes, Collection::Stories, &value)?;
				}

				prune_cache_in_txn(&mut records, &mut indexes, limit)?;
			}
			txn.commit()?;

			Ok(())
		})
		.await
	}

	/// Mirrors a single fetched story into the cache.
	pub async fn cache_story(&self, story: &Story) -> Result<(), StoreError> {
		let mut value = serde_json::to_value(story)?;
		if let Some(object) = value.as_object_mut() {
			object.insert("cachedAt".to_string(), serde_json::to_value(Utc::now())?);
		}

		self.put_value(Collection::Stories, value).await
	}

	pub async fn cached_stories(&self) -> Result<Vec<Story>, StoreError> {
		self.get_all(Collection::Stories).await
	}

	pub async fn cached_story(&self, id: &str) -> Result<Option<Story>, StoreError> {
		self.get(Collection::Stories, id).await
	}

	pub async fn add_favorite(&self, story: &Story) -> Result<FavoriteEntry, StoreError> {
		let entry = FavoriteEntry {
			story: story.clone(),
			added_at: Utc::now(),
		};
		self.put(Collection::Favorites, &entry).await?;

		Ok(entry)
	}

	pub async fn remove_favorite(&self, id: &str) -> Result<(), StoreError> {
		self.delete(Collection::Favorites, id).await
	}

	pub async fn favorites(&self) -> Result<Vec<FavoriteEntry>, StoreError> {
		self.get_all(Collection::Favorites).await
	}

	pub async fn is_favorite(&self, id: &str) -> Result<bool, StoreError> {
		Ok(self
			.get::<FavoriteEntry>(Collection::Favorites, id)
			.await?
			.is_some())
	}

	pub async fn put_user_story(&self, story: &Story) -> Result<(), StoreError> {
		self.put(Collection::UserStories, story).await
	}

	pub async fn user_story(&self, id: &str) -> Result<Option<Story>, StoreError> {
		self.get(Collection::UserStories, id).await
	}

	pub async fn user_stories(&self) -> Result<Vec<Story>, StoreError> {
		self.get_all(Collection::UserStories).await
	}

	pub async fn unsynced_user_stories(&self) -> Result<Vec<Story>, StoreError> {
		self.get_by_index(Collection::UserStories, "synced", json!(false))
			.await
	}

	/// Flips a queued story's `synced` flag in place, keeping the record
	/// for audit. Returns false when the id is unknown.
	pub async fn mark_user_story_synced(&self, id: &str) -> Result<bool, StoreError> {
		let id = id.to_string();

		self.run_blocking(move |db| {
			let txn = db.begin_write()?;
			let updated;
			{
				let mut records = txn.open_table(Collection::UserStories.table())?;
				let mut indexes = txn.open_table(INDEXES_TABLE)?;

				let previous = records.get(id.as_str())?.map(|guard| guard.value());
				match previous {
					Some(bytes) => {
						let mut value: Value = serde_json::from_slice(&bytes)?;
						let object = value.as_object_mut().ok_or_else(|| {
							StoreError::Corrupt("queued story is not an object".to_string())
						})?;
						object.insert("synced".to_string(), Value::Bool(true));

						upsert_in_txn(&mut records, &mut indexes, Collection::UserStories, &value)?;
						updated = true;
					}
					None => updated = false,
				}
			}
			txn.commit()?;

			Ok(updated)
		})
		.await
	}

	pub async fn delete_user_story(&self, id: &str) -> Result<(), StoreError> {
		self.delete(Collection::UserStories, id).await
	}

	/// Removes queue entries that were already acknowledged by the server
	/// and predate `older_than`. Returns how many were dropped.
	pub async fn prune_synced(&self, older_than: DateTime<Utc>) -> Result<usize, StoreError> {
		self.run_blocking(move |db| {
			let txn = db.begin_write()?;
			let mut pruned = 0;
			{
				let mut records = txn.open_table(Collection::UserStories.table())?;
				let mut indexes = txn.open_table(INDEXES_TABLE)?;

				let mut stale = Vec::new();
				for entry in records.iter()? {
					let (key, value) = entry?;
					let parsed: Value = serde_json::from_slice(&value.value())?;
					let synced = parsed.get("synced").and_then(Value::as_bool).unwrap_or(false);
					let created = parsed
						.get("createdAt")
						.and_then(Value::as_str)
						.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
						.map(|d| d.with_timezone(&Utc));

					if synced && created.is_some_and(|created| created < older_than) {
						stale.push(key.value().to_string());
					}
				}

				for id in stale {
					remove_in_txn(&mut records, &mut indexes, Collection::UserStories, &id)?;
					pruned += 1;
				}
			}
			txn.commit()?;

			Ok(pruned)
		})
		.await
	}
}

/// Evicts the least recently cached stories once the collection exceeds
/// `limit`. Records without a parseable `cachedAt` are evicted first.
fn prune_cache_in_txn(
	records: &mut RecordTable<'_>,
	indexes: &mut IndexTable<'_>,
	limit: usize,
) -> Result<(), StoreError> {
	let mut entries: Vec<(DateTime<Utc>, String)> = Vec::new();
	for entry in records.iter()? {
		let (key, value) = entry?;
		let parsed: Value = serde_json::from_slice(&value.value())?;
		let stamp = parsed
			.get("cachedAt")
			.and_then(Value::as_str)
			.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
			.map(|d| d.with_timezone(&Utc))
			.unwrap_or(DateTime::<Utc>::MIN_UTC);
		entries.push((stamp, key.value().to_string()));
	}

	if entries.len() <= limit {
		return Ok(());
	}

	entries.sort();
	let excess = entries.len() - limit;
	for (_, id) in entries.into_iter().take(excess) {
		remove_in_txn(records, indexes, Collection::Stories, &id)?;
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;
	use std::time::Duration;
	use tempfile::TempDir;

	fn story(id: &str) -> Story {
		Story {
			id: id.to_string(),
			name: "Ayu".to_string(),
			description: "Sunset at the bay".to_string(),
			photo_url: None,
			created_at: Utc::now(),
			lat: None,
			lon: None,
			synced: None,
			cached_at: None,
		}
	}

	async fn open_store() -> (LocalStore, TempDir) {
		let dir = TempDir::new().unwrap();
		let store = LocalStore::open(dir.path().join("stories.redb"))
			.await
			.unwrap();
		(store, dir)
	}

	#[tokio::test]
	async fn save_stories_stamps_cached_at() {
		let (store, _dir) = open_store().await;

		store.save_stories(&[story("1"), story("2")]).await.unwrap();

		let cached = store.cached_stories().await.unwrap();
		assert_eq!(cached.len(), 2);
		assert!(cached.iter().all(|s| s.cached_at.is_some()));
	}

	#[tokio::test]
	async fn cache_evicts_oldest_entries_beyond_limit() {
		let dir = TempDir::new().unwrap();
		let store = LocalStore::open(dir.path().join("stories.redb"))
			.await
			.unwrap()
			.with_cache_limit(2);

		store.save_stories(&[story("old")]).await.unwrap();
		tokio::time::sleep(Duration::from_millis(10)).await;
		store.save_stories(&[story("new-1"), story("new-2")]).await.unwrap();

		let cached = store.cached_stories().await.unwrap();
		assert_eq!(cached.len(), 2);
		assert!(cached.iter().all(|s| s.id != "old"));
	}

	#[tokio::test]
	async fn favorite_membership_is_independent_of_cache() {
		let (store, _dir) = open_store().await;

		store.add_favorite(&story("42")).await.unwrap();

		assert!(store.is_favorite("42").await.unwrap());
		assert!(store.cached_story("42").await.unwrap().is_none());
	}

	#[tokio::test]
	async fn readding_favorite_overwrites_single_record() {
		let (store, _dir) = open_store().await;

		store.add_favorite(&story("42")).await.unwrap();
		store.add_favorite(&story("42")).await.unwrap();

		assert_eq!(store.favorites().await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn mark_synced_flips_flag_in_place() {
		let (store, _dir) = open_store().await;

		let mut queued = story("local-1");
		queued.synced = Some(false);
		store.put_user_story(&queued).await.unwrap();

		assert!(store.mark_user_story_synced("local-1").await.unwrap());

		let record = store.user_story("local-1").await.unwrap().unwrap();
		assert_eq!(record.synced, Some(true));
		assert!(store.unsynced_user_stories().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn mark_synced_unknown_id_reports_false() {
		let (store, _dir) = open_store().await;

		assert!(!store.mark_user_story_synced("missing").await.unwrap());
	}

	#[tokio::test]
	async fn prune_synced_keeps_pending_entries() {
		let (store, _dir) = open_store().await;

		let mut pending = story("pending");
		pending.synced = Some(false);
		let mut done = story("done");
		done.synced = Some(true);
		store.put_user_story(&pending).await.unwrap();
		store.put_user_story(&done).await.unwrap();

		let pruned = store
			.prune_synced(Utc::now() + chrono::Duration::seconds(1))
			.await
			.unwrap();

		assert_eq!(pruned, 1);
		let remaining = store.user_stories().await.unwrap();
		assert_eq!(remaining.len(), 1);
		assert_eq!(remaining[0].id, "pending");
	}
}
