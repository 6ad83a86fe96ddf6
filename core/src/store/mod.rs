//! Durable local persistence for the three story collections.
//!
//! One redb database holds the network story cache, the favorites list and
//! the locally authored unsynced queue. Records are stored as JSON keyed by
//! their `id` field, with a shared secondary-index table so lookups like
//! "all unsynced stories" do not deserialize whole collections.

mod stories;

pub use stories::FavoriteEntry;

use std::{path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::task;

const STORIES_TABLE: TableDefinition<&str, Vec<u8>> = TableDefinition::new("stories");
const FAVORITES_TABLE: TableDefinition<&str, Vec<u8>> = TableDefinition::new("favorites");
const USER_STORIES_TABLE: TableDefinition<&str, Vec<u8>> = TableDefinition::new("user_stories");

/// Keyed by `("<collection>/<index>/<value>", record id)`. The first
/// component is compared whole, never as a prefix, so indexed values may
/// themselves contain `/`.
const INDEXES_TABLE: TableDefinition<(&str, &str), ()> = TableDefinition::new("secondary_indexes");

pub(crate) type RecordTable<'txn> = redb::Table<'txn, &'static str, Vec<u8>>;
pub(crate) type IndexTable<'txn> = redb::Table<'txn, (&'static str, &'static str), ()>;

const DEFAULT_CACHE_LIMIT: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
	/// Mirror of the most recent successful network fetches.
	Stories,
	Favorites,
	/// Locally authored stories, including those not yet accepted upstream.
	UserStories,
}

impl Collection {
	pub const fn name(self) -> &'static str {
		match self {
			Collection::Stories => "stories",
			Collection::Favorites => "favorites",
			Collection::UserStories => "user_stories",
		}
	}

	pub const fn indexes(self) -> &'static [&'static str] {
		match self {
			Collection::Stories => &["createdAt", "name"],
			Collection::Favorites => &["addedAt"],
			Collection::UserStories => &["createdAt", "synced"],
		}
	}

	fn table(self) -> TableDefinition<'static, &'static str, Vec<u8>> {
		match self {
			Collection::Stories => STORIES_TABLE,
			Collection::Favorites => FAVORITES_TABLE,
			Collection::UserStories => USER_STORIES_TABLE,
		}
	}
}

#[derive(Debug, Error)]
pub enum StoreError {
	#[error("storage transaction failed: {0}")]
	Transaction(String),
	#[error("stored record is not valid JSON: {0}")]
	Corrupt(String),
	#[error("record has no string `id` field")]
	MissingKey,
	#[error("collection `{collection}` has no index `{index}`")]
	UnknownIndex { collection: &'static str, index: String },
}

macro_rules! transaction_error_from {
	($($ty:ty),+) => {
		$(impl From<$ty> for StoreError {
			fn from(e: $ty) -> Self {
				StoreError::Transaction(e.to_string())
			}
		})+
	};
}

transaction_error_from!(
	redb::DatabaseError,
	redb::TransactionError,
	redb::TableError,
	redb::StorageError,
	redb::CommitError
);

impl From<serde_json::Error> for StoreError {
	fn from(e: serde_json::Error) -> Self {
		StoreError::Corrupt(e.to_string())
	}
}

pub struct LocalStore {
	db: Arc<Database>,
	pub(crate) cache_limit: usize,
}

impl LocalStore {
	/// Opens the database, creating it and its tables when absent.
	///
	/// Safe to call against an existing database: table creation is
	/// idempotent and existing records are untouched. Secondary-index
	/// entries are rebuilt from the primary tables, so records written
	/// before an index existed become visible to it.
	pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
		let path = path.as_ref().to_path_buf();

		let db = task::spawn_blocking(move || -> Result<Database, StoreError> {
			let db = Database::create(path)?;

			let txn = db.begin_write()?;
			{
				let mut indexes = txn.open_table(INDEXES_TABLE)?;

				for collection in [
					Collection::Stories,
					Collection::Favorites,
					Collection::UserStories,
				] {
					let records = txn.open_table(collection.table())?;

					for entry in records.iter()? {
						let (key, value) = entry?;
						let parsed: Value = serde_json::from_slice(&value.value())?;
						for index_key in index_keys(collection, &parsed) {
							indexes.insert((index_key.as_str(), key.value()), ())?;
						}
					}
				}
			}
			txn.commit()?;

			Ok(db)
		})
		.await
		.map_err(|e| StoreError::Transaction(format!("storage task failed: {e}")))??;

		Ok(Self {
			db: Arc::new(db),
			cache_limit: DEFAULT_CACHE_LIMIT,
		})
	}

	/// Caps the story cache collection; oldest `cachedAt` entries are
	/// evicted first once the cap is exceeded.
	pub fn with_cache_limit(mut self, limit: usize) -> Self {
		self.cache_limit = limit;
		self
	}

	/// Upserts a record keyed by its `id` field. A later write to the same
	/// id replaces the earlier one wholesale.
	pub async fn put<R: Serialize>(
		&self,
		collection: Collection,
		record: &R,
	) -> Result<(), StoreError> {
		self.put_value(collection, serde_json::to_value(record)?)
			.await
	}

	pub async fn get_all<R>(&self, collection: Collection) -> Result<Vec<R>, StoreError>
	where
		R: DeserializeOwned + Send + 'static,
	{
		self.run_blocking(move |db| {
			let txn = db.begin_read()?;
			let records = txn.open_table(collection.table())?;

			let mut out = Vec::new();
			for entry in records.iter()? {
				let (_, value) = entry?;
				out.push(serde_json::from_slice(&value.value())?);
			}

			Ok(out)
		})
		.await
	}

	pub async fn get<R>(&self, collection: Collection, id: &str) -> Result<Option<R>, StoreError>
	where
		R: DeserializeOwned + Send + 'static,
	{
		let id = id.to_string();

		self.run_blocking(move |db| {
			let txn = db.begin_read()?;
			let records = txn.open_table(collection.table())?;

			match records.get(id.as_str())? {
				Some(guard) => Ok(Some(serde_json::from_slice(&guard.value())?)),
				None => Ok(None),
			}
		})
		.await
	}

	/// Returns every record whose indexed field equals `value`.
	pub async fn get_by_index<R>(
		&self,
		collection: Collection,
		index: &str,
		value: Value,
	) -> Result<Vec<R>, StoreError>
	where
		R: DeserializeOwned + Send + 'static,
	{
		if !collection.indexes().contains(&index) {
			return Err(StoreError::UnknownIndex {
				collection: collection.name(),
				index: index.to_string(),
			});
		}

		let Some(component) = index_component(&value) else {
			return Ok(Vec::new());
		};
		let prefix = index_entry_key(collection, index, &component);

		self.run_blocking(move |db| {
			let txn = db.begin_read()?;
			let indexes = txn.open_table(INDEXES_TABLE)?;

			let mut ids = Vec::new();
			for entry in indexes.range((prefix.as_str(), "")..)? {
				let (key, _) = entry?;
				let (combo, id) = key.value();
				if combo != prefix {
					break;
				}
				ids.push(id.to_string());
			}

			let records = txn.open_table(collection.table())?;
			let mut out = Vec::new();
			for id in ids {
				if let Some(guard) = records.get(id.as_str())? {
					out.push(serde_json::from_slice(&guard.value())?);
				}
			}

			Ok(out)
		})
		.await
	}

	/// Removes a record by id; absent ids are a no-op.
	pub async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
		let id = id.to_string();

		self.run_blocking(move |db| {
			let txn = db.begin_write()?;
			{
				let mut records = txn.open_table(collection.table())?;
				let mut indexes = txn.open_table(INDEXES_TABLE)?;
				remove_in_txn(&mut records, &mut indexes, collection, &id)?;
			}
			txn.commit()?;

			Ok(())
		})
		.await
	}

	/// Wipes every collection.
	pub async fn clear_all(&self) -> Result<(), StoreError> {
		self.run_blocking(|db| {
			let txn = db.begin_write()?;
			for collection in [
				Collection::Stories,
				Collection::Favorites,
				Collection::UserStories,
			] {
				txn.delete_table(collection.table())?;
				txn.open_table(collection.table())?;
			}
			txn.delete_table(INDEXES_TABLE)?;
			txn.open_table(INDEXES_TABLE)?;
			txn.commit()?;

			Ok(())
		})
		.await
	}

	pub(crate) async fn put_value(
		&self,
		collection: Collection,
		value: Value,
	) -> Result<(), StoreError> {
		self.run_blocking(move |db| {
			let txn = db.begin_write()?;
			{
				let mut records = txn.open_table(collection.table())?;
				let mut indexes = txn.open_table(INDEXES_TABLE)?;
				upsert_in_txn(&mut records, &mut indexes, collection, &value)?;
			}
			txn.commit()?;

			Ok(())
		})
		.await
	}

	pub(crate) async fn run_blocking<T, F>(&self, f: F) -> Result<T, StoreError>
	where
		F: FnOnce(Arc<Database>) -> Result<T, StoreError> + Send + 'static,
		T: Send + 'static,
	{
		let db = self.db.clone();
		match task::spawn_blocking(move || f(db)).await {
			Ok(result) => result,
			Err(e) => Err(StoreError::Transaction(format!("storage task failed: {e}"))),
		}
	}
}

/// Writes `value` under its id and refreshes its secondary-index entries,
/// dropping entries that belonged to the replaced version.
pub(crate) fn upsert_in_txn(
	records: &mut RecordTable<'_>,
	indexes: &mut IndexTable<'_>,
	collection: Collection,
	value: &Value,
) -> Result<String, StoreError> {
	let id = value
		.get("id")
		.and_then(Value::as_str)
		.ok_or(StoreError::MissingKey)?
		.to_string();

	let previous = records.get(id.as_str())?.map(|guard| guard.value());
	if let Some(bytes) = previous {
		let old: Value = serde_json::from_slice(&bytes)?;
		for index_key in index_keys(collection, &old) {
			indexes.remove((index_key.as_str(), id.as_str()))?;
		}
	}

	records.insert(id.as_str(), serde_json::to_vec(value)?)?;
	for index_key in index_keys(collection, value) {
		indexes.insert((index_key.as_str(), id.as_str()), ())?;
	}

	Ok(id)
}

pub(crate) fn remove_in_txn(
	records: &mut RecordTable<'_>,
	indexes: &mut IndexTable<'_>,
	collection: Collection,
	id: &str,
) -> Result<bool, StoreError> {
	let previous = records.remove(id)?.map(|guard| guard.value());

	match previous {
		Some(bytes) => {
			let old: Value = serde_json::from_slice(&bytes)?;
			for index_key in index_keys(collection, &old) {
				indexes.remove((index_key.as_str(), id))?;
			}
			Ok(true)
		}
		None => Ok(false),
	}
}

fn index_keys(collection: Collection, value: &Value) -> Vec<String> {
	collection
		.indexes()
		.iter()
		.filter_map(|index| {
			value
				.get(*index)
				.and_then(index_component)
				.map(|component| index_entry_key(collection, index, &component))
		})
		.collect()
}

fn index_component(value: &Value) -> Option<String> {
	match value {
		Value::Null => None,
		Value::Bool(b) => Some(b.to_string()),
		Value::Number(n) => Some(n.to_string()),
		Value::String(s) => Some(s.clone()),
		other => Some(other.to_string()),
	}
}

fn index_entry_key(collection: Collection, index: &str, component: &str) -> String {
	format!("{}/{}/{}", collection.name(), index, component)
}
