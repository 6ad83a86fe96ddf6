//! Authenticated session slot.
//!
//! The token and user profile live in their own JSON file next to the
//! database, never inside it. An absent or unreadable slot means guest
//! mode.

use std::{
	fs,
	path::{Path, PathBuf},
};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
	pub token: String,
	pub user: SessionUser,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
	pub user_id: String,
	pub name: String,
}

#[derive(Debug, Error)]
pub enum SessionError {
	#[error("session slot I/O failed: {0}")]
	Io(#[from] std::io::Error),
	#[error("session slot is not valid JSON: {0}")]
	Serde(#[from] serde_json::Error),
}

pub struct SessionStore {
	path: PathBuf,
	current: RwLock<Option<Session>>,
}

impl SessionStore {
	/// Loads the session slot from `data_dir`. A corrupt slot is logged
	/// and treated as signed out rather than blocking startup.
	pub fn open(data_dir: impl AsRef<Path>) -> Self {
		let path = data_dir.as_ref().join("session.json");

		let current = match fs::read_to_string(&path) {
			Ok(json) => match serde_json::from_str(&json) {
				Ok(session) => Some(session),
				Err(e) => {
					warn!("discarding unreadable session slot: {e}");
					None
				}
			},
			Err(_) => None,
		};

		Self {
			path,
			current: RwLock::new(current),
		}
	}

	pub fn session(&self) -> Option<Session> {
		self.current.read().clone()
	}

	pub fn token(&self) -> Option<String> {
		self.current.read().as_ref().map(|s| s.token.clone())
	}

	pub fn is_authenticated(&self) -> bool {
		self.current.read().is_some()
	}

	pub fn set(&self, session: Session) -> Result<(), SessionError> {
		let json = serde_json::to_string_pretty(&session)?;
		fs::write(&self.path, json)?;
		*self.current.write() = Some(session);

		Ok(())
	}

	pub fn clear(&self) -> Result<(), SessionError> {
		match fs::remove_file(&self.path) {
			Ok(()) => {}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
			Err(e) => return Err(e.into()),
		}
		*self.current.write() = None;

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;
	use tempfile::TempDir;

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
	fn missing_slot_means_guest() {
		let dir = TempDir::new().unwrap();
		let store = SessionStore::open(dir.path());

		assert!(!store.is_authenticated());
		assert_eq!(store.token(), None);
	}

	#[test]
	fn set_persists_across_reopen() {
		let dir = TempDir::new().unwrap();

		SessionStore::open(dir.path()).set(session()).unwrap();

		let reopened = SessionStore::open(dir.path());
		assert_eq!(reopened.token().as_deref(), Some("token-123"));
		assert_eq!(reopened.session().unwrap().user.name, "Ayu");
	}

	#[test]
	fn clear_removes_slot() {
		let dir = TempDir::new().unwrap();
		let store = SessionStore::open(dir.path());

		store.set(session()).unwrap();
		store.clear().unwrap();
		// Clearing an already-empty slot stays a no-op.
		store.clear().unwrap();

		assert!(!store.is_authenticated());
		assert!(!SessionStore::open(dir.path()).is_authenticated());
	}

	#[test]
	fn corrupt_slot_degrades_to_guest() {
		let dir = TempDir::new().unwrap();
		std::fs::write(dir.path().join("session.json"), "{not json").unwrap();

		let store = SessionStore::open(dir.path());
		assert!(!store.is_authenticated());
	}
}
