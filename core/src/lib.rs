//! Storyline core: offline-first sync for location-tagged stories.
//!
//! [`Core`] wires the durable local store, the connectivity monitor, the
//! session slot and the sync engine together; the UI layer talks to
//! [`SyncEngine`] and renders the plain data shapes it returns.

pub mod connectivity;
pub mod notifications;
pub mod session;
pub mod store;
pub mod sync;
pub mod testing;

pub use sl_cloud_api as cloud_api;

pub use connectivity::ConnectivityMonitor;
pub use session::{Session, SessionError, SessionStore, SessionUser};
pub use store::{Collection, FavoriteEntry, LocalStore, StoreError};
pub use sync::{
	DataSource, DrainReport, FavoriteToggle, StoryFeed, Submission, SyncEngine, SyncError,
};

use std::{
	path::{Path, PathBuf},
	sync::Arc,
};

use sl_cloud_api::DEFAULT_API_URL;
use thiserror::Error;
use tracing::{info, warn};

use notifications::{NotificationRegistrar, PushPlatform};
use sync::{CloudGateway, StoryGateway};

#[derive(Debug, Error)]
pub enum CoreError {
	#[error(transparent)]
	Store(#[from] StoreError),
	#[error(transparent)]
	Session(#[from] SessionError),
	#[error(transparent)]
	Api(#[from] sl_cloud_api::Error),
	#[error("could not prepare data directory: {0}")]
	Io(#[from] std::io::Error),
	#[error("no platform data directory available")]
	NoDataDir,
}

/// Platform-specific default data directory.
pub fn default_data_dir() -> Result<PathBuf, CoreError> {
	dirs::data_dir()
		.map(|dir| dir.join("storyline"))
		.ok_or(CoreError::NoDataDir)
}

pub struct Core {
	pub store: Arc<LocalStore>,
	pub connectivity: Arc<ConnectivityMonitor>,
	pub session: Arc<SessionStore>,
	pub engine: Arc<SyncEngine>,
	gateway: Arc<dyn StoryGateway>,
}

impl Core {
	/// Opens the core against the production API. The data directory is
	/// created when absent.
	pub async fn new(data_dir: impl AsRef<Path>) -> Result<Arc<Self>, CoreError> {
		Self::with_api_url(data_dir, DEFAULT_API_URL).await
	}

	pub async fn with_api_url(
		data_dir: impl AsRef<Path>,
		api_url: impl Into<String>,
	) -> Result<Arc<Self>, CoreError> {
		let gateway: Arc<dyn StoryGateway> = Arc::new(CloudGateway::new(api_url.into()));
		// The platform shell reports the first offline edge; until then the
		// link is assumed up.
		Self::with_gateway(data_dir, gateway, true).await
	}

	/// Builds the core around an explicit gateway. This is the seam tests
	/// and alternative transports plug into.
	pub async fn with_gateway(
		data_dir: impl AsRef<Path>,
		gateway: Arc<dyn StoryGateway>,
		initially_online: bool,
	) -> Result<Arc<Self>, CoreError> {
		let data_dir = data_dir.as_ref();
		tokio::fs::create_dir_all(data_dir).await?;

		init_logging();

		let store = Arc::new(LocalStore::open(data_dir.join("stories.redb")).await?);
		let session = Arc::new(SessionStore::open(data_dir));
		let connectivity = ConnectivityMonitor::new(initially_online);
		let engine = Arc::new(SyncEngine::new(
			store.clone(),
			connectivity.clone(),
			session.clone(),
			gateway.clone(),
		));

		info!(data_dir = %data_dir.display(), "core initialized");

		Ok(Arc::new(Self {
			store,
			connectivity,
			session,
			engine,
			gateway,
		}))
	}

	/// Wires the reconnect hook: whenever the link comes back, the offline
	/// queue is drained in the background. Registration is idempotent, so
	/// calling this again is harmless.
	pub fn start(&self) {
		let engine = self.engine.clone();
		self.connectivity.on_online(move || {
			let engine = engine.clone();
			tokio::spawn(async move {
				match engine.drain_queue().await {
					Ok(report) if !report.skipped => {
						info!(
							replayed = report.replayed,
							failed = report.failed,
							"reconnect drain finished"
						);
					}
					Ok(_) => {}
					Err(e) => warn!("reconnect drain failed: {e}"),
				}
			});
		});
	}

	pub async fn register(
		&self,
		name: &str,
		email: &str,
		password: &str,
	) -> Result<(), CoreError> {
		self.gateway.register(name, email, password).await?;
		Ok(())
	}

	/// Logs in and persists the returned session in the durable slot.
	pub async fn login(&self, email: &str, password: &str) -> Result<Session, CoreError> {
		let result = self.gateway.login(email, password).await?;

		let session = Session {
			token: result.token,
			user: SessionUser {
				user_id: result.user_id,
				name: result.name,
			},
		};
		self.session.set(session.clone())?;

		Ok(session)
	}

	pub fn logout(&self) -> Result<(), CoreError> {
		self.session.clear()?;
		Ok(())
	}

	pub fn is_authenticated(&self) -> bool {
		self.session.is_authenticated()
	}

	/// Builds a push registrar bound to this core's gateway.
	pub fn notification_registrar(&self, platform: Arc<dyn PushPlatform>) -> NotificationRegistrar {
		NotificationRegistrar::new(self.gateway.clone(), platform)
	}
}

fn init_logging() {
	use tracing_subscriber::{fmt, prelude::*, EnvFilter};

	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::registry()
		.with(fmt::layer())
		.with(filter)
		.try_init()
		.ok();
}
