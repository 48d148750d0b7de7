pub mod content;
pub mod process;
pub mod status;
pub mod sweep;

mod error;

pub use error::{Error, Result};
pub use process::ProcessReport;
pub use status::{SyncState, TenantSyncStatus};
pub use sweep::{RecordFailure, TenantSweepReport};

use std::{
	collections::HashMap,
	future::Future,
	pin::Pin,
	sync::{Arc, Mutex, atomic::AtomicBool},
};

use time::OffsetDateTime;

use faro_config::{Config, EmbeddingProviderConfig};
use faro_storage::db::Db;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Seam between the orchestrator and the embedding provider; tests inject
/// deterministic or failing implementations here.
pub trait Embedder
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		text: &'a str,
	) -> BoxFuture<'a, faro_providers::Result<Vec<f32>>>;
}

/// Default embedder backed by the HTTP provider client.
pub struct HttpEmbedder;
impl Embedder for HttpEmbedder {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		text: &'a str,
	) -> BoxFuture<'a, faro_providers::Result<Vec<f32>>> {
		Box::pin(faro_providers::embedding::embed(cfg, text))
	}
}

/// Owns the per-record processing state machine, the per-tenant sync status
/// map, and the backup sweep loop. Collaborators hold it behind an `Arc` and
/// reach status only through it; nothing here is ambient global state.
pub struct SyncService {
	pub config: Config,
	pub db: Db,
	pub(crate) embedder: Arc<dyn Embedder>,
	pub(crate) statuses: Mutex<HashMap<String, TenantSyncStatus>>,
	pub(crate) sweep_running: AtomicBool,
	pub(crate) last_sweep_time: Mutex<OffsetDateTime>,
}
impl SyncService {
	pub fn new(config: Config, db: Db) -> Self {
		Self::with_embedder(config, db, Arc::new(HttpEmbedder))
	}

	pub fn with_embedder(config: Config, db: Db, embedder: Arc<dyn Embedder>) -> Self {
		Self {
			config,
			db,
			embedder,
			statuses: Mutex::new(HashMap::new()),
			sweep_running: AtomicBool::new(false),
			// Epoch-seeded so the first sweep cycle reconciles every record.
			last_sweep_time: Mutex::new(OffsetDateTime::UNIX_EPOCH),
		}
	}
}
