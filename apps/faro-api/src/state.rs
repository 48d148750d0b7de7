use std::sync::Arc;

use faro_storage::db::Db;
use faro_sync::SyncService;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<SyncService>,
}
impl AppState {
	pub async fn new(config: faro_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema(config.providers.embedding.dimensions).await?;

		let service = SyncService::new(config, db);

		Ok(Self { service: Arc::new(service) })
	}
}
