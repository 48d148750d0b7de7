use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use faro_storage::db::Db;
use faro_sync::SyncService;

#[derive(Debug, Parser)]
#[command(
	version = faro_cli::VERSION,
	rename_all = "kebab",
	styles = faro_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: std::path::PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = faro_config::load(&args.config)?;
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
	tracing_subscriber::fmt().with_env_filter(filter).init();

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema(config.providers.embedding.dimensions).await?;

	let service = Arc::new(SyncService::new(config, db));

	service.start();

	tokio::signal::ctrl_c().await?;
	tracing::info!("Shutdown signal received. Stopping sweep loop.");
	service.stop();

	Ok(())
}
