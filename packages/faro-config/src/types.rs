use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub sync: SyncConfig,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub admin_bind: String,
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default = "default_max_content_chars")]
	pub max_content_chars: u32,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
	/// Attempt budget for webhook-triggered record fetches. Raised above the
	/// storage baseline to absorb commit-visibility races on fresh inserts.
	pub fetch_max_attempts: u32,
	pub batch_size: u32,
	pub sweep_interval_secs: u64,
}
impl Default for SyncConfig {
	fn default() -> Self {
		Self { fetch_max_attempts: 5, batch_size: 25, sweep_interval_secs: 21_600 }
	}
}

fn default_max_content_chars() -> u32 {
	8_000
}
