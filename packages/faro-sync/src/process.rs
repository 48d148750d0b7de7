use std::time::Instant;

use serde::Serialize;
use time::OffsetDateTime;

use faro_storage::{
	models::{SourceRecord, VectorWrite},
	records, vectors,
};

use crate::{Result, SyncService, content, status::SyncState};

#[derive(Debug, Clone, Serialize)]
pub struct ProcessReport {
	pub tenant_id: String,
	pub record_id: String,
	pub dimensions: usize,
	pub elapsed_ms: u64,
}

impl SyncService {
	/// Runs one record through the full pipeline: existence probe, retrying
	/// fetch, content normalization, embedding, referential-checked upsert,
	/// status update.
	pub async fn process_record(&self, tenant_id: &str, record_id: &str) -> Result<ProcessReport> {
		let started = Instant::now();

		self.update_status(tenant_id, |status| {
			status.state = SyncState::Syncing;
			status.total += 1;
		});

		// Diagnostics only; the retrying fetch below is authoritative. The
		// probe result distinguishes never-existed from existed-but-fetch-failed
		// when the pipeline eventually fails.
		let probed = match records::exists(&self.db, tenant_id, record_id).await {
			Ok(found) => Some(found),
			Err(err) => {
				tracing::debug!(error = %err, tenant_id, record_id, "Existence probe failed.");

				None
			},
		};

		let result = self.fetch_and_process(tenant_id, record_id).await;
		let elapsed_ms = started.elapsed().as_millis() as u64;

		match result {
			Ok(dimensions) => {
				self.update_status(tenant_id, |status| {
					status.processed += 1;
					status.state = SyncState::Idle;
					status.last_sync_time = Some(OffsetDateTime::now_utc());
					status.last_error = None;
					status.record_latency(elapsed_ms as f64);
				});
				tracing::info!(tenant_id, record_id, dimensions, elapsed_ms, "Record synced.");

				Ok(ProcessReport {
					tenant_id: tenant_id.to_string(),
					record_id: record_id.to_string(),
					dimensions,
					elapsed_ms,
				})
			},
			Err(err) => {
				self.update_status(tenant_id, |status| {
					status.failed += 1;
					status.state = SyncState::Error;
					status.last_error = Some(err.to_string());
				});
				tracing::error!(
					error = %err,
					tenant_id,
					record_id,
					record_existed_at_receipt = ?probed,
					elapsed_ms,
					"Record sync failed."
				);

				Err(err)
			},
		}
	}

	async fn fetch_and_process(&self, tenant_id: &str, record_id: &str) -> Result<usize> {
		let record = records::fetch_one(
			&self.db,
			tenant_id,
			record_id,
			self.config.sync.fetch_max_attempts,
		)
		.await?;

		self.process_fetched(&record).await
	}

	/// The post-fetch pipeline shared by the webhook path and the sweep, which
	/// already holds full records. Returns the stored dimensionality.
	pub(crate) async fn process_fetched(&self, record: &SourceRecord) -> Result<usize> {
		let text = content::build_content(&record.fields);
		let embedding =
			self.embedder.embed(&self.config.providers.embedding, &text).await?;
		let dimensions = embedding.len();
		let write = VectorWrite {
			tenant_id: record.tenant_id.clone(),
			record_id: record.record_id.clone(),
			content_version: content::content_version(&text),
			content: text,
			embedding,
			model: self.config.providers.embedding.model.clone(),
		};

		vectors::upsert_vector(&self.db, &write).await?;

		Ok(dimensions)
	}
}
