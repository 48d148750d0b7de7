use std::{
	sync::{Arc, atomic::Ordering},
	time::{Duration, Instant},
};

use serde::Serialize;
use time::OffsetDateTime;
use tokio::time as tokio_time;

use faro_storage::{records, vectors};

use crate::{Result, SyncService, status::SyncState};

/// Slice length for the inter-cycle sleep, so `stop()` takes effect promptly
/// even with an hours-long recurrence interval.
const SLEEP_SLICE_MS: u64 = 1_000;

#[derive(Debug, Clone, Serialize)]
pub struct RecordFailure {
	pub record_id: String,
	pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TenantSweepReport {
	pub tenant_id: String,
	pub scanned: usize,
	pub processed: usize,
	pub failed: usize,
	pub orphans_removed: u64,
	pub errors: Vec<RecordFailure>,
}

impl SyncService {
	/// Starts the backup sweep loop. Returns false when a loop is already
	/// running in this process; the running flag is the only mutual exclusion.
	pub fn start(self: &Arc<Self>) -> bool {
		if self.sweep_running.swap(true, Ordering::SeqCst) {
			tracing::warn!("Sweep loop already running; start ignored.");

			return false;
		}

		let service = self.clone();

		tokio::spawn(async move {
			service.sweep_loop().await;
		});

		true
	}

	/// Signals the sweep loop to exit after its current cycle. Returns whether
	/// a loop was running.
	pub fn stop(&self) -> bool {
		self.sweep_running.swap(false, Ordering::SeqCst)
	}

	pub fn sweep_running(&self) -> bool {
		self.sweep_running.load(Ordering::SeqCst)
	}

	async fn sweep_loop(self: Arc<Self>) {
		tracing::info!(
			interval_secs = self.config.sync.sweep_interval_secs,
			"Backup sweep loop started."
		);

		while self.sweep_running.load(Ordering::SeqCst) {
			match self.run_sweep().await {
				Ok(reports) => {
					let processed: usize = reports.iter().map(|report| report.processed).sum();
					let failed: usize = reports.iter().map(|report| report.failed).sum();

					tracing::info!(
						tenants = reports.len(),
						processed,
						failed,
						"Sweep cycle finished."
					);
				},
				// Cycle-level failures are retried on the next scheduled cycle.
				Err(err) => {
					tracing::error!(error = %err, "Sweep cycle failed.");
				},
			}

			self.sleep_between_cycles().await;
		}

		tracing::info!("Backup sweep loop stopped.");
	}

	async fn sleep_between_cycles(&self) {
		let mut remaining_ms = self.config.sync.sweep_interval_secs.saturating_mul(1_000);

		while remaining_ms > 0 && self.sweep_running.load(Ordering::SeqCst) {
			let slice = remaining_ms.min(SLEEP_SLICE_MS);

			tokio_time::sleep(Duration::from_millis(slice)).await;

			remaining_ms -= slice;
		}
	}

	/// One reconciliation cycle over every active tenant. Advances
	/// `last_sweep_time` to the cycle start only after all tenants complete,
	/// so a failed cycle rescans the same window next time.
	pub async fn run_sweep(self: &Arc<Self>) -> Result<Vec<TenantSweepReport>> {
		let cycle_started = OffsetDateTime::now_utc();
		let since = *self.last_sweep_time.lock().unwrap_or_else(|err| err.into_inner());
		let tenants = records::list_active_tenants(&self.db).await?;
		let mut reports = Vec::with_capacity(tenants.len());

		for tenant_id in &tenants {
			reports.push(self.sweep_tenant_since(tenant_id, since).await?);
		}

		*self.last_sweep_time.lock().unwrap_or_else(|err| err.into_inner()) = cycle_started;

		Ok(reports)
	}

	/// Reprocesses everything a tenant owns, regardless of the sweep window.
	pub async fn force_sync_tenant(self: &Arc<Self>, tenant_id: &str) -> Result<TenantSweepReport> {
		self.sweep_tenant_since(tenant_id, OffsetDateTime::UNIX_EPOCH).await
	}

	async fn sweep_tenant_since(
		self: &Arc<Self>,
		tenant_id: &str,
		since: OffsetDateTime,
	) -> Result<TenantSweepReport> {
		let changed = records::fetch_changed_since(&self.db, tenant_id, since).await?;
		let scanned = changed.len();
		let batch_size = self.config.sync.batch_size.max(1) as usize;
		let mut latencies = Vec::new();
		let mut errors = Vec::new();

		for chunk in changed.chunks(batch_size) {
			let mut handles = Vec::with_capacity(chunk.len());

			// All records of one chunk proceed in parallel; chunks themselves
			// are sequential. One record's failure never aborts its siblings.
			for record in chunk {
				let service = self.clone();
				let record = record.clone();

				handles.push((
					record.record_id.clone(),
					tokio::spawn(async move {
						let started = Instant::now();
						let result = service.process_fetched(&record).await;

						(result, started.elapsed().as_millis() as u64)
					}),
				));
			}

			for (record_id, handle) in handles {
				match handle.await {
					Ok((Ok(_), elapsed_ms)) => latencies.push(elapsed_ms),
					Ok((Err(err), _)) => {
						tracing::error!(
							error = %err,
							tenant_id,
							record_id,
							"Sweep record failed."
						);

						errors.push(RecordFailure { record_id, error: err.to_string() });
					},
					Err(err) => {
						tracing::error!(error = %err, tenant_id, record_id, "Sweep task failed.");

						errors.push(RecordFailure { record_id, error: err.to_string() });
					},
				}
			}
		}

		let processed = latencies.len();

		self.update_status(tenant_id, |status| {
			status.total += scanned as u64;
			status.processed += processed as u64;
			status.failed += errors.len() as u64;

			for elapsed_ms in &latencies {
				status.record_latency(*elapsed_ms as f64);
			}

			if let Some(failure) = errors.last() {
				status.state = SyncState::Error;
				status.last_error = Some(failure.error.clone());
			} else {
				status.state = SyncState::Idle;
				status.last_sync_time = Some(OffsetDateTime::now_utc());
			}
		});

		let orphans_removed = vectors::remove_orphaned_vectors(&self.db, tenant_id).await?;

		Ok(TenantSweepReport {
			tenant_id: tenant_id.to_string(),
			scanned,
			processed,
			failed: errors.len(),
			orphans_removed,
			errors,
		})
	}
}
