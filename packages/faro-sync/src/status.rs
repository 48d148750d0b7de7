use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::SyncService;

const LATENCY_SMOOTHING: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncState {
	Idle,
	Syncing,
	Error,
	NoData,
}

/// In-memory observability state for one tenant. Created lazily, reset on
/// process restart.
#[derive(Debug, Clone, Serialize)]
pub struct TenantSyncStatus {
	pub tenant_id: String,
	pub total: u64,
	pub processed: u64,
	pub failed: u64,
	#[serde(with = "time::serde::rfc3339::option")]
	pub last_sync_time: Option<OffsetDateTime>,
	pub state: SyncState,
	pub last_error: Option<String>,
	pub avg_latency_ms: Option<f64>,
}
impl TenantSyncStatus {
	pub(crate) fn new(tenant_id: &str) -> Self {
		Self {
			tenant_id: tenant_id.to_string(),
			total: 0,
			processed: 0,
			failed: 0,
			last_sync_time: None,
			state: SyncState::Idle,
			last_error: None,
			avg_latency_ms: None,
		}
	}

	/// The status query never errors: a tenant with no recorded activity gets
	/// this synthesized value instead.
	pub fn no_data(tenant_id: &str) -> Self {
		Self { state: SyncState::NoData, ..Self::new(tenant_id) }
	}

	/// Moving average with smoothing 0.3, seeded directly by the first sample.
	pub(crate) fn record_latency(&mut self, sample_ms: f64) {
		self.avg_latency_ms = Some(match self.avg_latency_ms {
			Some(avg) => avg * (1.0 - LATENCY_SMOOTHING) + sample_ms * LATENCY_SMOOTHING,
			None => sample_ms,
		});
	}
}

impl SyncService {
	pub fn status(&self, tenant_id: &str) -> TenantSyncStatus {
		let statuses = self.statuses.lock().unwrap_or_else(|err| err.into_inner());

		statuses.get(tenant_id).cloned().unwrap_or_else(|| TenantSyncStatus::no_data(tenant_id))
	}

	pub(crate) fn update_status<F>(&self, tenant_id: &str, update: F)
	where
		F: FnOnce(&mut TenantSyncStatus),
	{
		let mut statuses = self.statuses.lock().unwrap_or_else(|err| err.into_inner());
		let entry = statuses
			.entry(tenant_id.to_string())
			.or_insert_with(|| TenantSyncStatus::new(tenant_id));

		update(entry);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn first_latency_sample_seeds_the_average() {
		let mut status = TenantSyncStatus::new("t1");

		status.record_latency(200.0);

		assert_eq!(status.avg_latency_ms, Some(200.0));
	}

	#[test]
	fn later_samples_are_smoothed() {
		let mut status = TenantSyncStatus::new("t1");

		status.record_latency(100.0);
		status.record_latency(200.0);

		assert_eq!(status.avg_latency_ms, Some(100.0 * 0.7 + 200.0 * 0.3));

		status.record_latency(50.0);

		assert_eq!(status.avg_latency_ms, Some(130.0 * 0.7 + 50.0 * 0.3));
	}

	#[test]
	fn no_data_is_synthesized_for_unknown_tenants() {
		let status = TenantSyncStatus::no_data("ghost");

		assert_eq!(status.state, SyncState::NoData);
		assert_eq!(status.total, 0);
		assert!(status.last_sync_time.is_none());
	}
}
