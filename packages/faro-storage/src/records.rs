use std::time::Duration;

use ::time::OffsetDateTime;
use tokio::time;

use crate::{Error, Result, db::Db, error, models::SourceRecord};

/// Baseline fetch budget. Webhook-triggered fetches pass a larger budget to
/// absorb commit-visibility races on just-inserted records.
pub const DEFAULT_FETCH_ATTEMPTS: u32 = 3;
pub const FETCH_BASE_BACKOFF_MS: u64 = 500;
pub const FETCH_MAX_BACKOFF_MS: u64 = 15_000;

/// Wait before the attempt after `attempt`: min(500 * 2^(attempt-1), 15000) ms.
/// Attempts are 1-indexed; no wait precedes the first attempt.
pub fn fetch_backoff(attempt: u32) -> Duration {
	let exp = attempt.max(1).saturating_sub(1).min(10);
	let ms = FETCH_BASE_BACKOFF_MS.saturating_mul(1 << exp).min(FETCH_MAX_BACKOFF_MS);

	Duration::from_millis(ms)
}

/// Fetches one record, retrying misses and transient errors with exponential
/// backoff. A miss on the final attempt classifies as not-found (a likely
/// commit-visibility race for the caller to surface as retryable); an error on
/// the final attempt classifies as a fatal fetch failure. Permission-class
/// errors abort immediately.
pub async fn fetch_one(
	db: &Db,
	tenant_id: &str,
	record_id: &str,
	max_attempts: u32,
) -> Result<SourceRecord> {
	let max_attempts = max_attempts.max(1);
	let mut last_err = None;

	for attempt in 1..=max_attempts {
		let fetched = sqlx::query_as::<_, SourceRecord>(
			"\
SELECT tenant_id, record_id, fields, created_at, updated_at
FROM source_records
WHERE tenant_id = $1 AND record_id = $2",
		)
		.bind(tenant_id)
		.bind(record_id)
		.fetch_optional(&db.pool)
		.await;

		match fetched {
			Ok(Some(record)) => return Ok(record),
			Ok(None) => {
				tracing::debug!(tenant_id, record_id, attempt, "Record not visible yet.");

				last_err = None;
			},
			Err(err) => {
				if error::permission_class(&err) {
					return Err(Error::PermissionDenied { message: err.to_string() });
				}

				tracing::warn!(
					error = %err,
					tenant_id,
					record_id,
					attempt,
					"Record fetch attempt failed."
				);

				last_err = Some(err);
			},
		}

		if attempt < max_attempts {
			time::sleep(fetch_backoff(attempt)).await;
		}
	}

	match last_err {
		Some(source) => Err(Error::FetchFailed {
			tenant_id: tenant_id.to_string(),
			record_id: record_id.to_string(),
			attempts: max_attempts,
			source,
		}),
		None => Err(Error::NotFound {
			tenant_id: tenant_id.to_string(),
			record_id: record_id.to_string(),
			attempts: max_attempts,
		}),
	}
}

pub async fn fetch_changed_since(
	db: &Db,
	tenant_id: &str,
	since: OffsetDateTime,
) -> Result<Vec<SourceRecord>> {
	let records = sqlx::query_as::<_, SourceRecord>(
		"\
SELECT tenant_id, record_id, fields, created_at, updated_at
FROM source_records
WHERE tenant_id = $1 AND updated_at >= $2
ORDER BY updated_at ASC",
	)
	.bind(tenant_id)
	.bind(since)
	.fetch_all(&db.pool)
	.await?;

	Ok(records)
}

/// Cheap existence probe. No retry; callers use it for diagnostics, not to
/// gate progress.
pub async fn exists(db: &Db, tenant_id: &str, record_id: &str) -> Result<bool> {
	let found: bool = sqlx::query_scalar(
		"SELECT EXISTS (SELECT 1 FROM source_records WHERE tenant_id = $1 AND record_id = $2)",
	)
	.bind(tenant_id)
	.bind(record_id)
	.fetch_one(&db.pool)
	.await?;

	Ok(found)
}

pub async fn tenant_exists(db: &Db, tenant_id: &str) -> Result<bool> {
	let found: bool =
		sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM tenants WHERE tenant_id = $1)")
			.bind(tenant_id)
			.fetch_one(&db.pool)
			.await?;

	Ok(found)
}

pub async fn list_active_tenants(db: &Db) -> Result<Vec<String>> {
	let tenants =
		sqlx::query_scalar("SELECT tenant_id FROM tenants WHERE active ORDER BY tenant_id")
			.fetch_all(&db.pool)
			.await?;

	Ok(tenants)
}
