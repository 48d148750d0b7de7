use time::OffsetDateTime;

use crate::{
	Error, Result,
	db::Db,
	models::{RecordVector, VectorWrite},
	records,
};

/// Idempotent create-or-replace keyed by `record_id`. Re-validates that both
/// the backing record and the owning tenant still exist before touching the
/// vector table; no orphaned vector row is ever written.
pub async fn upsert_vector(db: &Db, write: &VectorWrite) -> Result<()> {
	if !records::exists(db, &write.tenant_id, &write.record_id).await? {
		return Err(Error::ReferentialViolation {
			tenant_id: write.tenant_id.clone(),
			record_id: write.record_id.clone(),
			message: "backing record no longer exists".to_string(),
		});
	}
	if !records::tenant_exists(db, &write.tenant_id).await? {
		return Err(Error::ReferentialViolation {
			tenant_id: write.tenant_id.clone(),
			record_id: write.record_id.clone(),
			message: "owning tenant no longer exists".to_string(),
		});
	}

	let now = OffsetDateTime::now_utc();

	sqlx::query(
		"\
INSERT INTO record_vectors (
	record_id,
	tenant_id,
	content,
	embedding,
	content_version,
	dimensions,
	model,
	last_update,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, $8)
ON CONFLICT (record_id) DO UPDATE
SET
	tenant_id = EXCLUDED.tenant_id,
	content = EXCLUDED.content,
	embedding = EXCLUDED.embedding,
	content_version = EXCLUDED.content_version,
	dimensions = EXCLUDED.dimensions,
	model = EXCLUDED.model,
	last_update = EXCLUDED.last_update,
	updated_at = EXCLUDED.updated_at",
	)
	.bind(&write.record_id)
	.bind(&write.tenant_id)
	.bind(&write.content)
	.bind(&write.embedding)
	.bind(&write.content_version)
	.bind(write.embedding.len() as i32)
	.bind(&write.model)
	.bind(now)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn fetch_vector(
	db: &Db,
	tenant_id: &str,
	record_id: &str,
) -> Result<Option<RecordVector>> {
	let vector = sqlx::query_as::<_, RecordVector>(
		"\
SELECT
	record_id,
	tenant_id,
	content,
	embedding,
	content_version,
	dimensions,
	model,
	last_update,
	created_at,
	updated_at
FROM record_vectors
WHERE tenant_id = $1 AND record_id = $2",
	)
	.bind(tenant_id)
	.bind(record_id)
	.fetch_optional(&db.pool)
	.await?;

	Ok(vector)
}

/// Diagnostic probe used by the admin surface.
pub async fn vector_exists(db: &Db, record_id: &str) -> Result<bool> {
	let found: bool =
		sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM record_vectors WHERE record_id = $1)")
			.bind(record_id)
			.fetch_one(&db.pool)
			.await?;

	Ok(found)
}

/// Removes vectors whose backing record is gone, in one server-side statement.
pub async fn remove_orphaned_vectors(db: &Db, tenant_id: &str) -> Result<u64> {
	let result = sqlx::query(
		"\
DELETE FROM record_vectors v
WHERE v.tenant_id = $1
	AND NOT EXISTS (
		SELECT 1
		FROM source_records r
		WHERE r.tenant_id = v.tenant_id AND r.record_id = v.record_id
	)",
	)
	.bind(tenant_id)
	.execute(&db.pool)
	.await?;

	if result.rows_affected() > 0 {
		tracing::info!(tenant_id, count = result.rows_affected(), "Removed orphaned vectors.");
	}

	Ok(result.rows_affected())
}
