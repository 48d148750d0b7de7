use serde_json::Value;
use time::OffsetDateTime;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SourceRecord {
	pub tenant_id: String,
	pub record_id: String,
	pub fields: Value,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RecordVector {
	pub record_id: String,
	pub tenant_id: String,
	pub content: String,
	pub embedding: Vec<f32>,
	pub content_version: String,
	pub dimensions: i32,
	pub model: String,
	pub last_update: OffsetDateTime,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

/// One pending create-or-replace write. `dimensions` is derived from the
/// embedding at write time; timestamps are set by the store.
#[derive(Debug, Clone)]
pub struct VectorWrite {
	pub tenant_id: String,
	pub record_id: String,
	pub content: String,
	pub embedding: Vec<f32>,
	pub content_version: String,
	pub model: String,
}
