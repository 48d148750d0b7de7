#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error("Record {tenant_id}/{record_id} not found after {attempts} attempts.")]
	NotFound { tenant_id: String, record_id: String, attempts: u32 },
	#[error("Fetch for {tenant_id}/{record_id} failed after {attempts} attempts.")]
	FetchFailed {
		tenant_id: String,
		record_id: String,
		attempts: u32,
		#[source]
		source: sqlx::Error,
	},
	#[error("Store access denied: {message}")]
	PermissionDenied { message: String },
	#[error("Refusing vector write for {tenant_id}/{record_id}: {message}")]
	ReferentialViolation { tenant_id: String, record_id: String, message: String },
}

/// Postgres error classes that no amount of retrying will fix: 42501
/// insufficient_privilege and the 28xxx authorization failures.
pub(crate) fn permission_class(err: &sqlx::Error) -> bool {
	let Some(db_err) = err.as_database_error() else {
		return false;
	};
	let Some(code) = db_err.code() else {
		return false;
	};

	code == "42501" || code.starts_with("28")
}
