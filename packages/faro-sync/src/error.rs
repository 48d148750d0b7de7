pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("{message}")]
	Validation { message: String },
	#[error("Record {tenant_id}/{record_id} not found after {attempts} attempts.")]
	NotFound { tenant_id: String, record_id: String, attempts: u32 },
	#[error("{message}")]
	Permission { message: String },
	#[error("{message}")]
	Provider { message: String },
	#[error("{message}")]
	Referential { message: String },
	#[error(transparent)]
	Storage(faro_storage::Error),
}
impl Error {
	/// Retryable failures are commit-visibility races: the caller should try
	/// again shortly rather than treat the record as permanently missing.
	pub fn retryable(&self) -> bool {
		matches!(self, Self::NotFound { .. })
	}
}
impl From<faro_storage::Error> for Error {
	fn from(err: faro_storage::Error) -> Self {
		match err {
			faro_storage::Error::NotFound { tenant_id, record_id, attempts } =>
				Self::NotFound { tenant_id, record_id, attempts },
			faro_storage::Error::PermissionDenied { message } => Self::Permission { message },
			err @ faro_storage::Error::ReferentialViolation { .. } =>
				Self::Referential { message: err.to_string() },
			other => Self::Storage(other),
		}
	}
}
impl From<faro_providers::Error> for Error {
	fn from(err: faro_providers::Error) -> Self {
		match err {
			err @ faro_providers::Error::PermissionDenied { .. } =>
				Self::Permission { message: err.to_string() },
			other => Self::Provider { message: other.to_string() },
		}
	}
}
