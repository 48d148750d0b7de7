use std::time::{Duration, Instant};

use axum::{
	Json, Router,
	extract::{Path, State},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use faro_storage::vectors;
use faro_sync::Error as SyncError;

use crate::state::AppState;

/// Caller-side deadline for one webhook dispatch. Orchestration that outlives
/// it keeps running detached; only the response is cut short.
pub const WEBHOOK_DEADLINE: Duration = Duration::from_secs(30);
/// Applied before processing INSERT notifications, which tend to arrive ahead
/// of the write becoming visible to reads.
pub const INSERT_SETTLE_DELAY: Duration = Duration::from_secs(2);
pub const NOT_FOUND_RETRY_AFTER_SECS: u64 = 2;

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/webhook/project-update", post(project_update))
		.with_state(state)
}

pub fn admin_router(state: AppState) -> Router {
	Router::new()
		.route("/v1/admin/tenants/{tenant_id}/force_sync", post(force_sync))
		.route("/v1/admin/tenants/{tenant_id}/status", get(tenant_status))
		.route("/v1/admin/sweep/start", post(sweep_start))
		.route("/v1/admin/sweep/stop", post(sweep_stop))
		.route("/v1/admin/vectors/{tenant_id}/{record_id}", get(vector_diagnostic))
		.with_state(state)
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
	#[serde(alias = "inmobiliaria_id")]
	tenant_id: Option<String>,
	#[serde(alias = "project_id")]
	record_id: Option<String>,
	#[serde(default, alias = "operation")]
	event: Option<String>,
	#[serde(default)]
	#[allow(dead_code)]
	timestamp: Option<String>,
}

#[derive(Debug, Serialize)]
struct WebhookAccepted {
	success: bool,
	tenant_id: String,
	record_id: String,
	dimensions: usize,
	elapsed_ms: u64,
}

#[derive(Debug, Serialize)]
struct WebhookRejected {
	success: bool,
	error: String,
	error_code: String,
	elapsed_ms: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	retryable: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	retry_after: Option<u64>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
	status: &'static str,
	#[serde(with = "time::serde::rfc3339")]
	timestamp: OffsetDateTime,
}

async fn health() -> Json<HealthResponse> {
	Json(HealthResponse { status: "ok", timestamp: OffsetDateTime::now_utc() })
}

async fn project_update(
	State(state): State<AppState>,
	Json(payload): Json<WebhookPayload>,
) -> Response {
	let started = Instant::now();
	let Some(tenant_id) = non_empty(payload.tenant_id.as_deref()) else {
		return rejected(
			StatusCode::BAD_REQUEST,
			"invalid_payload",
			"tenant_id is required and must be non-empty.",
			started,
			None,
		);
	};
	let Some(record_id) = non_empty(payload.record_id.as_deref()) else {
		return rejected(
			StatusCode::BAD_REQUEST,
			"invalid_payload",
			"record_id is required and must be non-empty.",
			started,
			None,
		);
	};
	let event = payload.event.as_deref().unwrap_or("UPDATE").to_ascii_uppercase();

	tracing::info!(tenant_id, record_id, event, "Webhook change notification received.");

	let settle = event == "INSERT";
	let service = state.service.clone();
	let task_tenant = tenant_id.clone();
	let task_record = record_id.clone();
	// At-least-once contract: the deadline below cuts the response short but
	// does not cancel this task. Dropping the join handle detaches it; its
	// outcome is then observable only through the tenant's sync status.
	let handle = tokio::spawn(async move {
		if settle {
			tokio::time::sleep(INSERT_SETTLE_DELAY).await;
		}

		service.process_record(&task_tenant, &task_record).await
	});

	match tokio::time::timeout(WEBHOOK_DEADLINE, handle).await {
		Ok(Ok(Ok(report))) => {
			let elapsed_ms = started.elapsed().as_millis() as u64;

			tracing::info!(tenant_id, record_id, elapsed_ms, "Webhook sync succeeded.");

			(
				StatusCode::OK,
				Json(WebhookAccepted {
					success: true,
					tenant_id,
					record_id,
					dimensions: report.dimensions,
					elapsed_ms,
				}),
			)
				.into_response()
		},
		Ok(Ok(Err(err))) => {
			tracing::warn!(error = %err, tenant_id, record_id, "Webhook sync failed.");

			sync_failure(err, started)
		},
		Ok(Err(err)) => {
			tracing::error!(error = %err, tenant_id, record_id, "Webhook sync task failed.");

			rejected(
				StatusCode::INTERNAL_SERVER_ERROR,
				"sync_failed",
				"Record synchronization task failed.",
				started,
				None,
			)
		},
		Err(_) => {
			let elapsed_ms = started.elapsed().as_millis() as u64;

			tracing::warn!(
				tenant_id,
				record_id,
				elapsed_ms,
				"Webhook deadline elapsed; sync continues in the background."
			);

			rejected(
				StatusCode::GATEWAY_TIMEOUT,
				"sync_timeout",
				format!(
					"Synchronization did not finish within {}s; it continues in the background.",
					WEBHOOK_DEADLINE.as_secs()
				),
				started,
				None,
			)
		},
	}
}

async fn force_sync(State(state): State<AppState>, Path(tenant_id): Path<String>) -> Response {
	match state.service.force_sync_tenant(&tenant_id).await {
		Ok(report) => Json(report).into_response(),
		Err(err) => {
			tracing::error!(error = %err, tenant_id, "Force sync failed.");

			admin_error(err)
		},
	}
}

async fn tenant_status(
	State(state): State<AppState>,
	Path(tenant_id): Path<String>,
) -> Json<faro_sync::TenantSyncStatus> {
	Json(state.service.status(&tenant_id))
}

async fn sweep_start(State(state): State<AppState>) -> Json<serde_json::Value> {
	let started = state.service.start();

	Json(serde_json::json!({ "running": true, "started": started }))
}

async fn sweep_stop(State(state): State<AppState>) -> Json<serde_json::Value> {
	let stopped = state.service.stop();

	Json(serde_json::json!({ "running": false, "stopped": stopped }))
}

#[derive(Debug, Serialize)]
struct VectorDiagnostic {
	tenant_id: String,
	record_id: String,
	exists: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	dimensions: Option<i32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	model: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	content_version: Option<String>,
	#[serde(with = "time::serde::rfc3339::option")]
	last_update: Option<OffsetDateTime>,
}

/// Manual repair tooling: inspects the stored vector for one record without
/// running any part of the processing pipeline.
async fn vector_diagnostic(
	State(state): State<AppState>,
	Path((tenant_id, record_id)): Path<(String, String)>,
) -> Response {
	match vectors::fetch_vector(&state.service.db, &tenant_id, &record_id).await {
		Ok(vector) => {
			let exists = vector.is_some();
			let (dimensions, model, content_version, last_update) = match vector {
				Some(vector) => (
					Some(vector.dimensions),
					Some(vector.model),
					Some(vector.content_version),
					Some(vector.last_update),
				),
				None => (None, None, None, None),
			};

			Json(VectorDiagnostic {
				tenant_id,
				record_id,
				exists,
				dimensions,
				model,
				content_version,
				last_update,
			})
			.into_response()
		},
		Err(err) => {
			tracing::error!(error = %err, tenant_id, record_id, "Vector diagnostic failed.");

			(
				StatusCode::INTERNAL_SERVER_ERROR,
				Json(serde_json::json!({
					"error": err.to_string(),
					"error_code": "storage_error",
				})),
			)
				.into_response()
		},
	}
}

fn non_empty(value: Option<&str>) -> Option<String> {
	let trimmed = value?.trim();

	if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
}

fn sync_failure(err: SyncError, started: Instant) -> Response {
	match &err {
		SyncError::NotFound { .. } => rejected(
			StatusCode::NOT_FOUND,
			"record_not_found",
			err.to_string(),
			started,
			Some(NOT_FOUND_RETRY_AFTER_SECS),
		),
		SyncError::Validation { .. } =>
			rejected(StatusCode::BAD_REQUEST, "invalid_payload", err.to_string(), started, None),
		_ => rejected(
			StatusCode::INTERNAL_SERVER_ERROR,
			"sync_failed",
			err.to_string(),
			started,
			None,
		),
	}
}

fn rejected(
	status: StatusCode,
	error_code: &str,
	error: impl Into<String>,
	started: Instant,
	retry_after: Option<u64>,
) -> Response {
	let body = WebhookRejected {
		success: false,
		error: error.into(),
		error_code: error_code.to_string(),
		elapsed_ms: started.elapsed().as_millis() as u64,
		retryable: retry_after.map(|_| true),
		retry_after,
	};

	(status, Json(body)).into_response()
}

fn admin_error(err: SyncError) -> Response {
	(
		StatusCode::INTERNAL_SERVER_ERROR,
		Json(serde_json::json!({
			"error": err.to_string(),
			"error_code": "sync_failed",
		})),
	)
		.into_response()
}
