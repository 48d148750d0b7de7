use std::{sync::Arc, time::Duration};

use serde_json::Map;

use faro_config::{
	Config, EmbeddingProviderConfig, Postgres, Providers, Service, Storage, SyncConfig,
};
use faro_storage::{db::Db, vectors};
use faro_sync::{BoxFuture, Embedder, Error, SyncService, SyncState};
use faro_testkit::TestDatabase;

const VECTOR_DIM: u32 = 8;

/// Deterministic embedder for exercising the pipeline without a provider.
struct StaticEmbedder;
impl Embedder for StaticEmbedder {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		text: &'a str,
	) -> BoxFuture<'a, faro_providers::Result<Vec<f32>>> {
		let seed = text.len() as f32;
		let dimensions = cfg.dimensions as usize;

		Box::pin(async move { Ok(vec![seed; dimensions]) })
	}
}

/// Fails any input containing the marker, as an exhausted provider would.
struct FailingEmbedder {
	marker: &'static str,
}
impl Embedder for FailingEmbedder {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		text: &'a str,
	) -> BoxFuture<'a, faro_providers::Result<Vec<f32>>> {
		let fail = text.contains(self.marker);
		let dimensions = cfg.dimensions as usize;

		Box::pin(async move {
			if fail {
				Err(faro_providers::Error::Exhausted {
					attempts: 3,
					last: "simulated provider outage".to_string(),
				})
			} else {
				Ok(vec![0.5; dimensions])
			}
		})
	}
}

fn test_config(dsn: String, fetch_max_attempts: u32) -> Config {
	Config {
		service: Service {
			http_bind: "127.0.0.1:0".to_string(),
			admin_bind: "127.0.0.1:0".to_string(),
			log_level: "info".to_string(),
		},
		storage: Storage { postgres: Postgres { dsn, pool_max_conns: 4 } },
		providers: Providers {
			embedding: EmbeddingProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: "test-key".to_string(),
				path: "/v1/embeddings".to_string(),
				model: "test-model".to_string(),
				dimensions: VECTOR_DIM,
				timeout_ms: 1_000,
				max_content_chars: 8_000,
				default_headers: Map::new(),
			},
		},
		sync: SyncConfig { fetch_max_attempts, batch_size: 25, sweep_interval_secs: 3_600 },
	}
}

async fn test_service(
	test_db: &TestDatabase,
	fetch_max_attempts: u32,
	embedder: Arc<dyn Embedder>,
) -> Arc<SyncService> {
	let config = test_config(test_db.dsn().to_string(), fetch_max_attempts);
	let db = Db::connect(&config.storage.postgres).await.expect("Failed to connect to Postgres.");

	db.ensure_schema(VECTOR_DIM).await.expect("Failed to ensure schema.");

	Arc::new(SyncService::with_embedder(config, db, embedder))
}

async fn seed_tenant(service: &SyncService, tenant_id: &str) {
	sqlx::query("INSERT INTO tenants (tenant_id, name, active) VALUES ($1, $2, true)")
		.bind(tenant_id)
		.bind(tenant_id)
		.execute(&service.db.pool)
		.await
		.expect("Failed to seed tenant.");
}

async fn seed_record(service: &SyncService, tenant_id: &str, record_id: &str, name: &str) {
	let fields = serde_json::json!({
		"name": name,
		"description": "Three bedroom townhouse.",
		"location": "Alicante",
	});

	sqlx::query("INSERT INTO source_records (tenant_id, record_id, fields) VALUES ($1, $2, $3)")
		.bind(tenant_id)
		.bind(record_id)
		.bind(fields)
		.execute(&service.db.pool)
		.await
		.expect("Failed to seed record.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set FARO_PG_DSN to run."]
async fn process_record_stores_exactly_one_vector() {
	let Some(base_dsn) = faro_testkit::env_dsn() else {
		eprintln!("Skipping process_record_stores_exactly_one_vector; set FARO_PG_DSN.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let service = test_service(&test_db, 5, Arc::new(StaticEmbedder)).await;

	seed_tenant(&service, "t1").await;
	seed_record(&service, "t1", "p1", "Mirador del Puerto").await;

	let report = service.process_record("t1", "p1").await.expect("Expected the record to sync.");

	assert_eq!(report.dimensions, VECTOR_DIM as usize);

	let vector = vectors::fetch_vector(&service.db, "t1", "p1")
		.await
		.expect("Failed to fetch vector.")
		.expect("Expected a vector row.");

	assert_eq!(vector.record_id, "p1");
	assert_eq!(vector.tenant_id, "t1");
	assert_eq!(vector.model, "test-model");
	assert!(vector.content.contains("Mirador del Puerto"));

	let count: i64 = sqlx::query_scalar("SELECT count(*) FROM record_vectors")
		.fetch_one(&service.db.pool)
		.await
		.expect("Failed to count vectors.");

	assert_eq!(count, 1);

	let status = service.status("t1");

	assert_eq!(status.processed, 1);
	assert_eq!(status.failed, 0);
	assert_eq!(status.state, SyncState::Idle);
	assert!(status.last_sync_time.is_some());
	assert!(status.avg_latency_ms.is_some());

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set FARO_PG_DSN to run."]
async fn reprocessing_an_unchanged_record_is_idempotent() {
	let Some(base_dsn) = faro_testkit::env_dsn() else {
		eprintln!("Skipping reprocessing_an_unchanged_record_is_idempotent; set FARO_PG_DSN.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let service = test_service(&test_db, 5, Arc::new(StaticEmbedder)).await;

	seed_tenant(&service, "t1").await;
	seed_record(&service, "t1", "p1", "Faro Norte").await;

	service.process_record("t1", "p1").await.expect("Expected the record to sync.");

	let first = vectors::fetch_vector(&service.db, "t1", "p1")
		.await
		.expect("Failed to fetch vector.")
		.expect("Expected a vector row.");

	tokio::time::sleep(Duration::from_millis(10)).await;
	service.process_record("t1", "p1").await.expect("Expected the record to re-sync.");

	let second = vectors::fetch_vector(&service.db, "t1", "p1")
		.await
		.expect("Failed to fetch vector.")
		.expect("Expected a vector row.");

	assert_eq!(second.embedding, first.embedding);
	assert_eq!(second.content, first.content);
	assert_eq!(second.content_version, first.content_version);
	assert!(second.updated_at > first.updated_at);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set FARO_PG_DSN to run."]
async fn exhausted_fetch_surfaces_as_retryable_not_found() {
	let Some(base_dsn) = faro_testkit::env_dsn() else {
		eprintln!("Skipping exhausted_fetch_surfaces_as_retryable_not_found; set FARO_PG_DSN.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let service = test_service(&test_db, 2, Arc::new(StaticEmbedder)).await;

	seed_tenant(&service, "t1").await;

	let err = service
		.process_record("t1", "never-written")
		.await
		.expect_err("Expected a not-found failure.");

	assert!(matches!(err, Error::NotFound { .. }));
	assert!(err.retryable());

	let status = service.status("t1");

	assert_eq!(status.failed, 1);
	assert_eq!(status.state, SyncState::Error);
	assert!(status.last_error.is_some());

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set FARO_PG_DSN to run."]
async fn one_failing_record_does_not_abort_its_chunk() {
	let Some(base_dsn) = faro_testkit::env_dsn() else {
		eprintln!("Skipping one_failing_record_does_not_abort_its_chunk; set FARO_PG_DSN.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let service =
		test_service(&test_db, 5, Arc::new(FailingEmbedder { marker: "UNEMBEDDABLE" })).await;

	seed_tenant(&service, "t1").await;

	for record_id in ["p1", "p2", "p3", "p4"] {
		seed_record(&service, "t1", record_id, "Residencial Faro").await;
	}

	seed_record(&service, "t1", "p5", "UNEMBEDDABLE listing").await;

	let report =
		service.force_sync_tenant("t1").await.expect("Expected the tenant sweep to finish.");

	assert_eq!(report.scanned, 5);
	assert_eq!(report.processed, 4);
	assert_eq!(report.failed, 1);
	assert_eq!(report.errors.len(), 1);
	assert_eq!(report.errors[0].record_id, "p5");

	for record_id in ["p1", "p2", "p3", "p4"] {
		assert!(
			vectors::vector_exists(&service.db, record_id)
				.await
				.expect("Failed to probe vector."),
			"Expected a vector for {record_id}."
		);
	}

	assert!(!vectors::vector_exists(&service.db, "p5").await.expect("Failed to probe vector."));

	let status = service.status("t1");

	assert_eq!(status.failed, 1);
	assert_eq!(status.processed, 4);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set FARO_PG_DSN to run."]
async fn sweep_cleans_up_orphaned_vectors() {
	let Some(base_dsn) = faro_testkit::env_dsn() else {
		eprintln!("Skipping sweep_cleans_up_orphaned_vectors; set FARO_PG_DSN.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let service = test_service(&test_db, 5, Arc::new(StaticEmbedder)).await;

	seed_tenant(&service, "t1").await;
	seed_record(&service, "t1", "kept", "Kept listing").await;
	seed_record(&service, "t1", "doomed", "Doomed listing").await;

	service.force_sync_tenant("t1").await.expect("Expected the tenant sweep to finish.");

	sqlx::query("DELETE FROM source_records WHERE tenant_id = $1 AND record_id = $2")
		.bind("t1")
		.bind("doomed")
		.execute(&service.db.pool)
		.await
		.expect("Failed to delete record.");

	let report =
		service.force_sync_tenant("t1").await.expect("Expected the tenant sweep to finish.");

	assert_eq!(report.orphans_removed, 1);
	assert!(vectors::vector_exists(&service.db, "kept").await.expect("Failed to probe vector."));
	assert!(
		!vectors::vector_exists(&service.db, "doomed").await.expect("Failed to probe vector.")
	);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set FARO_PG_DSN to run."]
async fn sweep_window_advances_between_cycles() {
	let Some(base_dsn) = faro_testkit::env_dsn() else {
		eprintln!("Skipping sweep_window_advances_between_cycles; set FARO_PG_DSN.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let service = test_service(&test_db, 5, Arc::new(StaticEmbedder)).await;

	seed_tenant(&service, "t1").await;
	seed_tenant(&service, "t2").await;
	seed_record(&service, "t1", "p1", "First listing").await;
	seed_record(&service, "t2", "p2", "Second listing").await;

	let first = service.run_sweep().await.expect("Expected the first sweep cycle to finish.");

	assert_eq!(first.len(), 2);
	assert_eq!(first.iter().map(|report| report.processed).sum::<usize>(), 2);

	// Nothing changed since the first cycle, so the window excludes everything.
	let second = service.run_sweep().await.expect("Expected the second sweep cycle to finish.");

	assert_eq!(second.iter().map(|report| report.scanned).sum::<usize>(), 0);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set FARO_PG_DSN to run."]
async fn only_one_sweep_loop_runs_per_process() {
	let Some(base_dsn) = faro_testkit::env_dsn() else {
		eprintln!("Skipping only_one_sweep_loop_runs_per_process; set FARO_PG_DSN.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let service = test_service(&test_db, 5, Arc::new(StaticEmbedder)).await;

	assert!(service.start());
	assert!(!service.start());
	assert!(service.sweep_running());
	assert!(service.stop());
	assert!(!service.stop());
	assert!(!service.sweep_running());

	// Let the loop observe the cleared flag before the database goes away.
	tokio::time::sleep(Duration::from_millis(1_200)).await;

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
