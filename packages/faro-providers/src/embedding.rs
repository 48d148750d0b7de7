use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;
use tokio::time;

use faro_config::EmbeddingProviderConfig;

use crate::{Error, Result};

/// Fixed waits applied between embedding attempts.
pub const EMBED_BACKOFF_MS: [u64; 3] = [1_000, 2_000, 4_000];
pub const MAX_EMBED_ATTEMPTS: u32 = 3;

#[derive(Debug)]
pub struct BatchOutcome {
	pub vectors: Vec<Option<Vec<f32>>>,
	pub failed: Vec<usize>,
}

pub async fn embed(cfg: &EmbeddingProviderConfig, text: &str) -> Result<Vec<f32>> {
	let input = truncate_content(text, cfg.max_content_chars as usize);
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let mut last_err = None;

	for attempt in 1..=MAX_EMBED_ATTEMPTS {
		match request_embedding(&client, cfg, &input).await {
			Ok(vector) => return Ok(resize_vector(vector, cfg.dimensions as usize)),
			Err(err @ Error::PermissionDenied { .. }) => return Err(err),
			Err(err) => {
				tracing::warn!(error = %err, attempt, model = %cfg.model, "Embedding attempt failed.");

				last_err = Some(err);

				if attempt < MAX_EMBED_ATTEMPTS {
					time::sleep(Duration::from_millis(embed_backoff_ms(attempt))).await;
				}
			},
		}
	}

	Err(Error::Exhausted {
		attempts: MAX_EMBED_ATTEMPTS,
		last: last_err.map(|err| err.to_string()).unwrap_or_default(),
	})
}

/// Embeds every input concurrently. One input exhausting its retries never
/// aborts the others; its position is reported in `failed` instead.
pub async fn embed_batch(cfg: &EmbeddingProviderConfig, texts: &[String]) -> BatchOutcome {
	let mut handles = Vec::with_capacity(texts.len());

	for text in texts {
		let cfg = cfg.clone();
		let text = text.clone();

		handles.push(tokio::spawn(async move { embed(&cfg, &text).await }));
	}

	let mut vectors = Vec::with_capacity(handles.len());
	let mut failed = Vec::new();

	for (index, handle) in handles.into_iter().enumerate() {
		match handle.await {
			Ok(Ok(vector)) => vectors.push(Some(vector)),
			Ok(Err(err)) => {
				tracing::error!(error = %err, index, "Batch embedding input failed.");

				vectors.push(None);
				failed.push(index);
			},
			Err(err) => {
				tracing::error!(error = %err, index, "Batch embedding task failed.");

				vectors.push(None);
				failed.push(index);
			},
		}
	}

	BatchOutcome { vectors, failed }
}

pub fn embed_backoff_ms(attempt: u32) -> u64 {
	let index = attempt.clamp(1, EMBED_BACKOFF_MS.len() as u32) as usize - 1;

	EMBED_BACKOFF_MS[index]
}

/// Resizes a provider vector to the configured dimensionality: truncated if
/// longer, zero-padded if shorter. Not a precision-preserving operation.
pub fn resize_vector(mut vector: Vec<f32>, dimensions: usize) -> Vec<f32> {
	if vector.len() != dimensions {
		tracing::debug!(
			provider_len = vector.len(),
			dimensions,
			"Resizing embedding to the target dimensionality."
		);

		vector.resize(dimensions, 0.0);
	}

	vector
}

fn truncate_content(text: &str, max_chars: usize) -> String {
	if text.chars().count() <= max_chars {
		return text.to_string();
	}

	tracing::info!(max_chars, "Truncating embedding input to the configured maximum.");

	text.chars().take(max_chars).collect()
}

async fn request_embedding(
	client: &Client,
	cfg: &EmbeddingProviderConfig,
	input: &str,
) -> Result<Vec<f32>> {
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"input": input,
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let status = res.status();

	if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
		return Err(Error::PermissionDenied { status: status.as_u16() });
	}

	let json: Value = res.error_for_status()?.json().await?;

	parse_embedding_response(json)
}

fn parse_embedding_response(json: Value) -> Result<Vec<f32>> {
	let data = json.get("data").and_then(|v| v.as_array()).ok_or_else(|| {
		Error::InvalidResponse { message: "Embedding response is missing data array.".to_string() }
	})?;
	let embedding = data
		.first()
		.and_then(|item| item.get("embedding"))
		.and_then(|v| v.as_array())
		.ok_or_else(|| Error::InvalidResponse {
			message: "Embedding item missing embedding array.".to_string(),
		})?;
	let mut vec = Vec::with_capacity(embedding.len());

	for value in embedding {
		let number = value.as_f64().ok_or_else(|| Error::InvalidResponse {
			message: "Embedding value must be numeric.".to_string(),
		})?;

		vec.push(number as f32);
	}

	Ok(vec)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_single_embedding() {
		let json = serde_json::json!({
			"data": [
				{ "index": 0, "embedding": [0.5, 1.5, -2.0] }
			]
		});
		let parsed = parse_embedding_response(json).expect("parse failed");

		assert_eq!(parsed, vec![0.5, 1.5, -2.0]);
	}

	#[test]
	fn rejects_response_without_data() {
		let json = serde_json::json!({ "object": "list" });

		assert!(matches!(
			parse_embedding_response(json),
			Err(Error::InvalidResponse { .. })
		));
	}

	#[test]
	fn short_vector_is_zero_padded() {
		let vector: Vec<f32> = (0..1_200).map(|i| i as f32).collect();
		let resized = resize_vector(vector, 1_536);

		assert_eq!(resized.len(), 1_536);
		assert_eq!(resized[0], 0.0);
		assert_eq!(resized[1_199], 1_199.0);
		assert!(resized[1_200..].iter().all(|value| *value == 0.0));
	}

	#[test]
	fn long_vector_is_truncated() {
		let vector: Vec<f32> = (0..2_000).map(|i| i as f32).collect();
		let resized = resize_vector(vector, 1_536);

		assert_eq!(resized.len(), 1_536);
		assert_eq!(resized[0], 0.0);
		assert_eq!(resized[1_535], 1_535.0);
	}

	#[test]
	fn matching_vector_is_untouched() {
		let vector = vec![1.0_f32, 2.0, 3.0];

		assert_eq!(resize_vector(vector.clone(), 3), vector);
	}

	#[test]
	fn oversized_input_is_truncated_by_chars() {
		let text = "á".repeat(10);
		let truncated = truncate_content(&text, 4);

		assert_eq!(truncated.chars().count(), 4);
		assert_eq!(truncate_content("short", 10), "short");
	}

	#[test]
	fn backoff_schedule_is_fixed() {
		assert_eq!(embed_backoff_ms(1), 1_000);
		assert_eq!(embed_backoff_ms(2), 2_000);
		assert_eq!(embed_backoff_ms(3), 4_000);
		assert_eq!(embed_backoff_ms(9), 4_000);
	}

	fn unreachable_provider() -> EmbeddingProviderConfig {
		EmbeddingProviderConfig {
			provider_id: "test".to_string(),
			api_base: "http://127.0.0.1:9".to_string(),
			api_key: "test-key".to_string(),
			path: "/v1/embeddings".to_string(),
			model: "test-model".to_string(),
			dimensions: 4,
			timeout_ms: 100,
			max_content_chars: 100,
			default_headers: serde_json::Map::new(),
		}
	}

	#[tokio::test(start_paused = true)]
	async fn batch_of_nothing_is_empty() {
		let outcome = embed_batch(&unreachable_provider(), &[]).await;

		assert!(outcome.vectors.is_empty());
		assert!(outcome.failed.is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn one_failed_input_never_aborts_the_batch() {
		let texts = vec!["first".to_string(), "second".to_string()];
		let outcome = embed_batch(&unreachable_provider(), &texts).await;

		// Both inputs exhaust their retries against the unreachable provider;
		// each failure is reported at its own position.
		assert_eq!(outcome.vectors.len(), 2);
		assert!(outcome.vectors.iter().all(Option::is_none));
		assert_eq!(outcome.failed, vec![0, 1]);
	}

	#[tokio::test(start_paused = true)]
	async fn exhausted_retries_classify_as_exhausted() {
		let err = embed(&unreachable_provider(), "text")
			.await
			.expect_err("Expected the unreachable provider to fail.");

		assert!(matches!(err, Error::Exhausted { attempts: MAX_EMBED_ATTEMPTS, .. }));
	}
}
