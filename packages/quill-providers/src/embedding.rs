use reqwest::{
	Client, Response,
	header::{AUTHORIZATION, HeaderValue},
};
use serde_json::Value;

use quill_config::EmbeddingProviderConfig;

use crate::error::{Error, Result, is_retryable_status};

pub const USER_AGENT: &str = "quill-semantic-search/1.0";

// Providers should never need more than this for a single embedding.
const RESPONSE_BODY_LIMIT: usize = 2 << 20;

/// Embeds one text via the OpenAI-compatible `/embeddings` endpoint,
/// retrying transient failures up to `cfg.max_retry` extra times with
/// exponentially increasing backoff. Dropping the returned future (for
/// example through a caller-side timeout) aborts both in-flight requests
/// and backoff waits.
pub async fn embed(cfg: &EmbeddingProviderConfig, text: &str) -> Result<Vec<f32>> {
	if text.trim().is_empty() {
		return Err(Error::EmptyInput);
	}

	let client = Client::builder().timeout(cfg.timeout).user_agent(USER_AGENT).build()?;
	let url = format!("{}/embeddings", cfg.base_url);
	let body = serde_json::json!({
		"model": cfg.model,
		"input": text,
	});
	let mut auth = HeaderValue::from_str(&format!("Bearer {}", cfg.api_key))?;

	auth.set_sensitive(true);

	let mut attempt = 0_u32;

	loop {
		match embed_once(&client, &url, &auth, &body).await {
			Ok(vector) => return Ok(vector),
			Err(err) => {
				if !err.is_retryable() || attempt >= cfg.max_retry {
					return Err(err);
				}

				let backoff = cfg.retry_backoff.saturating_mul(1 << attempt.min(16));

				tokio::time::sleep(backoff).await;

				attempt += 1;
			},
		}
	}
}

async fn embed_once(
	client: &Client,
	url: &str,
	auth: &HeaderValue,
	body: &Value,
) -> Result<Vec<f32>> {
	let mut response = client.post(url).header(AUTHORIZATION, auth.clone()).json(body).send().await?;
	let status = response.status().as_u16();
	let bytes = read_limited(&mut response).await?;
	let json: Value = match serde_json::from_slice(&bytes) {
		Ok(json) => json,
		// Keep the status classification: a 5xx with a garbage body is still
		// transient, a garbage body on success is not.
		Err(err) if is_retryable_status(status) =>
			return Err(Error::Api { status, message: format!("undecodable response body: {err}") }),
		Err(err) => return Err(Error::InvalidResponse { message: err.to_string() }),
	};

	if status >= 400 {
		let message = json
			.get("error")
			.and_then(|error| error.get("message"))
			.and_then(|message| message.as_str())
			.unwrap_or("no error message")
			.to_owned();

		return Err(Error::Api { status, message });
	}

	parse_embedding_response(&json)
}

async fn read_limited(response: &mut Response) -> Result<Vec<u8>> {
	let mut bytes = Vec::new();

	while let Some(chunk) = response.chunk().await? {
		let remaining = RESPONSE_BODY_LIMIT.saturating_sub(bytes.len());

		if remaining == 0 {
			break;
		}

		let take = remaining.min(chunk.len());

		bytes.extend_from_slice(&chunk[..take]);
	}

	Ok(bytes)
}

fn parse_embedding_response(json: &Value) -> Result<Vec<f32>> {
	let embedding = json
		.get("data")
		.and_then(|value| value.as_array())
		.and_then(|data| data.first())
		.and_then(|item| item.get("embedding"))
		.and_then(|value| value.as_array())
		.ok_or_else(|| Error::InvalidResponse {
			message: "response is missing the embedding array".to_owned(),
		})?;
	let mut vector = Vec::with_capacity(embedding.len());

	for value in embedding {
		let number = value.as_f64().ok_or_else(|| Error::InvalidResponse {
			message: "embedding value must be numeric".to_owned(),
		})?;

		vector.push(number as f32);
	}

	if vector.is_empty() {
		return Err(Error::InvalidResponse { message: "embedding response is empty".to_owned() });
	}

	Ok(vector)
}
