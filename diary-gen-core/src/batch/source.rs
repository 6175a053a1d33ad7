use async_trait::async_trait;
use log::{error, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::config::SourceConfig;
use crate::error::{MarkovError, Result};

/// One stored text record as served by the corpus source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextRecord {
	pub id: usize,
	pub text: String,
}

/// Corpus statistics attached to every response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SourceStats {
	/// Number of records the source holds.
	pub total_texts: usize,
	/// Number of records (or lines) in this response.
	pub returned: usize,
}

/// Body of `GET /api/random-text`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SingleTextResponse {
	pub text: String,
	pub stats: SourceStats,
}

/// Body of `GET /api/random-texts?count=N`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchTextResponse {
	pub texts: Vec<TextRecord>,
	pub stats: SourceStats,
}

/// Anything able to hand out corpus lines in batches.
///
/// Implementations report transport problems as `Fetch` and shape problems
/// as `MalformedResponse`.
#[async_trait]
pub trait TextSource: Send + Sync {
	/// Fetches up to `count` corpus lines.
	async fn fetch_batch(&self, count: usize) -> Result<Vec<String>>;

	/// Lightweight reachability check. Never fails: any problem is `false`.
	async fn is_reachable(&self) -> bool;
}

/// `TextSource` backed by the HTTP corpus endpoints.
#[derive(Debug, Clone)]
pub struct HttpTextSource {
	client: Client,
	config: SourceConfig,
}

impl HttpTextSource {
	/// Creates a source with a reusable client honoring `config.timeout`.
	pub fn new(config: SourceConfig) -> Result<Self> {
		let client = Client::builder().timeout(config.timeout).build()?;
		Ok(Self { client, config })
	}

	pub fn config(&self) -> &SourceConfig {
		&self.config
	}

	/// Fetches a single random record.
	pub async fn fetch_one(&self) -> Result<String> {
		let body = self.get_body(&self.config.single_url(), None).await?;
		parse_single(&body)
	}

	/// Sends a GET request and returns the body of a 2xx response.
	async fn get_body(&self, url: &str, count: Option<usize>) -> Result<String> {
		let mut request = self.client.get(url);
		if let Some(count) = count {
			request = request.query(&[("count", count)]);
		}

		let response = request.send().await?.error_for_status()?;
		Ok(response.text().await?)
	}
}

#[async_trait]
impl TextSource for HttpTextSource {
	async fn fetch_batch(&self, count: usize) -> Result<Vec<String>> {
		let body = self
			.get_body(&self.config.batch_url(), Some(count))
			.await
			.inspect_err(|e| error!("corpus fetch from {} failed: {e}", self.config.base_url))?;
		parse_batch(&body).inspect_err(|e| error!("corpus batch from {} rejected: {e}", self.config.base_url))
	}

	async fn is_reachable(&self) -> bool {
		let response = self
			.client
			.head(self.config.batch_url())
			.query(&[("count", 1)])
			.send()
			.await;

		match response {
			Ok(response) if response.status().is_success() => true,
			Ok(response) => {
				warn!("corpus source {} answered {}", self.config.base_url, response.status());
				false
			}
			Err(e) => {
				warn!("corpus source {} unreachable: {e}", self.config.base_url);
				false
			}
		}
	}
}

/// Extracts the text of a single-record body.
pub(crate) fn parse_single(body: &str) -> Result<String> {
	let value: Value =
		serde_json::from_str(body).map_err(|e| MarkovError::MalformedResponse(format!("invalid JSON: {e}")))?;

	value
		.get("text")
		.and_then(Value::as_str)
		.map(str::to_owned)
		.ok_or_else(|| MarkovError::MalformedResponse("missing string field `text`".to_owned()))
}

/// Extracts the texts of a batch body.
///
/// A missing `texts` array fails the whole batch; a record without a usable
/// `text` is skipped.
pub(crate) fn parse_batch(body: &str) -> Result<Vec<String>> {
	let value: Value =
		serde_json::from_str(body).map_err(|e| MarkovError::MalformedResponse(format!("invalid JSON: {e}")))?;

	let records = value
		.get("texts")
		.and_then(Value::as_array)
		.ok_or_else(|| MarkovError::MalformedResponse("missing array field `texts`".to_owned()))?;

	let mut texts = Vec::with_capacity(records.len());
	for (index, record) in records.iter().enumerate() {
		match record.get("text").and_then(Value::as_str) {
			Some(text) if !text.trim().is_empty() => texts.push(text.to_owned()),
			Some(_) => warn!("skipping blank record #{index} in corpus batch"),
			None => warn!("skipping record #{index} without string `text` in corpus batch"),
		}
	}
	Ok(texts)
}
