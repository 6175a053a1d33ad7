use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MarkovError, Result};
use crate::model::generator::DEFAULT_MAX_TOKENS;

/// Settings of one `GenerationQueue`.
///
/// # Responsibilities
/// - Track the model order used for every rebuild
/// - Track the delivery rules (`min_chars`, `session_cap`)
/// - Track the default batch size and the generation safety cap
///
/// Fields are public for direct tweaking; the setters validate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueConfig {
	/// N-gram length of the model rebuilt after each batch.
	pub order: usize,

	/// Number of corpus lines fetched (and candidates generated) per batch.
	pub batch_size: usize,

	/// Generated lines shorter than this (in characters) are dropped.
	pub min_chars: usize,

	/// Maximum number of lines delivered during the queue lifetime.
	pub session_cap: usize,

	/// Token bound for one generated sentence.
	pub max_tokens: usize,
}

impl Default for QueueConfig {
	fn default() -> Self {
		Self {
			order: 5,
			batch_size: 20,
			min_chars: 20,
			session_cap: 20,
			max_tokens: DEFAULT_MAX_TOKENS,
		}
	}
}

impl QueueConfig {
	/// Checks every field.
	///
	/// # Errors
	/// - `InvalidOrder` if `order == 0`
	/// - `InvalidConfig` if `batch_size`, `session_cap` or `max_tokens` is 0
	pub fn validate(&self) -> Result<()> {
		if self.order == 0 {
			return Err(MarkovError::InvalidOrder(self.order));
		}
		if self.batch_size == 0 {
			return Err(MarkovError::InvalidConfig("batch_size must be >= 1".to_owned()));
		}
		if self.session_cap == 0 {
			return Err(MarkovError::InvalidConfig("session_cap must be >= 1".to_owned()));
		}
		if self.max_tokens == 0 {
			return Err(MarkovError::InvalidConfig("max_tokens must be >= 1".to_owned()));
		}
		Ok(())
	}

	/// Sets the model order.
	///
	/// # Errors
	/// Returns an error if `order == 0`.
	pub fn set_order(&mut self, order: usize) -> Result<()> {
		if order == 0 {
			return Err(MarkovError::InvalidOrder(order));
		}
		self.order = order;
		Ok(())
	}

	/// Sets the session cap.
	///
	/// # Errors
	/// Returns an error if `session_cap == 0`.
	pub fn set_session_cap(&mut self, session_cap: usize) -> Result<()> {
		if session_cap == 0 {
			return Err(MarkovError::InvalidConfig("session_cap must be >= 1".to_owned()));
		}
		self.session_cap = session_cap;
		Ok(())
	}

	/// Sets the default batch size.
	///
	/// # Errors
	/// Returns an error if `batch_size == 0`.
	pub fn set_batch_size(&mut self, batch_size: usize) -> Result<()> {
		if batch_size == 0 {
			return Err(MarkovError::InvalidConfig("batch_size must be >= 1".to_owned()));
		}
		self.batch_size = batch_size;
		Ok(())
	}
}

/// Where and how to reach the remote corpus source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
	/// Base URL without trailing slash, e.g. `http://127.0.0.1:5000`.
	pub base_url: String,

	/// Whole-request timeout.
	pub timeout: Duration,
}

impl Default for SourceConfig {
	fn default() -> Self {
		Self {
			base_url: "http://127.0.0.1:5000".to_owned(),
			timeout: Duration::from_secs(5),
		}
	}
}

impl SourceConfig {
	pub fn new(base_url: &str) -> Self {
		Self {
			base_url: base_url.trim_end_matches('/').to_owned(),
			..Self::default()
		}
	}

	/// URL of the single random record endpoint.
	pub fn single_url(&self) -> String {
		format!("{}/api/random-text", self.base_url)
	}

	/// URL of the batch endpoint.
	pub fn batch_url(&self) -> String {
		format!("{}/api/random-texts", self.base_url)
	}
}
