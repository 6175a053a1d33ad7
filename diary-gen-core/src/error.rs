use thiserror::Error;

/// Every failure the generation core can report.
///
/// Nothing here is fatal to the hosting process: the worst outcome for a
/// consumer is "no generated text is shown".
#[derive(Error, Debug)]
pub enum MarkovError {
	/// Generation was attempted on a model without any beginnings
	/// (nothing loaded yet, or every line shorter than `order + 1` tokens).
	#[error("model is empty: no sentence beginnings available")]
	EmptyModel,

	#[error("order must be >= 1, got {0}")]
	InvalidOrder(usize),

	#[error("invalid configuration: {0}")]
	InvalidConfig(String),

	/// Network or HTTP status failure while reaching the corpus source.
	#[error("fetch failed: {0}")]
	Fetch(String),

	/// The corpus source answered with an unexpected shape.
	#[error("malformed response: {0}")]
	MalformedResponse(String),

	#[error("i/o error: {0}")]
	Io(#[from] std::io::Error),

	#[error("serialization error: {0}")]
	Serialization(#[from] postcard::Error),
}

impl MarkovError {
	/// Whether the error comes from talking to the remote corpus source.
	///
	/// Both variants get the same treatment upstream (show nothing, retry later);
	/// they only differ in what gets logged.
	pub fn is_network(&self) -> bool {
		matches!(self, MarkovError::Fetch(_) | MarkovError::MalformedResponse(_))
	}
}

impl From<reqwest::Error> for MarkovError {
	fn from(err: reqwest::Error) -> Self {
		match err.status() {
			Some(status) => MarkovError::Fetch(format!("HTTP {status}: {err}")),
			None => MarkovError::Fetch(err.to_string()),
		}
	}
}

pub type Result<T> = std::result::Result<T, MarkovError>;
