use std::collections::VecDeque;

use rand::Rng;

use super::markov_model::{KEY_SEPARATOR, MarkovModel};
use crate::error::{MarkovError, Result};

/// Default bound on the number of tokens in one generated sentence.
pub const DEFAULT_MAX_TOKENS: usize = 300;

/// Random walk over a `MarkovModel`.
///
/// The generator never mutates the model; all randomness comes from the rng
/// passed to each call, so seeded rngs give reproducible sentences.
#[derive(Debug, Clone, Copy)]
pub struct SentenceGenerator {
	/// Output length safety cap (in tokens, seed included).
	///
	/// A model whose transitions form a cycle could otherwise walk forever;
	/// real sentences end well before this through a dead-end key.
	pub max_tokens: usize,
}

impl Default for SentenceGenerator {
	fn default() -> Self {
		Self { max_tokens: DEFAULT_MAX_TOKENS }
	}
}

impl SentenceGenerator {
	pub fn new(max_tokens: usize) -> Self {
		Self { max_tokens }
	}

	/// Generates one sentence.
	///
	/// # Behavior
	/// - Seeds with a uniformly chosen beginning and emits its tokens.
	/// - Repeatedly samples a successor of the last `order` tokens, appends it
	///   and slides the window by one.
	/// - Stops at a key without successors, or once the output holds
	///   `max(max_tokens, order)` tokens.
	///
	/// # Errors
	/// Returns `EmptyModel` if the model has no beginnings.
	pub fn generate_one<R: Rng + ?Sized>(&self, model: &MarkovModel, rng: &mut R) -> Result<String> {
		let seed = model.random_beginning(rng).ok_or(MarkovError::EmptyModel)?;

		let mut output: Vec<&str> = seed.split(KEY_SEPARATOR).collect();
		let mut window: VecDeque<&str> = output.iter().copied().collect();
		let mut key = seed.to_owned();

		while output.len() < self.max_tokens {
			let Some(next_word) = model.predict(&key, rng) else {
				break;
			};
			output.push(next_word);

			window.pop_front();
			window.push_back(next_word);
			key = window.iter().copied().collect::<Vec<_>>().join(KEY_SEPARATOR);
		}

		Ok(output.join(" "))
	}

	/// Generates `count` sentences. Identical sentences are allowed.
	///
	/// # Errors
	/// Returns `EmptyModel` if the model has no beginnings, even for `count == 0`.
	pub fn generate_many<R: Rng + ?Sized>(
		&self,
		model: &MarkovModel,
		count: usize,
		rng: &mut R,
	) -> Result<Vec<String>> {
		if model.beginnings().is_empty() {
			return Err(MarkovError::EmptyModel);
		}
		(0..count).map(|_| self.generate_one(model, rng)).collect()
	}
}
