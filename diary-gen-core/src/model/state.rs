use rand::Rng;
use rand::seq::IndexedRandom;

use serde::{Deserialize, Serialize};

use crate::error::{MarkovError, Result};

/// Represents a state in the word-level Markov chain.
///
/// A `State` corresponds to one n-gram key (`order` tokens joined by a single
/// space) and stores every word observed right after it in the corpus.
///
/// Successors are kept as a plain list with duplicates: a word seen three
/// times appears three times, so uniform sampling over the list is
/// frequency-weighted sampling over the distinct words.
///
/// ## Invariants
/// - All successors belong to the same `key`
/// - A state stored in a model always has at least one successor
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct State {
	/// Identifier of the state (the serialized n-gram).
	key: String,
	/// Observed next words, in corpus order.
	/// Example: ["sat", "ran", "sat"]
	successors: Vec<String>,
}

impl State {
	/// Creates a new empty state for the given n-gram key.
	pub fn new(key: &str) -> Self {
		Self {
			key: key.to_owned(),
			successors: Vec::new(),
		}
	}

	/// Records one more occurrence of `next_word` following this key.
	pub fn add_successor(&mut self, next_word: &str) {
		self.successors.push(next_word.to_owned());
	}

	/// All recorded successors, duplicates included.
	pub fn successors(&self) -> &[String] {
		&self.successors
	}

	/// Picks the next word uniformly from the successor list.
	///
	/// Returns `None` if the state has no successors.
	pub fn predict<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&str> {
		self.successors.choose(rng).map(String::as_str)
	}

	/// Appends the successors of another state with the same key.
	///
	/// Used to combine partial models built from separate corpus chunks.
	///
	/// # Errors
	/// Returns an error if the state keys do not match.
	pub fn merge(&mut self, other: &Self) -> Result<()> {
		if self.key != other.key {
			return Err(MarkovError::InvalidConfig(format!(
				"cannot merge state '{}' into '{}'",
				other.key, self.key
			)));
		}
		self.successors.extend(other.successors.iter().cloned());
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::SeedableRng;
	use rand::rngs::StdRng;

	#[test]
	fn empty_state_predicts_nothing() {
		let state = State::new("the cat");
		assert!(state.predict(&mut StdRng::seed_from_u64(1)).is_none());
	}

	#[test]
	fn predict_only_returns_recorded_words() {
		let mut state = State::new("the cat");
		state.add_successor("sat");
		state.add_successor("ran");
		let mut rng = StdRng::seed_from_u64(7);
		for _ in 0..50 {
			let word = state.predict(&mut rng).unwrap();
			assert!(word == "sat" || word == "ran");
		}
	}

	#[test]
	fn merge_keeps_duplicates_and_order() {
		let mut a = State::new("k");
		a.add_successor("x");
		let mut b = State::new("k");
		b.add_successor("x");
		b.add_successor("y");
		a.merge(&b).unwrap();
		assert_eq!(a.successors(), ["x", "x", "y"]);
	}

	#[test]
	fn merge_rejects_other_key() {
		let mut a = State::new("a b");
		let b = State::new("b c");
		assert!(a.merge(&b).is_err());
	}
}
