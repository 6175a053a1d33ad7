use std::collections::{HashMap, HashSet};
use std::io;
use std::path::Path;
use std::sync::mpsc;
use std::thread;

use log::{debug, info, warn};
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

use super::state::State;
use crate::error::{MarkovError, Result};
use crate::io::{model_cache_path, read_corpus};

/// Separator between the tokens of a serialized n-gram key.
///
/// Tokens come from whitespace splitting, so they never contain it.
pub const KEY_SEPARATOR: &str = " ";

/// Word-level Markov model of a fixed order.
///
/// The model maps every n-gram (`order` consecutive tokens) seen in the corpus
/// to the list of words that followed it, and remembers which n-grams opened a
/// corpus line. Only those "beginnings" may seed a generated sentence.
///
/// # Responsibilities
/// - Build transitions from corpus lines (additively)
/// - Answer successor and beginning queries for the generator
/// - Merge with another model of the same order
/// - Persist itself with `postcard` for fast reloads
///
/// # Invariants
/// - `order` is always >= 1
/// - Every state has at least one successor
/// - Every beginning is a key of `states`
/// - `beginnings` holds distinct keys in first-seen order
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MarkovModel {
	/// Number of tokens in an n-gram key.
	order: usize,

	/// Mapping from a serialized n-gram to its successors.
	states: HashMap<String, State>,

	/// Distinct line-opening keys, in insertion order (sampling needs an
	/// index, and a stable order keeps seeded generation reproducible).
	beginnings: Vec<String>,

	/// Membership index over `beginnings`.
	beginning_set: HashSet<String>,
}

impl MarkovModel {
	/// Creates an empty model of the given order.
	///
	/// # Errors
	/// Returns `InvalidOrder` if `order == 0`.
	pub fn new(order: usize) -> Result<Self> {
		if order == 0 {
			return Err(MarkovError::InvalidOrder(order));
		}
		Ok(Self {
			order,
			states: HashMap::new(),
			beginnings: Vec::new(),
			beginning_set: HashSet::new(),
		})
	}

	/// Builds a model from a whole corpus.
	///
	/// An empty corpus, or one where every line is too short, yields an empty
	/// model rather than an error.
	pub fn build<I, S>(lines: I, order: usize) -> Result<Self>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let mut model = Self::new(order)?;
		for line in lines {
			model.add_line(line.as_ref());
		}
		Ok(model)
	}

	/// Adds one corpus line to the model.
	///
	/// # Notes
	/// - Tokens keep their surface form (no case folding, no punctuation stripping).
	/// - Lines with fewer than `order + 1` tokens contribute nothing.
	/// - The first window of the line is registered as a beginning.
	pub fn add_line(&mut self, line: &str) {
		let tokens: Vec<&str> = line.split_whitespace().collect();
		if tokens.len() <= self.order {
			return;
		}

		for i in 0..tokens.len() - self.order {
			let key = tokens[i..i + self.order].join(KEY_SEPARATOR);
			let next_word = tokens[i + self.order];

			if i == 0 && self.beginning_set.insert(key.clone()) {
				self.beginnings.push(key.clone());
			}

			self.states
				.entry(key)
				.or_insert_with_key(|key| State::new(key))
				.add_successor(next_word);
		}
	}

	/// Returns the order of the model.
	pub fn order(&self) -> usize {
		self.order
	}

	/// Number of distinct n-gram keys.
	pub fn len(&self) -> usize {
		self.states.len()
	}

	pub fn is_empty(&self) -> bool {
		self.states.is_empty()
	}

	/// Sum of all successor list lengths, i.e. the number of recorded windows.
	pub fn transition_count(&self) -> usize {
		self.states.values().map(|state| state.successors().len()).sum()
	}

	/// Successors recorded for a serialized n-gram key.
	pub fn successors(&self, key: &str) -> Option<&[String]> {
		self.states.get(key).map(State::successors)
	}

	/// Distinct sentence-opening keys in first-seen order.
	pub fn beginnings(&self) -> &[String] {
		&self.beginnings
	}

	/// Picks a beginning uniformly at random.
	///
	/// Returns `None` when nothing can seed a sentence.
	pub fn random_beginning<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&str> {
		self.beginnings.choose(rng).map(String::as_str)
	}

	/// Samples the word following `key`, weighted by observed frequency.
	pub fn predict<R: Rng + ?Sized>(&self, key: &str, rng: &mut R) -> Option<&str> {
		self.states.get(key)?.predict(rng)
	}

	/// Merges another model into this one.
	///
	/// # Notes
	/// - Successor lists of shared keys are concatenated (`self` first).
	/// - Beginnings of `other` are appended when not already known.
	///
	/// # Errors
	/// Returns an error if the model orders do not match.
	pub fn merge(&mut self, other: &Self) -> Result<()> {
		if self.order != other.order {
			return Err(MarkovError::InvalidConfig(format!(
				"order mismatch: {} vs {}",
				self.order, other.order
			)));
		}

		for (key, state) in &other.states {
			if let Some(existing) = self.states.get_mut(key) {
				existing.merge(state)?;
			} else {
				self.states.insert(key.clone(), state.clone());
			}
		}

		for key in &other.beginnings {
			if self.beginning_set.insert(key.clone()) {
				self.beginnings.push(key.clone());
			}
		}

		Ok(())
	}

	/// Builds a model by splitting the corpus into chunks, building partial
	/// models on worker threads and merging them.
	///
	/// Partial models are merged in chunk order, so the result is the same
	/// as the one `build` would produce on the same lines.
	pub fn build_parallel(lines: &[String], order: usize) -> Result<Self> {
		let mut final_model = Self::new(order)?;
		if lines.is_empty() {
			return Ok(final_model);
		}

		let chunks = num_cpus::get() * 8;
		let chunk_size = lines.len().div_ceil(chunks);

		let (tx, rx) = mpsc::channel();
		let mut expected = 0;
		for (index, chunk) in lines.chunks(chunk_size).enumerate() {
			let tx = tx.clone();
			let chunk: Vec<String> = chunk.to_vec();
			expected += 1;

			thread::spawn(move || {
				// `order` was validated above, so this cannot fail
				if let Ok(partial_model) = MarkovModel::build(&chunk, order) {
					let _ = tx.send((index, partial_model));
				}
			});
		}
		drop(tx);

		let mut partials: Vec<(usize, MarkovModel)> = rx.iter().collect();
		if partials.len() != expected {
			return Err(MarkovError::Io(io::Error::other(format!(
				"{} of {} model workers did not finish",
				expected - partials.len(),
				expected
			))));
		}
		partials.sort_by_key(|(index, _)| *index);

		for (_, partial_model) in &partials {
			final_model.merge(partial_model)?;
		}

		debug!(
			"built order-{} model from {} lines in {} chunks: {} keys, {} beginnings",
			order,
			lines.len(),
			expected,
			final_model.len(),
			final_model.beginnings.len()
		);
		Ok(final_model)
	}

	/// Serializes the model with `postcard`.
	pub fn to_bytes(&self) -> Result<Vec<u8>> {
		Ok(postcard::to_stdvec(self)?)
	}

	/// Deserializes a model written by `to_bytes`.
	pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
		let model: Self = postcard::from_bytes(bytes)?;
		if model.order == 0 {
			return Err(MarkovError::InvalidOrder(0));
		}
		Ok(model)
	}

	/// Loads a model for a corpus file, using the binary cache when possible.
	///
	/// - Looks for `<stem>.o<order>.bin` next to the corpus file.
	/// - A missing, unreadable or mismatching cache triggers a rebuild from the
	///   text file, and the fresh model is written back to the cache.
	pub fn load_or_build<P: AsRef<Path>>(filepath: P, order: usize) -> Result<Self> {
		let cache_path = model_cache_path(&filepath, order)?;

		if cache_path.exists() {
			let bytes = std::fs::read(&cache_path)?;
			match Self::from_bytes(&bytes) {
				Ok(model) if model.order == order => {
					info!("loaded cached model {}", cache_path.display());
					return Ok(model);
				}
				Ok(model) => warn!(
					"cached model {} has order {}, expected {}; rebuilding",
					cache_path.display(),
					model.order,
					order
				),
				Err(e) => warn!("cached model {} unreadable ({e}); rebuilding", cache_path.display()),
			}
		}

		let lines = read_corpus(&filepath)?;
		let model = Self::build_parallel(&lines, order)?;
		std::fs::write(&cache_path, model.to_bytes()?)?;
		info!(
			"built model from {} ({} lines), cached at {}",
			filepath.as_ref().display(),
			lines.len(),
			cache_path.display()
		);
		Ok(model)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn cat_corpus() -> Vec<&'static str> {
		vec!["the cat sat on the mat", "the cat ran up the tree"]
	}

	#[test]
	fn zero_order_is_rejected() {
		assert!(matches!(MarkovModel::new(0), Err(MarkovError::InvalidOrder(0))));
	}

	#[test]
	fn shared_opening_is_one_beginning() {
		let model = MarkovModel::build(cat_corpus(), 2).unwrap();
		assert_eq!(model.beginnings(), ["the cat"]);
		assert_eq!(model.successors("the cat").unwrap(), ["sat", "ran"]);
		assert_eq!(model.successors("on the").unwrap(), ["mat"]);
		assert_eq!(model.successors("up the").unwrap(), ["tree"]);
		assert!(model.successors("the mat").is_none());
	}

	#[test]
	fn counts_every_window() {
		let model = MarkovModel::build(cat_corpus(), 2).unwrap();
		// 6 tokens per line, 4 windows each
		assert_eq!(model.transition_count(), 8);
	}

	#[test]
	fn short_lines_are_skipped() {
		let model = MarkovModel::build(["one two", "too short", ""], 2).unwrap();
		assert!(model.is_empty());
		assert!(model.beginnings().is_empty());
	}

	#[test]
	fn surface_form_is_preserved() {
		let model = MarkovModel::build(["Hello, World! Again."], 1).unwrap();
		assert_eq!(model.successors("Hello,").unwrap(), ["World!"]);
		assert!(model.successors("hello,").is_none());
	}

	#[test]
	fn duplicates_are_kept_in_successors() {
		let model = MarkovModel::build(["a b c", "a b c", "a b d"], 2).unwrap();
		assert_eq!(model.successors("a b").unwrap(), ["c", "c", "d"]);
		assert_eq!(model.beginnings().len(), 1);
	}

	#[test]
	fn add_line_extends_in_place() {
		let mut model = MarkovModel::build(["a b c"], 1).unwrap();
		model.add_line("x b d");
		assert_eq!(model.successors("b").unwrap(), ["c", "d"]);
		assert_eq!(model.beginnings(), ["a", "x"]);
	}

	#[test]
	fn merge_rejects_order_mismatch() {
		let mut a = MarkovModel::new(2).unwrap();
		let b = MarkovModel::new(3).unwrap();
		assert!(a.merge(&b).is_err());
	}

	#[test]
	fn parallel_build_matches_sequential() {
		let lines: Vec<String> = (0..200)
			.map(|i| format!("line {} starts here and then word{} follows", i % 7, i % 13))
			.collect();
		let sequential = MarkovModel::build(&lines, 3).unwrap();
		let parallel = MarkovModel::build_parallel(&lines, 3).unwrap();

		assert_eq!(sequential.beginnings(), parallel.beginnings());
		assert_eq!(sequential.len(), parallel.len());
		for key in sequential.states.keys() {
			assert_eq!(sequential.successors(key), parallel.successors(key));
		}
	}

	#[test]
	fn parallel_build_of_nothing_is_empty() {
		let model = MarkovModel::build_parallel(&[], 4).unwrap();
		assert!(model.is_empty());
	}

	#[test]
	fn bytes_roundtrip_keeps_order_and_beginnings() {
		let model = MarkovModel::build(cat_corpus(), 2).unwrap();
		let restored = MarkovModel::from_bytes(&model.to_bytes().unwrap()).unwrap();
		assert_eq!(restored.order(), 2);
		assert_eq!(restored.beginnings(), model.beginnings());
		assert_eq!(restored.successors("the cat"), model.successors("the cat"));
	}

	#[test]
	fn load_or_build_writes_and_reuses_cache() {
		let dir = std::env::temp_dir().join(format!("diary-gen-model-{}", std::process::id()));
		std::fs::create_dir_all(&dir).unwrap();
		let corpus = dir.join("diary.txt");
		std::fs::write(&corpus, cat_corpus().join("\n")).unwrap();

		let built = MarkovModel::load_or_build(&corpus, 2).unwrap();
		let cache = dir.join("diary.o2.bin");
		assert!(cache.exists());

		// Corpus changes are not seen while the cache is valid
		std::fs::write(&corpus, "completely different words in here").unwrap();
		let cached = MarkovModel::load_or_build(&corpus, 2).unwrap();
		assert_eq!(cached.beginnings(), built.beginnings());

		// Another order has its own cache
		let other = MarkovModel::load_or_build(&corpus, 3).unwrap();
		assert_eq!(other.beginnings(), ["completely different words"]);

		std::fs::remove_dir_all(&dir).unwrap();
	}
}
