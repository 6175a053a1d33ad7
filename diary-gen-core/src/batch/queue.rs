use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::config::QueueConfig;
use super::source::TextSource;
use crate::error::{MarkovError, Result};
use crate::model::generator::SentenceGenerator;
use crate::model::markov_model::MarkovModel;

/// Observable lifecycle of a `GenerationQueue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
	/// Nothing loaded yet.
	Empty,
	/// A batch fetch is in flight.
	Loading,
	/// At least one batch was loaded; lines may or may not be queued.
	Ready,
}

/// Mutable part of the queue, only touched under the lock and never across
/// an await point.
#[derive(Debug)]
struct Inner<R> {
	/// Every corpus line fetched so far.
	corpus: Vec<String>,
	/// Model rebuilt from `corpus` after each successful batch.
	model: Option<MarkovModel>,
	/// Generated lines waiting to be handed out, oldest first.
	pending: VecDeque<String>,
	/// Lines already handed out in this session.
	delivered: HashSet<String>,
	delivered_count: usize,
	loaded: bool,
	/// The last successful fetch returned no record.
	source_exhausted: bool,
	rng: R,
}

/// Releases the in-flight flag when the load ends, whether it succeeded,
/// failed or was dropped mid-fetch.
struct LoadingGuard<'a>(&'a AtomicBool);

impl Drop for LoadingGuard<'_> {
	fn drop(&mut self) {
		self.0.store(false, Ordering::Release);
	}
}

/// Pull-based queue of generated lines fed by batches of remote corpus text.
///
/// # Responsibilities
/// - Fetch corpus batches and rebuild the model from the whole accumulated corpus
/// - Generate candidates, drop short and already seen ones, queue the rest
/// - Hand out one line at a time, in generation order, up to the session cap
///
/// # Invariants
/// - A line is never handed out twice by the same queue
/// - At most one batch fetch is in flight at any time
/// - A failed or cancelled load leaves corpus, model and pending lines untouched
///
/// All methods take `&self`, so the queue can live behind an `Arc` and be
/// refilled from several tasks at once.
#[derive(Debug)]
pub struct GenerationQueue<S, R = StdRng> {
	source: S,
	config: QueueConfig,
	generator: SentenceGenerator,
	loading: AtomicBool,
	inner: Mutex<Inner<R>>,
}

impl<S: TextSource> GenerationQueue<S, StdRng> {
	/// Creates a queue with an rng seeded from the operating system.
	pub fn new(source: S, config: QueueConfig) -> Result<Self> {
		Self::with_rng(source, config, StdRng::from_os_rng())
	}

	/// Creates a queue with a reproducible rng.
	pub fn with_seed(source: S, config: QueueConfig, seed: u64) -> Result<Self> {
		Self::with_rng(source, config, StdRng::seed_from_u64(seed))
	}
}

impl<S: TextSource, R: Rng + Send> GenerationQueue<S, R> {
	/// Creates a queue using the given rng for every generation.
	///
	/// # Errors
	/// Returns an error if `config` does not validate.
	pub fn with_rng(source: S, config: QueueConfig, rng: R) -> Result<Self> {
		config.validate()?;
		Ok(Self {
			source,
			generator: SentenceGenerator::new(config.max_tokens),
			config,
			loading: AtomicBool::new(false),
			inner: Mutex::new(Inner {
				corpus: Vec::new(),
				model: None,
				pending: VecDeque::new(),
				delivered: HashSet::new(),
				delivered_count: 0,
				loaded: false,
				source_exhausted: false,
				rng,
			}),
		})
	}

	fn lock(&self) -> MutexGuard<'_, Inner<R>> {
		self.inner.lock().unwrap_or_else(PoisonError::into_inner)
	}

	pub fn config(&self) -> &QueueConfig {
		&self.config
	}

	/// Checks whether the corpus source answers. Never fails.
	pub async fn is_available(&self) -> bool {
		self.source.is_reachable().await
	}

	/// Fetches `n` corpus lines, rebuilds the model and queues up to `n` new
	/// generated lines. `n == 0` uses the configured batch size.
	///
	/// # Behavior
	/// - Returns immediately without fetching when another load is in flight
	///   or the session cap is reached.
	/// - A corpus too short to build beginnings yields no new lines, not an error.
	///
	/// # Errors
	/// Propagates `Fetch` / `MalformedResponse` from the source. The queue is
	/// left exactly as it was, so the call can be retried.
	pub async fn load_text_batch(&self, n: usize) -> Result<()> {
		let n = if n == 0 { self.config.batch_size } else { n };

		if self.is_session_over() {
			debug!("session cap reached, not loading");
			return Ok(());
		}

		if self
			.loading
			.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
			.is_err()
		{
			debug!("load already in flight, skipping");
			return Ok(());
		}
		let _guard = LoadingGuard(&self.loading);

		let lines = self
			.source
			.fetch_batch(n)
			.await
			.inspect_err(|e| warn!("corpus batch of {n} failed, queue unchanged: {e}"))?;
		self.ingest(lines, n)
	}

	/// Rebuilds the model with `lines` appended and queues the surviving
	/// candidates. Nothing is committed unless every step succeeds.
	fn ingest(&self, lines: Vec<String>, n: usize) -> Result<()> {
		let mut guard = self.lock();
		let inner = &mut *guard;

		let model = MarkovModel::build(inner.corpus.iter().chain(lines.iter()), self.config.order)?;

		let candidates = match self.generator.generate_many(&model, n, &mut inner.rng) {
			Ok(candidates) => candidates,
			Err(MarkovError::EmptyModel) => Vec::new(),
			Err(e) => return Err(e),
		};

		let mut seen: HashSet<&str> = inner
			.delivered
			.iter()
			.chain(inner.pending.iter())
			.map(String::as_str)
			.collect();
		let mut survivors = Vec::new();
		for candidate in &candidates {
			if candidate.chars().count() < self.config.min_chars {
				continue;
			}
			if seen.insert(candidate.as_str()) {
				survivors.push(candidate.clone());
			}
		}

		info!(
			"loaded {} corpus lines ({} total), queued {}/{} candidates",
			lines.len(),
			inner.corpus.len() + lines.len(),
			survivors.len(),
			candidates.len()
		);

		inner.source_exhausted = lines.is_empty();
		inner.corpus.extend(lines);
		inner.model = Some(model);
		inner.pending.extend(survivors);
		inner.loaded = true;
		Ok(())
	}

	/// Pops the oldest queued line.
	///
	/// Returns `None` when the queue is empty (load more) or the session cap
	/// is reached (done); `has_more_texts` tells the two apart.
	pub fn get_next_text(&self) -> Option<String> {
		let mut inner = self.lock();
		if inner.delivered_count >= self.config.session_cap {
			return None;
		}

		let text = inner.pending.pop_front()?;
		inner.delivered.insert(text.clone());
		inner.delivered_count += 1;
		Some(text)
	}

	/// `true` while the cap is not reached and either lines are queued or the
	/// source may still provide more.
	pub fn has_more_texts(&self) -> bool {
		let inner = self.lock();
		inner.delivered_count < self.config.session_cap
			&& (!inner.pending.is_empty() || !inner.source_exhausted)
	}

	pub fn state(&self) -> QueueState {
		if self.loading.load(Ordering::Acquire) {
			return QueueState::Loading;
		}
		if self.lock().loaded { QueueState::Ready } else { QueueState::Empty }
	}

	/// Whether the session cap has been reached.
	pub fn is_session_over(&self) -> bool {
		self.lock().delivered_count >= self.config.session_cap
	}

	pub fn delivered_count(&self) -> usize {
		self.lock().delivered_count
	}

	/// Number of generated lines waiting to be handed out.
	pub fn queued_len(&self) -> usize {
		self.lock().pending.len()
	}

	/// Number of corpus lines accumulated so far.
	pub fn corpus_len(&self) -> usize {
		self.lock().corpus.len()
	}

	/// Number of n-gram keys in the current model.
	pub fn model_len(&self) -> usize {
		self.lock().model.as_ref().map_or(0, MarkovModel::len)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;
	use std::sync::atomic::AtomicUsize;
	use std::time::Duration;

	use async_trait::async_trait;

	/// Keeps every log message so tests can look for their own lines.
	struct CaptureLogger {
		messages: Mutex<Vec<String>>,
	}

	impl log::Log for CaptureLogger {
		fn enabled(&self, _: &log::Metadata) -> bool {
			true
		}

		fn log(&self, record: &log::Record) {
			self.messages.lock().unwrap().push(record.args().to_string());
		}

		fn flush(&self) {}
	}

	static LOGGER: CaptureLogger = CaptureLogger { messages: Mutex::new(Vec::new()) };

	/// Installs the capture logger (once per test binary) and returns it.
	fn capture_logs() -> &'static CaptureLogger {
		if log::set_logger(&LOGGER).is_ok() {
			log::set_max_level(log::LevelFilter::Trace);
		}
		&LOGGER
	}

	/// In-memory source serving scripted batches; an exhausted script
	/// serves empty batches.
	#[derive(Default)]
	struct MockSource {
		batches: Mutex<VecDeque<Result<Vec<String>>>>,
		fetches: AtomicUsize,
		delay: Option<Duration>,
		unreachable: bool,
	}

	impl MockSource {
		fn with_batches(batches: Vec<Result<Vec<String>>>) -> Self {
			Self { batches: Mutex::new(batches.into()), ..Self::default() }
		}

		fn repeating(lines: &[&str], times: usize) -> Self {
			let batch: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
			Self::with_batches((0..times).map(|_| Ok(batch.clone())).collect())
		}

		fn fetches(&self) -> usize {
			self.fetches.load(Ordering::SeqCst)
		}
	}

	#[async_trait]
	impl TextSource for MockSource {
		async fn fetch_batch(&self, _count: usize) -> Result<Vec<String>> {
			self.fetches.fetch_add(1, Ordering::SeqCst);
			if let Some(delay) = self.delay {
				tokio::time::sleep(delay).await;
			}
			self.batches.lock().unwrap().pop_front().unwrap_or_else(|| Ok(Vec::new()))
		}

		async fn is_reachable(&self) -> bool {
			!self.unreachable
		}
	}

	fn config(order: usize, session_cap: usize) -> QueueConfig {
		QueueConfig { order, session_cap, ..QueueConfig::default() }
	}

	fn numbered_entries() -> Vec<String> {
		(0..10).map(|i| format!("entry number {i} of the long diary series")).collect()
	}

	#[tokio::test]
	async fn starts_empty() {
		let queue = GenerationQueue::with_seed(MockSource::default(), QueueConfig::default(), 1).unwrap();
		assert_eq!(queue.state(), QueueState::Empty);
		assert_eq!(queue.get_next_text(), None);
		assert!(queue.has_more_texts());
	}

	#[tokio::test]
	async fn invalid_config_is_rejected() {
		let result = GenerationQueue::with_seed(MockSource::default(), config(0, 20), 1);
		assert!(matches!(result, Err(MarkovError::InvalidOrder(0))));
	}

	#[tokio::test]
	async fn lines_come_out_in_generation_order() {
		let source = MockSource::with_batches(vec![Ok(numbered_entries())]);
		let queue = GenerationQueue::with_seed(source, config(2, 100), 5).unwrap();

		queue.load_text_batch(40).await.unwrap();
		assert_eq!(queue.state(), QueueState::Ready);
		assert_eq!(queue.corpus_len(), 10);
		assert!(queue.model_len() > 0);

		let queued = queue.queued_len();
		assert!(queued >= 4);
		let mut out = Vec::new();
		while let Some(line) = queue.get_next_text() {
			assert!(line.starts_with("entry number "));
			out.push(line);
		}
		assert_eq!(out.len(), queued);
		assert_eq!(queue.delivered_count(), queued);
	}

	#[tokio::test]
	async fn short_candidates_are_dropped() {
		let source = MockSource::repeating(&["tiny cat ran"; 5], 1);
		let queue = GenerationQueue::with_seed(source, config(1, 20), 2).unwrap();

		queue.load_text_batch(5).await.unwrap();
		assert_eq!(queue.state(), QueueState::Ready);
		assert_eq!(queue.queued_len(), 0);
		assert_eq!(queue.get_next_text(), None);
		assert!(queue.has_more_texts());
	}

	#[tokio::test]
	async fn corpus_too_short_for_order_queues_nothing() {
		let source = MockSource::repeating(&["four words only here"], 1);
		let queue = GenerationQueue::with_seed(source, config(5, 20), 2).unwrap();

		queue.load_text_batch(5).await.unwrap();
		assert_eq!(queue.model_len(), 0);
		assert_eq!(queue.get_next_text(), None);
	}

	#[tokio::test]
	async fn delivered_lines_never_repeat_across_batches() {
		let line = "the quiet morning light fell across the kitchen table";
		let source = MockSource::repeating(&[line, line], 3);
		let queue = GenerationQueue::with_seed(source, config(2, 20), 8).unwrap();

		queue.load_text_batch(5).await.unwrap();
		assert_eq!(queue.queued_len(), 1);
		assert_eq!(queue.get_next_text().as_deref(), Some(line));

		queue.load_text_batch(5).await.unwrap();
		queue.load_text_batch(5).await.unwrap();
		assert_eq!(queue.get_next_text(), None);
		assert_eq!(queue.corpus_len(), 6);
	}

	#[tokio::test]
	async fn refills_deliver_distinct_lines() {
		let source = MockSource::with_batches((0..6).map(|_| Ok(numbered_entries())).collect());
		let queue = GenerationQueue::with_seed(source, config(2, 100), 13).unwrap();

		let mut delivered = HashSet::new();
		for _ in 0..6 {
			queue.load_text_batch(8).await.unwrap();
			while let Some(line) = queue.get_next_text() {
				assert!(delivered.insert(line), "line delivered twice");
			}
		}
		assert!(delivered.len() <= 10);
		assert_eq!(delivered.len(), queue.delivered_count());
	}

	#[tokio::test]
	async fn session_cap_stops_delivery() {
		let source = MockSource::with_batches(vec![Ok(numbered_entries())]);
		let queue = GenerationQueue::with_seed(source, config(2, 3), 21).unwrap();

		queue.load_text_batch(40).await.unwrap();
		assert!(queue.queued_len() > 3);

		for _ in 0..3 {
			assert!(queue.get_next_text().is_some());
		}
		assert!(queue.is_session_over());
		assert_eq!(queue.get_next_text(), None);
		assert_eq!(queue.get_next_text(), None);
		assert!(queue.queued_len() > 0);
		assert!(!queue.has_more_texts());

		queue.load_text_batch(5).await.unwrap();
		assert_eq!(queue.source.fetches(), 1);
	}

	#[tokio::test]
	async fn overlapping_loads_fetch_once() {
		let source = MockSource {
			delay: Some(Duration::from_millis(20)),
			..MockSource::with_batches(vec![Ok(numbered_entries()), Ok(numbered_entries())])
		};
		let queue = GenerationQueue::with_seed(source, config(2, 100), 4).unwrap();

		let (a, b) = tokio::join!(queue.load_text_batch(10), queue.load_text_batch(10));
		assert!(a.is_ok() && b.is_ok());
		assert_eq!(queue.source.fetches(), 1);
		assert_eq!(queue.corpus_len(), 10);
		assert_eq!(queue.state(), QueueState::Ready);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn shared_queue_refills_from_tasks() {
		let source = MockSource::with_batches(vec![Ok(numbered_entries())]);
		let queue = Arc::new(GenerationQueue::with_seed(source, config(2, 100), 4).unwrap());

		let task = {
			let queue = Arc::clone(&queue);
			tokio::spawn(async move { queue.load_text_batch(10).await })
		};
		task.await.unwrap().unwrap();
		assert!(queue.get_next_text().is_some());
	}

	#[tokio::test]
	async fn failed_fetch_leaves_queue_untouched() {
		let source = MockSource::with_batches(vec![
			Err(MarkovError::Fetch("connection reset".into())),
			Ok(numbered_entries()),
			Err(MarkovError::MalformedResponse("missing texts".into())),
		]);
		let queue = GenerationQueue::with_seed(source, config(2, 100), 6).unwrap();

		let err = queue.load_text_batch(10).await.unwrap_err();
		assert!(err.is_network());
		assert_eq!(queue.state(), QueueState::Empty);
		assert_eq!(queue.corpus_len(), 0);

		queue.load_text_batch(10).await.unwrap();
		let queued = queue.queued_len();
		let model_len = queue.model_len();

		assert!(queue.load_text_batch(10).await.is_err());
		assert_eq!(queue.state(), QueueState::Ready);
		assert_eq!(queue.queued_len(), queued);
		assert_eq!(queue.corpus_len(), 10);
		assert_eq!(queue.model_len(), model_len);
	}

	#[tokio::test]
	async fn failed_fetch_is_logged_by_the_queue() {
		let logger = capture_logs();
		let source = MockSource::with_batches(vec![Err(MarkovError::Fetch("socket closed by diary host".into()))]);
		let queue = GenerationQueue::with_seed(source, config(2, 100), 6).unwrap();

		assert!(queue.load_text_batch(4).await.is_err());
		let messages = logger.messages.lock().unwrap();
		assert!(
			messages
				.iter()
				.any(|m| m.contains("corpus batch of 4 failed") && m.contains("socket closed by diary host")),
			"no queue log line for the failed fetch"
		);
	}

	#[tokio::test]
	async fn cancelled_load_releases_the_flag() {
		let source = MockSource {
			delay: Some(Duration::from_millis(200)),
			..MockSource::with_batches(vec![Ok(numbered_entries()), Ok(numbered_entries())])
		};
		let queue = GenerationQueue::with_seed(source, config(2, 100), 4).unwrap();

		let timed_out = tokio::time::timeout(Duration::from_millis(10), queue.load_text_batch(10)).await;
		assert!(timed_out.is_err());
		assert_eq!(queue.state(), QueueState::Empty);

		queue.load_text_batch(10).await.unwrap();
		assert_eq!(queue.source.fetches(), 2);
		assert_eq!(queue.corpus_len(), 10);
	}

	#[tokio::test]
	async fn exhausted_source_ends_the_session() {
		let source = MockSource::with_batches(vec![Ok(numbered_entries())]);
		let queue = GenerationQueue::with_seed(source, config(2, 100), 9).unwrap();

		queue.load_text_batch(3).await.unwrap();
		while queue.get_next_text().is_some() {}
		assert!(queue.has_more_texts());

		// script is used up: the next batch is empty, but the existing corpus
		// may still yield a few unseen lines
		queue.load_text_batch(3).await.unwrap();
		while queue.get_next_text().is_some() {}
		assert!(!queue.has_more_texts());
		assert_eq!(queue.corpus_len(), 10);
	}

	#[tokio::test]
	async fn availability_comes_from_the_source() {
		let up = GenerationQueue::with_seed(MockSource::default(), QueueConfig::default(), 1).unwrap();
		assert!(up.is_available().await);

		let down = MockSource { unreachable: true, ..MockSource::default() };
		let down = GenerationQueue::with_seed(down, QueueConfig::default(), 1).unwrap();
		assert!(!down.is_available().await);
	}
}
