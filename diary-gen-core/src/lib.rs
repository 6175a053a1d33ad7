//! Markov text generation for the audio diary.
//!
//! This crate provides:
//! - A word-level n-gram model built from corpus lines
//! - Frequency-weighted sentence generation with an injected rng
//! - A batched, pull-based generation queue fed by a remote corpus source
//! - Corpus file utilities and a `postcard` model cache

/// Error taxonomy shared by every module.
pub mod error;

/// Core model and generation logic.
pub mod model;

/// Batch client: corpus source access and the generation queue.
pub mod batch;

/// I/O utilities (corpus files, cache paths).
pub mod io;

pub use batch::config::{QueueConfig, SourceConfig};
pub use batch::queue::{GenerationQueue, QueueState};
pub use batch::source::{HttpTextSource, TextSource};
pub use error::{MarkovError, Result};
pub use model::generator::SentenceGenerator;
pub use model::markov_model::MarkovModel;
