//! Word-level Markov text model.
//!
//! - Fixed-order n-gram model with sentence beginnings (`MarkovModel`)
//! - Per-key successor lists (`State`)
//! - Random-walk sentence generation (`SentenceGenerator`)

/// Sentence generation by random walk over a built model.
///
/// Randomness is injected by the caller so output is reproducible with a
/// seeded rng.
pub mod generator;

/// Fixed-order word n-gram model.
///
/// Handles corpus ingestion, beginnings tracking, merging,
/// parallel construction and `postcard` persistence.
pub mod markov_model;

/// Internal representation of a single n-gram state.
///
/// Stores the duplicate-preserving successor list and samples from it.
mod state;
