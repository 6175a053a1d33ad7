//! Incremental delivery of generated lines.
//!
//! A `GenerationQueue` pulls corpus batches from a `TextSource`, rebuilds its
//! model and keeps a FIFO of fresh lines for a consumer that takes them one at
//! a time (the typewriter display).

/// Queue and source settings.
pub mod config;

/// The generation queue itself.
pub mod queue;

/// Remote corpus access: the `TextSource` trait, its HTTP implementation and
/// the JSON wire types shared with the corpus server.
pub mod source;
