//! N-gram extraction from automata.
//!
//! Given a deterministic automaton, derive a boolean expression over n-grams
//! that every accepted string satisfies. An n-gram index can evaluate that
//! expression to prune candidate documents before the regex itself runs.
//!
//! # Architecture
//!
//! - **walker** — `(state, window)` traversal solved per strongly connected component
//! - **normalize** — Rewriting candidate n-grams to match index-time analysis
//! - **extractor** — Configured facade over compilation and walking

pub mod extractor;
pub mod normalize;
pub mod walker;

pub use extractor::{extract, NGramExtractor};
pub use normalize::{GramNormalizer, Lowercase};
pub use walker::{NGramWalker, Walk};
