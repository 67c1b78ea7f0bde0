//! `ngram_core` — regex to n-gram query extraction.
//!
//! Turns a regular expression (or any deterministic automaton) into a boolean
//! expression over n-grams that every matching string must contain. An
//! n-gram index evaluates the expression to skip documents that cannot
//! match, and the regex only runs on the rest.
//!
//! Modules:
//! - `automaton`  — automaton view, concrete automaton and regex compiler
//! - `expression` — boolean expression algebra, simplification and degradation
//! - `ngram`      — automaton walker and extractor facade
//! - `config`     — extraction limits
//! - `error`      — error types

pub mod automaton;
pub mod config;
pub mod error;
pub mod expression;
pub mod ngram;

pub use automaton::{compile_regex, Automaton, AutomatonBuilder, AutomatonView};
pub use config::ExtractorConfig;
pub use error::{AutomatonError, Error, ExtractError, Result};
pub use expression::rewriter::ExpressionRewriter;
pub use expression::Expression;
pub use ngram::{extract, NGramExtractor};
