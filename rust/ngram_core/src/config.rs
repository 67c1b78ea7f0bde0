//! Extraction limits.
//!
//! Every field has a default, so a partial JSON object (or `{}`) is a valid
//! config.

use serde::{Deserialize, Serialize};

use crate::automaton::compile::DEFAULT_MAX_DETERMINIZED_STATES;
use crate::error::Result;

/// Limits for turning a regex into an n-gram expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Length of the extracted n-grams, in code points. At least 2.
    pub gram_size: usize,
    /// Widest character class expanded into one n-gram per member. Wider
    /// classes are treated as "any character".
    pub max_expand: u32,
    /// Traversal steps allowed before giving up with a complexity fault.
    pub max_states_traced: usize,
    /// Distinct n-grams kept; further ones are dropped from the expression.
    pub max_ngrams: usize,
    /// DFA states allowed when compiling a regex.
    pub max_determinized_states: usize,
    /// Leaf budget of [`NGramExtractor::degrade`](crate::NGramExtractor::degrade).
    pub max_disjunction_leaves: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        ExtractorConfig {
            gram_size: 3,
            max_expand: 4,
            max_states_traced: 10_000,
            max_ngrams: 100,
            max_determinized_states: DEFAULT_MAX_DETERMINIZED_STATES,
            max_disjunction_leaves: 100,
        }
    }
}

impl ExtractorConfig {
    /// Parse a config from a JSON object. Malformed input is
    /// [`Error::Config`](crate::error::Error::Config).
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_gram_size(mut self, gram_size: usize) -> Self {
        self.gram_size = gram_size;
        self
    }

    pub fn with_max_expand(mut self, max_expand: u32) -> Self {
        self.max_expand = max_expand;
        self
    }

    pub fn with_max_states_traced(mut self, max_states_traced: usize) -> Self {
        self.max_states_traced = max_states_traced;
        self
    }

    pub fn with_max_ngrams(mut self, max_ngrams: usize) -> Self {
        self.max_ngrams = max_ngrams;
        self
    }
}
