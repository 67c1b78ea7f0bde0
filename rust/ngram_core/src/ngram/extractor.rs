//! Extractor facade: configuration, regex compilation and walking.

use super::normalize::GramNormalizer;
use super::walker::NGramWalker;
use crate::automaton::{compile_regex, AutomatonView};
use crate::config::ExtractorConfig;
use crate::error::{ExtractError, Result};
use crate::expression::{Expression, ExpressionRewriter};

/// Configured n-gram extractor. Holds no per-call state, so one instance
/// can serve many threads.
pub struct NGramExtractor {
    config: ExtractorConfig,
    normalizer: Option<Box<dyn GramNormalizer>>,
}

impl std::fmt::Debug for NGramExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NGramExtractor")
            .field("config", &self.config)
            .field("normalizer", &self.normalizer.is_some())
            .finish()
    }
}

impl NGramExtractor {
    pub fn new(config: ExtractorConfig) -> std::result::Result<Self, ExtractError> {
        if config.gram_size < 2 {
            return Err(ExtractError::InvalidGramSize(config.gram_size));
        }
        Ok(NGramExtractor {
            config,
            normalizer: None,
        })
    }

    /// Pass every candidate n-gram through `normalizer` before it becomes a
    /// leaf.
    pub fn with_normalizer(mut self, normalizer: impl GramNormalizer + 'static) -> Self {
        self.normalizer = Some(Box::new(normalizer));
        self
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// N-gram expression implied by every string `automaton` accepts,
    /// simplified.
    ///
    /// `True` means no filtering is possible. Fails with
    /// [`ExtractError::TooComplex`] when the walk exceeds
    /// `max_states_traced`; there is no partial result in that case.
    pub fn extract<A: AutomatonView + ?Sized>(
        &self,
        automaton: &A,
    ) -> std::result::Result<Expression<String>, ExtractError> {
        if automaton.num_states() == 0 || automaton.is_accept(automaton.start()) {
            tracing::debug!("automaton accepts the empty string, no n-grams required");
            return Ok(Expression::True);
        }

        let mut walker = NGramWalker::new(automaton, &self.config);
        if let Some(normalizer) = &self.normalizer {
            walker = walker.with_normalizer(&**normalizer);
        }
        let walk = walker.walk()?;
        let expression = walk.expression.simplify();

        tracing::debug!(
            states_traced = walk.states_traced,
            ngrams = walk.ngrams,
            truncated = walk.truncated,
            clauses = expression.count_clauses(),
            "extracted n-gram expression"
        );
        Ok(expression)
    }

    /// Flatten an extracted expression into a disjunction of at most
    /// `max_disjunction_leaves` n-grams, for indexes that cannot evaluate
    /// nested queries. `True` when no such disjunction exists.
    pub fn degrade(&self, expression: &Expression<String>) -> Expression<String> {
        ExpressionRewriter::new(expression)
            .degrade_as_disjunction(self.config.max_disjunction_leaves)
    }

    /// Compile `pattern` and extract from it. Compile faults, including
    /// the determinization budget, surface unchanged as
    /// [`Error::Automaton`](crate::error::Error::Automaton).
    pub fn extract_regex(&self, pattern: &str) -> Result<Expression<String>> {
        let automaton = compile_regex(pattern, self.config.max_determinized_states)?;
        Ok(self.extract(&automaton)?)
    }
}

/// One-shot extraction without a normalizer.
pub fn extract<A: AutomatonView + ?Sized>(
    automaton: &A,
    gram_size: usize,
    max_expand: u32,
    max_states_traced: usize,
    max_ngrams: usize,
) -> std::result::Result<Expression<String>, ExtractError> {
    let config = ExtractorConfig::default()
        .with_gram_size(gram_size)
        .with_max_expand(max_expand)
        .with_max_states_traced(max_states_traced)
        .with_max_ngrams(max_ngrams);
    NGramExtractor::new(config)?.extract(automaton)
}
