//! Error types for automaton construction and n-gram extraction.

use thiserror::Error;

use crate::automaton::StateId;

/// Errors raised while building or compiling an automaton.
///
/// These originate outside the extraction engine and pass through it
/// unchanged.
#[derive(Debug, Error)]
pub enum AutomatonError {
    /// The regex could not be parsed.
    #[error("invalid regex: {0}")]
    Parse(#[from] Box<regex_syntax::Error>),

    /// Determinization needed more states than allowed.
    #[error("determinizing automaton would result in more than {max_determinized_states} states")]
    TooComplex { max_determinized_states: usize },

    /// A transition or the start state references a state that was never added.
    #[error("unknown state {state} (automaton has {num_states} states)")]
    UnknownState { state: StateId, num_states: usize },

    /// A transition range with `min > max`.
    #[error("invalid transition range {min:#x}..={max:#x} on state {state}")]
    InvalidRange { state: StateId, min: u32, max: u32 },

    /// Two transitions of one state overlap.
    #[error("state {state} is not deterministic: code point {code_point:#x} has two transitions")]
    NonDeterministic { state: StateId, code_point: u32 },
}

impl AutomatonError {
    /// True when the fault means "too expensive", not "invalid input".
    pub fn is_too_complex(&self) -> bool {
        matches!(self, AutomatonError::TooComplex { .. })
    }
}

impl From<regex_syntax::Error> for AutomatonError {
    fn from(e: regex_syntax::Error) -> Self {
        AutomatonError::Parse(Box::new(e))
    }
}

/// Errors raised by the n-gram extractor itself.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The state-visit budget was exhausted. No pruning expression is
    /// available; the caller must run the regex unfiltered.
    #[error("automaton too complex to extract n-grams from: traced more than {max_states_traced} states")]
    TooComplex { max_states_traced: usize },

    /// Gram size below 2.
    #[error("invalid gram size {0}: must be at least 2")]
    InvalidGramSize(usize),
}

impl ExtractError {
    pub fn is_too_complex(&self) -> bool {
        matches!(self, ExtractError::TooComplex { .. })
    }
}

/// Umbrella error for the regex → expression pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Automaton(#[from] AutomatonError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("invalid extractor config: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    /// True for either complexity fault: no pruning expression is available
    /// and the regex has to run against every candidate.
    pub fn should_run_unfiltered(&self) -> bool {
        match self {
            Error::Automaton(e) => e.is_too_complex(),
            Error::Extract(e) => e.is_too_complex(),
            Error::Config(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_complex_is_distinguishable() {
        let e = Error::from(ExtractError::TooComplex {
            max_states_traced: 10,
        });
        assert!(e.should_run_unfiltered());
        assert!(e.to_string().contains("too complex"));

        let e = Error::from(AutomatonError::TooComplex {
            max_determinized_states: 10,
        });
        assert!(e.should_run_unfiltered());

        let e = Error::from(ExtractError::InvalidGramSize(1));
        assert!(!e.should_run_unfiltered());
    }

    #[test]
    fn parse_error_converts() {
        let err = regex_syntax::parse("(").unwrap_err();
        let e = AutomatonError::from(err);
        assert!(matches!(e, AutomatonError::Parse(_)));
        assert!(!e.is_too_complex());
    }
}
