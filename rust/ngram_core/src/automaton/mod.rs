//! Finite automata over Unicode code points.
//!
//! The extraction engine only reads automata through [`AutomatonView`]. The
//! arena-backed [`Automaton`] is the concrete implementation, produced either
//! by hand through [`AutomatonBuilder`] or from a regex by [`compile`].

pub mod compile;

use crate::error::AutomatonError;

pub use compile::compile_regex;

/// Index of a state in an automaton's state arena.
pub type StateId = u32;

/// Highest Unicode scalar value.
pub const MAX_CODE_POINT: u32 = char::MAX as u32;

/// Transition labeled with the inclusive code-point range `min..=max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Transition {
    pub min: u32,
    pub max: u32,
    pub to: StateId,
}

impl Transition {
    /// Number of code points in the label; 0 for an inverted range, which
    /// [`AutomatonBuilder`] rejects but a hand-written view may still hold.
    pub fn width(&self) -> u32 {
        match self.max.checked_sub(self.min) {
            Some(span) => span.saturating_add(1),
            None => 0,
        }
    }

    pub fn contains(&self, code_point: u32) -> bool {
        self.min <= code_point && code_point <= self.max
    }
}

/// Read-only view of a deterministic automaton.
///
/// Implementations must return each state's transitions sorted by `min`
/// with no two ranges overlapping, and every range must have
/// `min <= max`. A range with `min > max` labels no code point and is
/// never followed.
pub trait AutomatonView {
    fn num_states(&self) -> usize;

    fn start(&self) -> StateId;

    fn is_accept(&self, state: StateId) -> bool;

    fn transitions(&self, state: StateId) -> &[Transition];

    /// Follow the transition that accepts `code_point`, if any.
    fn step(&self, state: StateId, code_point: u32) -> Option<StateId> {
        let transitions = self.transitions(state);
        let idx = transitions.partition_point(|t| t.max < code_point);
        transitions
            .get(idx)
            .filter(|t| t.contains(code_point))
            .map(|t| t.to)
    }
}

/// Deterministic automaton stored as an arena of states.
#[derive(Debug, Clone, Default)]
pub struct Automaton {
    transitions: Vec<Vec<Transition>>,
    accept: Vec<bool>,
    start: StateId,
}

impl Automaton {
    /// True when the start state accepts, i.e. the empty string matches.
    pub fn accepts_empty(&self) -> bool {
        !self.accept.is_empty() && self.is_accept(self.start)
    }

    /// Run the automaton over `input`.
    pub fn accepts(&self, input: &str) -> bool {
        if self.accept.is_empty() {
            return false;
        }
        let mut state = self.start;
        for c in input.chars() {
            match self.step(state, c as u32) {
                Some(next) => state = next,
                None => return false,
            }
        }
        self.is_accept(state)
    }

    /// Total number of transitions across all states.
    pub fn num_transitions(&self) -> usize {
        self.transitions.iter().map(Vec::len).sum()
    }
}

impl AutomatonView for Automaton {
    fn num_states(&self) -> usize {
        self.accept.len()
    }

    fn start(&self) -> StateId {
        self.start
    }

    fn is_accept(&self, state: StateId) -> bool {
        self.accept.get(state as usize).copied().unwrap_or(false)
    }

    fn transitions(&self, state: StateId) -> &[Transition] {
        self.transitions
            .get(state as usize)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

/// Incremental builder for [`Automaton`].
///
/// The first state added becomes the start state unless
/// [`set_start`](Self::set_start) says otherwise.
#[derive(Debug, Default)]
pub struct AutomatonBuilder {
    transitions: Vec<Vec<Transition>>,
    accept: Vec<bool>,
    start: StateId,
}

impl AutomatonBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a non-accepting state with no transitions.
    pub fn add_state(&mut self) -> StateId {
        self.transitions.push(Vec::new());
        self.accept.push(false);
        (self.accept.len() - 1) as StateId
    }

    pub fn num_states(&self) -> usize {
        self.accept.len()
    }

    pub fn set_accept(&mut self, state: StateId, accept: bool) {
        if let Some(slot) = self.accept.get_mut(state as usize) {
            *slot = accept;
        }
    }

    pub fn set_start(&mut self, state: StateId) {
        self.start = state;
    }

    /// Add a transition over `min..=max`. Validated in [`build`](Self::build).
    pub fn add_transition(&mut self, from: StateId, min: u32, max: u32, to: StateId) {
        if let Some(list) = self.transitions.get_mut(from as usize) {
            list.push(Transition { min, max, to });
        } else {
            // Remember the bad source so build() can report it.
            self.transitions.resize_with(from as usize + 1, Vec::new);
            self.transitions[from as usize].push(Transition { min, max, to });
        }
    }

    /// Add a single-code-point transition.
    pub fn add_char(&mut self, from: StateId, c: char, to: StateId) {
        self.add_transition(from, c as u32, c as u32, to);
    }

    /// Validate and freeze the automaton.
    ///
    /// Transitions are sorted by range start; adjacent ranges to the same
    /// target are merged.
    pub fn build(self) -> Result<Automaton, AutomatonError> {
        let num_states = self.accept.len();
        let known = |state: StateId| (state as usize) < num_states;

        if num_states > 0 && !known(self.start) {
            return Err(AutomatonError::UnknownState {
                state: self.start,
                num_states,
            });
        }

        let mut transitions = self.transitions;
        for (from, list) in transitions.iter_mut().enumerate() {
            let from = from as StateId;
            if !known(from) && !list.is_empty() {
                return Err(AutomatonError::UnknownState {
                    state: from,
                    num_states,
                });
            }
            for t in list.iter() {
                if !known(t.to) {
                    return Err(AutomatonError::UnknownState {
                        state: t.to,
                        num_states,
                    });
                }
                if t.min > t.max || t.max > MAX_CODE_POINT {
                    return Err(AutomatonError::InvalidRange {
                        state: from,
                        min: t.min,
                        max: t.max,
                    });
                }
            }

            list.sort_unstable();
            let mut merged: Vec<Transition> = Vec::with_capacity(list.len());
            for t in list.drain(..) {
                if let Some(last) = merged.last_mut() {
                    if t.min <= last.max {
                        return Err(AutomatonError::NonDeterministic {
                            state: from,
                            code_point: t.min,
                        });
                    }
                    if last.to == t.to && last.max + 1 == t.min {
                        last.max = t.max;
                        continue;
                    }
                }
                merged.push(t);
            }
            *list = merged;
        }
        transitions.truncate(num_states);

        Ok(Automaton {
            transitions,
            accept: self.accept,
            start: self.start,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(s: &str) -> Automaton {
        let mut b = AutomatonBuilder::new();
        let mut state = b.add_state();
        for c in s.chars() {
            let next = b.add_state();
            b.add_char(state, c, next);
            state = next;
        }
        b.set_accept(state, true);
        b.build().unwrap()
    }

    #[test]
    fn literal_accepts_exactly_itself() {
        let a = literal("abc");
        assert!(a.accepts("abc"));
        assert!(!a.accepts("ab"));
        assert!(!a.accepts("abcd"));
        assert!(!a.accepts_empty());
        assert_eq!(a.num_states(), 4);
    }

    #[test]
    fn transition_width() {
        let t = |min, max| Transition { min, max, to: 0 };
        assert_eq!(t(5, 5).width(), 1);
        assert_eq!(t('a' as u32, 'z' as u32).width(), 26);
        assert_eq!(t(5, 3).width(), 0);
        assert!(!t(5, 3).contains(4));
        assert_eq!(t(0, u32::MAX).width(), u32::MAX);
    }

    #[test]
    fn empty_automaton_accepts_nothing() {
        let a = AutomatonBuilder::new().build().unwrap();
        assert_eq!(a.num_states(), 0);
        assert!(!a.accepts(""));
        assert!(!a.accepts_empty());
    }

    #[test]
    fn step_uses_ranges() {
        let mut b = AutomatonBuilder::new();
        let s0 = b.add_state();
        let s1 = b.add_state();
        let s2 = b.add_state();
        b.add_transition(s0, 'x' as u32, 'z' as u32, s2);
        b.add_transition(s0, 'a' as u32, 'c' as u32, s1);
        let a = b.build().unwrap();

        assert_eq!(a.transitions(s0)[0].min, 'a' as u32);
        assert_eq!(a.step(s0, 'b' as u32), Some(s1));
        assert_eq!(a.step(s0, 'y' as u32), Some(s2));
        assert_eq!(a.step(s0, 'm' as u32), None);
    }

    #[test]
    fn adjacent_ranges_merge() {
        let mut b = AutomatonBuilder::new();
        let s0 = b.add_state();
        let s1 = b.add_state();
        b.add_transition(s0, 'a' as u32, 'c' as u32, s1);
        b.add_transition(s0, 'd' as u32, 'f' as u32, s1);
        let a = b.build().unwrap();
        assert_eq!(a.transitions(s0).len(), 1);
        assert_eq!(a.transitions(s0)[0].width(), 6);
    }

    #[test]
    fn overlapping_ranges_rejected() {
        let mut b = AutomatonBuilder::new();
        let s0 = b.add_state();
        let s1 = b.add_state();
        let s2 = b.add_state();
        b.add_transition(s0, 'a' as u32, 'm' as u32, s1);
        b.add_transition(s0, 'k' as u32, 'z' as u32, s2);
        match b.build() {
            Err(AutomatonError::NonDeterministic { state, code_point }) => {
                assert_eq!(state, s0);
                assert_eq!(code_point, 'k' as u32);
            }
            other => panic!("expected NonDeterministic, got {:?}", other),
        }
    }

    #[test]
    fn unknown_target_rejected() {
        let mut b = AutomatonBuilder::new();
        let s0 = b.add_state();
        b.add_char(s0, 'a', 7);
        assert!(matches!(
            b.build(),
            Err(AutomatonError::UnknownState { state: 7, .. })
        ));
    }

    #[test]
    fn inverted_range_rejected() {
        let mut b = AutomatonBuilder::new();
        let s0 = b.add_state();
        let s1 = b.add_state();
        b.add_transition(s0, 'z' as u32, 'a' as u32, s1);
        assert!(matches!(
            b.build(),
            Err(AutomatonError::InvalidRange { .. })
        ));
    }
}
