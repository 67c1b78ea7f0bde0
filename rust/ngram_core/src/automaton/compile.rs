//! Regex → deterministic automaton compilation.
//!
//! Parses with `regex_syntax` into HIR, lowers the HIR to a Thompson NFA over
//! code-point ranges, then determinizes by subset construction. The result
//! matches whole strings: `foo` accepts exactly "foo", unanchored search is
//! written `.*(?:foo).*`.
//!
//! Look-around assertions (`^`, `$`, `\b`, ...) compile to empty matches.
//! That only widens the accepted language, which keeps n-gram pruning sound.

use std::collections::VecDeque;

use ahash::AHashMap;
use regex_syntax::hir::{Class, Hir, HirKind};

use super::{Automaton, AutomatonBuilder, AutomatonView, StateId};
use crate::error::AutomatonError;

/// Default cap on DFA states created by determinization.
pub const DEFAULT_MAX_DETERMINIZED_STATES: usize = 10_000;

/// NFA states allowed per permitted DFA state before giving up early.
const NFA_STATES_PER_DFA_STATE: usize = 64;

/// Compile `pattern` into a deterministic automaton.
///
/// Fails with [`AutomatonError::TooComplex`] when determinization needs more
/// than `max_determinized_states` states.
pub fn compile_regex(
    pattern: &str,
    max_determinized_states: usize,
) -> Result<Automaton, AutomatonError> {
    let hir = regex_syntax::ParserBuilder::new().build().parse(pattern)?;

    let mut nfa = Nfa::new(max_determinized_states);
    let (start, end) = nfa.lower(&hir)?;
    nfa.accept = end;

    let dfa = determinize(&nfa, start, max_determinized_states)?;
    tracing::trace!(
        pattern,
        nfa_states = nfa.states.len(),
        dfa_states = dfa.num_states(),
        "compiled regex"
    );
    Ok(dfa)
}

#[derive(Debug, Default)]
struct NfaState {
    epsilon: Vec<usize>,
    ranges: Vec<(u32, u32, usize)>,
}

/// Thompson NFA: one accept state, epsilon moves, range-labeled moves.
struct Nfa {
    states: Vec<NfaState>,
    accept: usize,
    max_states: usize,
    max_determinized_states: usize,
}

impl Nfa {
    fn new(max_determinized_states: usize) -> Self {
        Nfa {
            states: Vec::new(),
            accept: 0,
            max_states: max_determinized_states.saturating_mul(NFA_STATES_PER_DFA_STATE),
            max_determinized_states,
        }
    }

    fn add(&mut self) -> Result<usize, AutomatonError> {
        if self.states.len() >= self.max_states {
            return Err(AutomatonError::TooComplex {
                max_determinized_states: self.max_determinized_states,
            });
        }
        self.states.push(NfaState::default());
        Ok(self.states.len() - 1)
    }

    fn epsilon(&mut self, from: usize, to: usize) {
        self.states[from].epsilon.push(to);
    }

    fn range(&mut self, from: usize, min: u32, max: u32, to: usize) {
        self.states[from].ranges.push((min, max, to));
    }

    /// Lower `hir` to a fragment; returns its (entry, exit) states.
    fn lower(&mut self, hir: &Hir) -> Result<(usize, usize), AutomatonError> {
        match hir.kind() {
            HirKind::Empty | HirKind::Look(_) => {
                let s = self.add()?;
                Ok((s, s))
            }
            HirKind::Literal(lit) => {
                let start = self.add()?;
                let mut cur = start;
                for cp in literal_code_points(&lit.0) {
                    let next = self.add()?;
                    self.range(cur, cp, cp, next);
                    cur = next;
                }
                Ok((start, cur))
            }
            HirKind::Class(class) => {
                let start = self.add()?;
                let end = self.add()?;
                match class {
                    Class::Unicode(cls) => {
                        for r in cls.ranges() {
                            self.range(start, r.start() as u32, r.end() as u32, end);
                        }
                    }
                    Class::Bytes(cls) => {
                        for r in cls.ranges() {
                            self.range(start, r.start() as u32, r.end() as u32, end);
                        }
                    }
                }
                Ok((start, end))
            }
            HirKind::Repetition(rep) => {
                let start = self.add()?;
                let mut cur = start;
                for _ in 0..rep.min {
                    let (a, b) = self.lower(&rep.sub)?;
                    self.epsilon(cur, a);
                    cur = b;
                }
                match rep.max {
                    Some(max) => {
                        let mut skips = Vec::new();
                        for _ in rep.min..max {
                            let (a, b) = self.lower(&rep.sub)?;
                            self.epsilon(cur, a);
                            skips.push(cur);
                            cur = b;
                        }
                        let end = self.add()?;
                        self.epsilon(cur, end);
                        for s in skips {
                            self.epsilon(s, end);
                        }
                        Ok((start, end))
                    }
                    None => {
                        let (a, b) = self.lower(&rep.sub)?;
                        let hub = self.add()?;
                        self.epsilon(cur, hub);
                        self.epsilon(hub, a);
                        self.epsilon(b, hub);
                        Ok((start, hub))
                    }
                }
            }
            HirKind::Capture(cap) => self.lower(&cap.sub),
            HirKind::Concat(subs) => {
                let start = self.add()?;
                let mut cur = start;
                for sub in subs {
                    let (a, b) = self.lower(sub)?;
                    self.epsilon(cur, a);
                    cur = b;
                }
                Ok((start, cur))
            }
            HirKind::Alternation(alts) => {
                let start = self.add()?;
                let end = self.add()?;
                for alt in alts {
                    let (a, b) = self.lower(alt)?;
                    self.epsilon(start, a);
                    self.epsilon(b, end);
                }
                Ok((start, end))
            }
        }
    }
}

/// Literal bytes are UTF-8 in Unicode mode; anything else maps byte → code point.
fn literal_code_points(bytes: &[u8]) -> Vec<u32> {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.chars().map(|c| c as u32).collect(),
        Err(_) => bytes.iter().map(|&b| b as u32).collect(),
    }
}

/// Epsilon-closure helper with a generation-stamped visited mark.
struct Closure {
    mark: Vec<u32>,
    generation: u32,
    stack: Vec<usize>,
}

impl Closure {
    fn new(nfa_states: usize) -> Self {
        Closure {
            mark: vec![0; nfa_states],
            generation: 0,
            stack: Vec::new(),
        }
    }

    /// Sorted epsilon closure of `seeds`.
    fn of(&mut self, nfa: &Nfa, seeds: impl IntoIterator<Item = usize>) -> Vec<usize> {
        self.generation += 1;
        let mut out = Vec::new();
        self.stack.extend(seeds);
        while let Some(s) = self.stack.pop() {
            if self.mark[s] == self.generation {
                continue;
            }
            self.mark[s] = self.generation;
            out.push(s);
            self.stack.extend(nfa.states[s].epsilon.iter().copied());
        }
        out.sort_unstable();
        out
    }
}

fn determinize(
    nfa: &Nfa,
    start: usize,
    max_determinized_states: usize,
) -> Result<Automaton, AutomatonError> {
    let mut closure = Closure::new(nfa.states.len());
    let mut builder = AutomatonBuilder::new();
    let mut ids: AHashMap<Vec<usize>, StateId> = AHashMap::new();
    let mut queue: VecDeque<(StateId, Vec<usize>)> = VecDeque::new();

    let too_complex = || AutomatonError::TooComplex {
        max_determinized_states,
    };

    let initial = closure.of(nfa, [start]);
    let id = builder.add_state();
    builder.set_start(id);
    ids.insert(initial.clone(), id);
    queue.push_back((id, initial));

    while let Some((id, set)) = queue.pop_front() {
        if set.binary_search(&nfa.accept).is_ok() {
            builder.set_accept(id, true);
        }

        let ranges: Vec<(u32, u32, usize)> = set
            .iter()
            .flat_map(|&s| nfa.states[s].ranges.iter().copied())
            .collect();
        if ranges.is_empty() {
            continue;
        }

        // Split the union of all labels into disjoint intervals.
        let mut points: Vec<u32> = ranges
            .iter()
            .flat_map(|&(min, max, _)| [min, max + 1])
            .collect();
        points.sort_unstable();
        points.dedup();

        for window in points.windows(2) {
            let (lo, hi) = (window[0], window[1] - 1);
            let targets: Vec<usize> = ranges
                .iter()
                .filter(|&&(min, max, _)| min <= lo && lo <= max)
                .map(|&(_, _, to)| to)
                .collect();
            if targets.is_empty() {
                continue;
            }
            let next = closure.of(nfa, targets);
            let to = match ids.get(&next) {
                Some(&to) => to,
                None => {
                    if builder.num_states() >= max_determinized_states {
                        return Err(too_complex());
                    }
                    let to = builder.add_state();
                    ids.insert(next.clone(), to);
                    queue.push_back((to, next));
                    to
                }
            };
            builder.add_transition(id, lo, hi, to);
        }
    }

    builder.build()
}
