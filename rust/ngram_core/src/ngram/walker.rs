//! Automaton walker deriving the n-grams every accepted string contains.
//!
//! The walk runs over nodes `(state, window)`, where `window` holds the last
//! `min(consumed, n - 1)` symbols read on the way to `state`. Each step out
//! of a node with a full window produces the n-gram `window + symbol`. The
//! requirement of a node is
//!
//! ```text
//! E(node) = TRUE                                   if state accepts
//!         = OR over steps (gram AND E(next node))  otherwise
//! ```
//!
//! Every reachable node is expanded exactly once. The equations are then
//! solved one strongly connected component at a time, sinks first, so each
//! node's requirement is computed once and shared by every path through it.
//! A node on no cycle takes the formula above directly. Inside a cycle the
//! requirements are the least fixpoint of the equations over sets of
//! clauses: a clause is the grams read inside the component along a path,
//! plus the requirement of the step that leaves it. Clause sets are kept
//! minimal. A node whose set grows past [`MAX_CYCLE_CLAUSES`] keeps only the
//! exit part of each clause from then on, which is weaker but still implied.

use std::collections::{BTreeMap, VecDeque};

use ahash::{AHashMap, AHashSet};

use super::normalize::GramNormalizer;
use crate::automaton::{AutomatonView, StateId};
use crate::config::ExtractorConfig;
use crate::error::ExtractError;
use crate::expression::Expression;

/// Clauses a node inside a cycle may hold before it keeps only exits.
pub const MAX_CYCLE_CLAUSES: usize = 64;

/// One position of a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Symbol {
    Char(char),
    /// Member of a class too wide to expand.
    Unknown,
}

type NodeKey = (StateId, Box<[Symbol]>);

/// Outgoing move of a node. `gram` indexes the walker's n-gram table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Step {
    target: usize,
    gram: Option<usize>,
}

/// Conjunct of a clause inside a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Atom {
    Gram(usize),
    /// Requirement of a step leaving the component, by distinct value.
    Exit(usize),
}

/// Sorted conjunction of distinct atoms.
type Clause = Vec<Atom>;

/// Result of one walk.
#[derive(Debug, Clone)]
pub struct Walk {
    /// Raw requirement, not simplified.
    pub expression: Expression<String>,
    /// Distinct nodes expanded.
    pub states_traced: usize,
    /// Distinct n-grams kept as leaves.
    pub ngrams: usize,
    /// Whether `max_ngrams` dropped any n-gram.
    pub truncated: bool,
}

/// Single-use walker over one automaton.
pub struct NGramWalker<'a, A: AutomatonView + ?Sized> {
    automaton: &'a A,
    gram_size: usize,
    max_expand: u32,
    max_states_traced: usize,
    max_ngrams: usize,
    normalizer: Option<&'a dyn GramNormalizer>,

    keys: Vec<NodeKey>,
    ids: AHashMap<NodeKey, usize>,
    /// Outgoing steps, `None` until the node is expanded.
    edges: Vec<Option<Vec<Step>>>,
    accepting: Vec<bool>,
    grams: Vec<String>,
    gram_ids: AHashMap<String, usize>,
    truncated: bool,
    states_traced: usize,
}

impl<'a, A: AutomatonView + ?Sized> NGramWalker<'a, A> {
    /// `config.gram_size` must be at least 2; the extractor checks it.
    pub fn new(automaton: &'a A, config: &ExtractorConfig) -> Self {
        NGramWalker {
            automaton,
            gram_size: config.gram_size,
            max_expand: config.max_expand,
            max_states_traced: config.max_states_traced,
            max_ngrams: config.max_ngrams,
            normalizer: None,
            keys: Vec::new(),
            ids: AHashMap::new(),
            edges: Vec::new(),
            accepting: Vec::new(),
            grams: Vec::new(),
            gram_ids: AHashMap::new(),
            truncated: false,
            states_traced: 0,
        }
    }

    pub fn with_normalizer(mut self, normalizer: &'a dyn GramNormalizer) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    /// Walk from the start state.
    ///
    /// Fails once more than `max_states_traced` distinct nodes have been
    /// expanded; the check runs on every expansion.
    pub fn walk(mut self) -> Result<Walk, ExtractError> {
        if self.automaton.num_states() == 0 {
            return Ok(self.into_walk(Expression::False));
        }

        let root = self.intern(self.automaton.start(), Box::new([]));
        self.explore(root)?;
        let expression = self.solve(root);
        Ok(self.into_walk(expression))
    }

    fn into_walk(self, expression: Expression<String>) -> Walk {
        Walk {
            expression,
            states_traced: self.states_traced,
            ngrams: self.grams.len(),
            truncated: self.truncated,
        }
    }

    fn intern(&mut self, state: StateId, window: Box<[Symbol]>) -> usize {
        let key = (state, window);
        if let Some(&id) = self.ids.get(&key) {
            return id;
        }
        let id = self.keys.len();
        self.keys.push(key.clone());
        self.ids.insert(key, id);
        self.edges.push(None);
        self.accepting.push(false);
        id
    }

    fn edges_of(&self, node: usize) -> &[Step] {
        self.edges[node].as_deref().unwrap_or(&[])
    }

    /// Expand every node reachable from `root` once, depth first in step
    /// order, so n-grams are numbered in the order a path reads them.
    fn explore(&mut self, root: usize) -> Result<(), ExtractError> {
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if self.edges[node].is_some() {
                continue;
            }

            self.states_traced += 1;
            if self.states_traced > self.max_states_traced {
                tracing::debug!(
                    max_states_traced = self.max_states_traced,
                    nodes = self.keys.len(),
                    ngrams = self.grams.len(),
                    "state budget exhausted"
                );
                return Err(ExtractError::TooComplex {
                    max_states_traced: self.max_states_traced,
                });
            }

            let state = self.keys[node].0;
            if self.automaton.is_accept(state) {
                // A path may end here, so nothing further is required.
                self.accepting[node] = true;
                self.edges[node] = Some(Vec::new());
                continue;
            }

            let steps = self.steps(node);
            stack.extend(steps.iter().rev().map(|s| s.target));
            self.edges[node] = Some(steps);
        }
        Ok(())
    }

    /// Outgoing steps of `node`, transitions in range order and code points
    /// ascending within each range.
    fn steps(&mut self, node: usize) -> Vec<Step> {
        let automaton = self.automaton;
        let (state, window) = self.keys[node].clone();
        let mut steps = Vec::new();
        // Wide ranges into one target all lead to the same node.
        let mut unknown_targets = AHashSet::new();
        for t in automaton.transitions(state) {
            if t.width() <= self.max_expand {
                for c in (t.min..=t.max).filter_map(char::from_u32) {
                    let step = self.step(&window, Symbol::Char(c), t.to);
                    steps.push(step);
                }
            } else if unknown_targets.insert(t.to) {
                let step = self.step(&window, Symbol::Unknown, t.to);
                steps.push(step);
            }
        }
        steps
    }

    fn step(&mut self, window: &[Symbol], symbol: Symbol, to: StateId) -> Step {
        let full = self.gram_size - 1;
        let gram = if window.len() == full {
            self.gram(window, symbol)
        } else {
            None
        };

        let skip = usize::from(window.len() == full);
        let next: Box<[Symbol]> = window[skip..]
            .iter()
            .copied()
            .chain(std::iter::once(symbol))
            .collect();
        let target = self.intern(to, next);
        Step { target, gram }
    }

    /// Id of the n-gram `window + symbol`, if it is known, survives
    /// normalization and fits the n-gram budget.
    fn gram(&mut self, window: &[Symbol], symbol: Symbol) -> Option<usize> {
        debug_assert_eq!(window.len(), self.gram_size - 1, "gram from a partial window");

        let mut gram = String::with_capacity(self.gram_size * 4);
        for s in window.iter().chain(std::iter::once(&symbol)) {
            match s {
                Symbol::Char(c) => gram.push(*c),
                Symbol::Unknown => return None,
            }
        }
        let gram = match self.normalizer {
            Some(normalizer) => normalizer.normalize(&gram)?,
            None => gram,
        };

        if let Some(&id) = self.gram_ids.get(&gram) {
            return Some(id);
        }
        if self.grams.len() >= self.max_ngrams {
            if !self.truncated {
                tracing::debug!(
                    max_ngrams = self.max_ngrams,
                    dropped = %gram,
                    "n-gram budget reached, dropping further n-grams"
                );
                self.truncated = true;
            }
            return None;
        }
        let id = self.grams.len();
        self.gram_ids.insert(gram.clone(), id);
        self.grams.push(gram);
        Some(id)
    }

    /// Requirement of `root`. Tarjan's algorithm, iterative, emits components
    /// in reverse topological order, so every step leaving a component points
    /// at a node already solved.
    fn solve(&self, root: usize) -> Expression<String> {
        const UNVISITED: usize = usize::MAX;

        let n = self.keys.len();
        let mut index = vec![UNVISITED; n];
        let mut low = vec![0; n];
        let mut on_stack = vec![false; n];
        let mut component: Vec<usize> = Vec::new();
        let mut value: Vec<Option<Expression<String>>> = vec![None; n];

        index[root] = 0;
        low[root] = 0;
        let mut next_index = 1;
        component.push(root);
        on_stack[root] = true;
        let mut call: Vec<(usize, usize)> = vec![(root, 0)];

        while let Some(top) = call.last_mut() {
            let node = top.0;
            if let Some(step) = self.edges_of(node).get(top.1) {
                top.1 += 1;
                let w = step.target;
                if index[w] == UNVISITED {
                    index[w] = next_index;
                    low[w] = next_index;
                    next_index += 1;
                    component.push(w);
                    on_stack[w] = true;
                    call.push((w, 0));
                } else if on_stack[w] {
                    low[node] = low[node].min(index[w]);
                }
                continue;
            }

            call.pop();
            if let Some(&(parent, _)) = call.last() {
                low[parent] = low[parent].min(low[node]);
            }
            if low[node] == index[node] {
                let mut members = Vec::new();
                while let Some(w) = component.pop() {
                    on_stack[w] = false;
                    members.push(w);
                    if w == node {
                        break;
                    }
                }
                self.solve_component(&members, &mut value);
            }
        }

        value[root].take().unwrap_or(Expression::False)
    }

    fn solve_component(&self, members: &[usize], value: &mut [Option<Expression<String>>]) {
        let first = members[0];
        let cyclic =
            members.len() > 1 || self.edges_of(first).iter().any(|s| s.target == first);
        if !cyclic {
            let expr = if self.accepting[first] {
                Expression::True
            } else {
                disjunction(self.edges_of(first).iter().map(|s| {
                    let rest = value[s.target].clone().unwrap_or(Expression::False);
                    self.branch(s.gram, rest)
                }))
            };
            value[first] = Some(expr);
            return;
        }

        let local: AHashMap<usize, usize> =
            members.iter().enumerate().map(|(i, &m)| (m, i)).collect();
        let mut exits: Vec<Expression<String>> = Vec::new();
        let mut exit_ids: BTreeMap<Expression<String>, usize> = BTreeMap::new();
        let mut preds: Vec<Vec<(usize, Option<usize>)>> = vec![Vec::new(); members.len()];
        let mut queue: VecDeque<(usize, Clause)> = VecDeque::new();

        for (i, &node) in members.iter().enumerate() {
            for step in self.edges_of(node) {
                if let Some(&j) = local.get(&step.target) {
                    preds[j].push((i, step.gram));
                    continue;
                }
                let rest = value[step.target].clone().unwrap_or(Expression::False);
                match self.branch(step.gram, rest) {
                    Expression::False => {}
                    Expression::True => queue.push_back((i, Vec::new())),
                    exit => {
                        let id = match exit_ids.get(&exit) {
                            Some(&id) => id,
                            None => {
                                exit_ids.insert(exit.clone(), exits.len());
                                exits.push(exit);
                                exits.len() - 1
                            }
                        };
                        queue.push_back((i, vec![Atom::Exit(id)]));
                    }
                }
            }
        }

        // Semi-naive least fixpoint: only new clauses travel to predecessors.
        let mut clauses: Vec<Vec<Clause>> = vec![Vec::new(); members.len()];
        let mut exits_only = vec![false; members.len()];
        while let Some((i, clause)) = queue.pop_front() {
            let clause = if exits_only[i] { exit_part(&clause) } else { clause };
            let set = &mut clauses[i];
            if set.iter().any(|c| is_subset(c, &clause)) {
                continue;
            }
            set.retain(|c| !is_subset(&clause, c));
            set.push(clause.clone());

            let added = if !exits_only[i] && set.len() > MAX_CYCLE_CLAUSES {
                tracing::debug!(
                    members = members.len(),
                    max_cycle_clauses = MAX_CYCLE_CLAUSES,
                    "cycle clause budget reached, keeping exits only"
                );
                exits_only[i] = true;
                *set = minimize(set.iter().map(|c| exit_part(c)).collect());
                set.clone()
            } else {
                vec![clause]
            };
            for c in &added {
                for &(p, gram) in &preds[i] {
                    queue.push_back((p, with_gram(c, gram)));
                }
            }
        }

        for (i, &node) in members.iter().enumerate() {
            let expr = disjunction(clauses[i].iter().map(|clause| {
                Expression::and(clause.iter().map(|atom| match *atom {
                    Atom::Gram(g) => self.leaf(g),
                    Atom::Exit(k) => exits[k].clone(),
                }))
            }));
            value[node] = Some(expr);
        }
    }

    /// `gram AND rest`, folding constants.
    fn branch(&self, gram: Option<usize>, rest: Expression<String>) -> Expression<String> {
        match (gram, rest) {
            (_, Expression::False) => Expression::False,
            (None, rest) => rest,
            (Some(g), Expression::True) => self.leaf(g),
            (Some(g), rest) => Expression::and([self.leaf(g), rest]),
        }
    }

    fn leaf(&self, gram: usize) -> Expression<String> {
        Expression::leaf(self.grams[gram].clone())
    }
}

/// Or of `branches`, `True` as soon as one branch is.
fn disjunction(branches: impl IntoIterator<Item = Expression<String>>) -> Expression<String> {
    let mut kept = Vec::new();
    for b in branches {
        match b {
            Expression::True => return Expression::True,
            Expression::False => {}
            b => kept.push(b),
        }
    }
    Expression::or(kept)
}

/// `small ⊆ large` for sorted clauses.
fn is_subset(small: &[Atom], large: &[Atom]) -> bool {
    let mut rest = large.iter();
    small.iter().all(|a| rest.any(|b| b == a))
}

fn with_gram(clause: &[Atom], gram: Option<usize>) -> Clause {
    let mut out = clause.to_vec();
    if let Some(g) = gram {
        if let Err(pos) = out.binary_search(&Atom::Gram(g)) {
            out.insert(pos, Atom::Gram(g));
        }
    }
    out
}

fn exit_part(clause: &[Atom]) -> Clause {
    clause
        .iter()
        .copied()
        .filter(|a| matches!(a, Atom::Exit(_)))
        .collect()
}

/// Drop duplicates and clauses implied by a smaller one.
fn minimize(mut clauses: Vec<Clause>) -> Vec<Clause> {
    clauses.sort_unstable_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    clauses.dedup();
    let mut kept: Vec<Clause> = Vec::new();
    for c in clauses {
        if !kept.iter().any(|k| is_subset(k, &c)) {
            kept.push(c);
        }
    }
    kept
}
