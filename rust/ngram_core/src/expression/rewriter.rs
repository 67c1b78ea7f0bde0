//! Degrade expressions that are too expensive to translate.
//!
//! A fully structured expression can need an index query with a huge number
//! of boolean clauses. [`ExpressionRewriter::degrade_as_disjunction`] trades
//! precision for a single flat `Or` of bounded width while keeping the
//! result implied by the original expression.

use std::hash::Hash;
use std::rc::Rc;

use ahash::{AHashMap, AHashSet};

use super::{node_key, Expression};

/// Rewrites an expression into cheaper, weaker forms.
#[derive(Debug, Clone, Copy)]
pub struct ExpressionRewriter<'a, T> {
    expression: &'a Expression<T>,
}

impl<'a, T: Ord + Clone + Hash> ExpressionRewriter<'a, T> {
    pub fn new(expression: &'a Expression<T>) -> Self {
        ExpressionRewriter { expression }
    }

    /// Disjunction of at most `budget` leaves implied by the expression.
    ///
    /// Every distinct leaf, in depth-first first-seen order, when they fit in
    /// the budget. Otherwise the narrowest sound disjunction: an `And` only
    /// needs one of its children, so the child with the fewest leaves is
    /// picked (the first one on ties). When that does not fit either, or the
    /// expression can be satisfied without any leaf, the result is `True`.
    ///
    /// Only `False` degrades to `False`. Runs in time linear in the size of
    /// the distinct nodes, whatever [`Expression::count_clauses`] reports.
    pub fn degrade_as_disjunction(&self, budget: usize) -> Expression<T> {
        if self.expression.always_false() {
            return Expression::False;
        }
        if holds_without_leaves(self.expression, &mut AHashMap::new()) {
            return Expression::True;
        }

        let all = self.expression.leaves();
        if all.len() <= budget {
            return Expression::or(all.into_iter().cloned().map(Expression::Leaf));
        }

        let narrowest = match narrowest_disjunction(self.expression, &mut AHashMap::new()) {
            Some(leaves) if !leaves.is_empty() => leaves,
            // Only unsatisfiable branches: nothing to require.
            _ => return Expression::True,
        };
        if narrowest.len() <= budget {
            return Expression::or(narrowest.iter().cloned().map(Expression::Leaf));
        }
        tracing::debug!(
            budget,
            leaves = all.len(),
            narrowest = narrowest.len(),
            "expression too wide to degrade, dropping the filter"
        );
        Expression::True
    }
}

/// Whether the expression holds when no leaf is present.
fn holds_without_leaves<T>(expr: &Expression<T>, memo: &mut AHashMap<usize, bool>) -> bool {
    let (children, is_and) = match expr {
        Expression::True => return true,
        Expression::False | Expression::Leaf(_) => return false,
        Expression::And(children) => (children, true),
        Expression::Or(children) => (children, false),
    };
    let key = node_key(children);
    if let Some(&done) = memo.get(&key) {
        return done;
    }
    let result = if is_and {
        children.iter().all(|c| holds_without_leaves(c, memo))
    } else {
        children.iter().any(|c| holds_without_leaves(c, memo))
    };
    memo.insert(key, result);
    result
}

/// Smallest set of leaves whose disjunction the expression implies, or
/// `None` when the expression holds with no leaf present.
fn narrowest_disjunction<T: Ord + Clone + Hash>(
    expr: &Expression<T>,
    memo: &mut AHashMap<usize, Option<Rc<[T]>>>,
) -> Option<Rc<[T]>> {
    let (children, is_and) = match expr {
        Expression::True => return None,
        Expression::False => return Some(Rc::from(Vec::new())),
        Expression::Leaf(value) => return Some(Rc::from(vec![value.clone()])),
        Expression::And(children) => (children, true),
        Expression::Or(children) => (children, false),
    };
    let key = node_key(children);
    if let Some(done) = memo.get(&key) {
        return done.clone();
    }

    let result = if is_and {
        let mut best: Option<Rc<[T]>> = None;
        for child in children.iter() {
            if let Some(leaves) = narrowest_disjunction(child, memo) {
                if best.as_ref().map_or(true, |b| leaves.len() < b.len()) {
                    best = Some(leaves);
                }
            }
        }
        best
    } else {
        let mut parts = Vec::with_capacity(children.len());
        for child in children.iter() {
            match narrowest_disjunction(child, memo) {
                Some(leaves) => parts.push(leaves),
                None => {
                    memo.insert(key, None);
                    return None;
                }
            }
        }
        let mut seen = AHashSet::new();
        let mut union = Vec::new();
        for leaf in parts.iter().flat_map(|p| p.iter()) {
            if seen.insert(leaf) {
                union.push(leaf.clone());
            }
        }
        Some(Rc::from(union))
    };
    memo.insert(key, result.clone());
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::TOO_MANY_CLAUSES;

    fn leaf(s: &str) -> Expression<String> {
        Expression::leaf(s.to_string())
    }

    fn leaf_count(expr: &Expression<String>) -> usize {
        expr.leaves().len()
    }

    #[test]
    fn flattens_to_all_leaves_within_budget() {
        let expr = Expression::and([
            leaf("abc"),
            Expression::or([leaf("bcd"), Expression::and([leaf("xyz"), leaf("yzw")])]),
        ]);
        let degraded = ExpressionRewriter::new(&expr).degrade_as_disjunction(10);
        assert_eq!(
            degraded,
            Expression::or([leaf("abc"), leaf("bcd"), leaf("xyz"), leaf("yzw")])
        );
    }

    #[test]
    fn narrows_when_over_budget() {
        // abc AND (d1 OR d2 OR d3): "abc" alone is implied.
        let expr = Expression::and([
            leaf("abc"),
            Expression::or([leaf("d1"), leaf("d2"), leaf("d3")]),
        ]);
        let degraded = ExpressionRewriter::new(&expr).degrade_as_disjunction(2);
        assert_eq!(degraded, leaf("abc"));
    }

    #[test]
    fn unions_disjuncts_when_narrowing() {
        let expr = Expression::or([
            Expression::and([leaf("a1"), leaf("a2"), leaf("a3")]),
            Expression::and([leaf("b1"), leaf("b2")]),
        ]);
        let degraded = ExpressionRewriter::new(&expr).degrade_as_disjunction(2);
        assert_eq!(degraded, Expression::or([leaf("a1"), leaf("b1")]));
    }

    #[test]
    fn gives_up_when_even_narrowest_is_too_wide() {
        let expr = Expression::or([leaf("a"), leaf("b"), leaf("c")]);
        let degraded = ExpressionRewriter::new(&expr).degrade_as_disjunction(2);
        assert!(degraded.always_true());
    }

    #[test]
    fn true_and_false() {
        let t = Expression::<String>::True;
        let f = Expression::<String>::False;
        assert!(ExpressionRewriter::new(&t).degrade_as_disjunction(5).always_true());
        assert!(ExpressionRewriter::new(&f).degrade_as_disjunction(5).always_false());
    }

    #[test]
    fn true_branch_means_no_filter() {
        let expr = Expression::Or(vec![Expression::True, leaf("abc")].into());
        assert!(ExpressionRewriter::new(&expr)
            .degrade_as_disjunction(5)
            .always_true());
    }

    #[test]
    fn never_false_unless_input_false() {
        let expr = Expression::And(vec![Expression::False, leaf("abc")].into());
        let degraded = ExpressionRewriter::new(&expr).degrade_as_disjunction(0);
        assert!(!degraded.always_false());
    }

    #[test]
    fn zero_budget_drops_filter() {
        let expr = leaf("abc");
        assert!(ExpressionRewriter::new(&expr)
            .degrade_as_disjunction(0)
            .always_true());
    }

    #[test]
    fn wide_flat_or() {
        let expr = Expression::or((0..20_000).map(|i| leaf(&format!("g{:05}", i))));
        let rewriter = ExpressionRewriter::new(&expr);
        assert!(rewriter.degrade_as_disjunction(10).always_true());
        assert_eq!(leaf_count(&rewriter.degrade_as_disjunction(20_000)), 20_000);
    }

    #[test]
    fn shared_or_under_and() {
        // Two wide disjunctions and one leaf: the leaf alone is implied.
        let wide = Expression::or((0..5_000).map(|i| leaf(&format!("w{}", i))));
        let expr = Expression::and([
            Expression::or([wide.clone(), leaf("x")]),
            Expression::or([wide, leaf("y")]),
            leaf("abc"),
        ]);
        let degraded = ExpressionRewriter::new(&expr).degrade_as_disjunction(3);
        assert_eq!(degraded, leaf("abc"));
    }

    #[test]
    fn linear_in_distinct_nodes() {
        // Each layer reuses the previous one twice: 2^80 clauses, 160 leaves.
        let mut expr = Expression::or([leaf("start0"), leaf("start1")]);
        for i in 0..80 {
            let layer = Expression::or([leaf(&format!("l{}", i)), leaf(&format!("r{}", i))]);
            expr = Expression::and([expr.clone(), layer]);
            expr = Expression::or([expr.clone(), Expression::and([expr, leaf("tail")])]);
        }
        assert_eq!(expr.count_clauses(), TOO_MANY_CLAUSES);

        let degraded = ExpressionRewriter::new(&expr).degrade_as_disjunction(200);
        assert!(leaf_count(&degraded) <= 200);
        assert!(!degraded.always_false());
    }
}
