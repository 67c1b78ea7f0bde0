//! Expression simplification.
//!
//! One pass rewrites the tree bottom-up:
//!
//! - `False` absorbs an `And`, `True` absorbs an `Or`; `True` inside an `And`
//!   and `False` inside an `Or` are dropped.
//! - Inside an `Or`, every child is read as a clause (the set of conjuncts of
//!   an `And`, or the child itself). A child whose clause contains another
//!   child's clause is implied by it and removed.
//! - Factors shared by every clause of an `Or` are pulled out:
//!   `(f AND g) OR (f AND h)` becomes `f AND (g OR h)`.
//! - Inside an `And`, an `Or` that has one of its sibling conjuncts as a
//!   disjunct is already satisfied and removed.
//!
//! Every rule strictly shrinks the tree, and `simplify` repeats passes until
//! one changes nothing, so the result is a fixed point.

use ahash::AHashMap;

use super::{node_key, Expression};

impl<T: Ord + Clone> Expression<T> {
    /// Rewrite to an equivalent, smaller expression. Idempotent.
    pub fn simplify(&self) -> Self {
        let mut current = self.clone();
        loop {
            let mut memo = AHashMap::new();
            let next = pass(&current, &mut memo);
            if next == current {
                return next;
            }
            current = next;
        }
    }
}

type Memo<T> = AHashMap<usize, Expression<T>>;

fn pass<T: Ord + Clone>(expr: &Expression<T>, memo: &mut Memo<T>) -> Expression<T> {
    let (children, is_and) = match expr {
        Expression::And(children) => (children, true),
        Expression::Or(children) => (children, false),
        leafish => return leafish.clone(),
    };
    let key = node_key(children);
    if let Some(done) = memo.get(&key) {
        return done.clone();
    }

    let simplified: Vec<Expression<T>> = children.iter().map(|c| pass(c, memo)).collect();
    let result = if is_and {
        simplify_and(simplified)
    } else {
        simplify_or(simplified)
    };
    memo.insert(key, result.clone());
    result
}

fn simplify_and<T: Ord + Clone>(children: Vec<Expression<T>>) -> Expression<T> {
    if children.iter().any(Expression::always_false) {
        return Expression::False;
    }
    let flat = Expression::and(children.into_iter().filter(|c| !c.always_true()));
    let conjuncts = match &flat {
        Expression::And(conjuncts) => conjuncts,
        _ => return flat,
    };

    // x AND (x OR y) == x
    let kept: Vec<Expression<T>> = conjuncts
        .iter()
        .filter(|c| match c {
            Expression::Or(disjuncts) => !disjuncts
                .iter()
                .any(|d| conjuncts.binary_search(d).is_ok()),
            _ => true,
        })
        .cloned()
        .collect();
    if kept.len() == conjuncts.len() {
        return flat;
    }
    Expression::and(kept)
}

fn simplify_or<T: Ord + Clone>(children: Vec<Expression<T>>) -> Expression<T> {
    if children.iter().any(Expression::always_true) {
        return Expression::True;
    }
    let flat = Expression::or(children.into_iter().filter(|c| !c.always_false()));
    let disjuncts = match &flat {
        Expression::Or(disjuncts) => disjuncts,
        _ => return flat,
    };

    let clauses: Vec<&[Expression<T>]> = disjuncts.iter().map(clause).collect();

    // Drop every clause that is a superset of another one. Clauses of
    // distinct canonical children are distinct, so "superset" is strict.
    let kept: Vec<usize> = (0..clauses.len())
        .filter(|&i| {
            !(0..clauses.len()).any(|j| {
                j != i && clauses[j].len() < clauses[i].len() && is_subset(clauses[j], clauses[i])
            })
        })
        .collect();
    if kept.len() == 1 {
        return disjuncts[kept[0]].clone();
    }

    // Factors common to every remaining clause.
    let common: Vec<&Expression<T>> = clauses[kept[0]]
        .iter()
        .filter(|f| kept[1..].iter().all(|&k| clauses[k].binary_search(*f).is_ok()))
        .collect();

    if common.is_empty() {
        if kept.len() == disjuncts.len() {
            return flat;
        }
        return Expression::or(kept.iter().map(|&k| disjuncts[k].clone()).collect::<Vec<_>>());
    }

    let rests: Vec<Expression<T>> = kept
        .iter()
        .map(|&k| {
            Expression::and(
                clauses[k]
                    .iter()
                    .filter(|f| common.binary_search(f).is_err())
                    .cloned()
                    .collect::<Vec<_>>(),
            )
        })
        .collect();

    let mut factored: Vec<Expression<T>> = common.into_iter().cloned().collect();
    factored.push(Expression::or(rests));
    Expression::and(factored)
}

/// Conjuncts of an `Or` child, sorted.
fn clause<T>(expr: &Expression<T>) -> &[Expression<T>] {
    match expr {
        Expression::And(conjuncts) => conjuncts,
        other => std::slice::from_ref(other),
    }
}

/// `small ⊆ large` for sorted, deduplicated slices.
fn is_subset<T: Ord>(small: &[T], large: &[T]) -> bool {
    let mut large = large.iter();
    'outer: for s in small {
        for l in large.by_ref() {
            match l.cmp(s) {
                std::cmp::Ordering::Less => continue,
                std::cmp::Ordering::Equal => continue 'outer,
                std::cmp::Ordering::Greater => return false,
            }
        }
        return false;
    }
    true
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    const TOKENS: [&str; 5] = ["a", "b", "c", "d", "e"];

    fn arb_expression() -> impl Strategy<Value = Expression<String>> {
        let leaf = prop_oneof![
            1 => Just(Expression::True),
            1 => Just(Expression::False),
            8 => (0..TOKENS.len()).prop_map(|i| Expression::leaf(TOKENS[i].to_string())),
        ];
        leaf.prop_recursive(4, 48, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 1..4).prop_map(Expression::and),
                prop::collection::vec(inner, 1..4).prop_map(Expression::or),
            ]
        })
    }

    fn all_assignments() -> impl Iterator<Item = Vec<&'static str>> {
        (0u32..(1 << TOKENS.len())).map(|mask| {
            TOKENS
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, t)| *t)
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_simplify_idempotent(expr in arb_expression()) {
            let once = expr.simplify();
            prop_assert_eq!(once.simplify(), once);
        }

        #[test]
        fn prop_simplify_preserves_truth(expr in arb_expression()) {
            let simplified = expr.simplify();
            for present in all_assignments() {
                let has = |t: &String| present.contains(&t.as_str());
                prop_assert_eq!(expr.evaluate(&has), simplified.evaluate(&has));
            }
        }

        #[test]
        fn prop_simplify_never_adds_leaves(expr in arb_expression()) {
            let simplified = expr.simplify();
            prop_assert!(simplified.leaves().len() <= expr.leaves().len());
        }
    }
}
