//! Boolean requirement expressions over tokens.
//!
//! An [`Expression`] says which tokens (n-grams) a document must contain:
//! `And` needs every child, `Or` needs at least one, `True` needs nothing and
//! `False` can never be satisfied.
//!
//! Composite children form an ordered set: the constructors flatten nested
//! nodes of the same kind, drop duplicates and sort children canonically, so
//! `And`/`Or` equality is associative and commutative. Children live in a
//! shared `Arc<[_]>`; cloning a subtree is O(1).
//!
//! - **simplify** — subsumption, distribution and absorption rewriting
//! - **rewriter** — degrade an expression into a bounded disjunction

pub mod rewriter;
mod simplify;

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use ahash::AHashSet;

pub use rewriter::ExpressionRewriter;

/// Clause count returned when the real count does not fit in a `u64`.
pub const TOO_MANY_CLAUSES: u64 = u64::MAX;

/// Immutable boolean expression over tokens of type `T`.
///
/// Ordered `True < False < Leaf < And < Or`; leaves by value, composites
/// lexicographically by children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression<T> {
    True,
    False,
    Leaf(T),
    And(Arc<[Expression<T>]>),
    Or(Arc<[Expression<T>]>),
}

impl<T> Expression<T> {
    fn rank(&self) -> u8 {
        match self {
            Expression::True => 0,
            Expression::False => 1,
            Expression::Leaf(_) => 2,
            Expression::And(_) => 3,
            Expression::Or(_) => 4,
        }
    }
}

impl<T: Ord> Ord for Expression<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Expression::Leaf(a), Expression::Leaf(b)) => a.cmp(b),
            (Expression::And(a), Expression::And(b)) | (Expression::Or(a), Expression::Or(b)) => {
                // Shared subtrees compare equal without walking them.
                if Arc::ptr_eq(a, b) {
                    Ordering::Equal
                } else {
                    a.iter().cmp(b.iter())
                }
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl<T: Ord> PartialOrd for Expression<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Fold hook used by [`Expression::transform`].
///
/// Children are transformed before their parent.
pub trait ExpressionTransformer<T, R> {
    fn on_true(&mut self) -> R;
    fn on_false(&mut self) -> R;
    fn on_leaf(&mut self, value: &T) -> R;
    fn on_and(&mut self, children: Vec<R>) -> R;
    fn on_or(&mut self, children: Vec<R>) -> R;
}

/// Identity of a shared child slice, used to visit shared subtrees once.
pub(crate) fn node_key<T>(children: &Arc<[Expression<T>]>) -> usize {
    Arc::as_ptr(children) as *const Expression<T> as usize
}

impl<T> Expression<T> {
    pub fn always_true(&self) -> bool {
        matches!(self, Expression::True)
    }

    pub fn always_false(&self) -> bool {
        matches!(self, Expression::False)
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Expression::And(_) | Expression::Or(_))
    }

    pub fn as_leaf(&self) -> Option<&T> {
        match self {
            Expression::Leaf(value) => Some(value),
            _ => None,
        }
    }

    /// Children of a composite node; empty for everything else.
    pub fn children(&self) -> &[Expression<T>] {
        match self {
            Expression::And(children) | Expression::Or(children) => children,
            _ => &[],
        }
    }

    /// Number of leaf-containing paths through the tree.
    ///
    /// `And` multiplies the counts of its children, `Or` adds them. The
    /// result saturates at [`TOO_MANY_CLAUSES`].
    pub fn count_clauses(&self) -> u64 {
        let mut memo = ahash::AHashMap::new();
        count_clauses(self, &mut memo)
    }

    /// Fold the tree into another representation.
    pub fn transform<R>(&self, transformer: &mut impl ExpressionTransformer<T, R>) -> R {
        match self {
            Expression::True => transformer.on_true(),
            Expression::False => transformer.on_false(),
            Expression::Leaf(value) => transformer.on_leaf(value),
            Expression::And(children) => {
                let children = children.iter().map(|c| c.transform(transformer)).collect();
                transformer.on_and(children)
            }
            Expression::Or(children) => {
                let children = children.iter().map(|c| c.transform(transformer)).collect();
                transformer.on_or(children)
            }
        }
    }

    /// Would a document holding exactly the tokens for which `present`
    /// returns true satisfy this expression?
    pub fn evaluate(&self, present: &impl Fn(&T) -> bool) -> bool {
        match self {
            Expression::True => true,
            Expression::False => false,
            Expression::Leaf(value) => present(value),
            Expression::And(children) => children.iter().all(|c| c.evaluate(present)),
            Expression::Or(children) => children.iter().any(|c| c.evaluate(present)),
        }
    }
}

impl<T: Ord> Expression<T> {
    /// Distinct leaf values in depth-first, first-seen order.
    ///
    /// Shared subtrees are walked once, so this is linear in the number of
    /// distinct nodes even when [`count_clauses`](Self::count_clauses)
    /// saturates.
    pub fn leaves(&self) -> Vec<&T> {
        let mut seen_nodes = AHashSet::new();
        let mut seen_leaves = BTreeSet::new();
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            match expr {
                Expression::Leaf(value) => {
                    if seen_leaves.insert(value) {
                        out.push(value);
                    }
                }
                Expression::And(children) | Expression::Or(children) => {
                    if seen_nodes.insert(node_key(children)) {
                        stack.extend(children.iter().rev());
                    }
                }
                Expression::True | Expression::False => {}
            }
        }
        out
    }
}

impl<T: Ord + Clone> Expression<T> {
    pub fn leaf(value: T) -> Self {
        Expression::Leaf(value)
    }

    /// Conjunction of `children`.
    ///
    /// Nested `And`s are flattened and duplicates removed. No children gives
    /// `True`, a single child is returned as is.
    pub fn and(children: impl IntoIterator<Item = Expression<T>>) -> Self {
        compose(true, children)
    }

    /// Disjunction of `children`.
    ///
    /// Nested `Or`s are flattened and duplicates removed. No children gives
    /// `False`, a single child is returned as is.
    pub fn or(children: impl IntoIterator<Item = Expression<T>>) -> Self {
        compose(false, children)
    }

    pub fn map<U: Ord + Clone>(&self, mut f: impl FnMut(&T) -> U) -> Expression<U> {
        self.map_with(&mut f)
    }

    fn map_with<U: Ord + Clone>(&self, f: &mut impl FnMut(&T) -> U) -> Expression<U> {
        match self {
            Expression::True => Expression::True,
            Expression::False => Expression::False,
            Expression::Leaf(value) => Expression::Leaf(f(value)),
            Expression::And(children) => {
                Expression::and(children.iter().map(|c| c.map_with(f)).collect::<Vec<_>>())
            }
            Expression::Or(children) => {
                Expression::or(children.iter().map(|c| c.map_with(f)).collect::<Vec<_>>())
            }
        }
    }
}

fn compose<T: Ord + Clone>(
    is_and: bool,
    children: impl IntoIterator<Item = Expression<T>>,
) -> Expression<T> {
    let mut flat = Vec::new();
    for child in children {
        match child {
            Expression::And(nested) if is_and => flat.extend(nested.iter().cloned()),
            Expression::Or(nested) if !is_and => flat.extend(nested.iter().cloned()),
            other => flat.push(other),
        }
    }
    flat.sort_unstable();
    flat.dedup();

    match flat.len() {
        0 if is_and => Expression::True,
        0 => Expression::False,
        1 => flat.swap_remove(0),
        _ if is_and => Expression::And(flat.into()),
        _ => Expression::Or(flat.into()),
    }
}

fn count_clauses<T>(expr: &Expression<T>, memo: &mut ahash::AHashMap<usize, u64>) -> u64 {
    let (children, is_and) = match expr {
        Expression::True | Expression::False => return 0,
        Expression::Leaf(_) => return 1,
        Expression::And(children) => (children, true),
        Expression::Or(children) => (children, false),
    };
    let key = node_key(children);
    if let Some(&count) = memo.get(&key) {
        return count;
    }

    let count = if is_and {
        if children.iter().any(Expression::always_false) {
            0
        } else {
            children
                .iter()
                .map(|c| count_clauses(c, memo))
                .filter(|&n| n > 0)
                .fold(1u64, u64::saturating_mul)
        }
    } else {
        children
            .iter()
            .map(|c| count_clauses(c, memo))
            .fold(0u64, u64::saturating_add)
    };
    memo.insert(key, count);
    count
}

impl<T: fmt::Display> fmt::Display for Expression<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (children, op) = match self {
            Expression::True => return write!(f, "TRUE"),
            Expression::False => return write!(f, "FALSE"),
            Expression::Leaf(value) => return write!(f, "[{}]", value),
            Expression::And(children) => (children, " AND "),
            Expression::Or(children) => (children, " OR "),
        };
        write!(f, "(")?;
        for (i, child) in children.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", op)?;
            }
            write!(f, "{}", child)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(s: &str) -> Expression<String> {
        Expression::leaf(s.to_string())
    }

    #[test]
    fn constructors_flatten_and_dedup() {
        let nested = Expression::and([leaf("a"), Expression::and([leaf("b"), leaf("a")])]);
        assert_eq!(nested, Expression::and([leaf("b"), leaf("a")]));
        assert_eq!(nested.children().len(), 2);

        let nested = Expression::or([Expression::or([leaf("c"), leaf("a")]), leaf("b")]);
        assert_eq!(nested.children().len(), 3);
    }

    #[test]
    fn constructors_are_commutative() {
        assert_eq!(
            Expression::or([leaf("x"), leaf("y")]),
            Expression::or([leaf("y"), leaf("x")])
        );
        assert_eq!(
            Expression::and([leaf("x"), Expression::or([leaf("y"), leaf("z")])]),
            Expression::and([Expression::or([leaf("z"), leaf("y")]), leaf("x")])
        );
    }

    #[test]
    fn constructors_do_not_mix_kinds() {
        let expr = Expression::and([leaf("a"), Expression::or([leaf("b"), leaf("c")])]);
        assert_eq!(expr.children().len(), 2);
        assert!(expr.children().iter().any(|c| matches!(c, Expression::Or(_))));
    }

    #[test]
    fn empty_and_single_child() {
        assert!(Expression::<String>::and([]).always_true());
        assert!(Expression::<String>::or([]).always_false());
        assert_eq!(Expression::and([leaf("a")]), leaf("a"));
        assert_eq!(Expression::or([leaf("a"), leaf("a")]), leaf("a"));
    }

    #[test]
    fn structural_predicates() {
        assert!(Expression::<String>::True.always_true());
        assert!(!Expression::<String>::True.always_false());
        assert!(Expression::<String>::False.always_false());
        assert!(!leaf("a").is_composite());
        assert!(Expression::and([leaf("a"), leaf("b")]).is_composite());
        assert_eq!(leaf("a").as_leaf().map(String::as_str), Some("a"));
    }

    #[test]
    fn count_clauses_basic() {
        assert_eq!(Expression::<String>::True.count_clauses(), 0);
        assert_eq!(Expression::<String>::False.count_clauses(), 0);
        assert_eq!(leaf("a").count_clauses(), 1);
        assert_eq!(Expression::and([leaf("a"), leaf("b")]).count_clauses(), 1);
        assert_eq!(Expression::or([leaf("a"), leaf("b")]).count_clauses(), 2);

        // (a OR b) AND (c OR d OR e) → 2 * 3
        let expr = Expression::and([
            Expression::or([leaf("a"), leaf("b")]),
            Expression::or([leaf("c"), leaf("d"), leaf("e")]),
        ]);
        assert_eq!(expr.count_clauses(), 6);
    }

    #[test]
    fn count_clauses_saturates() {
        // 70 conjuncts of 2-way disjunctions: 2^70 clauses.
        let conjuncts: Vec<_> = (0..70)
            .map(|i| Expression::or([leaf(&format!("a{}", i)), leaf(&format!("b{}", i))]))
            .collect();
        let expr = Expression::and(conjuncts);
        assert_eq!(expr.count_clauses(), TOO_MANY_CLAUSES);

        let wider = Expression::or([expr, leaf("z")]);
        assert_eq!(wider.count_clauses(), TOO_MANY_CLAUSES);
    }

    #[test]
    fn evaluate_against_token_set() {
        let expr = Expression::and([leaf("a"), Expression::or([leaf("b"), leaf("c")])]);
        let doc = |tokens: &'static [&'static str]| move |t: &String| tokens.contains(&t.as_str());
        assert!(expr.evaluate(&doc(&["a", "c"])));
        assert!(!expr.evaluate(&doc(&["a"])));
        assert!(!expr.evaluate(&doc(&["b", "c"])));
        assert!(Expression::<String>::True.evaluate(&doc(&[])));
        assert!(!Expression::<String>::False.evaluate(&doc(&["a"])));
    }

    #[test]
    fn leaves_in_first_seen_order() {
        let shared = Expression::or([leaf("x"), leaf("y")]);
        let expr = Expression::and([
            leaf("a"),
            Expression::and([shared.clone(), leaf("b")]),
            Expression::or([shared, leaf("a")]),
        ]);
        let leaves: Vec<&str> = expr.leaves().into_iter().map(String::as_str).collect();
        assert_eq!(leaves.len(), 4);
        assert_eq!(leaves[0], "a");
        for l in ["b", "x", "y"] {
            assert!(leaves.contains(&l));
        }
    }

    struct QueryString;

    impl ExpressionTransformer<String, String> for QueryString {
        fn on_true(&mut self) -> String {
            "*".to_string()
        }
        fn on_false(&mut self) -> String {
            "-*".to_string()
        }
        fn on_leaf(&mut self, value: &String) -> String {
            format!("ngram:{}", value)
        }
        fn on_and(&mut self, children: Vec<String>) -> String {
            format!("({})", children.join(" && "))
        }
        fn on_or(&mut self, children: Vec<String>) -> String {
            format!("({})", children.join(" || "))
        }
    }

    #[test]
    fn transform_builds_foreign_representation() {
        let expr = Expression::and([leaf("abc"), Expression::or([leaf("bcd"), leaf("xyz")])]);
        assert_eq!(
            expr.transform(&mut QueryString),
            "(ngram:abc && (ngram:bcd || ngram:xyz))"
        );
        assert_eq!(Expression::<String>::True.transform(&mut QueryString), "*");
    }

    #[test]
    fn map_re_canonicalizes() {
        let expr = Expression::or([leaf("ABC"), leaf("abc")]);
        let lowered = expr.map(|s| s.to_lowercase());
        assert_eq!(lowered, leaf("abc"));
    }

    #[test]
    fn display() {
        let expr = Expression::and([leaf("a"), Expression::or([leaf("b"), leaf("c")])]);
        assert_eq!(expr.to_string(), "([a] AND ([b] OR [c]))");
        assert_eq!(Expression::<String>::True.to_string(), "TRUE");
    }

    #[test]
    fn expressions_are_send_and_sync() {
        fn assert_send_sync<S: Send + Sync>() {}
        assert_send_sync::<Expression<String>>();
    }
}
