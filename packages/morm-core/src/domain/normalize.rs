//! Rewrites a domain tree to negation-normal form: negations are pushed
//! down until they sit directly on a leaf, where they are absorbed into the
//! leaf's operator (`!=`, `not in`, `not like`, ...) whenever the operator
//! has a native complement. `child_of`, `overlap`, and `count` have none,
//! so a `Not` wrapping one of those leaves survives normalization.
//!
//! Adjacent `&`/`|` chains are also flattened (§4.3 "adjacent `&` chains
//! flattened"): `Domain::And`/`Domain::Or` stay binary (the parser always
//! produces a binary tree, and `compile_domain` only ever walks two
//! children at a time), but nested chains built by repeated `&`/`|` --
//! whether left- or right-associated, or rebuilt by repeated `push_not`
//! applications of De Morgan's law -- are re-associated into one canonical
//! right-leaning chain so that semantically identical trees compare equal.

use super::{Domain, Operator};

/// Normalizes `domain` to negation-normal form. Idempotent: normalizing an
/// already-normalized tree returns an equal tree.
#[must_use]
pub fn normalize(domain: &Domain) -> Domain {
    match domain {
        Domain::True => Domain::True,
        Domain::False => Domain::False,
        Domain::Leaf { path, op, value } => Domain::Leaf {
            path: path.clone(),
            op: *op,
            value: value.clone(),
        },
        Domain::And(l, r) => flatten_and(Domain::And(Box::new(normalize(l)), Box::new(normalize(r)))),
        Domain::Or(l, r) => flatten_or(Domain::Or(Box::new(normalize(l)), Box::new(normalize(r)))),
        Domain::Not(inner) => push_not(inner),
    }
}

/// Computes the negation of `domain`, pushing the negation as far down the
/// tree as operator complements allow.
fn push_not(domain: &Domain) -> Domain {
    match domain {
        Domain::True => Domain::False,
        Domain::False => Domain::True,
        Domain::Leaf { path, op, value } => match op.negate() {
            Some(negated) => Domain::Leaf {
                path: path.clone(),
                op: negated,
                value: value.clone(),
            },
            None => Domain::Not(Box::new(Domain::Leaf {
                path: path.clone(),
                op: *op,
                value: value.clone(),
            })),
        },
        // De Morgan: !(a & b) = !a | !b, !(a | b) = !a & !b.
        Domain::And(l, r) => flatten_or(Domain::Or(Box::new(push_not(l)), Box::new(push_not(r)))),
        Domain::Or(l, r) => flatten_and(Domain::And(Box::new(push_not(l)), Box::new(push_not(r)))),
        Domain::Not(inner) => normalize(inner),
    }
}

/// Flattens a chain of nested `Domain::And` nodes (in either associativity)
/// into one canonical right-leaning chain, dropping `True` (AND's identity
/// element) along the way. Leaf order is preserved left-to-right.
fn flatten_and(domain: Domain) -> Domain {
    let mut conjuncts = Vec::new();
    collect_and(domain, &mut conjuncts);
    rebuild_chain(conjuncts, Domain::And, Domain::True)
}

/// As [`flatten_and`], for `Domain::Or` chains (`False` is OR's identity).
fn flatten_or(domain: Domain) -> Domain {
    let mut disjuncts = Vec::new();
    collect_or(domain, &mut disjuncts);
    rebuild_chain(disjuncts, Domain::Or, Domain::False)
}

fn collect_and(domain: Domain, out: &mut Vec<Domain>) {
    match domain {
        Domain::And(l, r) => {
            collect_and(*l, out);
            collect_and(*r, out);
        }
        Domain::True => {}
        other => out.push(other),
    }
}

fn collect_or(domain: Domain, out: &mut Vec<Domain>) {
    match domain {
        Domain::Or(l, r) => {
            collect_or(*l, out);
            collect_or(*r, out);
        }
        Domain::False => {}
        other => out.push(other),
    }
}

/// Rebuilds a flat list of operands into a right-leaning binary chain using
/// `combine` (`Domain::And`/`Domain::Or`), falling back to `identity` for an
/// empty list.
fn rebuild_chain(
    mut operands: Vec<Domain>,
    combine: fn(Box<Domain>, Box<Domain>) -> Domain,
    identity: Domain,
) -> Domain {
    if operands.is_empty() {
        return identity;
    }
    if operands.len() == 1 {
        return operands.pop().expect("just checked len == 1");
    }
    let first = operands.remove(0);
    combine(Box::new(first), Box::new(rebuild_chain(operands, combine, identity)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn leaf(path: &str, op: Operator, value: Value) -> Domain {
        Domain::leaf(path, op, value)
    }

    #[test]
    fn negated_eq_becomes_ne() {
        let d = Domain::Not(Box::new(leaf("a", Operator::Eq, Value::Int(1))));
        assert_eq!(normalize(&d), leaf("a", Operator::Ne, Value::Int(1)));
    }

    #[test]
    fn de_morgan_pushes_not_through_and() {
        let d = Domain::Not(Box::new(Domain::And(
            Box::new(leaf("a", Operator::Eq, Value::Int(1))),
            Box::new(leaf("b", Operator::Gt, Value::Int(2))),
        )));
        let expected = Domain::Or(
            Box::new(leaf("a", Operator::Ne, Value::Int(1))),
            Box::new(leaf("b", Operator::Lte, Value::Int(2))),
        );
        assert_eq!(normalize(&d), expected);
    }

    #[test]
    fn double_negation_cancels() {
        let d = Domain::Not(Box::new(Domain::Not(Box::new(leaf(
            "a",
            Operator::Eq,
            Value::Int(1),
        )))));
        assert_eq!(normalize(&d), leaf("a", Operator::Eq, Value::Int(1)));
    }

    #[test]
    fn child_of_has_no_complement_and_stays_wrapped() {
        let d = Domain::Not(Box::new(leaf("parent_id", Operator::ChildOf, Value::Int(1))));
        let normalized = normalize(&d);
        assert!(matches!(normalized, Domain::Not(_)));
    }

    #[test]
    fn left_and_right_associated_and_chains_normalize_to_the_same_tree() {
        let a = leaf("a", Operator::Eq, Value::Int(1));
        let b = leaf("b", Operator::Eq, Value::Int(2));
        let c = leaf("c", Operator::Eq, Value::Int(3));
        let left_assoc = Domain::And(
            Box::new(Domain::And(Box::new(a.clone()), Box::new(b.clone()))),
            Box::new(c.clone()),
        );
        let right_assoc = Domain::And(Box::new(a), Box::new(Domain::And(Box::new(b), Box::new(c))));
        assert_eq!(normalize(&left_assoc), normalize(&right_assoc));
    }

    #[test]
    fn normalize_is_idempotent() {
        let d = Domain::Not(Box::new(Domain::Or(
            Box::new(leaf("a", Operator::Eq, Value::Int(1))),
            Box::new(Domain::Not(Box::new(leaf("b", Operator::In, Value::Array(vec![Value::Int(1)]))))),
        )));
        let once = normalize(&d);
        let twice = normalize(&once);
        assert_eq!(once, twice);
    }

    fn arb_op() -> impl proptest::strategy::Strategy<Value = Operator> {
        use proptest::prelude::*;
        prop_oneof![
            Just(Operator::Eq),
            Just(Operator::Ne),
            Just(Operator::Gt),
            Just(Operator::Gte),
            Just(Operator::Lt),
            Just(Operator::Lte),
        ]
    }

    fn arb_domain() -> impl proptest::strategy::Strategy<Value = Domain> {
        use proptest::prelude::*;
        let leaf = ("[a-c]", arb_op(), any::<i64>()).prop_map(|(path, op, v)| leaf(path, op, Value::Int(v)));
        leaf.prop_recursive(4, 32, 4, |inner| {
            prop_oneof![
                inner.clone().prop_map(|d| Domain::Not(Box::new(d))),
                (inner.clone(), inner.clone()).prop_map(|(l, r)| Domain::And(Box::new(l), Box::new(r))),
                (inner.clone(), inner).prop_map(|(l, r)| Domain::Or(Box::new(l), Box::new(r))),
            ]
        })
    }

    proptest::proptest! {
        #[test]
        fn normalize_is_idempotent_for_any_tree(d in arb_domain()) {
            let once = normalize(&d);
            let twice = normalize(&once);
            proptest::prop_assert_eq!(once, twice);
        }
    }
}
