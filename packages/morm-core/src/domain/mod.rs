//! The domain expression language: a prefix-notation filter tree parsed
//! from a flat token list, normalized to negation-normal form, and compiled
//! to a `bson::Document` filter (plus, for relation/aggregate operators,
//! pipeline stages that must precede the `$match`).

pub mod aggregate;
pub mod compile;
pub mod normalize;
pub mod parser;

use crate::value::Value;

pub use aggregate::{AggregateBuilder, FrameBound, FrameKind, WindowBuilder};
pub use compile::{compile_domain, CompiledQuery};
pub use normalize::normalize;
pub use parser::{parse, serialize, DomainToken};

/// Comparison/membership operator carried by a domain leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Ilike,
    NotLike,
    NotIlike,
    In,
    NotIn,
    IsNull,
    IsNotNull,
    ChildOf,
    Overlap,
    Count,
}

impl Operator {
    /// The De Morgan complement of this operator, when one exists as a
    /// single operator (used to push negations down to leaves during
    /// normalization). `child_of`, `overlap`, and `count` have no native
    /// complement and are left wrapped in `Domain::Not`.
    #[must_use]
    pub fn negate(self) -> Option<Operator> {
        Some(match self {
            Operator::Eq => Operator::Ne,
            Operator::Ne => Operator::Eq,
            Operator::Gt => Operator::Lte,
            Operator::Gte => Operator::Lt,
            Operator::Lt => Operator::Gte,
            Operator::Lte => Operator::Gt,
            Operator::Like => Operator::NotLike,
            Operator::NotLike => Operator::Like,
            Operator::Ilike => Operator::NotIlike,
            Operator::NotIlike => Operator::Ilike,
            Operator::In => Operator::NotIn,
            Operator::NotIn => Operator::In,
            Operator::IsNull => Operator::IsNotNull,
            Operator::IsNotNull => Operator::IsNull,
            Operator::ChildOf | Operator::Overlap | Operator::Count => return None,
        })
    }
}

/// A parsed, tree-shaped domain expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Domain {
    /// Empty domain: matches every record.
    True,
    /// Unsatisfiable domain: matches no record. Only produced by
    /// negating `True` during normalization.
    False,
    Leaf {
        path: String,
        op: Operator,
        value: Value,
    },
    And(Box<Domain>, Box<Domain>),
    Or(Box<Domain>, Box<Domain>),
    Not(Box<Domain>),
}

impl Domain {
    #[must_use]
    pub fn leaf(path: impl Into<String>, op: Operator, value: Value) -> Self {
        Domain::Leaf {
            path: path.into(),
            op,
            value,
        }
    }

    #[must_use]
    pub fn and(self, other: Domain) -> Self {
        match (self, other) {
            (Domain::True, d) | (d, Domain::True) => d,
            (a, b) => Domain::And(Box::new(a), Box::new(b)),
        }
    }

    #[must_use]
    pub fn or(self, other: Domain) -> Self {
        match (self, other) {
            (Domain::False, d) | (d, Domain::False) => d,
            (a, b) => Domain::Or(Box::new(a), Box::new(b)),
        }
    }

    #[must_use]
    pub fn not(self) -> Self {
        Domain::Not(Box::new(self))
    }

    /// Walks the tree collecting every leaf using the `child_of` operator,
    /// which `compile_domain` cannot resolve on its own: the runtime must
    /// expand each one to an `In` leaf over the transitive id closure before
    /// calling compile.
    #[must_use]
    pub fn child_of_leaves(&self) -> Vec<(&str, &Value)> {
        let mut out = Vec::new();
        fn walk<'a>(d: &'a Domain, out: &mut Vec<(&'a str, &'a Value)>) {
            match d {
                Domain::Leaf {
                    path,
                    op: Operator::ChildOf,
                    value,
                } => out.push((path.as_str(), value)),
                Domain::And(l, r) | Domain::Or(l, r) => {
                    walk(l, out);
                    walk(r, out);
                }
                Domain::Not(inner) => walk(inner, out),
                _ => {}
            }
        }
        walk(self, &mut out);
        out
    }
}
