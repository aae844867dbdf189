//! Parses a flat, prefix-notation token list into a [`Domain`] tree, and
//! serializes a tree back to that flat form. Combinators (`&`, `|`, `!`)
//! consume the next 2, 2, or 1 already-parsed operands respectively;
//! whatever operands remain uncombined at the top level are implicitly
//! ANDed together, matching the conventional domain-list convention.

use super::{Domain, Operator};
use crate::error::DomainError;
use crate::value::Value;

/// One token of the flat domain representation.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainToken {
    And,
    Or,
    Not,
    Leaf(String, Operator, Value),
}

struct Cursor<'a> {
    tokens: &'a [DomainToken],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn next_expr(&mut self) -> Result<Domain, DomainError> {
        let token = self.tokens.get(self.pos).ok_or(DomainError::UnexpectedEnd)?;
        self.pos += 1;
        match token {
            DomainToken::And => {
                let l = self.next_expr()?;
                let r = self.next_expr()?;
                Ok(Domain::And(Box::new(l), Box::new(r)))
            }
            DomainToken::Or => {
                let l = self.next_expr()?;
                let r = self.next_expr()?;
                Ok(Domain::Or(Box::new(l), Box::new(r)))
            }
            DomainToken::Not => {
                let inner = self.next_expr()?;
                Ok(Domain::Not(Box::new(inner)))
            }
            DomainToken::Leaf(path, op, value) => Ok(Domain::Leaf {
                path: path.clone(),
                op: *op,
                value: value.clone(),
            }),
        }
    }
}

/// Parses a flat domain token list into a tree.
///
/// # Errors
/// Returns [`DomainError::UnexpectedEnd`] if a combinator runs out of
/// operands, or if trailing combinators consume past the end of the list.
pub fn parse(tokens: &[DomainToken]) -> Result<Domain, DomainError> {
    if tokens.is_empty() {
        return Ok(Domain::True);
    }
    let mut cursor = Cursor { tokens, pos: 0 };
    let mut exprs = Vec::new();
    while cursor.pos < cursor.tokens.len() {
        exprs.push(cursor.next_expr()?);
    }
    let mut iter = exprs.into_iter();
    let first = iter.next().expect("non-empty token list yields at least one expression");
    Ok(iter.fold(first, |acc, next| Domain::And(Box::new(acc), Box::new(next))))
}

/// Serializes a tree back to its flat prefix-notation form. `parse` and
/// `serialize` round-trip for any tree built without `Domain::False` (which
/// has no token representation, since it only arises from normalizing a
/// negated `True`).
#[must_use]
pub fn serialize(domain: &Domain) -> Vec<DomainToken> {
    match domain {
        Domain::True => Vec::new(),
        Domain::False => vec![DomainToken::Not],
        Domain::Leaf { path, op, value } => {
            vec![DomainToken::Leaf(path.clone(), *op, value.clone())]
        }
        Domain::And(l, r) => {
            let mut out = vec![DomainToken::And];
            out.extend(serialize(l));
            out.extend(serialize(r));
            out
        }
        Domain::Or(l, r) => {
            let mut out = vec![DomainToken::Or];
            out.extend(serialize(l));
            out.extend(serialize(r));
            out
        }
        Domain::Not(inner) => {
            let mut out = vec![DomainToken::Not];
            out.extend(serialize(inner));
            out
        }
    }
}
