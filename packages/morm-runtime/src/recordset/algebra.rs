//! Set algebra over id sequences (§4.6 "Algebra"). Ids are compared by
//! their `bson::Bson` string form since `Bson` has no `Hash`/`Ord` impl;
//! ordering is otherwise always taken from the left-hand operand so these
//! stay stable regardless of backing-store order.

use std::collections::HashSet;

use bson::Bson;

/// Left-first union: every id of `a`, then every id of `b` not already
/// present, each kept in its original relative order.
#[must_use]
pub fn union(a: &[Bson], b: &[Bson]) -> Vec<Bson> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(a.len() + b.len());
    for id in a.iter().chain(b.iter()) {
        if seen.insert(id.to_string()) {
            out.push(id.clone());
        }
    }
    out
}

/// Ids present in both `a` and `b`, in `a`'s order.
#[must_use]
pub fn intersection(a: &[Bson], b: &[Bson]) -> Vec<Bson> {
    let b_set: HashSet<String> = b.iter().map(std::string::ToString::to_string).collect();
    a.iter().filter(|id| b_set.contains(&id.to_string())).cloned().collect()
}

/// Ids of `a` not present in `b`, in `a`'s order.
#[must_use]
pub fn difference(a: &[Bson], b: &[Bson]) -> Vec<Bson> {
    let b_set: HashSet<String> = b.iter().map(std::string::ToString::to_string).collect();
    a.iter().filter(|id| !b_set.contains(&id.to_string())).cloned().collect()
}

/// Plain concatenation, duplicates preserved.
#[must_use]
pub fn concat(a: &[Bson], b: &[Bson]) -> Vec<Bson> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    out.extend_from_slice(a);
    out.extend_from_slice(b);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[i64]) -> Vec<Bson> {
        values.iter().map(|v| Bson::Int64(*v)).collect()
    }

    #[test]
    fn union_preserves_left_first_order_and_dedups() {
        let a = ids(&[1, 2, 3]);
        let b = ids(&[3, 4]);
        assert_eq!(union(&a, &b), ids(&[1, 2, 3, 4]));
    }

    #[test]
    fn intersection_keeps_left_order() {
        let a = ids(&[3, 1, 2]);
        let b = ids(&[1, 2]);
        assert_eq!(intersection(&a, &b), ids(&[1, 2]));
    }

    #[test]
    fn difference_removes_right_hand_ids() {
        let a = ids(&[1, 2, 3]);
        let b = ids(&[2]);
        assert_eq!(difference(&a, &b), ids(&[1, 3]));
    }

    #[test]
    fn concat_keeps_duplicates() {
        let a = ids(&[1, 2]);
        let b = ids(&[2, 3]);
        assert_eq!(concat(&a, &b), ids(&[1, 2, 2, 3]));
    }
}
