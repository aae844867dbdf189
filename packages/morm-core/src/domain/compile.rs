//! Compiles a normalized [`Domain`] tree to a MongoDB filter document, plus
//! any aggregation pipeline stages (`$lookup`/`$unwind`/`$addFields`) that
//! must run before the resulting `$match`.
//!
//! Direct field comparisons compile to a plain filter usable with `find()`.
//! Traversing a relation or using `count` requires an aggregation pipeline:
//! callers should check whether [`CompiledQuery::pre_stages`] is empty to
//! decide between `find(filter)` and `aggregate(pre_stages + [{$match: filter}])`.

use bson::{doc, Bson, Document};

use super::{Domain, Operator};
use crate::error::DomainError;
use crate::field::kinds::FieldKind;
use crate::value::Value;

/// Looks up field declarations and collection names while compiling a
/// domain. Implemented by the frozen model registry.
pub trait FieldResolver {
    /// # Errors
    /// Returns [`DomainError::FieldNotFound`] if `model` has no field named
    /// `field`.
    fn field_kind(&self, model: &str, field: &str) -> Result<FieldKind, DomainError>;

    /// # Errors
    /// Returns [`DomainError::UnknownRelationTarget`] if `model` is not a
    /// registered model.
    fn collection_name(&self, model: &str) -> Result<String, DomainError>;
}

/// The compiled result of a domain expression: a filter usable in a
/// `$match`, plus any pipeline stages that must run first.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub filter: Document,
    pub pre_stages: Vec<Document>,
}

/// Compiles `domain` (evaluated against `model`) to a filter and its
/// supporting pipeline stages.
///
/// # Errors
/// See [`DomainError`]. In particular, a `child_of` leaf must be expanded
/// to an `In` leaf by the runtime (which has store access) before this is
/// called; encountering one here returns
/// [`DomainError::UnexpandedChildOf`].
pub fn compile_domain(
    domain: &Domain,
    model: &str,
    resolver: &dyn FieldResolver,
) -> Result<CompiledQuery, DomainError> {
    match domain {
        Domain::True => Ok(CompiledQuery {
            filter: Document::new(),
            pre_stages: Vec::new(),
        }),
        Domain::False => Ok(CompiledQuery {
            filter: doc! { "$expr": false },
            pre_stages: Vec::new(),
        }),
        Domain::Leaf { path, op, value } => compile_leaf(model, path, *op, value, resolver),
        Domain::And(l, r) => {
            let cl = compile_domain(l, model, resolver)?;
            let cr = compile_domain(r, model, resolver)?;
            let mut stages = cl.pre_stages;
            stages.extend(cr.pre_stages);
            Ok(CompiledQuery {
                filter: doc! { "$and": [Bson::Document(cl.filter), Bson::Document(cr.filter)] },
                pre_stages: stages,
            })
        }
        Domain::Or(l, r) => {
            let cl = compile_domain(l, model, resolver)?;
            let cr = compile_domain(r, model, resolver)?;
            let mut stages = cl.pre_stages;
            stages.extend(cr.pre_stages);
            Ok(CompiledQuery {
                filter: doc! { "$or": [Bson::Document(cl.filter), Bson::Document(cr.filter)] },
                pre_stages: stages,
            })
        }
        Domain::Not(inner) => {
            let c = compile_domain(inner, model, resolver)?;
            Ok(CompiledQuery {
                filter: doc! { "$nor": [Bson::Document(c.filter)] },
                pre_stages: c.pre_stages,
            })
        }
    }
}

fn compile_leaf(
    model: &str,
    path: &str,
    op: Operator,
    value: &Value,
    resolver: &dyn FieldResolver,
) -> Result<CompiledQuery, DomainError> {
    if op == Operator::ChildOf {
        return Err(DomainError::UnexpandedChildOf);
    }
    let segments: Vec<&str> = path.split('.').collect();
    compile_segments(model, &segments, op, value, resolver, "")
}

fn compile_segments(
    model: &str,
    segments: &[&str],
    op: Operator,
    value: &Value,
    resolver: &dyn FieldResolver,
    prefix: &str,
) -> Result<CompiledQuery, DomainError> {
    let head = segments[0];
    let kind = resolver.field_kind(model, head)?;
    let store_key = if prefix.is_empty() {
        head.to_string()
    } else {
        format!("{prefix}.{head}")
    };

    if segments.len() == 1 {
        if op == Operator::Count {
            if !kind.is_multi_valued() {
                return Err(DomainError::OperatorNotSupported {
                    operator: "count".to_string(),
                    field: store_key,
                    kind: kind.name().to_string(),
                });
            }
            let count_field = format!("__count_{head}");
            let add_fields = doc! {
                "$addFields": { count_field.clone(): { "$size": format!("${store_key}") } }
            };
            let cmp = compile_comparison(&count_field, Operator::Eq, value)?;
            return Ok(CompiledQuery {
                filter: cmp,
                pre_stages: vec![add_fields],
            });
        }
        let filter = compile_comparison(&store_key, op, value)?;
        return Ok(CompiledQuery {
            filter,
            pre_stages: Vec::new(),
        });
    }

    match &kind {
        FieldKind::Embedded(target) => {
            compile_segments(target, &segments[1..], op, value, resolver, &store_key)
        }
        _ if kind.is_cross_collection_relation() => {
            let rel = kind
                .relation_spec()
                .expect("cross-collection relation kind carries a RelationSpec");
            let collection = resolver.collection_name(&rel.target)?;
            let alias = format!("__lookup_{store_key}").replace('.', "_");
            let mut stages = vec![doc! {
                "$lookup": {
                    "from": collection,
                    "localField": store_key.clone(),
                    "foreignField": "_id",
                    "as": alias.clone(),
                }
            }];
            if matches!(kind, FieldKind::Many2One(_) | FieldKind::One2One(_)) {
                stages.push(doc! {
                    "$unwind": { "path": format!("${alias}"), "preserveNullAndEmptyArrays": true }
                });
            }
            let inner = compile_segments(&rel.target, &segments[1..], op, value, resolver, &alias)?;
            stages.extend(inner.pre_stages);
            Ok(CompiledQuery {
                filter: inner.filter,
                pre_stages: stages,
            })
        }
        _ => Err(DomainError::OperatorNotSupported {
            operator: format!("{op:?}"),
            field: store_key,
            kind: kind.name().to_string(),
        }),
    }
}

fn compile_comparison(store_key: &str, op: Operator, value: &Value) -> Result<Document, DomainError> {
    let to_bson = |v: &Value| {
        Bson::try_from(v).map_err(|e| DomainError::ValueCoercion {
            field: store_key.to_string(),
            value: format!("{e}"),
        })
    };
    Ok(match op {
        Operator::Eq => doc! { store_key: to_bson(value)? },
        Operator::Ne => doc! { store_key: { "$ne": to_bson(value)? } },
        Operator::Gt => doc! { store_key: { "$gt": to_bson(value)? } },
        Operator::Gte => doc! { store_key: { "$gte": to_bson(value)? } },
        Operator::Lt => doc! { store_key: { "$lt": to_bson(value)? } },
        Operator::Lte => doc! { store_key: { "$lte": to_bson(value)? } },
        Operator::Like => doc! { store_key: { "$regex": like_pattern(store_key, value)? } },
        Operator::Ilike => {
            doc! { store_key: { "$regex": like_pattern(store_key, value)?, "$options": "i" } }
        }
        Operator::NotLike => {
            doc! { store_key: { "$not": { "$regex": like_pattern(store_key, value)? } } }
        }
        Operator::NotIlike => doc! {
            store_key: { "$not": { "$regex": like_pattern(store_key, value)?, "$options": "i" } }
        },
        Operator::In | Operator::Overlap => doc! { store_key: { "$in": to_bson(value)? } },
        Operator::NotIn => doc! { store_key: { "$nin": to_bson(value)? } },
        Operator::IsNull => doc! { store_key: Bson::Null },
        Operator::IsNotNull => doc! { store_key: { "$ne": Bson::Null } },
        Operator::Count | Operator::ChildOf => {
            unreachable!("count and child_of are handled by the caller before reaching this point")
        }
    })
}

fn is_regex_meta(c: char) -> bool {
    matches!(
        c,
        '.' | '^' | '$' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '\\'
    )
}

/// Translates a SQL-style `LIKE` pattern (`%` = any run, `_` = any one
/// character) into an anchored regular expression, escaping literal regex
/// metacharacters along the way.
fn like_pattern(field: &str, value: &Value) -> Result<String, DomainError> {
    let Value::String(s) = value else {
        return Err(DomainError::ValueCoercion {
            field: field.to_string(),
            value: format!("{value:?} (like requires a string pattern)"),
        });
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push('^');
    for ch in s.chars() {
        match ch {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            c if is_regex_meta(c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push('$');
    Ok(out)
}
