//! morm-core -- the storage-independent half of the morm async ORM runtime.
//!
//! This crate has no I/O and no `tokio` dependency; everything here is
//! pure data and pure functions, so it can be unit- and property-tested
//! without a database:
//!
//! - **Value** ([`value`]): the dynamic `Value` enum and its BSON mapping
//! - **Error** ([`error`]): registry/validation/domain error taxonomies
//! - **Field** ([`field`]): field kinds, the per-field validation chain,
//!   and computed-field dependency graphs
//! - **Domain** ([`domain`]): the prefix-notation filter language --
//!   parse, normalize to NNF, and compile to a BSON filter + pipeline
//! - **Registry** ([`registry`]): model registration, inheritance
//!   resolution, and relation-graph validation, frozen into an immutable
//!   [`registry::FrozenRegistry`]

pub mod domain;
pub mod error;
pub mod field;
pub mod registry;
pub mod value;

pub use domain::{
    compile_domain, normalize, parse, serialize, AggregateBuilder, CompiledQuery, Domain,
    DomainToken, FrameBound, FrameKind, Operator, WindowBuilder,
};
pub use error::{DomainError, RegistryError, ValidationError, ValidationReason};
pub use field::{ComputeSpec, Field, FieldKind, FileConstraints, FileValidator, RecordLike, RelationSpec};
pub use registry::{CrossFieldValidator, FrozenRegistry, IndexSpec, Model, ModelMeta, RegistryBuilder};
pub use value::{Value, ValueCoercionError};
