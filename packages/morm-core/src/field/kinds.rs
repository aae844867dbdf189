//! The closed set of field kinds a model may declare, per §3/§4.4.

/// Target-model reference carried by a relational field kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationSpec {
    /// Name of the model this relation points at.
    pub target: String,
    /// Name of the field on `target` that mirrors this relation, if any.
    /// `one2many` always carries one; `many2many` and `one2one` may.
    pub inverse: Option<String>,
    /// Name of the intermediate junction collection for `many2many`.
    pub through: Option<String>,
}

impl RelationSpec {
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            inverse: None,
            through: None,
        }
    }

    #[must_use]
    pub fn with_inverse(mut self, inverse: impl Into<String>) -> Self {
        self.inverse = Some(inverse.into());
        self
    }

    #[must_use]
    pub fn with_through(mut self, through: impl Into<String>) -> Self {
        self.through = Some(through.into());
        self
    }
}

/// The declared shape of a field's value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Float,
    Decimal,
    Boolean,
    DateTime,
    Date,
    Time,
    Uuid,
    ObjectId,
    Enum(Vec<String>),
    Json,
    File,
    List(Box<FieldKind>),
    Set(Box<FieldKind>),
    Tuple(Vec<FieldKind>),
    Dict(Box<FieldKind>, Box<FieldKind>),
    Embedded(String),
    Many2One(RelationSpec),
    One2Many(RelationSpec),
    Many2Many(RelationSpec),
    One2One(RelationSpec),
}

impl FieldKind {
    /// Human-readable name used in error messages and domain compile errors.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::Decimal => "decimal",
            FieldKind::Boolean => "boolean",
            FieldKind::DateTime => "datetime",
            FieldKind::Date => "date",
            FieldKind::Time => "time",
            FieldKind::Uuid => "uuid",
            FieldKind::ObjectId => "objectid",
            FieldKind::Enum(_) => "enum",
            FieldKind::Json => "json",
            FieldKind::File => "file",
            FieldKind::List(_) => "list",
            FieldKind::Set(_) => "set",
            FieldKind::Tuple(_) => "tuple",
            FieldKind::Dict(_, _) => "dict",
            FieldKind::Embedded(_) => "embedded",
            FieldKind::Many2One(_) => "many2one",
            FieldKind::One2Many(_) => "one2many",
            FieldKind::Many2Many(_) => "many2many",
            FieldKind::One2One(_) => "one2one",
        }
    }

    /// Relations that live in a foreign collection and therefore require a
    /// `$lookup` stage when traversed in a domain expression.
    #[must_use]
    pub fn is_cross_collection_relation(&self) -> bool {
        matches!(
            self,
            FieldKind::Many2One(_)
                | FieldKind::One2Many(_)
                | FieldKind::Many2Many(_)
                | FieldKind::One2One(_)
        )
    }

    #[must_use]
    pub fn relation_spec(&self) -> Option<&RelationSpec> {
        match self {
            FieldKind::Many2One(r)
            | FieldKind::One2Many(r)
            | FieldKind::Many2Many(r)
            | FieldKind::One2One(r) => Some(r),
            _ => None,
        }
    }

    /// Relations (or embeddeds) that yield more than one value per record,
    /// and so are addressable with `count`/`overlap` domain operators.
    #[must_use]
    pub fn is_multi_valued(&self) -> bool {
        matches!(
            self,
            FieldKind::List(_)
                | FieldKind::Set(_)
                | FieldKind::One2Many(_)
                | FieldKind::Many2Many(_)
        )
    }
}
