//! Aggregate and window operation builders (§4.3): a fluent, `#[must_use]`
//! step-by-step builder in the same style as [`crate::field::kinds::RelationSpec`]
//! and [`crate::field::Field`], compiling to MongoDB aggregation pipeline
//! stages rather than to a single filter document like [`super::compile`].

use bson::{doc, Bson, Document};

/// A `$group` accumulator expression.
#[derive(Debug, Clone, PartialEq)]
enum Accumulator {
    Sum(String),
    Avg(String),
    Min(String),
    Max(String),
    Count,
    First(String),
    Last(String),
}

impl Accumulator {
    fn to_bson(&self) -> Bson {
        match self {
            Accumulator::Sum(f) => Bson::Document(doc! { "$sum": format!("${f}") }),
            Accumulator::Avg(f) => Bson::Document(doc! { "$avg": format!("${f}") }),
            Accumulator::Min(f) => Bson::Document(doc! { "$min": format!("${f}") }),
            Accumulator::Max(f) => Bson::Document(doc! { "$max": format!("${f}") }),
            Accumulator::Count => Bson::Document(doc! { "$sum": 1_i32 }),
            Accumulator::First(f) => Bson::Document(doc! { "$first": format!("${f}") }),
            Accumulator::Last(f) => Bson::Document(doc! { "$last": format!("${f}") }),
        }
    }
}

/// Builds a grouped aggregation: `$group` by zero or more fields, with named
/// accumulator outputs, an optional `having` filter applied after grouping,
/// and arbitrary extra pipeline stages spliced in after the group.
///
/// An empty `group_by` groups the whole collection into a single row,
/// matching MongoDB's own `$group: {_id: null, ...}` idiom.
#[derive(Debug, Clone, Default)]
pub struct AggregateBuilder {
    group_by: Vec<String>,
    outputs: Vec<(String, Accumulator)>,
    having: Option<Document>,
    extra_stages: Vec<Document>,
}

impl AggregateBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn group_by(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.group_by.extend(fields.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn count(mut self, alias: impl Into<String>) -> Self {
        self.outputs.push((alias.into(), Accumulator::Count));
        self
    }

    #[must_use]
    pub fn sum(mut self, field: impl Into<String>, alias: impl Into<String>) -> Self {
        self.outputs.push((alias.into(), Accumulator::Sum(field.into())));
        self
    }

    #[must_use]
    pub fn avg(mut self, field: impl Into<String>, alias: impl Into<String>) -> Self {
        self.outputs.push((alias.into(), Accumulator::Avg(field.into())));
        self
    }

    #[must_use]
    pub fn min(mut self, field: impl Into<String>, alias: impl Into<String>) -> Self {
        self.outputs.push((alias.into(), Accumulator::Min(field.into())));
        self
    }

    #[must_use]
    pub fn max(mut self, field: impl Into<String>, alias: impl Into<String>) -> Self {
        self.outputs.push((alias.into(), Accumulator::Max(field.into())));
        self
    }

    #[must_use]
    pub fn first(mut self, field: impl Into<String>, alias: impl Into<String>) -> Self {
        self.outputs.push((alias.into(), Accumulator::First(field.into())));
        self
    }

    #[must_use]
    pub fn last(mut self, field: impl Into<String>, alias: impl Into<String>) -> Self {
        self.outputs.push((alias.into(), Accumulator::Last(field.into())));
        self
    }

    /// A filter evaluated on the grouped rows (field names are the group
    /// keys plus accumulator aliases), compiled to a trailing `$match`.
    #[must_use]
    pub fn having(mut self, filter: Document) -> Self {
        self.having = Some(filter);
        self
    }

    /// Splices an arbitrary stage in after the group (and before `having`),
    /// for pipeline needs this builder does not cover directly.
    #[must_use]
    pub fn add_stage(mut self, stage: Document) -> Self {
        self.extra_stages.push(stage);
        self
    }

    /// Compiles to an ordered pipeline: `$group`, a `$project` restoring
    /// the group keys to top-level fields (MongoDB nests them under `_id`),
    /// any `add_stage`s, then `having` as a trailing `$match`.
    #[must_use]
    pub fn build(self) -> Vec<Document> {
        let mut stages = Vec::new();

        let id_expr = if self.group_by.is_empty() {
            Bson::Null
        } else if self.group_by.len() == 1 {
            Bson::String(format!("${}", self.group_by[0]))
        } else {
            let mut id_doc = Document::new();
            for field in &self.group_by {
                id_doc.insert(field.clone(), format!("${field}"));
            }
            Bson::Document(id_doc)
        };

        let mut group_stage = Document::new();
        group_stage.insert("_id", id_expr);
        for (alias, acc) in &self.outputs {
            group_stage.insert(alias.clone(), acc.to_bson());
        }
        stages.push(doc! { "$group": group_stage });

        if !self.group_by.is_empty() {
            let mut project = doc! { "_id": 0_i32 };
            for field in &self.group_by {
                let path = if self.group_by.len() == 1 {
                    "_id".to_string()
                } else {
                    format!("_id.{field}")
                };
                project.insert(field.clone(), format!("${path}"));
            }
            for (alias, _) in &self.outputs {
                project.insert(alias.clone(), 1_i32);
            }
            stages.push(doc! { "$project": project });
        }

        stages.extend(self.extra_stages);
        if let Some(having) = self.having {
            stages.push(doc! { "$match": having });
        }
        stages
    }
}

/// Which side of the window frame an offset anchors to, per §4.3's
/// `frame(kind, start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Frame bounds count physical documents.
    Documents,
    /// Frame bounds count logical units along the sort key (e.g. days).
    Range,
}

/// One edge of a window frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameBound {
    Unbounded,
    Current,
    Offset(i64),
}

impl FrameBound {
    fn to_bson(self) -> Bson {
        match self {
            FrameBound::Unbounded => Bson::String("unbounded".to_string()),
            FrameBound::Current => Bson::String("current".to_string()),
            FrameBound::Offset(n) => Bson::Int64(n),
        }
    }
}

/// A ranking or windowed-accumulator output column.
#[derive(Debug, Clone, PartialEq)]
enum WindowOutput {
    Rank,
    DenseRank,
    RowNumber,
    Sum(String),
    Avg(String),
}

/// Builds a `$setWindowFields` stage: partitioned, ordered ranking and
/// running-accumulator outputs over a frame, per §4.3's window-operation
/// contract (`partition_by`, `order_by`, `frame`, ranking functions).
#[derive(Debug, Clone, Default)]
pub struct WindowBuilder {
    partition_by: Vec<String>,
    order_by: Vec<(String, i32)>,
    frame: Option<(FrameKind, FrameBound, FrameBound)>,
    outputs: Vec<(String, WindowOutput)>,
}

impl WindowBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn partition_by(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.partition_by.extend(fields.into_iter().map(Into::into));
        self
    }

    /// `ascending = false` sorts descending, matching `bson::doc!`'s own
    /// `1`/`-1` sort-direction convention used by `Adapter::find`.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, ascending: bool) -> Self {
        self.order_by.push((field.into(), if ascending { 1 } else { -1 }));
        self
    }

    #[must_use]
    pub fn frame(mut self, kind: FrameKind, start: FrameBound, end: FrameBound) -> Self {
        self.frame = Some((kind, start, end));
        self
    }

    #[must_use]
    pub fn rank(mut self, alias: impl Into<String>) -> Self {
        self.outputs.push((alias.into(), WindowOutput::Rank));
        self
    }

    #[must_use]
    pub fn dense_rank(mut self, alias: impl Into<String>) -> Self {
        self.outputs.push((alias.into(), WindowOutput::DenseRank));
        self
    }

    #[must_use]
    pub fn row_number(mut self, alias: impl Into<String>) -> Self {
        self.outputs.push((alias.into(), WindowOutput::RowNumber));
        self
    }

    #[must_use]
    pub fn running_sum(mut self, field: impl Into<String>, alias: impl Into<String>) -> Self {
        self.outputs.push((alias.into(), WindowOutput::Sum(field.into())));
        self
    }

    #[must_use]
    pub fn running_avg(mut self, field: impl Into<String>, alias: impl Into<String>) -> Self {
        self.outputs.push((alias.into(), WindowOutput::Avg(field.into())));
        self
    }

    /// Compiles to a single `$setWindowFields` stage.
    #[must_use]
    pub fn build(self) -> Document {
        let partition_by = if self.partition_by.is_empty() {
            None
        } else if self.partition_by.len() == 1 {
            Some(Bson::String(format!("${}", self.partition_by[0])))
        } else {
            let mut d = Document::new();
            for f in &self.partition_by {
                d.insert(f.clone(), format!("${f}"));
            }
            Some(Bson::Document(d))
        };

        let mut sort_by = Document::new();
        for (field, dir) in &self.order_by {
            sort_by.insert(field.clone(), *dir);
        }

        let window_doc = self.frame.map(|(kind, start, end)| {
            let unit = match kind {
                FrameKind::Documents => "documents",
                FrameKind::Range => "range",
            };
            doc! { unit: [start.to_bson(), end.to_bson()] }
        });

        let mut output = Document::new();
        for (alias, out) in &self.outputs {
            let expr = match out {
                WindowOutput::Rank => doc! { "$rank": {} },
                WindowOutput::DenseRank => doc! { "$denseRank": {} },
                WindowOutput::RowNumber => doc! { "$documentNumber": {} },
                WindowOutput::Sum(f) => doc! { "$sum": format!("${f}") },
                WindowOutput::Avg(f) => doc! { "$avg": format!("${f}") },
            };
            let mut entry = expr;
            if let Some(ref w) = window_doc {
                entry.insert("window", w.clone());
            }
            output.insert(alias.clone(), entry);
        }

        let mut set_window_fields = Document::new();
        if let Some(p) = partition_by {
            set_window_fields.insert("partitionBy", p);
        }
        if !sort_by.is_empty() {
            set_window_fields.insert("sortBy", sort_by);
        }
        set_window_fields.insert("output", output);

        doc! { "$setWindowFields": set_window_fields }
    }
}
