//! Pipeline Stages - `{ "$<stage>": payload }` Documents
//!
//! Each stage compiles to a single-entry document keyed by its operator
//! name. [`Pipeline`] keeps stages in insertion order.

use bson::{Bson, Document};
use tracing::debug;

use crate::aggregation::compiler::{encode_accumulation, encode_entries, encode_expression, value};
use crate::aggregation::expr::{DocumentExpression, Expression, FieldAccumulation};
use crate::aggregation::AggregationResult;
use crate::document::{document, DocumentWriter};
use crate::query::CriteriaContainer;

// ============================================================================
// Stage
// ============================================================================

/// One aggregation pipeline stage
#[derive(Debug, Clone)]
pub enum Stage {
    AddFields(AddFields),
    Count(String),
    Group(Group),
    Limit(i64),
    Match(Match),
    Project(Projection),
    Sample(i64),
    Skip(i64),
    Sort(Sort),
    Unwind(Unwind),
}

impl Stage {
    pub fn limit(limit: i64) -> Self {
        Stage::Limit(limit)
    }

    pub fn skip(skip: i64) -> Self {
        Stage::Skip(skip)
    }

    /// Random sample of `size` documents
    pub fn sample(size: i64) -> Self {
        Stage::Sample(size)
    }

    /// Count documents into the field `name`
    pub fn count(name: &str) -> Self {
        Stage::Count(name.to_string())
    }

    /// Operator name the stage is keyed by
    pub fn stage_name(&self) -> &'static str {
        match self {
            Stage::AddFields(_) => "$addFields",
            Stage::Count(_) => "$count",
            Stage::Group(_) => "$group",
            Stage::Limit(_) => "$limit",
            Stage::Match(_) => "$match",
            Stage::Project(_) => "$project",
            Stage::Sample(_) => "$sample",
            Stage::Skip(_) => "$skip",
            Stage::Sort(_) => "$sort",
            Stage::Unwind(_) => "$unwind",
        }
    }

    /// Write the stage document at the current position
    pub fn encode(&self, writer: &mut DocumentWriter) -> AggregationResult<()> {
        document(writer, |w| {
            w.write_name(self.stage_name())?;
            self.encode_payload(w)
        })
    }

    pub fn to_document(&self) -> AggregationResult<Document> {
        let mut writer = DocumentWriter::new();
        self.encode(&mut writer)?;
        Ok(writer.into_document()?)
    }

    fn encode_payload(&self, writer: &mut DocumentWriter) -> AggregationResult<()> {
        match self {
            Stage::AddFields(add) => document(writer, |w| encode_entries(w, &add.fields)),
            Stage::Count(name) => Ok(writer.write_string(name.as_str())?),
            Stage::Group(group) => group.encode_payload(writer),
            Stage::Limit(n) | Stage::Skip(n) => Ok(writer.write_i64(*n)?),
            Stage::Match(matcher) => Ok(writer.write_bson(Bson::Document(matcher.filter.to_document()))?),
            Stage::Project(projection) => projection.encode_payload(writer),
            Stage::Sample(size) => document(writer, |w| Ok(w.write_field("size", *size)?)),
            Stage::Sort(sort) => sort.encode_payload(writer),
            Stage::Unwind(unwind) => unwind.encode_payload(writer),
        }
    }
}

// ============================================================================
// $addFields
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct AddFields {
    fields: DocumentExpression,
}

impl AddFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &str, expression: impl Into<Expression>) -> Self {
        self.fields.set(name, expression.into());
        self
    }
}

impl From<AddFields> for Stage {
    fn from(stage: AddFields) -> Self {
        Stage::AddFields(stage)
    }
}

// ============================================================================
// $group
// ============================================================================

/// `_id` of a `$group` stage: named sub-fields or one expression
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupId {
    accumulation: FieldAccumulation,
}

impl GroupId {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group by the value of one expression
    pub fn of(expression: impl Into<Expression>) -> Self {
        Self {
            accumulation: FieldAccumulation::Single(Box::new(expression.into())),
        }
    }

    /// Add a named component to a compound id
    pub fn field(mut self, name: &str, expression: impl Into<Expression>) -> AggregationResult<Self> {
        self.accumulation.add_field("_id", name, expression.into())?;
        Ok(self)
    }

    /// Replace the id with one expression
    pub fn single(mut self, expression: impl Into<Expression>) -> AggregationResult<Self> {
        self.accumulation.set_single("_id", expression.into())?;
        Ok(self)
    }
}

/// `$group` stage; without an id every document lands in one group
#[derive(Debug, Clone, Default)]
pub struct Group {
    id: Option<GroupId>,
    fields: DocumentExpression,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: GroupId) -> Self {
        Self {
            id: Some(id),
            fields: DocumentExpression::new(),
        }
    }

    /// Output field computed by an accumulator
    pub fn field(mut self, name: &str, accumulator: impl Into<Expression>) -> Self {
        self.fields.set(name, accumulator.into());
        self
    }

    fn encode_payload(&self, writer: &mut DocumentWriter) -> AggregationResult<()> {
        document(writer, |w| {
            w.write_name("_id")?;
            match self.id.as_ref().filter(|id| !id.accumulation.is_empty()) {
                Some(id) => encode_accumulation(w, &id.accumulation)?,
                None => w.write_null()?,
            }
            encode_entries(w, &self.fields)
        })
    }
}

impl From<Group> for Stage {
    fn from(stage: Group) -> Self {
        Stage::Group(stage)
    }
}

// ============================================================================
// $match
// ============================================================================

/// `$match` stage over a criteria container
#[derive(Debug, Clone)]
pub struct Match {
    filter: CriteriaContainer,
}

impl Match {
    pub fn new(filter: CriteriaContainer) -> Self {
        Self { filter }
    }

    pub fn filter(&self) -> &CriteriaContainer {
        &self.filter
    }
}

impl From<Match> for Stage {
    fn from(stage: Match) -> Self {
        Stage::Match(stage)
    }
}

impl From<CriteriaContainer> for Stage {
    fn from(filter: CriteriaContainer) -> Self {
        Stage::Match(Match::new(filter))
    }
}

// ============================================================================
// $project
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum ProjectionEntry {
    Include,
    Exclude,
    Computed(Expression),
}

#[derive(Debug, Clone, Default)]
pub struct Projection {
    entries: Vec<(String, ProjectionEntry)>,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(self, name: &str) -> Self {
        self.entry(name, ProjectionEntry::Include)
    }

    pub fn exclude(self, name: &str) -> Self {
        self.entry(name, ProjectionEntry::Exclude)
    }

    pub fn suppress_id(self) -> Self {
        self.exclude("_id")
    }

    /// Output field computed from an expression
    pub fn computed(self, name: &str, expression: impl Into<Expression>) -> Self {
        self.entry(name, ProjectionEntry::Computed(expression.into()))
    }

    fn entry(mut self, name: &str, entry: ProjectionEntry) -> Self {
        self.entries.retain(|(n, _)| n != name);
        self.entries.push((name.to_string(), entry));
        self
    }

    fn encode_payload(&self, writer: &mut DocumentWriter) -> AggregationResult<()> {
        document(writer, |w| {
            for (name, entry) in &self.entries {
                w.write_name(name)?;
                match entry {
                    ProjectionEntry::Include => w.write_bool(true)?,
                    ProjectionEntry::Exclude => w.write_bool(false)?,
                    ProjectionEntry::Computed(expression) => encode_expression(w, expression)?,
                }
            }
            Ok(())
        })
    }
}

impl From<Projection> for Stage {
    fn from(stage: Projection) -> Self {
        Stage::Project(stage)
    }
}

// ============================================================================
// $sort
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
    /// `{ $meta: "textScore" }`
    TextScore,
}

#[derive(Debug, Clone, Default)]
pub struct Sort {
    fields: Vec<(String, SortOrder)>,
}

impl Sort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ascending(mut self, name: &str) -> Self {
        self.fields.push((name.to_string(), SortOrder::Ascending));
        self
    }

    pub fn descending(mut self, name: &str) -> Self {
        self.fields.push((name.to_string(), SortOrder::Descending));
        self
    }

    pub fn text_score(mut self, name: &str) -> Self {
        self.fields.push((name.to_string(), SortOrder::TextScore));
        self
    }

    fn encode_payload(&self, writer: &mut DocumentWriter) -> AggregationResult<()> {
        document(writer, |w| {
            for (name, order) in &self.fields {
                match order {
                    SortOrder::Ascending => w.write_field(name, 1)?,
                    SortOrder::Descending => w.write_field(name, -1)?,
                    SortOrder::TextScore => {
                        w.write_field(name, bson::doc! { "$meta": "textScore" })?
                    }
                }
            }
            Ok(())
        })
    }
}

impl From<Sort> for Stage {
    fn from(stage: Sort) -> Self {
        Stage::Sort(stage)
    }
}

// ============================================================================
// $unwind
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Unwind {
    path: String,
    include_array_index: Option<String>,
    preserve_null_and_empty_arrays: Option<bool>,
}

impl Unwind {
    /// Unwind the array at `path`; a leading `$` is added when missing
    pub fn new(path: &str) -> Self {
        let path = if path.starts_with('$') {
            path.to_string()
        } else {
            format!("${}", path)
        };
        Self {
            path,
            include_array_index: None,
            preserve_null_and_empty_arrays: None,
        }
    }

    pub fn include_array_index(mut self, name: &str) -> Self {
        self.include_array_index = Some(name.to_string());
        self
    }

    pub fn preserve_null_and_empty_arrays(mut self, preserve: bool) -> Self {
        self.preserve_null_and_empty_arrays = Some(preserve);
        self
    }

    fn encode_payload(&self, writer: &mut DocumentWriter) -> AggregationResult<()> {
        if self.include_array_index.is_none() && self.preserve_null_and_empty_arrays.is_none() {
            return Ok(writer.write_string(self.path.as_str())?);
        }
        document(writer, |w| {
            w.write_field("path", self.path.as_str())?;
            value(w, "includeArrayIndex", self.include_array_index.as_deref())?;
            value(w, "preserveNullAndEmptyArrays", self.preserve_null_and_empty_arrays)
        })
    }
}

impl From<Unwind> for Stage {
    fn from(stage: Unwind) -> Self {
        Stage::Unwind(stage)
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Ordered list of stages
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage
    pub fn pipeline(mut self, stage: impl Into<Stage>) -> Self {
        self.stages.push(stage.into());
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Compile every stage, in order
    pub fn compile(&self) -> AggregationResult<Vec<Document>> {
        let documents = self
            .stages
            .iter()
            .map(Stage::to_document)
            .collect::<AggregationResult<Vec<_>>>()?;
        debug!(stages = documents.len(), "Compiled aggregation pipeline");
        Ok(documents)
    }
}
