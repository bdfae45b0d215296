//! Criteria and Criteria Containers
//!
//! A container keeps its criteria in insertion order. AND containers merge
//! several operator sub-documents on the same field into one; when two of
//! them collide the container falls back to an explicit `$and`.

use std::fmt;
use std::sync::Arc;

use bson::{Bson, Document};
use tracing::trace;

use crate::document::DocumentWriter;
use crate::mapper::Mapper;
use crate::query::field_end::FieldEnd;
use crate::query::{QueryError, QueryResult};
use crate::schema::resolve_path;

// ============================================================================
// Filter Operators
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    In,
    NotIn,
    All,
    Exists,
    Size,
    Type,
    Mod,
    ElemMatch,
    Regex,
    Near,
    NearSphere,
    GeoWithin,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Equal => "$eq",
            FilterOperator::NotEqual => "$ne",
            FilterOperator::GreaterThan => "$gt",
            FilterOperator::GreaterThanOrEqual => "$gte",
            FilterOperator::LessThan => "$lt",
            FilterOperator::LessThanOrEqual => "$lte",
            FilterOperator::In => "$in",
            FilterOperator::NotIn => "$nin",
            FilterOperator::All => "$all",
            FilterOperator::Exists => "$exists",
            FilterOperator::Size => "$size",
            FilterOperator::Type => "$type",
            FilterOperator::Mod => "$mod",
            FilterOperator::ElemMatch => "$elemMatch",
            FilterOperator::Regex => "$regex",
            FilterOperator::Near => "$near",
            FilterOperator::NearSphere => "$nearSphere",
            FilterOperator::GeoWithin => "$geoWithin",
        }
    }

    pub fn is_geo(&self) -> bool {
        matches!(
            self,
            FilterOperator::Near | FilterOperator::NearSphere | FilterOperator::GeoWithin
        )
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Criteria
// ============================================================================

/// One field-level predicate
#[derive(Debug, Clone, PartialEq)]
pub struct Criteria {
    field: String,
    operator: FilterOperator,
    value: Bson,
    options: Option<Document>,
    negated: bool,
    validated: bool,
}

impl Criteria {
    pub fn new(field: &str, operator: FilterOperator, value: impl Into<Bson>) -> Self {
        Self {
            field: field.to_string(),
            operator,
            value: value.into(),
            options: None,
            negated: false,
            validated: false,
        }
    }

    /// Extra operator entries written beside the main one (`$maxDistance`)
    pub fn with_options(mut self, options: Document) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_negation(mut self, negated: bool) -> Self {
        self.negated = negated;
        self
    }

    pub fn with_validation(mut self, validated: bool) -> Self {
        self.validated = validated;
        self
    }

    /// Document path the criteria applies to
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operator(&self) -> FilterOperator {
        self.operator
    }

    pub fn value(&self) -> &Bson {
        &self.value
    }

    pub fn options(&self) -> Option<&Document> {
        self.options.as_ref()
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// Whether the field path was checked against the entity model
    pub fn is_validated(&self) -> bool {
        self.validated
    }

    /// `{field: {$op: value}}`, or `{field: {$not: {$op: value}}}` when negated
    pub fn to_document(&self) -> Document {
        let mut predicate = Document::new();
        predicate.insert(self.operator.as_str(), self.value.clone());
        if let Some(options) = &self.options {
            for (key, value) in options {
                predicate.insert(key.clone(), value.clone());
            }
        }

        let mut filter = Document::new();
        if self.negated {
            let mut not = Document::new();
            not.insert("$not", predicate);
            filter.insert(self.field.clone(), not);
        } else {
            filter.insert(self.field.clone(), predicate);
        }
        filter
    }
}

// ============================================================================
// Criteria Container
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CriteriaJoin {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone)]
enum CriteriaNode {
    Criteria(Criteria),
    Container(CriteriaContainer),
}

impl CriteriaNode {
    fn to_document(&self) -> Document {
        match self {
            CriteriaNode::Criteria(criteria) => criteria.to_document(),
            CriteriaNode::Container(container) => container.to_document(),
        }
    }
}

/// Entity model the container's field paths are checked against
#[derive(Debug, Clone)]
struct SchemaTarget {
    mapper: Arc<Mapper>,
    entity: String,
}

/// Ordered group of criteria joined by AND or OR
#[derive(Debug, Clone, Default)]
pub struct CriteriaContainer {
    join: CriteriaJoin,
    nodes: Vec<CriteriaNode>,
    target: Option<SchemaTarget>,
    validate: bool,
}

impl CriteriaContainer {
    /// Unbound container; field paths are used as written
    pub fn new() -> Self {
        Self::default()
    }

    /// Container bound to the model of `entity`
    ///
    /// Field ends validate by default when the mapper's `validate_queries`
    /// option is set.
    pub fn for_entity(mapper: &Arc<Mapper>, entity: &str) -> QueryResult<Self> {
        if mapper.model(entity).is_none() {
            return Err(QueryError::UnknownEntity(entity.to_string()));
        }
        Ok(Self {
            join: CriteriaJoin::And,
            nodes: Vec::new(),
            validate: mapper.options().validate_queries,
            target: Some(SchemaTarget {
                mapper: Arc::clone(mapper),
                entity: entity.to_string(),
            }),
        })
    }

    pub fn join(&self) -> CriteriaJoin {
        self.join
    }

    pub fn entity(&self) -> Option<&str> {
        self.target.as_ref().map(|target| target.entity.as_str())
    }

    pub fn is_validating(&self) -> bool {
        self.validate
    }

    /// Start a predicate on `name` with the container's validation setting
    pub fn field(&mut self, name: &str) -> FieldEnd<'_> {
        let validating = self.validate;
        FieldEnd::new(self, name, validating)
    }

    /// Start a predicate on `name` with explicit validation
    pub fn field_validating(&mut self, name: &str, validating: bool) -> FieldEnd<'_> {
        FieldEnd::new(self, name, validating)
    }

    pub fn add(&mut self, criteria: Criteria) -> &mut Self {
        self.nodes.push(CriteriaNode::Criteria(criteria));
        self
    }

    /// Empty AND container bound to the same entity model
    pub fn child(&self) -> Self {
        Self {
            join: CriteriaJoin::And,
            nodes: Vec::new(),
            target: self.target.clone(),
            validate: self.validate,
        }
    }

    /// Nest a group where every child must match
    pub fn and(&mut self, children: impl IntoIterator<Item = CriteriaContainer>) -> &mut Self {
        self.nest(CriteriaJoin::And, children)
    }

    /// Nest a group where at least one child must match
    pub fn or(&mut self, children: impl IntoIterator<Item = CriteriaContainer>) -> &mut Self {
        self.nest(CriteriaJoin::Or, children)
    }

    fn nest(&mut self, join: CriteriaJoin, children: impl IntoIterator<Item = CriteriaContainer>) -> &mut Self {
        let group = Self {
            join,
            nodes: children.into_iter().map(CriteriaNode::Container).collect(),
            target: self.target.clone(),
            validate: self.validate,
        };
        self.nodes.push(CriteriaNode::Container(group));
        self
    }

    /// Every criteria in the container, nested groups included, in order
    pub fn criteria(&self) -> Vec<&Criteria> {
        let mut found = Vec::new();
        for node in &self.nodes {
            match node {
                CriteriaNode::Criteria(criteria) => found.push(criteria),
                CriteriaNode::Container(container) => found.extend(container.criteria()),
            }
        }
        found
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Filter document for this container
    pub fn to_document(&self) -> Document {
        if self.nodes.is_empty() {
            return Document::new();
        }
        let parts: Vec<Document> = self.nodes.iter().map(CriteriaNode::to_document).collect();
        match self.join {
            CriteriaJoin::Or => joined("$or", parts),
            CriteriaJoin::And => match merge(&parts) {
                Some(merged) => merged,
                None => joined("$and", parts),
            },
        }
    }

    /// Write the filter entries into the open document
    pub fn encode(&self, writer: &mut DocumentWriter) -> QueryResult<()> {
        for (name, value) in self.to_document() {
            writer.write_name(&name)?;
            writer.write_bson(value)?;
        }
        Ok(())
    }

    /// Property path to document path, rejecting unknown paths when validating
    pub(crate) fn translate(&self, field: &str, validating: bool) -> QueryResult<String> {
        let Some(target) = &self.target else {
            return Ok(field.to_string());
        };
        let resolved = resolve_path(&target.mapper, &target.entity, field);
        match &resolved.unresolved {
            Some(segment) if validating => {
                trace!(entity = %target.entity, path = field, segment = %segment, "Rejected criteria path");
                Err(QueryError::InvalidField {
                    entity: target.entity.clone(),
                    path: field.to_string(),
                })
            }
            _ => Ok(resolved.path),
        }
    }
}

fn joined(operator: &str, parts: Vec<Document>) -> Document {
    let mut document = Document::new();
    document.insert(operator, parts.into_iter().map(Bson::Document).collect::<Vec<_>>());
    document
}

/// Merge AND parts into one document, or `None` on a collision
fn merge(parts: &[Document]) -> Option<Document> {
    let mut merged = Document::new();
    for part in parts {
        for (key, value) in part {
            if !merged.contains_key(key) {
                merged.insert(key.clone(), value.clone());
                continue;
            }
            let existing = merged.get_mut(key)?;
            if !merge_operators(existing, value) {
                return None;
            }
        }
    }
    Some(merged)
}

fn merge_operators(existing: &mut Bson, incoming: &Bson) -> bool {
    let (Bson::Document(existing), Bson::Document(incoming)) = (existing, incoming) else {
        return false;
    };
    if !is_operator_document(existing)
        || !is_operator_document(incoming)
        || incoming.keys().any(|key| existing.contains_key(key))
    {
        return false;
    }
    for (key, value) in incoming {
        existing.insert(key.clone(), value.clone());
    }
    true
}

fn is_operator_document(document: &Document) -> bool {
    !document.is_empty() && document.keys().all(|key| key.starts_with('$'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapperOptions;
    use crate::schema::{EntityModel, FieldDescriptor, FieldType, PrimitiveType};
    use bson::doc;

    fn mapper(validate: bool) -> Arc<Mapper> {
        let person = EntityModel::builder("Person")
            .id("id", FieldType::ObjectId)
            .field(FieldDescriptor::new("name", FieldType::String).mapped_as("n"))
            .property("age", FieldType::Primitive(PrimitiveType::Int32))
            .build()
            .unwrap();
        Arc::new(
            Mapper::builder()
                .options(MapperOptions::default().with_validate_queries(validate))
                .entity(person)
                .build()
                .unwrap(),
        )
    }

    // --- Criteria ---

    #[test]
    fn test_criteria_document_shapes() {
        let plain = Criteria::new("age", FilterOperator::GreaterThan, 10);
        assert_eq!(plain.to_document(), doc! { "age": { "$gt": 10 } });

        let negated = plain.clone().with_negation(true);
        assert_eq!(negated.to_document(), doc! { "age": { "$not": { "$gt": 10 } } });

        let near = Criteria::new("loc", FilterOperator::Near, vec![1.0, 2.0])
            .with_options(doc! { "$maxDistance": 5.0 });
        assert_eq!(
            near.to_document(),
            doc! { "loc": { "$near": [1.0, 2.0], "$maxDistance": 5.0 } }
        );
    }

    // --- Containers ---

    #[test]
    fn test_and_merges_same_field() {
        let mut query = CriteriaContainer::new();
        query
            .add(Criteria::new("age", FilterOperator::GreaterThan, 10))
            .add(Criteria::new("age", FilterOperator::LessThan, 20))
            .add(Criteria::new("name", FilterOperator::Equal, "bob"));
        assert_eq!(
            query.to_document(),
            doc! { "age": { "$gt": 10, "$lt": 20 }, "name": { "$eq": "bob" } }
        );
    }

    #[test]
    fn test_and_collision_falls_back() {
        let mut query = CriteriaContainer::new();
        query
            .add(Criteria::new("age", FilterOperator::GreaterThan, 10))
            .add(Criteria::new("age", FilterOperator::GreaterThan, 12));
        assert_eq!(
            query.to_document(),
            doc! { "$and": [{ "age": { "$gt": 10 } }, { "age": { "$gt": 12 } }] }
        );
    }

    #[test]
    fn test_or_groups() {
        let mut query = CriteriaContainer::new();
        let mut young = query.child();
        young.add(Criteria::new("age", FilterOperator::LessThan, 18));
        let mut named = query.child();
        named.add(Criteria::new("name", FilterOperator::Equal, "bob"));
        query
            .add(Criteria::new("active", FilterOperator::Equal, true))
            .or([young, named]);
        assert_eq!(
            query.to_document(),
            doc! {
                "active": { "$eq": true },
                "$or": [{ "age": { "$lt": 18 } }, { "name": { "$eq": "bob" } }]
            }
        );
        assert_eq!(query.criteria().len(), 3);
    }

    #[test]
    fn test_empty_container() {
        assert_eq!(CriteriaContainer::new().to_document(), Document::new());
    }

    #[test]
    fn test_encode_into_open_document() {
        let mut query = CriteriaContainer::new();
        query.add(Criteria::new("age", FilterOperator::Exists, true));
        let mut writer = DocumentWriter::new();
        writer.write_start_document().unwrap();
        query.encode(&mut writer).unwrap();
        writer.write_end_document().unwrap();
        assert_eq!(writer.into_document().unwrap(), doc! { "age": { "$exists": true } });
    }

    // --- Schema binding ---

    #[test]
    fn test_unknown_entity_rejected() {
        let err = CriteriaContainer::for_entity(&mapper(true), "Ghost").unwrap_err();
        assert_eq!(err, QueryError::UnknownEntity("Ghost".into()));
    }

    #[test]
    fn test_paths_translated() {
        let mut query = CriteriaContainer::for_entity(&mapper(true), "Person").unwrap();
        query.field("name").equal("bob").unwrap();
        query.field("id").exists().unwrap();
        assert_eq!(
            query.to_document(),
            doc! { "n": { "$eq": "bob" }, "_id": { "$exists": true } }
        );
    }

    #[test]
    fn test_validation_follows_options() {
        let strict = CriteriaContainer::for_entity(&mapper(true), "Person").unwrap();
        assert!(strict.is_validating());
        let lax = CriteriaContainer::for_entity(&mapper(false), "Person").unwrap();
        assert!(!lax.is_validating());

        let mut lax = lax;
        lax.field("nickname").equal("bo").unwrap();
        assert_eq!(lax.to_document(), doc! { "nickname": { "$eq": "bo" } });
        assert!(!lax.criteria()[0].is_validated());
    }

    #[test]
    fn test_validation_per_field_end() {
        let mut query = CriteriaContainer::for_entity(&mapper(true), "Person").unwrap();
        let err = query.field("nickname").equal("bo").unwrap_err();
        assert_eq!(
            err,
            QueryError::InvalidField {
                entity: "Person".into(),
                path: "nickname".into()
            }
        );

        query.field_validating("nickname", false).equal("bo").unwrap();
        query.field("age").greater_than(3).unwrap();
        let criteria = query.criteria();
        assert_eq!(criteria.len(), 2);
        assert!(!criteria[0].is_validated());
        assert!(criteria[1].is_validated());
    }
}
