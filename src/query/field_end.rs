//! Field End - Predicates on One Field
//!
//! A field end adds criteria for a single field to its container. `not()`
//! flips negation for every criteria added through this field end from then
//! on; criteria added earlier keep their state. Geospatial predicates refuse
//! negation.

use bson::spec::ElementType;
use bson::{doc, Bson, Document, Regex};
use tracing::trace;

use crate::query::criteria::{Criteria, CriteriaContainer, FilterOperator};
use crate::query::{QueryError, QueryResult};

/// Legacy coordinate shapes for `$geoWithin`
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Box {
        bottom_left: (f64, f64),
        upper_right: (f64, f64),
    },
    Center {
        center: (f64, f64),
        radius: f64,
    },
    CenterSphere {
        center: (f64, f64),
        radius: f64,
    },
    Polygon(Vec<(f64, f64)>),
}

impl Shape {
    pub fn geometry(&self) -> &'static str {
        match self {
            Shape::Box { .. } => "$box",
            Shape::Center { .. } => "$center",
            Shape::CenterSphere { .. } => "$centerSphere",
            Shape::Polygon(_) => "$polygon",
        }
    }

    pub fn to_document(&self) -> Document {
        let coordinates = match self {
            Shape::Box {
                bottom_left,
                upper_right,
            } => vec![point(*bottom_left), point(*upper_right)],
            Shape::Center { center, radius } | Shape::CenterSphere { center, radius } => {
                vec![point(*center), Bson::Double(*radius)]
            }
            Shape::Polygon(points) => points.iter().copied().map(point).collect(),
        };
        let mut document = Document::new();
        document.insert(self.geometry(), coordinates);
        document
    }
}

fn point((x, y): (f64, f64)) -> Bson {
    Bson::Array(vec![Bson::Double(x), Bson::Double(y)])
}

/// Predicate builder for one field of a container
pub struct FieldEnd<'a> {
    target: &'a mut CriteriaContainer,
    field: String,
    not: bool,
    validating: bool,
}

impl<'a> FieldEnd<'a> {
    pub(crate) fn new(target: &'a mut CriteriaContainer, field: &str, validating: bool) -> Self {
        Self {
            target,
            field: field.to_string(),
            not: false,
            validating,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn is_negated(&self) -> bool {
        self.not
    }

    pub fn is_validating(&self) -> bool {
        self.validating
    }

    /// Toggle negation for criteria added after this call
    pub fn not(&mut self) -> &mut Self {
        self.not = !self.not;
        self
    }

    // ------------------------------------------------------------------------
    // Comparison
    // ------------------------------------------------------------------------

    pub fn equal(&mut self, value: impl Into<Bson>) -> QueryResult<&mut CriteriaContainer> {
        self.add(FilterOperator::Equal, value.into())
    }

    pub fn not_equal(&mut self, value: impl Into<Bson>) -> QueryResult<&mut CriteriaContainer> {
        self.add(FilterOperator::NotEqual, value.into())
    }

    pub fn greater_than(&mut self, value: impl Into<Bson>) -> QueryResult<&mut CriteriaContainer> {
        self.add(FilterOperator::GreaterThan, value.into())
    }

    pub fn greater_than_or_eq(&mut self, value: impl Into<Bson>) -> QueryResult<&mut CriteriaContainer> {
        self.add(FilterOperator::GreaterThanOrEqual, value.into())
    }

    pub fn less_than(&mut self, value: impl Into<Bson>) -> QueryResult<&mut CriteriaContainer> {
        self.add(FilterOperator::LessThan, value.into())
    }

    pub fn less_than_or_eq(&mut self, value: impl Into<Bson>) -> QueryResult<&mut CriteriaContainer> {
        self.add(FilterOperator::LessThanOrEqual, value.into())
    }

    /// Array field containing `value`
    pub fn has_this_one(&mut self, value: impl Into<Bson>) -> QueryResult<&mut CriteriaContainer> {
        self.add(FilterOperator::Equal, value.into())
    }

    // ------------------------------------------------------------------------
    // Sets
    // ------------------------------------------------------------------------

    pub fn has_any_of<I, V>(&mut self, values: I) -> QueryResult<&mut CriteriaContainer>
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        self.add_values(FilterOperator::In, values)
    }

    pub fn is_in<I, V>(&mut self, values: I) -> QueryResult<&mut CriteriaContainer>
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        self.has_any_of(values)
    }

    pub fn has_none_of<I, V>(&mut self, values: I) -> QueryResult<&mut CriteriaContainer>
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        self.add_values(FilterOperator::NotIn, values)
    }

    pub fn not_in<I, V>(&mut self, values: I) -> QueryResult<&mut CriteriaContainer>
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        self.has_none_of(values)
    }

    pub fn has_all_of<I, V>(&mut self, values: I) -> QueryResult<&mut CriteriaContainer>
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        self.add_values(FilterOperator::All, values)
    }

    // ------------------------------------------------------------------------
    // Element and array
    // ------------------------------------------------------------------------

    pub fn exists(&mut self) -> QueryResult<&mut CriteriaContainer> {
        self.add(FilterOperator::Exists, Bson::Boolean(true))
    }

    pub fn does_not_exist(&mut self) -> QueryResult<&mut CriteriaContainer> {
        self.add(FilterOperator::Exists, Bson::Boolean(false))
    }

    pub fn size_eq(&mut self, size: i32) -> QueryResult<&mut CriteriaContainer> {
        self.add(FilterOperator::Size, Bson::Int32(size))
    }

    /// `$type` by numeric type code; `MinKey` is -1 on the server
    pub fn has_type(&mut self, element_type: ElementType) -> QueryResult<&mut CriteriaContainer> {
        let code = match element_type {
            ElementType::MinKey => -1,
            other => other as i32,
        };
        self.add(FilterOperator::Type, Bson::Int32(code))
    }

    pub fn modulo(&mut self, divisor: i64, remainder: i64) -> QueryResult<&mut CriteriaContainer> {
        self.add(
            FilterOperator::Mod,
            Bson::Array(vec![Bson::Int64(divisor), Bson::Int64(remainder)]),
        )
    }

    /// Array element matching every criteria of `query`
    pub fn elem_match(&mut self, query: &CriteriaContainer) -> QueryResult<&mut CriteriaContainer> {
        self.add(FilterOperator::ElemMatch, Bson::Document(query.to_document()))
    }

    // ------------------------------------------------------------------------
    // Strings
    // ------------------------------------------------------------------------

    pub fn starts_with(&mut self, prefix: &str) -> QueryResult<&mut CriteriaContainer> {
        self.pattern(format!("^{}", regex::escape(prefix)), false)
    }

    pub fn starts_with_ignore_case(&mut self, prefix: &str) -> QueryResult<&mut CriteriaContainer> {
        self.pattern(format!("^{}", regex::escape(prefix)), true)
    }

    pub fn ends_with(&mut self, suffix: &str) -> QueryResult<&mut CriteriaContainer> {
        self.pattern(format!("{}$", regex::escape(suffix)), false)
    }

    pub fn ends_with_ignore_case(&mut self, suffix: &str) -> QueryResult<&mut CriteriaContainer> {
        self.pattern(format!("{}$", regex::escape(suffix)), true)
    }

    pub fn contains(&mut self, text: &str) -> QueryResult<&mut CriteriaContainer> {
        self.pattern(regex::escape(text), false)
    }

    pub fn contains_ignore_case(&mut self, text: &str) -> QueryResult<&mut CriteriaContainer> {
        self.pattern(regex::escape(text), true)
    }

    pub fn equal_ignore_case(&mut self, value: &str) -> QueryResult<&mut CriteriaContainer> {
        self.pattern(format!("^{}$", regex::escape(value)), true)
    }

    fn pattern(&mut self, pattern: String, ignore_case: bool) -> QueryResult<&mut CriteriaContainer> {
        let options = if ignore_case { "i" } else { "" };
        let regex = Regex {
            pattern,
            options: options.to_string(),
        };
        self.add(FilterOperator::Regex, Bson::RegularExpression(regex))
    }

    // ------------------------------------------------------------------------
    // Geospatial (legacy coordinates)
    // ------------------------------------------------------------------------

    pub fn near(&mut self, x: f64, y: f64) -> QueryResult<&mut CriteriaContainer> {
        self.geo(FilterOperator::Near, point((x, y)), None)
    }

    pub fn near_within(&mut self, x: f64, y: f64, max_distance: f64) -> QueryResult<&mut CriteriaContainer> {
        self.geo(
            FilterOperator::Near,
            point((x, y)),
            Some(doc! { "$maxDistance": max_distance }),
        )
    }

    pub fn near_sphere(&mut self, x: f64, y: f64) -> QueryResult<&mut CriteriaContainer> {
        self.geo(FilterOperator::NearSphere, point((x, y)), None)
    }

    pub fn near_sphere_within(&mut self, x: f64, y: f64, max_distance: f64) -> QueryResult<&mut CriteriaContainer> {
        self.geo(
            FilterOperator::NearSphere,
            point((x, y)),
            Some(doc! { "$maxDistance": max_distance }),
        )
    }

    pub fn within(&mut self, shape: &Shape) -> QueryResult<&mut CriteriaContainer> {
        self.geo(FilterOperator::GeoWithin, Bson::Document(shape.to_document()), None)
    }

    fn geo(
        &mut self,
        operator: FilterOperator,
        value: Bson,
        options: Option<Document>,
    ) -> QueryResult<&mut CriteriaContainer> {
        if self.not {
            return Err(QueryError::NegatedGeo {
                field: self.field.clone(),
            });
        }
        self.add_with_options(operator, value, options)
    }

    // ------------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------------

    fn add_values<I, V>(&mut self, operator: FilterOperator, values: I) -> QueryResult<&mut CriteriaContainer>
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        let values: Vec<Bson> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return Err(QueryError::EmptyValues {
                operation: operator.as_str().to_string(),
            });
        }
        self.add(operator, Bson::Array(values))
    }

    fn add(&mut self, operator: FilterOperator, value: Bson) -> QueryResult<&mut CriteriaContainer> {
        self.add_with_options(operator, value, None)
    }

    fn add_with_options(
        &mut self,
        operator: FilterOperator,
        value: Bson,
        options: Option<Document>,
    ) -> QueryResult<&mut CriteriaContainer> {
        let path = self.target.translate(&self.field, self.validating)?;
        let mut criteria = Criteria::new(&path, operator, value)
            .with_negation(self.not)
            .with_validation(self.validating);
        if let Some(options) = options {
            criteria = criteria.with_options(options);
        }
        trace!(field = %path, operator = %operator, negated = self.not, "Added criteria");
        Ok(self.target.add(criteria))
    }
}
