//! Query Module - Criteria Containers and Field Ends
//!
//! Builds filter documents from field-level predicates:
//!
//! 1. **CriteriaContainer** - ordered AND/OR group of criteria and nested groups
//! 2. **FieldEnd** - per-field predicate builder carrying negation and validation
//! 3. **Criteria** - one `{field: {$op: value}}` predicate
//!
//! When the container is bound to an entity model, property paths are
//! translated to document names and, if validation is on, unknown paths are
//! rejected.

pub mod criteria;
pub mod field_end;

pub use criteria::{Criteria, CriteriaContainer, CriteriaJoin, FilterOperator};
pub use field_end::{FieldEnd, Shape};

use thiserror::Error;

use crate::document::DocumentError;

/// Errors raised while building criteria
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("geospatial criteria on '{field}' cannot be negated")]
    NegatedGeo { field: String },

    #[error("'{path}' is not a valid path on entity {entity}")]
    InvalidField { entity: String, path: String },

    #[error("{operation} requires at least one value")]
    EmptyValues { operation: String },

    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    #[error(transparent)]
    Document(#[from] DocumentError),
}

pub type QueryResult<T> = Result<T, QueryError>;
