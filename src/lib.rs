//! docmapper - Typed Entities to BSON Documents and Back
//!
//! A mapping layer between entity values described by a schema and the
//! hierarchical document format:
//! - Entities are encoded field by field through per-type codecs
//! - Polymorphic entities carry a discriminator and decode to their subtype
//! - Lifecycle hooks and interceptors can rewrite documents around encode/decode
//! - Wire values of the wrong type are coerced to the declared type on decode
//! - Aggregation expressions and pipeline stages compile to documents
//! - Query criteria build filter documents with per-field negation and validation

pub mod aggregation;
pub mod codec;
pub mod config;
pub mod document;
pub mod mapper;
pub mod query;
pub mod schema;

// Re-export the mapping entry points
pub use config::{ConfigError, MapperOptions};
pub use mapper::{DiscriminatorLookup, Mapper, MapperBuilder};

// Re-export schema types
pub use schema::{
    Entity, EntityInterceptor, EntityModel, EntityModelBuilder, FieldDescriptor, FieldType,
    HookKind, PrimitiveType, Value,
};

// Re-export codec types
pub use codec::{Codec, CodecRegistry, DecoderContext, EncoderContext, MappingError, MappingResult};

// Re-export document cursors
pub use document::{DocumentError, DocumentReader, DocumentWriter};

// Re-export aggregation and query builders
pub use aggregation::{AggregationError, Expression, Pipeline, Stage};
pub use query::{CriteriaContainer, FieldEnd, QueryError};
