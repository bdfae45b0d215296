//! Codec Module - Entity Encoding and Decoding
//!
//! Converts entities to and from documents through the streaming writer and
//! reader. Codecs are resolved once per field when the mapper is built.
//!
//! 1. **Codec trait** - encode a [`Value`] / decode one back for a declared type
//! 2. **Contexts** - collectible flag on encode, checked-discriminator flag on decode
//! 3. **EntityEncoder / EntityDecoder** - schema-driven entity codecs with
//!    discriminators, lifecycle hooks, id generation and decode fallback

pub mod builtin;
pub mod conversions;
pub mod decoder;
pub mod encoder;
pub mod instance;

pub use builtin::{AnyCodec, EntityCodec, ListCodec, MapCodec};
pub use conversions::convert;
pub use decoder::EntityDecoder;
pub use encoder::EntityEncoder;
pub use instance::InstanceCreator;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::document::{DocumentError, DocumentReader, DocumentWriter};
use crate::mapper::Mapper;
use crate::schema::lifecycle::HookKind;
use crate::schema::types::{FieldType, PrimitiveType, Value};

// ============================================================================
// Mapping Errors
// ============================================================================

/// Errors raised while building a mapper or mapping entities
#[derive(Error, Debug)]
pub enum MappingError {
    /// Invalid model or mapper setup
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No codec or entity model is registered for the type
    #[error("no codec registered for type '{0}'")]
    NoCodec(String),

    /// Discriminator value with no registered entity
    #[error("no entity registered for discriminator '{value}' while decoding '{entity}'")]
    UnknownDiscriminator { entity: String, value: String },

    /// Discriminator mapped to a type that is not an entity
    #[error("discriminator '{value}' refers to '{target}', which is not a mapped entity")]
    NonEntityDiscriminator { value: String, target: String },

    /// Value does not fit the codec it was handed to
    #[error("cannot encode {found} value as {expected}")]
    UnexpectedValue { expected: String, found: String },

    /// Fallback conversion of a decoded value failed
    #[error("cannot convert {found} value to {target}")]
    Conversion { target: String, found: String },

    /// Encoding a property failed
    #[error("failed to encode '{entity}.{field}': {source}")]
    Encoding {
        entity: String,
        field: String,
        source: Box<MappingError>,
    },

    /// Decoding a property failed
    #[error("failed to decode '{entity}.{field}': {source}")]
    Decoding {
        entity: String,
        field: String,
        source: Box<MappingError>,
    },

    /// Lifecycle hook or interceptor returned an error
    #[error("{kind} hook failed on '{entity}': {message}")]
    Hook {
        kind: HookKind,
        entity: String,
        message: String,
    },

    /// Writer or reader failure
    #[error(transparent)]
    Document(#[from] DocumentError),
}

impl MappingError {
    /// Whether the error only signals a wire type different from the declared one
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, MappingError::Document(err) if err.is_type_mismatch())
    }

    pub(crate) fn unexpected_value(expected: &FieldType, found: &Value) -> Self {
        MappingError::UnexpectedValue {
            expected: expected.to_string(),
            found: found.kind_name().to_string(),
        }
    }

    pub(crate) fn encoding(entity: &str, field: &str, source: MappingError) -> Self {
        MappingError::Encoding {
            entity: entity.to_string(),
            field: field.to_string(),
            source: Box::new(source),
        }
    }

    pub(crate) fn decoding(entity: &str, field: &str, source: MappingError) -> Self {
        MappingError::Decoding {
            entity: entity.to_string(),
            field: field.to_string(),
            source: Box::new(source),
        }
    }
}

/// Result type for mapping operations
pub type MappingResult<T> = Result<T, MappingError>;

// ============================================================================
// Codec Trait
// ============================================================================

/// Encoder/decoder for values of one declared type
pub trait Codec: Send + Sync + fmt::Debug {
    /// Declared type handled by this codec
    fn field_type(&self) -> FieldType;

    /// Write `value` as the next value of `writer`
    fn encode(
        &self,
        writer: &mut DocumentWriter,
        value: &Value,
        ctx: &EncoderContext<'_>,
    ) -> MappingResult<()>;

    /// Read the next value of `reader`
    ///
    /// A wire value of the wrong type must fail with a type mismatch
    /// before consuming it, so callers can fall back to generic decoding.
    fn decode(&self, reader: &mut DocumentReader, ctx: &DecoderContext<'_>) -> MappingResult<Value>;
}

// ============================================================================
// Contexts
// ============================================================================

/// State carried through one encode call
#[derive(Clone, Copy)]
pub struct EncoderContext<'m> {
    mapper: &'m Mapper,
    collectible: bool,
}

impl<'m> EncoderContext<'m> {
    /// Context for an embedded value
    pub fn new(mapper: &'m Mapper) -> Self {
        Self {
            mapper,
            collectible: false,
        }
    }

    /// Context for a top-level document stored in a collection
    pub fn collectible(mapper: &'m Mapper) -> Self {
        Self {
            mapper,
            collectible: true,
        }
    }

    pub fn mapper(&self) -> &'m Mapper {
        self.mapper
    }

    pub fn is_encoding_collectible_document(&self) -> bool {
        self.collectible
    }

    /// Context for values nested below the current one
    pub fn child(&self) -> Self {
        Self::new(self.mapper)
    }

    pub fn encode_with_child_context(
        &self,
        codec: &dyn Codec,
        writer: &mut DocumentWriter,
        value: &Value,
    ) -> MappingResult<()> {
        codec.encode(writer, value, &self.child())
    }
}

/// State carried through one decode call
#[derive(Clone, Copy)]
pub struct DecoderContext<'m> {
    mapper: &'m Mapper,
    checked_discriminator: bool,
}

impl<'m> DecoderContext<'m> {
    pub fn new(mapper: &'m Mapper) -> Self {
        Self {
            mapper,
            checked_discriminator: false,
        }
    }

    pub fn mapper(&self) -> &'m Mapper {
        self.mapper
    }

    /// Whether the concrete entity was already chosen from the discriminator
    pub fn has_checked_discriminator(&self) -> bool {
        self.checked_discriminator
    }

    pub fn with_checked_discriminator(&self) -> Self {
        Self {
            mapper: self.mapper,
            checked_discriminator: true,
        }
    }

    /// Context for values nested below the current one
    pub fn child(&self) -> Self {
        Self::new(self.mapper)
    }

    pub fn decode_with_child_context(
        &self,
        codec: &dyn Codec,
        reader: &mut DocumentReader,
    ) -> MappingResult<Value> {
        codec.decode(reader, &self.child())
    }
}

// ============================================================================
// Codec Registry
// ============================================================================

/// Resolves codecs for declared field types
#[derive(Debug, Clone, Default)]
pub struct CodecRegistry {
    entities: HashSet<String>,
}

impl CodecRegistry {
    /// Registry aware of the given entity model names
    pub fn new<I, S>(entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entities: entities.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains_entity(&self, name: &str) -> bool {
        self.entities.contains(name)
    }

    /// Codec for `field_type`; entity references must name a registered model
    pub fn get(&self, field_type: &FieldType) -> MappingResult<Arc<dyn Codec>> {
        Ok(match field_type {
            FieldType::Primitive(PrimitiveType::Bool) => Arc::new(builtin::BoolCodec),
            FieldType::Primitive(PrimitiveType::Int32) => Arc::new(builtin::Int32Codec),
            FieldType::Primitive(PrimitiveType::Int64) => Arc::new(builtin::Int64Codec),
            FieldType::Primitive(PrimitiveType::Double) => Arc::new(builtin::DoubleCodec),
            FieldType::String => Arc::new(builtin::StringCodec),
            FieldType::ObjectId => Arc::new(builtin::ObjectIdCodec),
            FieldType::DateTime => Arc::new(builtin::DateTimeCodec),
            FieldType::List(element) => Arc::new(ListCodec::new(self.get(element)?)),
            FieldType::Map(value) => Arc::new(MapCodec::new(self.get(value)?)),
            FieldType::Entity(name) if self.contains_entity(name) => Arc::new(EntityCodec::new(name)),
            FieldType::Entity(name) => return Err(MappingError::NoCodec(name.clone())),
            FieldType::Any => Arc::new(AnyCodec),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentError;
    use bson::spec::ElementType;

    #[test]
    fn test_registry_resolves_nested_types() {
        let registry = CodecRegistry::new(["Author"]);
        let codec = registry
            .get(&FieldType::list(FieldType::map(FieldType::entity("Author"))))
            .unwrap();
        assert_eq!(
            codec.field_type(),
            FieldType::list(FieldType::map(FieldType::entity("Author")))
        );
    }

    #[test]
    fn test_registry_rejects_unknown_entity() {
        let registry = CodecRegistry::new(["Author"]);
        let err = registry.get(&FieldType::list(FieldType::entity("Ghost"))).unwrap_err();
        assert!(matches!(err, MappingError::NoCodec(ref name) if name == "Ghost"));
    }

    #[test]
    fn test_type_mismatch_only_for_direct_document_errors() {
        let mismatch = MappingError::from(DocumentError::TypeMismatch {
            expected: ElementType::Int32,
            found: ElementType::String,
        });
        assert!(mismatch.is_type_mismatch());

        let wrapped = MappingError::decoding("Book", "pages", mismatch);
        assert!(!wrapped.is_type_mismatch());
        assert_eq!(
            wrapped.to_string(),
            "failed to decode 'Book.pages': type mismatch: expected Int32, found String"
        );
    }

    #[test]
    fn test_child_contexts_reset_flags() {
        let mapper = Mapper::builder().build().unwrap();
        let encode = EncoderContext::collectible(&mapper);
        assert!(encode.is_encoding_collectible_document());
        assert!(!encode.child().is_encoding_collectible_document());

        let decode = DecoderContext::new(&mapper).with_checked_discriminator();
        assert!(decode.has_checked_discriminator());
        assert!(!decode.child().has_checked_discriminator());
    }
}
