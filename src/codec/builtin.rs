//! Builtin Codecs - Scalars, Collections, Entities and Any

use std::sync::Arc;

use bson::spec::ElementType;

use crate::codec::{Codec, DecoderContext, EncoderContext, MappingError, MappingResult};
use crate::document::{array, document, DocumentError, DocumentReader, DocumentWriter};
use crate::schema::types::{FieldType, PrimitiveType, Value};

// ============================================================================
// Scalar Codecs
// ============================================================================

/// Helper macro for codecs of single-valued BSON types
macro_rules! scalar_codec {
    ($name:ident, $field_type:expr, $variant:ident, $write:ident, $read:ident) => {
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl Codec for $name {
            fn field_type(&self) -> FieldType {
                $field_type
            }

            fn encode(
                &self,
                writer: &mut DocumentWriter,
                value: &Value,
                _ctx: &EncoderContext<'_>,
            ) -> MappingResult<()> {
                match value {
                    Value::$variant(v) => Ok(writer.$write(v.to_owned())?),
                    other => Err(MappingError::unexpected_value(&self.field_type(), other)),
                }
            }

            fn decode(
                &self,
                reader: &mut DocumentReader,
                _ctx: &DecoderContext<'_>,
            ) -> MappingResult<Value> {
                Ok(Value::$variant(reader.$read()?))
            }
        }
    };
}

scalar_codec!(BoolCodec, FieldType::Primitive(PrimitiveType::Bool), Bool, write_bool, read_bool);
scalar_codec!(Int32Codec, FieldType::Primitive(PrimitiveType::Int32), Int32, write_i32, read_i32);
scalar_codec!(Int64Codec, FieldType::Primitive(PrimitiveType::Int64), Int64, write_i64, read_i64);
scalar_codec!(DoubleCodec, FieldType::Primitive(PrimitiveType::Double), Double, write_f64, read_f64);
scalar_codec!(StringCodec, FieldType::String, String, write_string, read_string);
scalar_codec!(ObjectIdCodec, FieldType::ObjectId, ObjectId, write_object_id, read_object_id);
scalar_codec!(DateTimeCodec, FieldType::DateTime, DateTime, write_date_time, read_date_time);

/// Fail with a type mismatch, without consuming, unless the next value is `expected`
fn expect_element(reader: &DocumentReader, expected: ElementType) -> MappingResult<()> {
    let found = reader.current_element_type()?;
    if found != expected {
        return Err(DocumentError::TypeMismatch { expected, found }.into());
    }
    Ok(())
}

// ============================================================================
// Collections
// ============================================================================

/// Arrays whose elements share one codec
#[derive(Debug, Clone)]
pub struct ListCodec {
    element: Arc<dyn Codec>,
}

impl ListCodec {
    pub fn new(element: Arc<dyn Codec>) -> Self {
        Self { element }
    }
}

impl Codec for ListCodec {
    fn field_type(&self) -> FieldType {
        FieldType::list(self.element.field_type())
    }

    fn encode(
        &self,
        writer: &mut DocumentWriter,
        value: &Value,
        ctx: &EncoderContext<'_>,
    ) -> MappingResult<()> {
        let Value::Array(items) = value else {
            return Err(MappingError::unexpected_value(&self.field_type(), value));
        };
        array(writer, |w| {
            for item in items {
                if item.is_null() {
                    w.write_null()?;
                } else {
                    ctx.encode_with_child_context(self.element.as_ref(), w, item)?;
                }
            }
            Ok(())
        })
    }

    fn decode(&self, reader: &mut DocumentReader, ctx: &DecoderContext<'_>) -> MappingResult<Value> {
        expect_element(reader, ElementType::Array)?;
        reader.read_start_array()?;
        let mut items = Vec::new();
        while let Some(kind) = reader.read_element_type()? {
            if kind == ElementType::Null {
                reader.read_null()?;
                items.push(Value::Null);
            } else {
                items.push(ctx.decode_with_child_context(self.element.as_ref(), reader)?);
            }
        }
        reader.read_end_array()?;
        Ok(Value::Array(items))
    }
}

/// String-keyed documents whose values share one codec
#[derive(Debug, Clone)]
pub struct MapCodec {
    value: Arc<dyn Codec>,
}

impl MapCodec {
    pub fn new(value: Arc<dyn Codec>) -> Self {
        Self { value }
    }
}

impl Codec for MapCodec {
    fn field_type(&self) -> FieldType {
        FieldType::map(self.value.field_type())
    }

    fn encode(
        &self,
        writer: &mut DocumentWriter,
        value: &Value,
        ctx: &EncoderContext<'_>,
    ) -> MappingResult<()> {
        let Value::Map(entries) = value else {
            return Err(MappingError::unexpected_value(&self.field_type(), value));
        };
        document(writer, |w| {
            for (key, entry) in entries {
                w.write_name(key)?;
                if entry.is_null() {
                    w.write_null()?;
                } else {
                    ctx.encode_with_child_context(self.value.as_ref(), w, entry)?;
                }
            }
            Ok(())
        })
    }

    fn decode(&self, reader: &mut DocumentReader, ctx: &DecoderContext<'_>) -> MappingResult<Value> {
        expect_element(reader, ElementType::EmbeddedDocument)?;
        reader.read_start_document()?;
        let mut entries = indexmap::IndexMap::new();
        while let Some(kind) = reader.read_element_type()? {
            let key = reader.read_name()?;
            let entry = if kind == ElementType::Null {
                reader.read_null()?;
                Value::Null
            } else {
                ctx.decode_with_child_context(self.value.as_ref(), reader)?
            };
            entries.insert(key, entry);
        }
        reader.read_end_document()?;
        Ok(Value::Map(entries))
    }
}

// ============================================================================
// Entities
// ============================================================================

/// Embedded entity of a declared model
#[derive(Debug, Clone)]
pub struct EntityCodec {
    entity: String,
}

impl EntityCodec {
    pub fn new(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
        }
    }
}

impl Codec for EntityCodec {
    fn field_type(&self) -> FieldType {
        FieldType::Entity(self.entity.clone())
    }

    fn encode(
        &self,
        writer: &mut DocumentWriter,
        value: &Value,
        ctx: &EncoderContext<'_>,
    ) -> MappingResult<()> {
        match value {
            Value::Entity(entity) => ctx
                .mapper()
                .encoder(&self.entity)?
                .encode_ref(writer, entity, ctx),
            other => Err(MappingError::unexpected_value(&self.field_type(), other)),
        }
    }

    fn decode(&self, reader: &mut DocumentReader, ctx: &DecoderContext<'_>) -> MappingResult<Value> {
        expect_element(reader, ElementType::EmbeddedDocument)?;
        let entity = ctx.mapper().decoder(&self.entity)?.decode(reader, ctx)?;
        Ok(Value::Entity(Box::new(entity)))
    }
}

// ============================================================================
// Any
// ============================================================================

/// Values of undeclared type, encoded by their runtime kind
///
/// Decoding yields plain values; embedded documents carrying a known
/// discriminator decode as the matching entity, other documents as maps.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyCodec;

impl Codec for AnyCodec {
    fn field_type(&self) -> FieldType {
        FieldType::Any
    }

    fn encode(
        &self,
        writer: &mut DocumentWriter,
        value: &Value,
        ctx: &EncoderContext<'_>,
    ) -> MappingResult<()> {
        match value {
            Value::Null => Ok(writer.write_null()?),
            Value::Bool(v) => Ok(writer.write_bool(*v)?),
            Value::Int32(v) => Ok(writer.write_i32(*v)?),
            Value::Int64(v) => Ok(writer.write_i64(*v)?),
            Value::Double(v) => Ok(writer.write_f64(*v)?),
            Value::String(v) => Ok(writer.write_string(v.as_str())?),
            Value::ObjectId(v) => Ok(writer.write_object_id(*v)?),
            Value::DateTime(v) => Ok(writer.write_date_time(*v)?),
            Value::Other(v) => Ok(writer.write_bson(v.clone())?),
            Value::Array(items) => array(writer, |w| {
                for item in items {
                    self.encode(w, item, ctx)?;
                }
                Ok(())
            }),
            Value::Map(entries) => document(writer, |w| {
                for (key, entry) in entries {
                    w.write_name(key)?;
                    self.encode(w, entry, ctx)?;
                }
                Ok(())
            }),
            Value::Entity(entity) => ctx
                .mapper()
                .encoder(entity.kind())?
                .encode_ref(writer, entity, ctx),
        }
    }

    fn decode(&self, reader: &mut DocumentReader, ctx: &DecoderContext<'_>) -> MappingResult<Value> {
        match reader.current_element_type()? {
            ElementType::EmbeddedDocument => {
                let mark = reader.mark();
                let document = reader.read_document()?;
                let mapper = ctx.mapper();
                let entity = mapper.discriminator_keys().iter().find_map(|key| {
                    let value = document.get_str(key).ok()?;
                    let model = mapper.model(mapper.discriminators().lookup(value)?)?;
                    (model.discriminator_key() == Some(key.as_str())).then(|| model.name())
                });
                match entity {
                    Some(entity) => {
                        reader.reset(mark);
                        let decoded = mapper.decoder(entity)?.decode(reader, ctx)?;
                        Ok(Value::Entity(Box::new(decoded)))
                    }
                    None => Ok(Value::from_bson(bson::Bson::Document(document))),
                }
            }
            ElementType::Array => {
                reader.read_start_array()?;
                let mut items = Vec::new();
                while reader.read_element_type()?.is_some() {
                    items.push(self.decode(reader, ctx)?);
                }
                reader.read_end_array()?;
                Ok(Value::Array(items))
            }
            _ => Ok(Value::from_bson(reader.read_bson()?)),
        }
    }
}
