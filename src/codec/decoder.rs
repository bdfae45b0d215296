//! Entity Decoder - Schema-Driven Entity Deserialization
//!
//! Reads a document back into an entity:
//!
//! 1. Resolve the concrete model from the discriminator (probe, then rewind)
//! 2. Walk the entries, matching document names against the model
//! 3. Fall back to generic decoding plus conversion on wire type mismatches
//!
//! Models with load hooks, or mappers with interceptors, materialize the
//! document first so hooks can inspect and rewrite it.

use std::sync::Arc;

use bson::spec::ElementType;
use tracing::{trace, warn};

use crate::codec::builtin::AnyCodec;
use crate::codec::conversions::convert;
use crate::codec::instance::InstanceCreator;
use crate::codec::{DecoderContext, MappingError, MappingResult};
use crate::document::{DocumentError, DocumentReader};
use crate::schema::lifecycle::HookKind;
use crate::schema::model::{EntityModel, FieldDescriptor};
use crate::schema::types::{Entity, Value};

/// Decoder bound to one entity model
#[derive(Debug, Clone)]
pub struct EntityDecoder {
    model: Arc<EntityModel>,
}

impl EntityDecoder {
    pub fn new(model: Arc<EntityModel>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &Arc<EntityModel> {
        &self.model
    }

    /// Decode the document at the reader's cursor
    pub fn decode(&self, reader: &mut DocumentReader, ctx: &DecoderContext<'_>) -> MappingResult<Entity> {
        if self.model.has_load_hooks() || ctx.mapper().has_interceptors() {
            return self.decode_with_lifecycle(reader, ctx);
        }

        if ctx.has_checked_discriminator() {
            let mut creator = InstanceCreator::new(self.model.clone());
            self.decode_properties(reader, ctx, &mut creator)?;
            return Ok(creator.into_instance());
        }

        let decoder = self.decoder_from_document(reader, ctx)?;
        decoder.decode(reader, &ctx.with_checked_discriminator())
    }

    /// Pick the decoder named by the document's discriminator, leaving the
    /// reader where it was
    fn decoder_from_document(
        &self,
        reader: &mut DocumentReader,
        ctx: &DecoderContext<'_>,
    ) -> MappingResult<EntityDecoder> {
        if !self.model.use_discriminator() {
            return Ok(self.clone());
        }
        let Some(key) = self.model.discriminator_key() else {
            return Ok(self.clone());
        };

        let mark = reader.mark();
        let probed = probe_discriminator(reader, key);
        reader.reset(mark);

        match probed {
            Ok(Some(value)) => {
                let model = ctx.mapper().model_for_discriminator(self.model.name(), &value)?;
                trace!(declared = %self.model.name(), resolved = %model.name(), "Resolved discriminator");
                Ok(EntityDecoder::new(model))
            }
            Ok(None) => Ok(self.clone()),
            Err(err) => Err(MappingError::decoding(self.model.name(), key, err.into())),
        }
    }

    fn decode_with_lifecycle(
        &self,
        reader: &mut DocumentReader,
        ctx: &DecoderContext<'_>,
    ) -> MappingResult<Entity> {
        let mapper = ctx.mapper();
        let mut document = reader.read_document()?;

        let mut model = self.model.clone();
        if self.model.use_discriminator() && !ctx.has_checked_discriminator() {
            if let Some(key) = self.model.discriminator_key() {
                match document.get(key) {
                    Some(bson::Bson::String(value)) => {
                        model = mapper.model_for_discriminator(self.model.name(), value)?;
                    }
                    Some(other) => {
                        let found = other.element_type();
                        return Err(MappingError::decoding(
                            self.model.name(),
                            key,
                            DocumentError::TypeMismatch {
                                expected: ElementType::String,
                                found,
                            }
                            .into(),
                        ));
                    }
                    None => {}
                }
            }
        }

        let mut creator = InstanceCreator::new(model.clone());
        model.call_lifecycle_methods(HookKind::PreLoad, creator.staged(), &mut document, mapper)?;

        let decoder = EntityDecoder::new(model.clone());
        let mut detached = DocumentReader::new(&document);
        decoder.decode_properties(&mut detached, ctx, &mut creator)?;

        let entity = creator.into_instance();
        model.call_lifecycle_methods(HookKind::PostLoad, &entity, &mut document, mapper)?;
        Ok(entity)
    }

    fn decode_properties(
        &self,
        reader: &mut DocumentReader,
        ctx: &DecoderContext<'_>,
        creator: &mut InstanceCreator,
    ) -> MappingResult<()> {
        let discriminator_key = self
            .model
            .use_discriminator()
            .then(|| self.model.discriminator_key())
            .flatten();

        reader.read_start_document()?;
        while let Some(kind) = reader.read_element_type()? {
            let name = reader.read_name()?;
            if discriminator_key == Some(name.as_str()) {
                reader.skip_value()?;
                continue;
            }
            match self.model.field_by_mapped_name(&name) {
                Some(field) => self.decode_model(reader, ctx, creator, field, kind)?,
                None => {
                    trace!(entity = %self.model.name(), field = %name, "Skipping unmapped field");
                    reader.skip_value()?;
                }
            }
        }
        reader.read_end_document()?;
        Ok(())
    }

    fn decode_model(
        &self,
        reader: &mut DocumentReader,
        ctx: &DecoderContext<'_>,
        creator: &mut InstanceCreator,
        field: &FieldDescriptor,
        kind: ElementType,
    ) -> MappingResult<()> {
        if kind == ElementType::Null {
            reader.read_null()?;
            creator.set(Value::Null, field);
            return Ok(());
        }

        let mark = reader.mark();
        let codec = field.codec()?;
        let value = match ctx.decode_with_child_context(codec.as_ref(), reader) {
            Ok(value) => value,
            Err(err) if err.is_type_mismatch() => {
                reader.reset(mark);
                let raw = ctx.decode_with_child_context(&AnyCodec, reader)?;
                warn!(
                    entity = %self.model.name(),
                    field = %field.name(),
                    declared = %field.field_type(),
                    found = raw.kind_name(),
                    "Stored type differs from declared type, converting"
                );
                convert(raw, field.field_type())
                    .map_err(|err| MappingError::decoding(self.model.name(), field.name(), err))?
            }
            Err(err) => return Err(MappingError::decoding(self.model.name(), field.name(), err)),
        };
        creator.set(value, field);
        Ok(())
    }
}

/// Scan the document at the cursor for a string discriminator under `key`
fn probe_discriminator(reader: &mut DocumentReader, key: &str) -> Result<Option<String>, DocumentError> {
    reader.read_start_document()?;
    while reader.read_element_type()?.is_some() {
        let name = reader.read_name()?;
        if name == key {
            return reader.read_string().map(Some);
        }
        reader.skip_value()?;
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::EncoderContext;
    use crate::document::DocumentWriter;
    use crate::mapper::Mapper;
    use crate::schema::types::{FieldType, PrimitiveType};
    use bson::oid::ObjectId;
    use bson::{doc, Document};

    fn mapper() -> Mapper {
        let book = EntityModel::builder("Book")
            .id("id", FieldType::ObjectId)
            .property("title", FieldType::String)
            .property("pages", FieldType::Primitive(PrimitiveType::Int64))
            .property("tags", FieldType::list(FieldType::String))
            .build()
            .unwrap();
        let novel = EntityModel::builder("Novel")
            .property("genre", FieldType::String)
            .extends(&book)
            .build()
            .unwrap();
        let note = EntityModel::builder("Note")
            .use_discriminator(false)
            .property("text", FieldType::String)
            .build()
            .unwrap();
        Mapper::builder()
            .entity(book)
            .entity(novel)
            .entity(note)
            .build()
            .unwrap()
    }

    fn decode(mapper: &Mapper, declared: &str, document: &Document) -> MappingResult<Entity> {
        let mut reader = DocumentReader::new(document);
        mapper.decoder(declared)?.decode(&mut reader, &DecoderContext::new(mapper))
    }

    #[test]
    fn test_decodes_fields_and_ignores_unknown() {
        let mapper = mapper();
        let id = ObjectId::new();
        let doc = doc! { "_id": id, "_t": "Book", "title": "Dune", "legacy": { "a": [1, 2] } };
        let book = decode(&mapper, "Book", &doc).unwrap();
        assert_eq!(book, Entity::new("Book").with("id", id).with("title", "Dune"));
    }

    #[test]
    fn test_discriminator_selects_subtype() {
        let mapper = mapper();
        let doc = doc! { "title": "Neuromancer", "_t": "Novel", "genre": "cyberpunk" };
        let novel = decode(&mapper, "Book", &doc).unwrap();
        assert_eq!(novel.kind(), "Novel");
        assert_eq!(novel.get("genre"), Some(&Value::from("cyberpunk")));
        assert_eq!(novel.get("title"), Some(&Value::from("Neuromancer")));
    }

    #[test]
    fn test_missing_discriminator_uses_declared_model() {
        let mapper = mapper();
        let book = decode(&mapper, "Book", &doc! { "title": "Dune" }).unwrap();
        assert_eq!(book.kind(), "Book");
    }

    #[test]
    fn test_unknown_discriminator_is_an_error() {
        let mapper = mapper();
        let err = decode(&mapper, "Book", &doc! { "_t": "Pamphlet" }).unwrap_err();
        assert!(matches!(
            err,
            MappingError::UnknownDiscriminator { ref value, .. } if value == "Pamphlet"
        ));
    }

    #[test]
    fn test_non_string_discriminator_is_an_error() {
        let mapper = mapper();
        let err = decode(&mapper, "Book", &doc! { "_t": 5 }).unwrap_err();
        assert!(matches!(err, MappingError::Decoding { ref field, .. } if field == "_t"));
    }

    #[test]
    fn test_discriminator_key_ignored_when_unused() {
        let mapper = mapper();
        let note = decode(&mapper, "Note", &doc! { "_t": "Book", "text": "hi" }).unwrap();
        assert_eq!(note, Entity::new("Note").with("text", "hi"));
    }

    #[test]
    fn test_explicit_null_decodes_as_absent() {
        let mapper = mapper();
        let book = decode(&mapper, "Book", &doc! { "title": null, "pages": 3_i64 }).unwrap();
        assert!(book.get("title").is_none());
        assert_eq!(book.get("pages"), Some(&Value::Int64(3)));
    }

    #[test]
    fn test_fallback_converts_mismatched_types() {
        let mapper = mapper();
        let doc = doc! { "pages": 412, "tags": "single", "title": 7 };
        let book = decode(&mapper, "Book", &doc).unwrap();
        assert_eq!(book.get("pages"), Some(&Value::Int64(412)));
        assert_eq!(book.get("tags"), Some(&Value::from(vec!["single"])));
        assert_eq!(book.get("title"), Some(&Value::from("7")));
    }

    #[test]
    fn test_failed_fallback_reports_field() {
        let mapper = mapper();
        let err = decode(&mapper, "Book", &doc! { "pages": "many" }).unwrap_err();
        assert!(matches!(
            err,
            MappingError::Decoding { ref entity, ref field, .. } if entity == "Book" && field == "pages"
        ));
    }

    #[test]
    fn test_load_hooks_rewrite_document() {
        let model = EntityModel::builder("Legacy")
            .property("name", FieldType::String)
            .hook(HookKind::PreLoad, |entity, doc, _| {
                assert!(entity.is_empty());
                if let Some(old) = doc.remove("fullName") {
                    doc.insert("name", old);
                }
                Ok(())
            })
            .hook(HookKind::PostLoad, |entity, _, _| {
                assert_eq!(entity.get("name"), Some(&Value::from("Ada")));
                Ok(())
            })
            .build()
            .unwrap();
        let mapper = Mapper::builder().entity(model).build().unwrap();

        let entity = decode(&mapper, "Legacy", &doc! { "_t": "Legacy", "fullName": "Ada" }).unwrap();
        assert_eq!(entity, Entity::new("Legacy").with("name", "Ada"));
    }

    #[test]
    fn test_nested_reader_positions_survive_probe() {
        let mapper = mapper();
        let mut novel = Entity::new("Novel")
            .with("id", ObjectId::new())
            .with("genre", "noir")
            .with("tags", vec!["a", "b"]);

        let mut writer = DocumentWriter::new();
        mapper
            .encoder("Book")
            .unwrap()
            .encode(&mut writer, &mut novel, &EncoderContext::collectible(&mapper))
            .unwrap();
        let doc = writer.into_document().unwrap();

        let mut reader = DocumentReader::new(&doc);
        let decoded = mapper
            .decoder("Book")
            .unwrap()
            .decode(&mut reader, &DecoderContext::new(&mapper))
            .unwrap();
        assert!(reader.is_exhausted());
        assert_eq!(decoded, novel);
    }
}
