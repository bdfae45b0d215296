//! Entity Encoder - Schema-Driven Entity Serialization
//!
//! Writes an entity as a document in a fixed field order:
//!
//! 1. id property (generated first for top-level documents when null)
//! 2. discriminator, when the model uses one
//! 3. remaining properties in schema order
//!
//! Entities whose runtime kind differs from the declared model are handed to
//! the encoder of their own model. Models with persist hooks, or mappers with
//! interceptors, encode through a detached document the hooks may rewrite.

use std::sync::Arc;

use bson::oid::ObjectId;
use bson::{Bson, Document};
use tracing::{debug, trace};

use crate::codec::{EncoderContext, MappingError, MappingResult};
use crate::document::{document, DocumentWriter};
use crate::schema::lifecycle::HookKind;
use crate::schema::model::{EntityModel, FieldDescriptor};
use crate::schema::types::{Entity, FieldType, Value};

/// Encoder bound to one entity model
#[derive(Debug, Clone)]
pub struct EntityEncoder {
    model: Arc<EntityModel>,
}

impl EntityEncoder {
    pub fn new(model: Arc<EntityModel>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &Arc<EntityModel> {
        &self.model
    }

    /// Encode a top-level or embedded entity
    ///
    /// When the context is collectible and the entity's id is null, a fresh
    /// `ObjectId` is generated and assigned back to `entity`.
    pub fn encode(
        &self,
        writer: &mut DocumentWriter,
        entity: &mut Entity,
        ctx: &EncoderContext<'_>,
    ) -> MappingResult<()> {
        let encoder = self.resolve(entity, ctx)?;
        if ctx.is_encoding_collectible_document() {
            encoder.generate_id(entity, ctx);
        }
        encoder.encode_ref(writer, entity, ctx)
    }

    /// Encode without touching the instance
    pub fn encode_ref(
        &self,
        writer: &mut DocumentWriter,
        entity: &Entity,
        ctx: &EncoderContext<'_>,
    ) -> MappingResult<()> {
        let encoder = self.resolve(entity, ctx)?;
        let model = &encoder.model;
        if model.has_persist_hooks() || ctx.mapper().has_interceptors() {
            encoder.encode_with_lifecycle(writer, entity, ctx)
        } else {
            encoder.encode_properties(writer, entity, ctx)
        }
    }

    /// Encoder for the entity's runtime kind
    fn resolve(&self, entity: &Entity, ctx: &EncoderContext<'_>) -> MappingResult<EntityEncoder> {
        let declared = FieldType::Entity(self.model.name().to_string());
        let runtime = FieldType::Entity(entity.kind().to_string());
        if declared.is_equivalent(&runtime) {
            return Ok(self.clone());
        }
        trace!(
            declared = %self.model.name(),
            runtime = %entity.kind(),
            "Re-dispatching to runtime entity encoder"
        );
        ctx.mapper().encoder(entity.kind())
    }

    fn generate_id(&self, entity: &mut Entity, ctx: &EncoderContext<'_>) {
        if !ctx.mapper().options().generate_ids {
            return;
        }
        let Some(id_field) = self.model.id_field() else {
            return;
        };
        if !id_field.field_type().accepts_object_id() {
            return;
        }
        if entity.get(id_field.name()).map_or(true, Value::is_null) {
            let id = ObjectId::new();
            debug!(entity = %self.model.name(), %id, "Generated id");
            entity.set(id_field.name(), Value::ObjectId(id));
        }
    }

    fn encode_with_lifecycle(
        &self,
        writer: &mut DocumentWriter,
        entity: &Entity,
        ctx: &EncoderContext<'_>,
    ) -> MappingResult<()> {
        let mapper = ctx.mapper();

        let mut seed = Document::new();
        self.model
            .call_lifecycle_methods(HookKind::PrePersist, entity, &mut seed, mapper)?;

        let mut detached = DocumentWriter::with_seed(seed);
        self.encode_properties(&mut detached, entity, ctx)?;
        let mut document = detached.into_document()?;

        self.model
            .call_lifecycle_methods(HookKind::PostPersist, entity, &mut document, mapper)?;
        writer.write_bson(Bson::Document(document))?;
        Ok(())
    }

    fn encode_properties(
        &self,
        writer: &mut DocumentWriter,
        entity: &Entity,
        ctx: &EncoderContext<'_>,
    ) -> MappingResult<()> {
        let model = &self.model;
        document(writer, |w| {
            if let Some(id_field) = model.id_field() {
                self.encode_property(w, entity, id_field, ctx)?;
            }
            if model.use_discriminator() {
                if let Some(key) = model.discriminator_key() {
                    w.write_field(key, model.discriminator())?;
                }
            }
            for field in model.fields().iter().filter(|f| !f.is_id()) {
                self.encode_property(w, entity, field, ctx)?;
            }
            Ok(())
        })
    }

    fn encode_property(
        &self,
        writer: &mut DocumentWriter,
        entity: &Entity,
        field: &FieldDescriptor,
        ctx: &EncoderContext<'_>,
    ) -> MappingResult<()> {
        let value = entity.get(field.name()).unwrap_or(&Value::Null);
        if !field.should_serialize(value, ctx.mapper().options()) {
            return Ok(());
        }
        writer.write_name(field.mapped_name())?;
        if value.is_null() {
            writer.write_null()?;
            return Ok(());
        }
        let codec = field.codec()?;
        ctx.encode_with_child_context(codec.as_ref(), writer, value)
            .map_err(|err| MappingError::encoding(self.model.name(), field.name(), err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Codec, DecoderContext};
    use crate::config::MapperOptions;
    use crate::document::{DocumentError, DocumentReader};
    use crate::mapper::Mapper;
    use crate::schema::types::PrimitiveType;
    use bson::doc;

    fn mapper(options: MapperOptions) -> Mapper {
        let author = EntityModel::builder("Author")
            .property("name", FieldType::String)
            .build()
            .unwrap();
        let book = EntityModel::builder("Book")
            .property("title", FieldType::String)
            .id("id", FieldType::ObjectId)
            .property("author", FieldType::entity("Author"))
            .property("tags", FieldType::list(FieldType::String))
            .build()
            .unwrap();
        let novel = EntityModel::builder("Novel")
            .property("genre", FieldType::String)
            .extends(&book)
            .build()
            .unwrap();
        Mapper::builder()
            .options(options)
            .entity(author)
            .entity(book)
            .entity(novel)
            .build()
            .unwrap()
    }

    fn encode(mapper: &Mapper, declared: &str, entity: &mut Entity) -> MappingResult<Document> {
        let mut writer = DocumentWriter::new();
        mapper
            .encoder(declared)?
            .encode(&mut writer, entity, &EncoderContext::collectible(mapper))?;
        Ok(writer.into_document()?)
    }

    #[test]
    fn test_field_order_id_then_discriminator() {
        let mapper = mapper(MapperOptions::default());
        let id = ObjectId::new();
        let mut book = Entity::new("Book").with("title", "Dune").with("id", id);

        let doc = encode(&mapper, "Book", &mut book).unwrap();
        let keys: Vec<&String> = doc.keys().collect();
        assert_eq!(keys, vec!["_id", "_t", "title"]);
        assert_eq!(doc, doc! { "_id": id, "_t": "Book", "title": "Dune" });
    }

    #[test]
    fn test_generates_missing_id_only_when_collectible() {
        let mapper = mapper(MapperOptions::default());
        let mut book = Entity::new("Book").with("title", "Dune");

        let mut writer = DocumentWriter::new();
        mapper
            .encoder("Book")
            .unwrap()
            .encode(&mut writer, &mut book, &EncoderContext::new(&mapper))
            .unwrap();
        assert!(book.get("id").is_none());

        let doc = encode(&mapper, "Book", &mut book).unwrap();
        let Some(Value::ObjectId(id)) = book.get("id") else {
            panic!("id was not assigned");
        };
        assert_eq!(doc.get_object_id("_id").unwrap(), *id);
    }

    #[test]
    fn test_id_generation_can_be_disabled() {
        let mapper = mapper(MapperOptions::default().with_generate_ids(false));
        let mut book = Entity::new("Book").with("title", "Dune");
        let doc = encode(&mapper, "Book", &mut book).unwrap();
        assert!(!doc.contains_key("_id"));
        assert!(book.get("id").is_none());
    }

    #[test]
    fn test_runtime_subtype_redispatch() {
        let mapper = mapper(MapperOptions::default());
        let mut novel = Entity::new("Novel")
            .with("id", ObjectId::new())
            .with("genre", "scifi");
        let doc = encode(&mapper, "Book", &mut novel).unwrap();
        assert_eq!(doc.get_str("_t").unwrap(), "Novel");
        assert_eq!(doc.get_str("genre").unwrap(), "scifi");
    }

    #[test]
    fn test_null_and_empty_omission() {
        let mapper = mapper(MapperOptions::default());
        let mut book = Entity::new("Book")
            .with("id", ObjectId::new())
            .with("tags", Value::Array(vec![]));
        let doc = encode(&mapper, "Book", &mut book).unwrap();
        assert!(!doc.contains_key("title"));
        assert!(!doc.contains_key("tags"));

        let mapper = self::mapper(MapperOptions::default().with_store_nulls(true).with_store_empties(true));
        let doc = encode(&mapper, "Book", &mut book).unwrap();
        assert_eq!(doc.get("title"), Some(&Bson::Null));
        assert_eq!(doc.get("tags"), Some(&Bson::Array(vec![])));
    }

    #[test]
    fn test_embedded_entity_keeps_discriminator_without_id() {
        let mapper = mapper(MapperOptions::default());
        let author = Entity::new("Author").with("name", "Herbert");
        let mut book = Entity::new("Book").with("id", ObjectId::new()).with("author", author);
        let doc = encode(&mapper, "Book", &mut book).unwrap();
        assert_eq!(
            doc.get_document("author").unwrap(),
            &doc! { "_t": "Author", "name": "Herbert" }
        );
    }

    #[test]
    fn test_wrong_value_type_reports_field() {
        let mapper = mapper(MapperOptions::default());
        let mut book = Entity::new("Book").with("title", 12);
        let err = encode(&mapper, "Book", &mut book).unwrap_err();
        assert!(matches!(
            err,
            MappingError::Encoding { ref entity, ref field, .. } if entity == "Book" && field == "title"
        ));
    }

    /// Writes its value twice, leaving the second without a name
    #[derive(Debug)]
    struct DoubleWriteCodec;

    impl Codec for DoubleWriteCodec {
        fn field_type(&self) -> FieldType {
            FieldType::String
        }

        fn encode(&self, writer: &mut DocumentWriter, _: &Value, _: &EncoderContext<'_>) -> MappingResult<()> {
            writer.write_string("first")?;
            writer.write_string("second")?;
            Ok(())
        }

        fn decode(&self, reader: &mut DocumentReader, _: &DecoderContext<'_>) -> MappingResult<Value> {
            Ok(Value::from(reader.read_string()?))
        }
    }

    #[test]
    fn test_writer_failure_reports_field() {
        let mapper = mapper(MapperOptions::default());
        let encoder = mapper.encoder("Book").unwrap();
        let mut title = FieldDescriptor::new("title", FieldType::String);
        title.set_codec(Arc::new(DoubleWriteCodec));
        let book = Entity::new("Book").with("title", "Dune");

        let mut writer = DocumentWriter::new();
        writer.write_start_document().unwrap();
        let err = encoder
            .encode_property(&mut writer, &book, &title, &EncoderContext::new(&mapper))
            .unwrap_err();
        match err {
            MappingError::Encoding { entity, field, source } => {
                assert_eq!((entity.as_str(), field.as_str()), ("Book", "title"));
                assert!(matches!(*source, MappingError::Document(DocumentError::InvalidState(_))));
            }
            other => panic!("expected an encoding error, got {:?}", other),
        }
    }

    #[test]
    fn test_unregistered_runtime_kind_fails() {
        let mapper = mapper(MapperOptions::default());
        let mut ghost = Entity::new("Ghost");
        let err = encode(&mapper, "Book", &mut ghost).unwrap_err();
        assert!(matches!(err, MappingError::NoCodec(_)));
    }

    #[test]
    fn test_persist_hooks_see_and_rewrite_document() {
        let counter = EntityModel::builder("Counter")
            .id("id", FieldType::Primitive(PrimitiveType::Int64))
            .property("hits", FieldType::Primitive(PrimitiveType::Int32))
            .hook(HookKind::PrePersist, |_, doc, _| {
                doc.insert("version", 1);
                doc.insert("hits", "placeholder");
                Ok(())
            })
            .hook(HookKind::PostPersist, |entity, doc, _| {
                assert_eq!(entity.get("hits"), Some(&Value::Int32(3)));
                doc.insert("checked", true);
                Ok(())
            })
            .build()
            .unwrap();
        let mapper = Mapper::builder().entity(counter).build().unwrap();

        let mut entity = Entity::new("Counter").with("id", 5_i64).with("hits", 3);
        let doc = encode(&mapper, "Counter", &mut entity).unwrap();
        assert_eq!(
            doc,
            doc! { "version": 1, "hits": 3, "_id": 5_i64, "_t": "Counter", "checked": true }
        );
    }

    #[test]
    fn test_failing_hook_aborts_encode() {
        let model = EntityModel::builder("Strict")
            .hook(HookKind::PrePersist, |_, _, _| {
                Err(MappingError::Configuration("rejected".to_string()))
            })
            .build()
            .unwrap();
        let mapper = Mapper::builder().entity(model).build().unwrap();
        let mut entity = Entity::new("Strict");
        let err = encode(&mapper, "Strict", &mut entity).unwrap_err();
        assert!(matches!(err, MappingError::Hook { kind: HookKind::PrePersist, .. }));
    }
}
