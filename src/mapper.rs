//! Mapper - Entity Registry and Entry Point
//!
//! Owns every entity model, the discriminator registry and the interceptors,
//! and offers the top-level conversions between entities and documents.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bson::Document;
use tracing::{debug, info};

use crate::codec::{
    CodecRegistry, DecoderContext, EncoderContext, EntityDecoder, EntityEncoder, MappingError,
    MappingResult,
};
use crate::config::MapperOptions;
use crate::document::{self, DocumentReader, DocumentWriter};
use crate::schema::lifecycle::EntityInterceptor;
use crate::schema::model::EntityModel;
use crate::schema::types::Entity;

// ============================================================================
// Discriminator Registry
// ============================================================================

/// Maps discriminator values to entity model names
#[derive(Debug, Clone, Default)]
pub struct DiscriminatorLookup {
    entries: HashMap<String, String>,
}

impl DiscriminatorLookup {
    /// Register `value` for `entity`; a value may name only one entity
    pub fn register(&mut self, value: &str, entity: &str) -> MappingResult<()> {
        match self.entries.get(value) {
            Some(existing) if existing != entity => Err(MappingError::Configuration(format!(
                "discriminator '{}' is used by both '{}' and '{}'",
                value, existing, entity
            ))),
            _ => {
                self.entries.insert(value.to_string(), entity.to_string());
                Ok(())
            }
        }
    }

    /// Entity model name registered for `value`
    pub fn lookup(&self, value: &str) -> Option<&str> {
        self.entries.get(value).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Mapper
// ============================================================================

/// Registry of entity models plus the options they are mapped with
pub struct Mapper {
    options: MapperOptions,
    models: HashMap<String, Arc<EntityModel>>,
    discriminators: DiscriminatorLookup,
    discriminator_keys: Vec<String>,
    interceptors: Vec<Arc<dyn EntityInterceptor>>,
    codecs: CodecRegistry,
}

impl Mapper {
    pub fn builder() -> MapperBuilder {
        MapperBuilder::new()
    }

    pub fn options(&self) -> &MapperOptions {
        &self.options
    }

    pub fn model(&self, name: &str) -> Option<&Arc<EntityModel>> {
        self.models.get(name)
    }

    /// Model for `name`, or `NoCodec` if it was never registered
    pub fn require_model(&self, name: &str) -> MappingResult<&Arc<EntityModel>> {
        self.model(name)
            .ok_or_else(|| MappingError::NoCodec(name.to_string()))
    }

    pub fn models(&self) -> impl Iterator<Item = &Arc<EntityModel>> {
        self.models.values()
    }

    /// Every model that extends `name`, directly or indirectly
    pub fn subtypes(&self, name: &str) -> Vec<&Arc<EntityModel>> {
        let mut found: Vec<&Arc<EntityModel>> = self
            .models
            .values()
            .filter(|model| self.is_subtype(model, name))
            .collect();
        found.sort_by(|a, b| a.name().cmp(b.name()));
        found
    }

    fn is_subtype(&self, model: &EntityModel, ancestor: &str) -> bool {
        let mut parent = model.parent();
        while let Some(name) = parent {
            if name == ancestor {
                return true;
            }
            parent = self.model(name).and_then(|m| m.parent());
        }
        false
    }

    pub fn discriminators(&self) -> &DiscriminatorLookup {
        &self.discriminators
    }

    /// Every key a discriminator may be stored under, mapper-wide key first
    pub fn discriminator_keys(&self) -> &[String] {
        &self.discriminator_keys
    }

    /// Model registered for a discriminator value met while decoding `entity`
    pub fn model_for_discriminator(&self, entity: &str, value: &str) -> MappingResult<Arc<EntityModel>> {
        self.discriminators
            .lookup(value)
            .and_then(|name| self.models.get(name))
            .cloned()
            .ok_or_else(|| MappingError::UnknownDiscriminator {
                entity: entity.to_string(),
                value: value.to_string(),
            })
    }

    pub fn interceptors(&self) -> &[Arc<dyn EntityInterceptor>] {
        &self.interceptors
    }

    pub fn has_interceptors(&self) -> bool {
        !self.interceptors.is_empty()
    }

    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    pub fn encoder(&self, entity: &str) -> MappingResult<EntityEncoder> {
        Ok(EntityEncoder::new(self.require_model(entity)?.clone()))
    }

    pub fn decoder(&self, entity: &str) -> MappingResult<EntityDecoder> {
        Ok(EntityDecoder::new(self.require_model(entity)?.clone()))
    }

    // ------------------------------------------------------------------------
    // Top-level conversions
    // ------------------------------------------------------------------------

    /// Encode `entity` as a collection document, assigning a generated id if needed
    pub fn to_document(&self, entity: &mut Entity) -> MappingResult<Document> {
        let mut writer = DocumentWriter::new();
        let ctx = EncoderContext::collectible(self);
        self.encoder(entity.kind())?.encode(&mut writer, entity, &ctx)?;
        Ok(writer.into_document()?)
    }

    /// Decode `document` as the entity `entity` or one of its subtypes
    pub fn from_document(&self, entity: &str, document: &Document) -> MappingResult<Entity> {
        let mut reader = DocumentReader::new(document);
        self.decoder(entity)?
            .decode(&mut reader, &DecoderContext::new(self))
    }

    /// Encode `entity` straight to BSON wire bytes
    pub fn to_bytes(&self, entity: &mut Entity) -> MappingResult<Vec<u8>> {
        let document = self.to_document(entity)?;
        Ok(document::to_bytes(&document)?)
    }

    /// Decode BSON wire bytes as `entity`
    pub fn from_bytes(&self, entity: &str, bytes: &[u8]) -> MappingResult<Entity> {
        let mut reader = DocumentReader::from_bytes(bytes)?;
        self.decoder(entity)?
            .decode(&mut reader, &DecoderContext::new(self))
    }
}

impl fmt::Debug for Mapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.models.keys().collect();
        names.sort();
        f.debug_struct("Mapper")
            .field("options", &self.options)
            .field("models", &names)
            .field("discriminators", &self.discriminators.len())
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Collects models and settings, then validates them into a [`Mapper`]
#[derive(Default)]
pub struct MapperBuilder {
    options: MapperOptions,
    models: Vec<EntityModel>,
    aliases: Vec<(String, String)>,
    interceptors: Vec<Arc<dyn EntityInterceptor>>,
}

impl MapperBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(mut self, options: MapperOptions) -> Self {
        self.options = options;
        self
    }

    pub fn entity(mut self, model: EntityModel) -> Self {
        self.models.push(model);
        self
    }

    /// Accept an additional discriminator value for `entity`, e.g. a legacy name
    pub fn discriminator_alias(mut self, value: &str, entity: &str) -> Self {
        self.aliases.push((value.to_string(), entity.to_string()));
        self
    }

    pub fn interceptor(mut self, interceptor: impl EntityInterceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Validate every model, resolve field codecs and register discriminators
    pub fn build(self) -> MappingResult<Mapper> {
        self.options
            .validate()
            .map_err(|err| MappingError::Configuration(err.to_string()))?;

        let codecs = CodecRegistry::new(self.models.iter().map(|m| m.name().to_string()));
        let mut models = HashMap::new();
        let mut discriminators = DiscriminatorLookup::default();
        let mut discriminator_keys = vec![self.options.discriminator_key.clone()];

        for mut model in self.models {
            if models.contains_key(model.name()) {
                return Err(MappingError::Configuration(format!(
                    "entity '{}' registered twice",
                    model.name()
                )));
            }
            model.apply_defaults(&self.options);
            model.validate()?;

            let name = model.name().to_string();
            for field in model.fields_mut() {
                let codec = codecs.get(field.field_type()).map_err(|err| {
                    MappingError::Configuration(format!(
                        "property '{}.{}': {}",
                        name,
                        field.name(),
                        err
                    ))
                })?;
                field.set_codec(codec);
            }

            if model.use_discriminator() {
                discriminators.register(model.discriminator(), &name)?;
                if let Some(key) = model.discriminator_key() {
                    if !discriminator_keys.iter().any(|known| known == key) {
                        discriminator_keys.push(key.to_string());
                    }
                }
            }
            debug!(entity = %name, fields = model.fields().len(), "Registered entity model");
            models.insert(name, Arc::new(model));
        }

        for (value, entity) in &self.aliases {
            if !models.contains_key(entity) {
                return Err(MappingError::NonEntityDiscriminator {
                    value: value.clone(),
                    target: entity.clone(),
                });
            }
            discriminators.register(value, entity)?;
        }

        info!(
            entities = models.len(),
            discriminators = discriminators.len(),
            interceptors = self.interceptors.len(),
            "Mapper built"
        );

        Ok(Mapper {
            options: self.options,
            models,
            discriminators,
            discriminator_keys,
            interceptors: self.interceptors,
            codecs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::{FieldType, Value};
    use bson::doc;

    fn shapes() -> (EntityModel, EntityModel, EntityModel) {
        let shape = EntityModel::builder("Shape")
            .id("id", FieldType::ObjectId)
            .property("color", FieldType::String)
            .build()
            .unwrap();
        let circle = EntityModel::builder("Circle")
            .property("radius", FieldType::Primitive(crate::schema::types::PrimitiveType::Double))
            .extends(&shape)
            .build()
            .unwrap();
        let ring = EntityModel::builder("Ring")
            .extends(&circle)
            .build()
            .unwrap();
        (shape, circle, ring)
    }

    #[test]
    fn test_build_resolves_codecs_and_discriminators() {
        let (shape, circle, ring) = shapes();
        let mapper = Mapper::builder()
            .entity(shape)
            .entity(circle)
            .entity(ring)
            .build()
            .unwrap();

        assert_eq!(mapper.discriminators().lookup("Circle"), Some("Circle"));
        let circle = mapper.model("Circle").unwrap();
        assert_eq!(circle.discriminator_key(), Some("_t"));
        assert!(circle.fields().iter().all(|f| f.codec().is_ok()));

        let names: Vec<&str> = mapper.subtypes("Shape").iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["Circle", "Ring"]);
        assert!(mapper.subtypes("Ring").is_empty());
    }

    #[test]
    fn test_unknown_entity_reference_rejected() {
        let model = EntityModel::builder("Order")
            .property("customer", FieldType::entity("Customer"))
            .build()
            .unwrap();
        let err = Mapper::builder().entity(model).build().unwrap_err();
        assert!(matches!(err, MappingError::Configuration(ref msg) if msg.contains("Customer")));
    }

    #[test]
    fn test_duplicate_discriminator_rejected() {
        let a = EntityModel::builder("A").discriminator("same").build().unwrap();
        let b = EntityModel::builder("B").discriminator("same").build().unwrap();
        let err = Mapper::builder().entity(a).entity(b).build().unwrap_err();
        assert!(matches!(err, MappingError::Configuration(_)));
    }

    #[test]
    fn test_default_key_collision_detected_at_build() {
        let model = EntityModel::builder("Tagged")
            .property("_t", FieldType::String)
            .build()
            .unwrap();
        assert!(Mapper::builder().entity(model).build().is_err());
    }

    #[test]
    fn test_alias_must_target_entity() {
        let (shape, _, _) = shapes();
        let err = Mapper::builder()
            .entity(shape)
            .discriminator_alias("OldShape", "Polygon")
            .build()
            .unwrap_err();
        assert!(matches!(err, MappingError::NonEntityDiscriminator { .. }));
    }

    #[test]
    fn test_alias_decodes_legacy_documents() {
        let (shape, circle, _) = shapes();
        let mapper = Mapper::builder()
            .entity(shape)
            .entity(circle)
            .discriminator_alias("com.example.Circle", "Circle")
            .build()
            .unwrap();
        let entity = mapper
            .from_document("Shape", &doc! { "_t": "com.example.Circle", "radius": 2.0 })
            .unwrap();
        assert_eq!(entity.kind(), "Circle");
        assert_eq!(entity.get("radius"), Some(&Value::Double(2.0)));
    }

    #[test]
    fn test_bytes_roundtrip() {
        let (shape, circle, _) = shapes();
        let mapper = Mapper::builder().entity(shape).entity(circle).build().unwrap();
        let mut entity = Entity::new("Circle").with("color", "red").with("radius", 1.5);

        let bytes = mapper.to_bytes(&mut entity).unwrap();
        assert!(entity.get("id").is_some());
        let decoded = mapper.from_bytes("Shape", &bytes).unwrap();
        assert_eq!(decoded, entity);
    }

    #[test]
    fn test_discriminator_keys_collected_once() {
        let (shape, circle, _) = shapes();
        let label = EntityModel::builder("Label")
            .discriminator_key("kind")
            .build()
            .unwrap();
        let badge = EntityModel::builder("Badge")
            .discriminator_key("kind")
            .build()
            .unwrap();
        let mapper = Mapper::builder()
            .entity(shape)
            .entity(circle)
            .entity(label)
            .entity(badge)
            .build()
            .unwrap();
        assert_eq!(mapper.discriminator_keys(), &["_t".to_string(), "kind".to_string()]);
    }

    #[test]
    fn test_invalid_options_rejected() {
        let options = MapperOptions::default().with_discriminator_key("");
        assert!(Mapper::builder().options(options).build().is_err());
    }
}
