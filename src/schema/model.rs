//! Entity Model - Property Descriptors and Discriminator Settings
//!
//! Describes how an entity maps to a document:
//!
//! - **FieldDescriptor** - property name, document name, declared type, cached codec
//! - **EntityModel** - ordered fields, id, discriminator key/value, lifecycle hooks
//! - **EntityModelBuilder** - fluent construction with inheritance via `extends`

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use bson::Document;
use tracing::trace;

use crate::codec::{Codec, MappingError, MappingResult};
use crate::config::MapperOptions;
use crate::mapper::Mapper;
use crate::schema::lifecycle::{HookKind, LifecycleHook};
use crate::schema::types::{Entity, FieldType, Value};

/// Document name used for the id property
pub const ID_FIELD: &str = "_id";

// ============================================================================
// Field Descriptor
// ============================================================================

/// A mapped property of an entity
#[derive(Clone)]
pub struct FieldDescriptor {
    name: String,
    mapped_name: String,
    field_type: FieldType,
    is_id: bool,
    nullable: bool,
    codec: Option<Arc<dyn Codec>>,
}

impl FieldDescriptor {
    /// Property stored under its own name
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            mapped_name: name.to_string(),
            field_type,
            is_id: false,
            nullable: false,
            codec: None,
        }
    }

    /// Id property, always stored as `_id`
    pub fn id(name: &str, field_type: FieldType) -> Self {
        Self {
            mapped_name: ID_FIELD.to_string(),
            is_id: true,
            ..Self::new(name, field_type)
        }
    }

    /// Store the property under a different document name
    pub fn mapped_as(mut self, document_name: &str) -> Self {
        self.mapped_name = document_name.to_string();
        self
    }

    /// Write explicit nulls for this property even when nulls are not stored
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mapped_name(&self) -> &str {
        &self.mapped_name
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    pub fn is_id(&self) -> bool {
        self.is_id
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Codec resolved for the declared type when the mapper was built
    pub fn codec(&self) -> MappingResult<&Arc<dyn Codec>> {
        self.codec
            .as_ref()
            .ok_or_else(|| MappingError::NoCodec(self.field_type.to_string()))
    }

    pub(crate) fn set_codec(&mut self, codec: Arc<dyn Codec>) {
        self.codec = Some(codec);
    }

    /// Whether `value` is written for this property under `options`
    ///
    /// Nulls are kept for nullable properties or when nulls are stored;
    /// empty arrays and maps only when empties are stored.
    pub fn should_serialize(&self, value: &Value, options: &MapperOptions) -> bool {
        match value {
            Value::Null => self.nullable || options.store_nulls,
            v if v.is_empty_collection() => options.store_empties,
            _ => true,
        }
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("mapped_name", &self.mapped_name)
            .field("field_type", &self.field_type)
            .field("is_id", &self.is_id)
            .field("nullable", &self.nullable)
            .field("resolved", &self.codec.is_some())
            .finish()
    }
}

// ============================================================================
// Entity Model
// ============================================================================

/// Mapping description of one entity type
#[derive(Clone)]
pub struct EntityModel {
    name: String,
    fields: Vec<FieldDescriptor>,
    discriminator_key: Option<String>,
    discriminator: String,
    use_discriminator: bool,
    parent: Option<String>,
    hooks: HashMap<HookKind, Vec<LifecycleHook>>,
}

impl EntityModel {
    /// Start building a model named `name`
    pub fn builder(name: &str) -> EntityModelBuilder {
        EntityModelBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in schema order
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub(crate) fn fields_mut(&mut self) -> &mut [FieldDescriptor] {
        &mut self.fields
    }

    pub fn id_field(&self) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.is_id)
    }

    /// Look up a field by its document name
    pub fn field_by_mapped_name(&self, mapped_name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.mapped_name == mapped_name)
    }

    /// Look up a field by property name, then by document name
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .or_else(|| self.field_by_mapped_name(name))
    }

    /// Document key holding the discriminator, once resolved
    pub fn discriminator_key(&self) -> Option<&str> {
        self.discriminator_key.as_deref()
    }

    /// Discriminator value written for this entity
    pub fn discriminator(&self) -> &str {
        &self.discriminator
    }

    pub fn use_discriminator(&self) -> bool {
        self.use_discriminator
    }

    /// Name of the model this one extends
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Whether any hook is registered for `kind`
    pub fn has_hooks(&self, kind: HookKind) -> bool {
        self.hooks.get(&kind).is_some_and(|hooks| !hooks.is_empty())
    }

    pub fn has_persist_hooks(&self) -> bool {
        self.has_hooks(HookKind::PrePersist) || self.has_hooks(HookKind::PostPersist)
    }

    pub fn has_load_hooks(&self) -> bool {
        self.has_hooks(HookKind::PreLoad) || self.has_hooks(HookKind::PostLoad)
    }

    /// Run this model's hooks of `kind`, then every interceptor of `mapper`
    pub fn call_lifecycle_methods(
        &self,
        kind: HookKind,
        entity: &Entity,
        document: &mut Document,
        mapper: &Mapper,
    ) -> MappingResult<()> {
        if let Some(hooks) = self.hooks.get(&kind) {
            trace!(entity = %self.name, %kind, count = hooks.len(), "Running lifecycle hooks");
            for hook in hooks {
                hook(entity, document, mapper).map_err(|err| self.hook_error(kind, err))?;
            }
        }
        for interceptor in mapper.interceptors() {
            interceptor
                .intercept(kind, entity, document, mapper)
                .map_err(|err| self.hook_error(kind, err))?;
        }
        Ok(())
    }

    fn hook_error(&self, kind: HookKind, err: MappingError) -> MappingError {
        match err {
            err @ MappingError::Hook { .. } => err,
            other => MappingError::Hook {
                kind,
                entity: self.name.clone(),
                message: other.to_string(),
            },
        }
    }

    /// Fill in the mapper-wide discriminator key when none was declared
    pub(crate) fn apply_defaults(&mut self, options: &MapperOptions) {
        if self.discriminator_key.is_none() {
            self.discriminator_key = Some(options.discriminator_key.clone());
        }
    }

    /// Check the structural invariants of the model
    ///
    /// At most one id property, unique document names, and a discriminator
    /// key that no field is stored under.
    pub fn validate(&self) -> MappingResult<()> {
        let ids = self.fields.iter().filter(|f| f.is_id).count();
        if ids > 1 {
            return Err(MappingError::Configuration(format!(
                "entity '{}' declares {} id properties",
                self.name, ids
            )));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.mapped_name.as_str()) {
                return Err(MappingError::Configuration(format!(
                    "entity '{}' maps more than one property to '{}'",
                    self.name, field.mapped_name
                )));
            }
        }

        if self.use_discriminator {
            if let Some(key) = &self.discriminator_key {
                if let Some(field) = self.field_by_mapped_name(key) {
                    return Err(MappingError::Configuration(format!(
                        "discriminator key '{}' of entity '{}' collides with property '{}'",
                        key, self.name, field.name
                    )));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for EntityModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityModel")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("discriminator_key", &self.discriminator_key)
            .field("discriminator", &self.discriminator)
            .field("use_discriminator", &self.use_discriminator)
            .field("parent", &self.parent)
            .field("hooks", &self.hooks.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Fluent builder for [`EntityModel`]
pub struct EntityModelBuilder {
    model: EntityModel,
}

impl EntityModelBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            model: EntityModel {
                name: name.to_string(),
                fields: Vec::new(),
                discriminator_key: None,
                discriminator: name.to_string(),
                use_discriminator: true,
                parent: None,
                hooks: HashMap::new(),
            },
        }
    }

    /// Inherit fields, discriminator key and hooks from `parent`
    ///
    /// Inherited fields come first in schema order.
    pub fn extends(mut self, parent: &EntityModel) -> Self {
        let own = std::mem::take(&mut self.model.fields);
        self.model.fields = parent.fields.clone();
        self.model.fields.extend(own);
        if self.model.discriminator_key.is_none() {
            self.model.discriminator_key = parent.discriminator_key.clone();
        }
        for (kind, hooks) in &parent.hooks {
            self.model
                .hooks
                .entry(*kind)
                .or_default()
                .splice(0..0, hooks.iter().cloned());
        }
        self.model.use_discriminator = parent.use_discriminator;
        self.model.parent = Some(parent.name.clone());
        self
    }

    /// Declare the id property
    pub fn id(self, name: &str, field_type: FieldType) -> Self {
        self.field(FieldDescriptor::id(name, field_type))
    }

    /// Declare a property stored under its own name
    pub fn property(self, name: &str, field_type: FieldType) -> Self {
        self.field(FieldDescriptor::new(name, field_type))
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.model.fields.push(field);
        self
    }

    pub fn discriminator_key(mut self, key: &str) -> Self {
        self.model.discriminator_key = Some(key.to_string());
        self
    }

    pub fn discriminator(mut self, value: &str) -> Self {
        self.model.discriminator = value.to_string();
        self
    }

    pub fn use_discriminator(mut self, enabled: bool) -> Self {
        self.model.use_discriminator = enabled;
        self
    }

    /// Register a lifecycle hook
    pub fn hook<F>(mut self, kind: HookKind, hook: F) -> Self
    where
        F: Fn(&Entity, &mut Document, &Mapper) -> MappingResult<()> + Send + Sync + 'static,
    {
        self.model.hooks.entry(kind).or_default().push(Arc::new(hook));
        self
    }

    pub fn build(self) -> MappingResult<EntityModel> {
        self.model.validate()?;
        Ok(self.model)
    }
}
