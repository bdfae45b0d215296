//! Instance Creator - Staging Decoded Properties

use std::sync::Arc;

use crate::schema::model::{EntityModel, FieldDescriptor};
use crate::schema::types::{Entity, Value};

/// Collects property values while a document is decoded, then yields the entity
#[derive(Debug)]
pub struct InstanceCreator {
    model: Arc<EntityModel>,
    entity: Entity,
}

impl InstanceCreator {
    pub fn new(model: Arc<EntityModel>) -> Self {
        let entity = Entity::new(model.name());
        Self { model, entity }
    }

    /// Model of the instance being built
    pub fn model(&self) -> &Arc<EntityModel> {
        &self.model
    }

    /// Assign the decoded value of `field`
    pub fn set(&mut self, value: Value, field: &FieldDescriptor) {
        self.entity.set(field.name(), value);
    }

    /// Instance as built so far
    pub fn staged(&self) -> &Entity {
        &self.entity
    }

    pub fn into_instance(self) -> Entity {
        self.entity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::FieldType;

    #[test]
    fn test_values_keyed_by_property_name() {
        let model = EntityModel::builder("Book")
            .field(FieldDescriptor::new("title", FieldType::String).mapped_as("t"))
            .build()
            .unwrap();
        let field = model.fields()[0].clone();
        let mut creator = InstanceCreator::new(Arc::new(model));
        assert!(creator.staged().is_empty());

        creator.set(Value::from("Dune"), &field);
        let book = creator.into_instance();
        assert_eq!(book.kind(), "Book");
        assert_eq!(book.get("title"), Some(&Value::from("Dune")));
    }
}
