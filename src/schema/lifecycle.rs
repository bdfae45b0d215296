//! Lifecycle Hooks - Persist and Load Callbacks
//!
//! Hooks observe an entity while it is written to or read from a document.
//! They may rewrite the document but never the instance.

use std::fmt;
use std::sync::Arc;

use bson::Document;
use serde::{Deserialize, Serialize};

use crate::codec::MappingResult;
use crate::mapper::Mapper;
use crate::schema::types::Entity;

/// Point in the encode/decode cycle at which a hook runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookKind {
    /// Before fields are written; receives an empty document to seed
    PrePersist,
    /// After fields are written; receives the complete document
    PostPersist,
    /// Before fields are read; receives the raw document
    PreLoad,
    /// After the instance is built
    PostLoad,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HookKind::PrePersist => "pre-persist",
            HookKind::PostPersist => "post-persist",
            HookKind::PreLoad => "pre-load",
            HookKind::PostLoad => "post-load",
        };
        f.write_str(name)
    }
}

/// Hook registered on an entity model
pub type LifecycleHook =
    Arc<dyn Fn(&Entity, &mut Document, &Mapper) -> MappingResult<()> + Send + Sync>;

/// Mapper-wide observer invoked for every entity, after the model's own hooks
pub trait EntityInterceptor: Send + Sync {
    fn pre_persist(&self, _entity: &Entity, _document: &mut Document, _mapper: &Mapper) -> MappingResult<()> {
        Ok(())
    }

    fn post_persist(&self, _entity: &Entity, _document: &mut Document, _mapper: &Mapper) -> MappingResult<()> {
        Ok(())
    }

    fn pre_load(&self, _entity: &Entity, _document: &mut Document, _mapper: &Mapper) -> MappingResult<()> {
        Ok(())
    }

    fn post_load(&self, _entity: &Entity, _document: &mut Document, _mapper: &Mapper) -> MappingResult<()> {
        Ok(())
    }

    /// Dispatch to the method matching `kind`
    fn intercept(
        &self,
        kind: HookKind,
        entity: &Entity,
        document: &mut Document,
        mapper: &Mapper,
    ) -> MappingResult<()> {
        match kind {
            HookKind::PrePersist => self.pre_persist(entity, document, mapper),
            HookKind::PostPersist => self.post_persist(entity, document, mapper),
            HookKind::PreLoad => self.pre_load(entity, document, mapper),
            HookKind::PostLoad => self.post_load(entity, document, mapper),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stamp;

    impl EntityInterceptor for Stamp {
        fn pre_persist(&self, _entity: &Entity, document: &mut Document, _mapper: &Mapper) -> MappingResult<()> {
            document.insert("stamped", true);
            Ok(())
        }
    }

    #[test]
    fn test_intercept_dispatches_by_kind() {
        let mapper = Mapper::builder().build().unwrap();
        let entity = Entity::new("Any");
        let mut document = Document::new();

        Stamp
            .intercept(HookKind::PostLoad, &entity, &mut document, &mapper)
            .unwrap();
        assert!(document.is_empty());

        Stamp
            .intercept(HookKind::PrePersist, &entity, &mut document, &mapper)
            .unwrap();
        assert!(document.get_bool("stamped").unwrap());
    }

    #[test]
    fn test_hook_kind_display() {
        assert_eq!(HookKind::PrePersist.to_string(), "pre-persist");
        assert_eq!(HookKind::PostLoad.to_string(), "post-load");
    }
}
