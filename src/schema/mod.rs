//! Schema Module - Entity Models and Their Types
//!
//! Describes how typed entities map onto documents. Key concepts:
//!
//! 1. **Field Types** - declared property types and runtime values
//! 2. **Entity Models** - ordered properties, id, discriminator, inheritance
//! 3. **Lifecycle Hooks** - persist/load callbacks and mapper-wide interceptors
//! 4. **Path Validation** - property paths translated to document paths

pub mod lifecycle;
pub mod model;
pub mod types;
pub mod validation;

pub use lifecycle::{EntityInterceptor, HookKind, LifecycleHook};
pub use model::{EntityModel, EntityModelBuilder, FieldDescriptor, ID_FIELD};
pub use types::{Entity, FieldType, PrimitiveType, Value};
pub use validation::{resolve_path, ResolvedPath};
