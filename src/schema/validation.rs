//! Path Validation - Property Paths to Document Paths
//!
//! Translates dotted property paths used in criteria (`author.name`) into the
//! document names they are stored under (`author.n`), walking embedded
//! entities, lists and maps along the way.
//!
//! - Positional segments (`0`, `$`, `$[]`, `$[elem]`) pass through unchanged
//! - Map keys pass through unchanged
//! - Fields of subtypes are found when the declared entity lacks them
//! - Segments below `Any` are not checked

use tracing::trace;

use crate::mapper::Mapper;
use crate::schema::model::FieldDescriptor;
use crate::schema::types::FieldType;

/// Outcome of translating a property path
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPath {
    /// Path expressed in document names
    pub path: String,
    /// Declared type of the last resolved property
    pub field_type: Option<FieldType>,
    /// First segment that could not be resolved
    pub unresolved: Option<String>,
}

impl ResolvedPath {
    pub fn is_resolved(&self) -> bool {
        self.unresolved.is_none()
    }
}

/// What the next path segment is looked up in
enum Cursor {
    Entity(String),
    Map(FieldType),
    Opaque,
    Scalar,
}

impl Cursor {
    fn for_type(field_type: &FieldType) -> Self {
        match field_type {
            FieldType::Entity(name) => Cursor::Entity(name.clone()),
            // arrays are traversed implicitly
            FieldType::List(inner) => Cursor::for_type(inner),
            FieldType::Map(inner) => Cursor::Map((**inner).clone()),
            FieldType::Any => Cursor::Opaque,
            _ => Cursor::Scalar,
        }
    }
}

/// Whether `segment` addresses an array position rather than a property
pub fn is_positional(segment: &str) -> bool {
    segment == "$" || segment.starts_with("$[") || segment.parse::<u64>().is_ok()
}

/// Translate `path` against the entity model `entity`
///
/// Resolution stops at the first unknown segment; it and every segment after
/// it are kept as written.
pub fn resolve_path(mapper: &Mapper, entity: &str, path: &str) -> ResolvedPath {
    let mut cursor = Cursor::Entity(entity.to_string());
    let mut segments: Vec<String> = Vec::new();
    let mut field_type = None;
    let mut unresolved: Option<String> = None;

    for segment in path.split('.') {
        if unresolved.is_some() {
            segments.push(segment.to_string());
            continue;
        }

        match &cursor {
            Cursor::Map(value_type) => {
                let value_type = value_type.clone();
                segments.push(segment.to_string());
                cursor = Cursor::for_type(&value_type);
                field_type = Some(value_type);
            }
            _ if is_positional(segment) => segments.push(segment.to_string()),
            Cursor::Entity(name) => match find_field(mapper, name, segment) {
                Some(field) => {
                    segments.push(field.mapped_name().to_string());
                    cursor = Cursor::for_type(field.field_type());
                    field_type = Some(field.field_type().clone());
                }
                None => {
                    trace!(entity = %name, segment, path, "Path segment not found");
                    unresolved = Some(segment.to_string());
                    segments.push(segment.to_string());
                }
            },
            Cursor::Opaque => {
                field_type = None;
                segments.push(segment.to_string());
            }
            Cursor::Scalar => {
                unresolved = Some(segment.to_string());
                segments.push(segment.to_string());
            }
        }
    }

    ResolvedPath {
        path: segments.join("."),
        field_type,
        unresolved,
    }
}

fn find_field<'m>(mapper: &'m Mapper, entity: &str, segment: &str) -> Option<&'m FieldDescriptor> {
    let model = mapper.model(entity)?;
    model.field(segment).or_else(|| {
        mapper
            .subtypes(entity)
            .into_iter()
            .find_map(|subtype| subtype.field(segment))
    })
}
