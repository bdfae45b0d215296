//! Schema Types - Field Types, Values and Entities
//!
//! The declared type system of mapped entities and the dynamic values that
//! flow through the codecs:
//!
//! - **FieldType** - what a property is declared as
//! - **Value** - what a property currently holds
//! - **Entity** - a typed record, identified by the name of its entity model

use std::fmt;

use bson::oid::ObjectId;
use bson::{Bson, DateTime};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Scalar types with a fixed BSON representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveType {
    Bool,
    Int32,
    Int64,
    Double,
}

/// Declared type of an entity property
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// Fixed-width scalar
    Primitive(PrimitiveType),
    /// UTF-8 string
    String,
    /// 12-byte object identifier
    ObjectId,
    /// UTC datetime with millisecond precision
    DateTime,
    /// Ordered collection of elements
    List(Box<FieldType>),
    /// String-keyed map of values
    Map(Box<FieldType>),
    /// Embedded entity, by model name
    Entity(String),
    /// Any value; encoded by its runtime kind
    Any,
}

impl FieldType {
    pub fn list(element: FieldType) -> Self {
        FieldType::List(Box::new(element))
    }

    pub fn map(value: FieldType) -> Self {
        FieldType::Map(Box::new(value))
    }

    pub fn entity(name: &str) -> Self {
        FieldType::Entity(name.to_string())
    }

    #[inline]
    pub fn is_list_like(&self) -> bool {
        matches!(self, FieldType::List(_))
    }

    #[inline]
    pub fn is_map_like(&self) -> bool {
        matches!(self, FieldType::Map(_))
    }

    /// Types considered interchangeable when deciding whether a runtime value
    /// needs a different codec than the declared one
    ///
    /// Identical types are equivalent, as are any two list-like or any two
    /// map-like types regardless of their element types.
    pub fn is_equivalent(&self, other: &FieldType) -> bool {
        self == other
            || (self.is_list_like() && other.is_list_like())
            || (self.is_map_like() && other.is_map_like())
    }

    /// Whether a generated `ObjectId` may be assigned to a property of this type
    pub fn accepts_object_id(&self) -> bool {
        matches!(self, FieldType::ObjectId | FieldType::Any)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Primitive(p) => write!(f, "{:?}", p),
            FieldType::String => write!(f, "String"),
            FieldType::ObjectId => write!(f, "ObjectId"),
            FieldType::DateTime => write!(f, "DateTime"),
            FieldType::List(inner) => write!(f, "List<{}>", inner),
            FieldType::Map(inner) => write!(f, "Map<{}>", inner),
            FieldType::Entity(name) => write!(f, "{}", name),
            FieldType::Any => write!(f, "Any"),
        }
    }
}

// ============================================================================
// Values
// ============================================================================

/// Runtime value held by an entity property
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
    String(String),
    ObjectId(ObjectId),
    DateTime(DateTime),
    Array(Vec<Value>),
    Map(IndexMap<String, Value>),
    Entity(Box<Entity>),
    /// BSON value without a dedicated variant (binary, regex, decimal, ...)
    Other(Bson),
}

impl Value {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Empty arrays and maps
    pub fn is_empty_collection(&self) -> bool {
        match self {
            Value::Array(items) => items.is_empty(),
            Value::Map(entries) => entries.is_empty(),
            _ => false,
        }
    }

    /// Type of the value as it exists at runtime
    ///
    /// Collections report `Any` as their element type; `None` for null and
    /// values without a declared counterpart.
    pub fn runtime_type(&self) -> Option<FieldType> {
        Some(match self {
            Value::Null | Value::Other(_) => return None,
            Value::Bool(_) => FieldType::Primitive(PrimitiveType::Bool),
            Value::Int32(_) => FieldType::Primitive(PrimitiveType::Int32),
            Value::Int64(_) => FieldType::Primitive(PrimitiveType::Int64),
            Value::Double(_) => FieldType::Primitive(PrimitiveType::Double),
            Value::String(_) => FieldType::String,
            Value::ObjectId(_) => FieldType::ObjectId,
            Value::DateTime(_) => FieldType::DateTime,
            Value::Array(_) => FieldType::list(FieldType::Any),
            Value::Map(_) => FieldType::map(FieldType::Any),
            Value::Entity(entity) => FieldType::Entity(entity.kind().to_string()),
        })
    }

    /// Short name of the variant, for error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::ObjectId(_) => "objectId",
            Value::DateTime(_) => "datetime",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Entity(_) => "entity",
            Value::Other(_) => "bson",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Value::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    /// Convert a raw BSON value; embedded documents become maps
    pub fn from_bson(value: Bson) -> Self {
        match value {
            Bson::Null | Bson::Undefined => Value::Null,
            Bson::Boolean(b) => Value::Bool(b),
            Bson::Int32(v) => Value::Int32(v),
            Bson::Int64(v) => Value::Int64(v),
            Bson::Double(v) => Value::Double(v),
            Bson::String(s) => Value::String(s),
            Bson::ObjectId(oid) => Value::ObjectId(oid),
            Bson::DateTime(dt) => Value::DateTime(dt),
            Bson::Array(items) => Value::Array(items.into_iter().map(Value::from_bson).collect()),
            Bson::Document(doc) => Value::Map(
                doc.into_iter()
                    .map(|(k, v)| (k, Value::from_bson(v)))
                    .collect(),
            ),
            other => Value::Other(other),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<ObjectId> for Value {
    fn from(v: ObjectId) -> Self {
        Value::ObjectId(v)
    }
}

impl From<DateTime> for Value {
    fn from(v: DateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<Entity> for Value {
    fn from(v: Entity) -> Self {
        Value::Entity(Box::new(v))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

// ============================================================================
// Entities
// ============================================================================

/// Instance of a mapped entity
///
/// Properties are keyed by property name (not document name). A property set
/// to null and a property never set are the same state. An empty list or map
/// compares equal to an absent property.
#[derive(Debug, Clone)]
pub struct Entity {
    kind: String,
    fields: IndexMap<String, Value>,
}

impl Entity {
    /// Create an empty instance of the entity model `kind`
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            fields: IndexMap::new(),
        }
    }

    /// Name of the entity model this instance belongs to
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn get(&self, property: &str) -> Option<&Value> {
        self.fields.get(property)
    }

    /// Set a property; setting null clears it
    pub fn set(&mut self, property: &str, value: impl Into<Value>) {
        match value.into() {
            Value::Null => {
                self.fields.shift_remove(property);
            }
            value => {
                self.fields.insert(property.to_string(), value);
            }
        }
    }

    /// Builder form of [`Entity::set`]
    pub fn with(mut self, property: &str, value: impl Into<Value>) -> Self {
        self.set(property, value);
        self
    }

    pub fn remove(&mut self, property: &str) -> Option<Value> {
        self.fields.shift_remove(property)
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn significant(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter().filter(|(_, v)| !v.is_empty_collection())
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.significant().count() == other.significant().count()
            && self
                .significant()
                .all(|(property, value)| other.fields.get(property) == Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_equivalence() {
        let strings = FieldType::list(FieldType::String);
        let ints = FieldType::list(FieldType::Primitive(PrimitiveType::Int32));
        assert!(strings.is_equivalent(&ints));
        assert!(FieldType::map(FieldType::Any).is_equivalent(&FieldType::map(FieldType::String)));
        assert!(!strings.is_equivalent(&FieldType::map(FieldType::String)));
        assert!(FieldType::entity("Book").is_equivalent(&FieldType::entity("Book")));
        assert!(!FieldType::entity("Book").is_equivalent(&FieldType::entity("Magazine")));
    }

    #[test]
    fn test_display() {
        let ty = FieldType::map(FieldType::list(FieldType::Primitive(PrimitiveType::Int64)));
        assert_eq!(ty.to_string(), "Map<List<Int64>>");
    }

    #[test]
    fn test_value_from_bson() {
        let value = Value::from_bson(Bson::Document(doc! { "a": 1, "b": [true, null] }));
        let Value::Map(entries) = value else {
            panic!("expected map");
        };
        assert_eq!(entries["a"], Value::Int32(1));
        assert_eq!(entries["b"], Value::Array(vec![Value::Bool(true), Value::Null]));
    }

    #[test]
    fn test_runtime_type() {
        assert_eq!(Value::from("x").runtime_type(), Some(FieldType::String));
        assert_eq!(Value::Null.runtime_type(), None);
        let book = Entity::new("Book");
        assert_eq!(Value::from(book).runtime_type(), Some(FieldType::entity("Book")));
    }

    #[test]
    fn test_entity_null_clears_property() {
        let mut entity = Entity::new("Book").with("title", "Dune").with("pages", 412);
        assert_eq!(entity.len(), 2);

        entity.set("title", Value::Null);
        assert!(entity.get("title").is_none());
        assert_eq!(entity, Entity::new("Book").with("pages", 412));
    }

    #[test]
    fn test_empty_collection_equals_absent() {
        let bare = Entity::new("Book").with("title", "Dune");
        let tagged = bare.clone().with("tags", Vec::<&str>::new());
        assert_eq!(tagged.get("tags"), Some(&Value::Array(vec![])));
        assert_eq!(tagged, bare);
        assert_eq!(bare.clone().with("extra", Value::Map(IndexMap::new())), bare);
        assert_ne!(bare.clone().with("tags", vec!["sf"]), bare);
        assert_ne!(Entity::new("Magazine").with("title", "Dune"), bare);
    }

    #[test]
    fn test_option_into_value() {
        let none: Option<i32> = None;
        assert_eq!(Value::from(none), Value::Null);
        assert_eq!(Value::from(Some(3)), Value::Int32(3));
        assert_eq!(
            Value::from(vec!["x", "y"]),
            Value::Array(vec![Value::from("x"), Value::from("y")])
        );
    }
}
