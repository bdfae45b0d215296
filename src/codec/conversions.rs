//! Conversions - Coercing Decoded Values to Declared Types
//!
//! Used when a stored value's type no longer matches the property's declared
//! type, e.g. after a schema change turned an `int` into a `long` or a single
//! value into a list.

use bson::oid::ObjectId;
use bson::DateTime;

use crate::codec::{MappingError, MappingResult};
use crate::schema::types::{FieldType, PrimitiveType, Value};

/// Coerce a generically decoded `value` to `target`
///
/// Null converts to null for every target. Lists and maps convert element
/// by element; a single value becomes a one-element list.
pub fn convert(value: Value, target: &FieldType) -> MappingResult<Value> {
    if value.is_null() || matches!(target, FieldType::Any) || matches_declared(&value, target) {
        return Ok(value);
    }

    let failed = |value: &Value| MappingError::Conversion {
        target: target.to_string(),
        found: value.kind_name().to_string(),
    };

    match target {
        FieldType::Primitive(primitive) => to_primitive(value, *primitive).map_err(|v| failed(&v)),
        FieldType::String => match value {
            Value::Bool(v) => Ok(Value::String(v.to_string())),
            Value::Int32(v) => Ok(Value::String(v.to_string())),
            Value::Int64(v) => Ok(Value::String(v.to_string())),
            Value::Double(v) => Ok(Value::String(v.to_string())),
            Value::ObjectId(v) => Ok(Value::String(v.to_hex())),
            other => Err(failed(&other)),
        },
        FieldType::ObjectId => match value {
            Value::String(ref s) => ObjectId::parse_str(s)
                .map(Value::ObjectId)
                .map_err(|_| failed(&value)),
            other => Err(failed(&other)),
        },
        FieldType::DateTime => match value {
            Value::Int64(ms) => Ok(Value::DateTime(DateTime::from_millis(ms))),
            Value::Int32(ms) => Ok(Value::DateTime(DateTime::from_millis(i64::from(ms)))),
            other => Err(failed(&other)),
        },
        FieldType::List(element) => match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| convert(item, element))
                .collect::<MappingResult<Vec<_>>>()
                .map(Value::Array),
            single => Ok(Value::Array(vec![convert(single, element)?])),
        },
        FieldType::Map(entry_type) => match value {
            Value::Map(entries) => entries
                .into_iter()
                .map(|(key, entry)| convert(entry, entry_type).map(|entry| (key, entry)))
                .collect::<MappingResult<indexmap::IndexMap<_, _>>>()
                .map(Value::Map),
            other => Err(failed(&other)),
        },
        FieldType::Entity(_) | FieldType::Any => Err(failed(&value)),
    }
}

/// Whether `value` already has the shape `target` declares
fn matches_declared(value: &Value, target: &FieldType) -> bool {
    match (value, target) {
        (Value::Entity(entity), FieldType::Entity(name)) => entity.kind() == name,
        (Value::Array(_), FieldType::List(_)) | (Value::Map(_), FieldType::Map(_)) => false,
        _ => value.runtime_type().as_ref() == Some(target),
    }
}

/// Numeric widening/narrowing and string parsing; hands the value back on failure
fn to_primitive(value: Value, target: PrimitiveType) -> Result<Value, Value> {
    match target {
        PrimitiveType::Int32 => match value {
            Value::Int64(v) => i32::try_from(v).map(Value::Int32).map_err(|_| value),
            Value::Double(v) if v.is_finite() && v >= f64::from(i32::MIN) && v <= f64::from(i32::MAX) => {
                Ok(Value::Int32(v as i32))
            }
            Value::Bool(v) => Ok(Value::Int32(i32::from(v))),
            Value::String(s) => s.trim().parse().map(Value::Int32).map_err(|_| Value::String(s)),
            other => Err(other),
        },
        PrimitiveType::Int64 => match value {
            Value::Int32(v) => Ok(Value::Int64(i64::from(v))),
            Value::Double(v) if v.is_finite() && v >= i64::MIN as f64 && v <= i64::MAX as f64 => {
                Ok(Value::Int64(v as i64))
            }
            Value::DateTime(v) => Ok(Value::Int64(v.timestamp_millis())),
            Value::Bool(v) => Ok(Value::Int64(i64::from(v))),
            Value::String(s) => s.trim().parse().map(Value::Int64).map_err(|_| Value::String(s)),
            other => Err(other),
        },
        PrimitiveType::Double => match value {
            Value::Int32(v) => Ok(Value::Double(f64::from(v))),
            Value::Int64(v) => Ok(Value::Double(v as f64)),
            Value::String(s) => s.trim().parse().map(Value::Double).map_err(|_| Value::String(s)),
            other => Err(other),
        },
        PrimitiveType::Bool => match value {
            Value::Int32(v) => Ok(Value::Bool(v != 0)),
            Value::Int64(v) => Ok(Value::Bool(v != 0)),
            Value::String(s) => s.trim().parse().map(Value::Bool).map_err(|_| Value::String(s)),
            other => Err(other),
        },
    }
}
