//! Document Module - Streaming BSON Writer and Reader
//!
//! Depth-aware cursors over the hierarchical document format. Everything that
//! produces or consumes documents in this crate goes through these two types:
//!
//! 1. **DocumentWriter** - builds a `bson::Document` from start/end/name/value calls
//! 2. **DocumentReader** - walks a document as a token stream with exact checkpoints
//! 3. **Scope helpers** - `document`/`array` closures that balance start and end calls

pub mod reader;
pub mod writer;

pub use reader::{DocumentReader, Mark};
pub use writer::DocumentWriter;

use bson::spec::ElementType;
use bson::Document;
use thiserror::Error;

// ============================================================================
// Document Errors
// ============================================================================

/// Errors raised by the document writer and reader
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentError {
    /// Writer call made in a state that does not allow it
    #[error("invalid writer state: {0}")]
    InvalidState(String),

    /// Reader found a different token than the one the caller asked for
    #[error("unexpected {found} while expecting {expected}")]
    UnexpectedToken { expected: &'static str, found: String },

    /// Typed read against a value of another BSON type
    #[error("type mismatch: expected {expected:?}, found {found:?}")]
    TypeMismatch {
        expected: ElementType,
        found: ElementType,
    },

    /// Reader ran past the last token
    #[error("unexpected end of document stream")]
    EndOfStream,

    /// Writer finished while scopes were still open or nothing was written
    #[error("incomplete document: {0}")]
    Incomplete(String),

    /// Raw BSON serialization failed
    #[error("bson serialization failed: {0}")]
    Serialize(String),

    /// Raw BSON deserialization failed
    #[error("bson deserialization failed: {0}")]
    Deserialize(String),
}

impl DocumentError {
    /// Whether this error only signals that a value had another type than expected
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, DocumentError::TypeMismatch { .. })
    }
}

impl From<bson::ser::Error> for DocumentError {
    fn from(err: bson::ser::Error) -> Self {
        DocumentError::Serialize(err.to_string())
    }
}

impl From<bson::de::Error> for DocumentError {
    fn from(err: bson::de::Error) -> Self {
        DocumentError::Deserialize(err.to_string())
    }
}

/// Result type for document operations
pub type DocumentResult<T> = Result<T, DocumentError>;

// ============================================================================
// Scope Helpers
// ============================================================================

/// Write an unnamed document scope around `body`
pub fn document<E, F>(writer: &mut DocumentWriter, body: F) -> Result<(), E>
where
    E: From<DocumentError>,
    F: FnOnce(&mut DocumentWriter) -> Result<(), E>,
{
    writer.write_start_document()?;
    body(writer)?;
    writer.write_end_document()?;
    Ok(())
}

/// Write a document scope stored under `name` in the enclosing document
pub fn named_document<E, F>(writer: &mut DocumentWriter, name: &str, body: F) -> Result<(), E>
where
    E: From<DocumentError>,
    F: FnOnce(&mut DocumentWriter) -> Result<(), E>,
{
    writer.write_name(name)?;
    document(writer, body)
}

/// Write an unnamed array scope around `body`
pub fn array<E, F>(writer: &mut DocumentWriter, body: F) -> Result<(), E>
where
    E: From<DocumentError>,
    F: FnOnce(&mut DocumentWriter) -> Result<(), E>,
{
    writer.write_start_array()?;
    body(writer)?;
    writer.write_end_array()?;
    Ok(())
}

/// Write an array scope stored under `name` in the enclosing document
pub fn named_array<E, F>(writer: &mut DocumentWriter, name: &str, body: F) -> Result<(), E>
where
    E: From<DocumentError>,
    F: FnOnce(&mut DocumentWriter) -> Result<(), E>,
{
    writer.write_name(name)?;
    array(writer, body)
}

// ============================================================================
// Raw Bytes
// ============================================================================

/// Serialize a document to its BSON wire bytes
pub fn to_bytes(document: &Document) -> DocumentResult<Vec<u8>> {
    let mut bytes = Vec::new();
    document.to_writer(&mut bytes)?;
    Ok(bytes)
}

/// Parse a document from BSON wire bytes
pub fn from_bytes(bytes: &[u8]) -> DocumentResult<Document> {
    Ok(Document::from_reader(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_scope_helpers_balance_calls() {
        let mut writer = DocumentWriter::new();
        document::<DocumentError, _>(&mut writer, |w| {
            w.write_name("a")?;
            w.write_i32(1)?;
            named_array(w, "list", |w| {
                w.write_string("x")?;
                w.write_string("y")
            })?;
            named_document(w, "inner", |w| {
                w.write_name("flag")?;
                w.write_bool(true)
            })
        })
        .unwrap();

        assert_eq!(
            writer.into_document().unwrap(),
            doc! { "a": 1, "list": ["x", "y"], "inner": { "flag": true } }
        );
    }

    #[test]
    fn test_bytes_roundtrip() {
        let original = doc! { "_id": 1, "name": "abc", "tags": ["x", "y"] };
        let bytes = to_bytes(&original).unwrap();
        let parsed = from_bytes(&bytes).unwrap();
        assert_eq!(original, parsed);
        let keys: Vec<&String> = parsed.keys().collect();
        assert_eq!(keys, vec!["_id", "name", "tags"]);
    }

    #[test]
    fn test_from_bytes_rejects_garbage() {
        let result = from_bytes(&[1, 2, 3]);
        assert!(matches!(result, Err(DocumentError::Deserialize(_))));
    }

    #[test]
    fn test_type_mismatch_classification() {
        let err = DocumentError::TypeMismatch {
            expected: ElementType::Int32,
            found: ElementType::String,
        };
        assert!(err.is_type_mismatch());
        assert!(!DocumentError::EndOfStream.is_type_mismatch());
    }
}
