//! Document Writer - Depth-Aware BSON Builder
//!
//! Accumulates start/end/name/value calls into an in-memory `bson::Document`.
//! Insertion order of fields is preserved exactly as written.

use std::fmt;

use bson::oid::ObjectId;
use bson::{Bson, DateTime, Document};

use super::{DocumentError, DocumentResult};

/// Where a finished value lands in its parent
#[derive(Debug)]
enum Slot {
    /// Named entry of the enclosing document
    Field(String),
    /// Next element of the enclosing array
    Element,
    /// Top-level value of the writer
    Root,
}

/// Open scope on the writer stack
#[derive(Debug)]
enum Frame {
    Document { doc: Document, slot: Slot },
    Array { items: Vec<Bson>, slot: Slot },
}

/// Streaming writer producing an in-memory BSON value
///
/// The top-level value is usually a document, but single-valued expressions
/// may also write a bare scalar or array at the root.
#[derive(Default)]
pub struct DocumentWriter {
    /// Open document/array scopes, innermost last
    stack: Vec<Frame>,
    /// Name written for the next value of the innermost document
    pending_name: Option<String>,
    /// Finished top-level value
    root: Option<Bson>,
    /// Entries the root document starts with
    seed: Option<Document>,
}

impl DocumentWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer whose root document starts with the entries of `seed`
    ///
    /// Fields written later with the same name replace the seeded value in place.
    pub fn with_seed(seed: Document) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    /// Number of open scopes
    #[inline]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Whether the root value has been completely written
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.stack.is_empty() && self.root.is_some()
    }

    // ------------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------------

    /// Open a document scope
    pub fn write_start_document(&mut self) -> DocumentResult<()> {
        let slot = self.begin_value()?;
        let doc = match slot {
            Slot::Root => self.seed.take().unwrap_or_default(),
            _ => Document::new(),
        };
        self.stack.push(Frame::Document { doc, slot });
        Ok(())
    }

    /// Close the innermost document scope
    pub fn write_end_document(&mut self) -> DocumentResult<()> {
        if let Some(name) = &self.pending_name {
            return Err(DocumentError::InvalidState(format!(
                "name '{}' written without a value",
                name
            )));
        }
        match self.stack.pop() {
            Some(Frame::Document { doc, slot }) => self.finish_value(slot, Bson::Document(doc)),
            Some(frame @ Frame::Array { .. }) => {
                self.stack.push(frame);
                Err(DocumentError::InvalidState(
                    "end of document inside an array".to_string(),
                ))
            }
            None => Err(DocumentError::InvalidState(
                "end of document without a start".to_string(),
            )),
        }
    }

    /// Open an array scope
    pub fn write_start_array(&mut self) -> DocumentResult<()> {
        let slot = self.begin_value()?;
        self.stack.push(Frame::Array {
            items: Vec::new(),
            slot,
        });
        Ok(())
    }

    /// Close the innermost array scope
    pub fn write_end_array(&mut self) -> DocumentResult<()> {
        match self.stack.pop() {
            Some(Frame::Array { items, slot }) => self.finish_value(slot, Bson::Array(items)),
            Some(frame @ Frame::Document { .. }) => {
                self.stack.push(frame);
                Err(DocumentError::InvalidState(
                    "end of array inside a document".to_string(),
                ))
            }
            None => Err(DocumentError::InvalidState(
                "end of array without a start".to_string(),
            )),
        }
    }

    /// Name the next value of the innermost document
    pub fn write_name(&mut self, name: &str) -> DocumentResult<()> {
        match self.stack.last() {
            Some(Frame::Document { .. }) => {}
            _ => {
                return Err(DocumentError::InvalidState(format!(
                    "name '{}' written outside of a document",
                    name
                )))
            }
        }
        if let Some(previous) = &self.pending_name {
            return Err(DocumentError::InvalidState(format!(
                "name '{}' written while '{}' still has no value",
                name, previous
            )));
        }
        self.pending_name = Some(name.to_string());
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Values
    // ------------------------------------------------------------------------

    /// Write any BSON value, including whole documents and arrays
    pub fn write_bson(&mut self, value: Bson) -> DocumentResult<()> {
        let slot = self.begin_value()?;
        self.finish_value(slot, value)
    }

    /// Write `name` followed by `value`
    pub fn write_field(&mut self, name: &str, value: impl Into<Bson>) -> DocumentResult<()> {
        self.write_name(name)?;
        self.write_bson(value.into())
    }

    /// Write a boolean
    pub fn write_bool(&mut self, value: bool) -> DocumentResult<()> {
        self.write_bson(Bson::Boolean(value))
    }

    /// Write a 32-bit integer
    pub fn write_i32(&mut self, value: i32) -> DocumentResult<()> {
        self.write_bson(Bson::Int32(value))
    }

    /// Write a 64-bit integer
    pub fn write_i64(&mut self, value: i64) -> DocumentResult<()> {
        self.write_bson(Bson::Int64(value))
    }

    /// Write a double
    pub fn write_f64(&mut self, value: f64) -> DocumentResult<()> {
        self.write_bson(Bson::Double(value))
    }

    /// Write a UTF-8 string
    pub fn write_string(&mut self, value: impl Into<String>) -> DocumentResult<()> {
        self.write_bson(Bson::String(value.into()))
    }

    /// Write an explicit null
    pub fn write_null(&mut self) -> DocumentResult<()> {
        self.write_bson(Bson::Null)
    }

    /// Write an `ObjectId`
    pub fn write_object_id(&mut self, value: ObjectId) -> DocumentResult<()> {
        self.write_bson(Bson::ObjectId(value))
    }

    /// Write a UTC datetime with millisecond precision
    pub fn write_date_time(&mut self, value: DateTime) -> DocumentResult<()> {
        self.write_bson(Bson::DateTime(value))
    }

    // ------------------------------------------------------------------------
    // Results
    // ------------------------------------------------------------------------

    /// Take the finished top-level value
    pub fn into_bson(self) -> DocumentResult<Bson> {
        if !self.stack.is_empty() {
            return Err(DocumentError::Incomplete(format!(
                "{} scope(s) still open",
                self.stack.len()
            )));
        }
        self.root
            .ok_or_else(|| DocumentError::Incomplete("nothing was written".to_string()))
    }

    /// Take the finished top-level document
    pub fn into_document(self) -> DocumentResult<Document> {
        match self.into_bson()? {
            Bson::Document(doc) => Ok(doc),
            other => Err(DocumentError::UnexpectedToken {
                expected: "document",
                found: format!("{:?}", other.element_type()),
            }),
        }
    }

    fn begin_value(&mut self) -> DocumentResult<Slot> {
        match self.stack.last() {
            Some(Frame::Document { .. }) => self
                .pending_name
                .take()
                .map(Slot::Field)
                .ok_or_else(|| {
                    DocumentError::InvalidState("value written without a name".to_string())
                }),
            Some(Frame::Array { .. }) => Ok(Slot::Element),
            None if self.root.is_some() => Err(DocumentError::InvalidState(
                "top-level value already written".to_string(),
            )),
            None => Ok(Slot::Root),
        }
    }

    fn finish_value(&mut self, slot: Slot, value: Bson) -> DocumentResult<()> {
        match (slot, self.stack.last_mut()) {
            (Slot::Field(name), Some(Frame::Document { doc, .. })) => {
                doc.insert(name, value);
                Ok(())
            }
            (Slot::Element, Some(Frame::Array { items, .. })) => {
                items.push(value);
                Ok(())
            }
            (Slot::Root, None) => {
                self.root = Some(value);
                Ok(())
            }
            (slot, _) => Err(DocumentError::InvalidState(format!(
                "value cannot be placed into {:?}",
                slot
            ))),
        }
    }
}

impl fmt::Debug for DocumentWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentWriter")
            .field("depth", &self.depth())
            .field("pending_name", &self.pending_name)
            .field("finished", &self.is_finished())
            .finish()
    }
}
