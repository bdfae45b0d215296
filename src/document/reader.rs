//! Document Reader - Token Cursor with Checkpoints
//!
//! Flattens a BSON value into a token stream and walks it with an explicit
//! cursor. A [`Mark`] is the cursor position, so `reset` restores the exact
//! reader state without side effects. Used for speculative reads such as the
//! discriminator probe and the type-mismatch fallback.

use std::fmt;

use bson::oid::ObjectId;
use bson::spec::ElementType;
use bson::{Bson, DateTime, Document};

use super::{DocumentError, DocumentResult};

/// Flattened element of a document stream
#[derive(Debug, Clone, PartialEq)]
enum Token {
    StartDocument,
    EndDocument,
    StartArray,
    EndArray,
    Name(String),
    Value(Bson),
}

impl Token {
    /// BSON type of the value starting at this token, if it starts one
    fn element_type(&self) -> Option<ElementType> {
        match self {
            Token::StartDocument => Some(ElementType::EmbeddedDocument),
            Token::StartArray => Some(ElementType::Array),
            Token::Value(value) => Some(value.element_type()),
            _ => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            Token::StartDocument => "start of document".to_string(),
            Token::EndDocument => "end of document".to_string(),
            Token::StartArray => "start of array".to_string(),
            Token::EndArray => "end of array".to_string(),
            Token::Name(name) => format!("field name '{}'", name),
            Token::Value(value) => format!("{:?} value", value.element_type()),
        }
    }
}

/// Saved reader position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark(usize);

/// Cursor over a flattened BSON value
pub struct DocumentReader {
    tokens: Vec<Token>,
    cursor: usize,
}

impl DocumentReader {
    /// Create a reader over a document
    pub fn new(document: &Document) -> Self {
        let mut tokens = Vec::new();
        flatten_document(document, &mut tokens);
        Self { tokens, cursor: 0 }
    }

    /// Create a reader over any BSON value
    pub fn from_bson(value: &Bson) -> Self {
        let mut tokens = Vec::new();
        flatten(value, &mut tokens);
        Self { tokens, cursor: 0 }
    }

    /// Create a reader over BSON wire bytes
    pub fn from_bytes(bytes: &[u8]) -> DocumentResult<Self> {
        let document = super::from_bytes(bytes)?;
        Ok(Self::new(&document))
    }

    /// Current cursor position
    #[inline]
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Whether every token has been consumed
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.tokens.len()
    }

    // ------------------------------------------------------------------------
    // Checkpoints
    // ------------------------------------------------------------------------

    /// Save the current position
    #[inline]
    pub fn mark(&self) -> Mark {
        Mark(self.cursor)
    }

    /// Restore a position saved by [`DocumentReader::mark`]
    #[inline]
    pub fn reset(&mut self, mark: Mark) {
        self.cursor = mark.0;
    }

    // ------------------------------------------------------------------------
    // Structure
    // ------------------------------------------------------------------------

    pub fn read_start_document(&mut self) -> DocumentResult<()> {
        self.expect(Token::StartDocument, "start of document")
    }

    pub fn read_end_document(&mut self) -> DocumentResult<()> {
        self.expect(Token::EndDocument, "end of document")
    }

    pub fn read_start_array(&mut self) -> DocumentResult<()> {
        self.expect(Token::StartArray, "start of array")
    }

    pub fn read_end_array(&mut self) -> DocumentResult<()> {
        self.expect(Token::EndArray, "end of array")
    }

    /// Type of the next entry of the current document or array
    ///
    /// Returns `None` at the end of the enclosing scope. Does not consume
    /// anything; inside a document follow it with [`DocumentReader::read_name`].
    pub fn read_element_type(&self) -> DocumentResult<Option<ElementType>> {
        match self.peek()? {
            Token::EndDocument | Token::EndArray => Ok(None),
            Token::Name(_) => {
                let value = self
                    .tokens
                    .get(self.cursor + 1)
                    .ok_or(DocumentError::EndOfStream)?;
                value
                    .element_type()
                    .map(Some)
                    .ok_or_else(|| unexpected("value", value))
            }
            token => token
                .element_type()
                .map(Some)
                .ok_or_else(|| unexpected("entry", token)),
        }
    }

    /// Consume the next field name
    pub fn read_name(&mut self) -> DocumentResult<String> {
        match self.advance()? {
            Token::Name(name) => Ok(name),
            other => Err(unexpected("field name", &other)),
        }
    }

    /// Type of the value at the cursor
    pub fn current_element_type(&self) -> DocumentResult<ElementType> {
        let token = self.peek()?;
        token.element_type().ok_or_else(|| unexpected("value", token))
    }

    // ------------------------------------------------------------------------
    // Values
    // ------------------------------------------------------------------------

    /// Read a UTF-8 string; other types fail without consuming
    pub fn read_string(&mut self) -> DocumentResult<String> {
        match self.read_scalar(ElementType::String)? {
            Bson::String(value) => Ok(value),
            other => Err(mismatch(ElementType::String, &other)),
        }
    }

    /// Read a 32-bit integer; other types fail without consuming
    pub fn read_i32(&mut self) -> DocumentResult<i32> {
        match self.read_scalar(ElementType::Int32)? {
            Bson::Int32(value) => Ok(value),
            other => Err(mismatch(ElementType::Int32, &other)),
        }
    }

    /// Read a 64-bit integer; other types fail without consuming
    pub fn read_i64(&mut self) -> DocumentResult<i64> {
        match self.read_scalar(ElementType::Int64)? {
            Bson::Int64(value) => Ok(value),
            other => Err(mismatch(ElementType::Int64, &other)),
        }
    }

    /// Read a double; other types fail without consuming
    pub fn read_f64(&mut self) -> DocumentResult<f64> {
        match self.read_scalar(ElementType::Double)? {
            Bson::Double(value) => Ok(value),
            other => Err(mismatch(ElementType::Double, &other)),
        }
    }

    /// Read a boolean; other types fail without consuming
    pub fn read_bool(&mut self) -> DocumentResult<bool> {
        match self.read_scalar(ElementType::Boolean)? {
            Bson::Boolean(value) => Ok(value),
            other => Err(mismatch(ElementType::Boolean, &other)),
        }
    }

    /// Read an `ObjectId`; other types fail without consuming
    pub fn read_object_id(&mut self) -> DocumentResult<ObjectId> {
        match self.read_scalar(ElementType::ObjectId)? {
            Bson::ObjectId(value) => Ok(value),
            other => Err(mismatch(ElementType::ObjectId, &other)),
        }
    }

    /// Read a UTC datetime; other types fail without consuming
    pub fn read_date_time(&mut self) -> DocumentResult<DateTime> {
        match self.read_scalar(ElementType::DateTime)? {
            Bson::DateTime(value) => Ok(value),
            other => Err(mismatch(ElementType::DateTime, &other)),
        }
    }

    /// Read an explicit null
    pub fn read_null(&mut self) -> DocumentResult<()> {
        self.read_scalar(ElementType::Null).map(|_| ())
    }

    /// Consume the value at the cursor, whatever its type
    pub fn read_bson(&mut self) -> DocumentResult<Bson> {
        match self.advance()? {
            Token::Value(value) => Ok(value),
            Token::StartDocument => {
                let mut doc = Document::new();
                loop {
                    match self.advance()? {
                        Token::EndDocument => break,
                        Token::Name(name) => {
                            let value = self.read_bson()?;
                            doc.insert(name, value);
                        }
                        other => return Err(unexpected("field name", &other)),
                    }
                }
                Ok(Bson::Document(doc))
            }
            Token::StartArray => {
                let mut items = Vec::new();
                while !matches!(self.peek()?, Token::EndArray) {
                    items.push(self.read_bson()?);
                }
                self.advance()?;
                Ok(Bson::Array(items))
            }
            other => Err(unexpected("value", &other)),
        }
    }

    /// Consume an embedded document at the cursor
    pub fn read_document(&mut self) -> DocumentResult<Document> {
        let found = self.current_element_type()?;
        if found != ElementType::EmbeddedDocument {
            return Err(DocumentError::TypeMismatch {
                expected: ElementType::EmbeddedDocument,
                found,
            });
        }
        match self.read_bson()? {
            Bson::Document(doc) => Ok(doc),
            other => Err(mismatch(ElementType::EmbeddedDocument, &other)),
        }
    }

    /// Skip the value at the cursor, including nested structures
    pub fn skip_value(&mut self) -> DocumentResult<()> {
        match self.advance()? {
            Token::Value(_) => Ok(()),
            Token::StartDocument | Token::StartArray => {
                let mut depth = 1usize;
                while depth > 0 {
                    match self.advance()? {
                        Token::StartDocument | Token::StartArray => depth += 1,
                        Token::EndDocument | Token::EndArray => depth -= 1,
                        _ => {}
                    }
                }
                Ok(())
            }
            other => Err(unexpected("value", &other)),
        }
    }

    fn read_scalar(&mut self, expected: ElementType) -> DocumentResult<Bson> {
        let found = self.current_element_type()?;
        if found != expected {
            return Err(DocumentError::TypeMismatch { expected, found });
        }
        self.read_bson()
    }

    fn peek(&self) -> DocumentResult<&Token> {
        self.tokens.get(self.cursor).ok_or(DocumentError::EndOfStream)
    }

    fn advance(&mut self) -> DocumentResult<Token> {
        let token = self
            .tokens
            .get(self.cursor)
            .cloned()
            .ok_or(DocumentError::EndOfStream)?;
        self.cursor += 1;
        Ok(token)
    }

    fn expect(&mut self, expected: Token, label: &'static str) -> DocumentResult<()> {
        let token = self.peek()?;
        if *token != expected {
            return Err(unexpected(label, token));
        }
        self.cursor += 1;
        Ok(())
    }
}

impl fmt::Debug for DocumentReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentReader")
            .field("cursor", &self.cursor)
            .field("tokens", &self.tokens.len())
            .finish()
    }
}

fn flatten(value: &Bson, out: &mut Vec<Token>) {
    match value {
        Bson::Document(doc) => flatten_document(doc, out),
        Bson::Array(items) => {
            out.push(Token::StartArray);
            for item in items {
                flatten(item, out);
            }
            out.push(Token::EndArray);
        }
        other => out.push(Token::Value(other.clone())),
    }
}

fn flatten_document(doc: &Document, out: &mut Vec<Token>) {
    out.push(Token::StartDocument);
    for (name, value) in doc {
        out.push(Token::Name(name.clone()));
        flatten(value, out);
    }
    out.push(Token::EndDocument);
}

fn unexpected(expected: &'static str, found: &Token) -> DocumentError {
    DocumentError::UnexpectedToken {
        expected,
        found: found.describe(),
    }
}

fn mismatch(expected: ElementType, found: &Bson) -> DocumentError {
    DocumentError::TypeMismatch {
        expected,
        found: found.element_type(),
    }
}
