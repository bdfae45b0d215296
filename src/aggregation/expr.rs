//! Expression Tree - Typed Aggregation Expressions
//!
//! Expressions come in two shapes:
//!
//! - **Single-valued** - field references, plain values, document and array
//!   expressions; written as a bare value
//! - **General** - operators; written as `{ "<operation>": payload }`
//!
//! The distinction decides whether a nested expression is wrapped in its own
//! document when it appears as an argument.

use std::fmt;

use bson::Bson;
use serde::{Deserialize, Serialize};

use crate::aggregation::{AggregationError, AggregationResult};

/// Node of an aggregation expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Field path reference, always `$`-prefixed
    Field(String),
    /// Plain value written as-is
    Value(Bson),
    /// Named sub-expressions
    Document(DocumentExpression),
    /// Ordered sub-expressions
    Array(Vec<Expression>),
    /// Operator with its arguments
    Operator(OperatorExpression),
    /// `$push` accumulator
    Push(Push),
    /// `$zip` array operator
    Zip(ZipExpression),
    /// `$derivative` / `$integral` window operators
    Calculus(CalculusExpression),
    /// `$function` with a JavaScript body
    Function(FunctionExpression),
}

impl Expression {
    /// Whether the expression is written as a bare value
    pub fn is_single_valued(&self) -> bool {
        matches!(
            self,
            Expression::Field(_) | Expression::Value(_) | Expression::Document(_) | Expression::Array(_)
        )
    }

    /// Operator name of a general expression
    pub fn operation(&self) -> Option<&str> {
        match self {
            Expression::Operator(op) => Some(&op.operation),
            Expression::Push(_) => Some("$push"),
            Expression::Zip(_) => Some("$zip"),
            Expression::Calculus(calculus) => Some(&calculus.operation),
            Expression::Function(_) => Some("$function"),
            _ => None,
        }
    }
}

impl From<Bson> for Expression {
    fn from(value: Bson) -> Self {
        Expression::Value(value)
    }
}

impl From<DocumentExpression> for Expression {
    fn from(doc: DocumentExpression) -> Self {
        Expression::Document(doc)
    }
}

impl From<Push> for Expression {
    fn from(push: Push) -> Self {
        Expression::Push(push)
    }
}

impl From<ZipExpression> for Expression {
    fn from(zip: ZipExpression) -> Self {
        Expression::Zip(zip)
    }
}

impl From<CalculusExpression> for Expression {
    fn from(calculus: CalculusExpression) -> Self {
        Expression::Calculus(calculus)
    }
}

impl From<FunctionExpression> for Expression {
    fn from(function: FunctionExpression) -> Self {
        Expression::Function(function)
    }
}

// ============================================================================
// Document Expressions
// ============================================================================

/// Ordered named sub-expressions, written as an embedded document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentExpression {
    fields: Vec<(String, Expression)>,
}

impl DocumentExpression {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the entry `name`, keeping its original position
    pub fn field(mut self, name: &str, expression: impl Into<Expression>) -> Self {
        self.set(name, expression.into());
        self
    }

    pub fn set(&mut self, name: &str, expression: Expression) {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = expression,
            None => self.fields.push((name.to_string(), expression)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Expression> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, e)| e)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &Expression)> {
        self.fields.iter().map(|(n, e)| (n.as_str(), e))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// ============================================================================
// Operators
// ============================================================================

/// Arguments of an operator expression
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorArgs {
    /// `{ op: arg }`
    Single(Box<Expression>),
    /// `{ op: [args...] }`
    List(Vec<Expression>),
    /// `{ op: { name: arg, ... } }`
    Named(DocumentExpression),
}

/// Operator applied to its arguments
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorExpression {
    pub operation: String,
    pub args: OperatorArgs,
}

impl OperatorExpression {
    pub fn single(operation: &str, arg: impl Into<Expression>) -> Self {
        Self {
            operation: operation.to_string(),
            args: OperatorArgs::Single(Box::new(arg.into())),
        }
    }

    pub fn list(operation: &str, args: Vec<Expression>) -> Self {
        Self {
            operation: operation.to_string(),
            args: OperatorArgs::List(args),
        }
    }

    pub fn named(operation: &str, args: DocumentExpression) -> Self {
        Self {
            operation: operation.to_string(),
            args: OperatorArgs::Named(args),
        }
    }
}

impl From<OperatorExpression> for Expression {
    fn from(op: OperatorExpression) -> Self {
        Expression::Operator(op)
    }
}

// ============================================================================
// Field Accumulation
// ============================================================================

/// Value source of `$push` and of a `$group` id
///
/// Either named sub-fields, which form an implicit document, or one source
/// expression written unwrapped. Once a mode is chosen the other is refused.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FieldAccumulation {
    #[default]
    Empty,
    Fields(DocumentExpression),
    Single(Box<Expression>),
}

impl FieldAccumulation {
    /// Add a named sub-field
    pub fn add_field(
        &mut self,
        operation: &str,
        name: &str,
        expression: Expression,
    ) -> AggregationResult<()> {
        match self {
            FieldAccumulation::Single(_) => Err(AggregationError::MixedModes {
                operation: operation.to_string(),
            }),
            FieldAccumulation::Fields(doc) => {
                doc.set(name, expression);
                Ok(())
            }
            FieldAccumulation::Empty => {
                let mut doc = DocumentExpression::new();
                doc.set(name, expression);
                *self = FieldAccumulation::Fields(doc);
                Ok(())
            }
        }
    }

    /// Use one source expression
    pub fn set_single(&mut self, operation: &str, expression: Expression) -> AggregationResult<()> {
        match self {
            FieldAccumulation::Fields(_) => Err(AggregationError::MixedModes {
                operation: operation.to_string(),
            }),
            _ => {
                *self = FieldAccumulation::Single(Box::new(expression));
                Ok(())
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, FieldAccumulation::Empty)
    }
}

/// `$push` accumulator
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Push {
    accumulation: FieldAccumulation,
}

impl Push {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a document built from named sub-fields
    pub fn field(mut self, name: &str, expression: impl Into<Expression>) -> AggregationResult<Self> {
        self.accumulation.add_field("$push", name, expression.into())?;
        Ok(self)
    }

    /// Push the value of one expression
    pub fn single(mut self, expression: impl Into<Expression>) -> AggregationResult<Self> {
        self.accumulation.set_single("$push", expression.into())?;
        Ok(self)
    }

    pub fn accumulation(&self) -> &FieldAccumulation {
        &self.accumulation
    }
}

// ============================================================================
// Array and Window Operators
// ============================================================================

/// `$zip` over several input arrays
///
/// `defaults` is only meaningful with `use_longest_length`; the pairing is
/// left to the server to enforce.
#[derive(Debug, Clone, PartialEq)]
pub struct ZipExpression {
    pub inputs: Vec<Expression>,
    pub use_longest_length: Option<bool>,
    pub defaults: Option<Box<Expression>>,
}

impl ZipExpression {
    pub fn new(inputs: Vec<Expression>) -> Self {
        Self {
            inputs,
            use_longest_length: None,
            defaults: None,
        }
    }

    pub fn use_longest_length(mut self, enabled: bool) -> Self {
        self.use_longest_length = Some(enabled);
        self
    }

    pub fn defaults(mut self, defaults: impl Into<Expression>) -> Self {
        self.defaults = Some(Box::new(defaults.into()));
        self
    }
}

/// Time unit of window calculus operators, written in lowercase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Week,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
}

impl TimeUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::Week => "week",
            TimeUnit::Day => "day",
            TimeUnit::Hour => "hour",
            TimeUnit::Minute => "minute",
            TimeUnit::Second => "second",
            TimeUnit::Millisecond => "millisecond",
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `$derivative` or `$integral`
#[derive(Debug, Clone, PartialEq)]
pub struct CalculusExpression {
    pub operation: String,
    pub input: Box<Expression>,
    pub unit: Option<TimeUnit>,
}

impl CalculusExpression {
    pub fn new(operation: &str, input: impl Into<Expression>) -> Self {
        Self {
            operation: operation.to_string(),
            input: Box::new(input.into()),
            unit: None,
        }
    }

    pub fn unit(mut self, unit: TimeUnit) -> Self {
        self.unit = Some(unit);
        self
    }
}

/// `$function` with a JavaScript body
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionExpression {
    pub body: String,
    pub args: Vec<Expression>,
    pub lang: String,
}

impl FunctionExpression {
    pub fn new(body: &str, args: Vec<Expression>) -> Self {
        Self {
            body: body.to_string(),
            args,
            lang: "js".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_valued_kinds() {
        assert!(Expression::Field("$a".into()).is_single_valued());
        assert!(Expression::Value(Bson::Int32(1)).is_single_valued());
        assert!(Expression::Document(DocumentExpression::new()).is_single_valued());
        assert!(Expression::Array(vec![]).is_single_valued());
        assert!(!Expression::from(Push::new()).is_single_valued());
        assert!(!Expression::from(OperatorExpression::list("$add", vec![])).is_single_valued());
    }

    #[test]
    fn test_operation_names() {
        let zip = Expression::from(ZipExpression::new(vec![]));
        assert_eq!(zip.operation(), Some("$zip"));
        let integral = Expression::from(CalculusExpression::new("$integral", Bson::Int32(1)));
        assert_eq!(integral.operation(), Some("$integral"));
        assert_eq!(Expression::Field("$a".into()).operation(), None);
    }

    #[test]
    fn test_document_expression_replaces_in_place() {
        let doc = DocumentExpression::new()
            .field("a", Bson::Int32(1))
            .field("b", Bson::Int32(2))
            .field("a", Bson::Int32(3));
        let names: Vec<&str> = doc.entries().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(doc.get("a"), Some(&Expression::Value(Bson::Int32(3))));
    }

    // -------------------------------------------------------------------------
    // Field accumulation modes
    // -------------------------------------------------------------------------

    #[test]
    fn test_push_fields_then_single_fails() {
        let push = Push::new().field("item", Expression::Field("$item".into())).unwrap();
        let err = push.single(Expression::Field("$qty".into())).unwrap_err();
        assert_eq!(
            err,
            AggregationError::MixedModes {
                operation: "$push".to_string()
            }
        );
    }

    #[test]
    fn test_push_single_then_fields_fails() {
        let push = Push::new().single(Expression::Field("$item".into())).unwrap();
        assert!(matches!(
            push.field("qty", Expression::Field("$qty".into())),
            Err(AggregationError::MixedModes { .. })
        ));
    }

    #[test]
    fn test_push_same_mode_accumulates() {
        let push = Push::new()
            .field("item", Expression::Field("$item".into()))
            .and_then(|p| p.field("qty", Expression::Field("$qty".into())))
            .unwrap();
        let FieldAccumulation::Fields(doc) = push.accumulation() else {
            panic!("expected named fields");
        };
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn test_time_unit_lowercase() {
        assert_eq!(TimeUnit::Millisecond.to_string(), "millisecond");
        assert_eq!(serde_json::to_string(&TimeUnit::Hour).unwrap(), "\"hour\"");
    }
}
