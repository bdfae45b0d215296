//! Aggregation Module - Expression Trees and Pipeline Stages
//!
//! Write-only: expressions and stages compile to documents for the server and
//! are never read back.
//!
//! 1. **expr** - the expression tree, including `$push`, `$zip` and calculus
//! 2. **compiler** - writes expression trees through a `DocumentWriter`
//! 3. **expressions** - free builder functions for common operators
//! 4. **stages** - pipeline stages and the ordered `Pipeline`

pub mod compiler;
pub mod expr;
pub mod expressions;
pub mod stages;

pub use compiler::compile;
pub use expr::{
    CalculusExpression, DocumentExpression, Expression, FieldAccumulation, FunctionExpression,
    OperatorArgs, OperatorExpression, Push, TimeUnit, ZipExpression,
};
pub use stages::{
    AddFields, Group, GroupId, Match, Pipeline, Projection, Sort, SortOrder, Stage, Unwind,
};

use thiserror::Error;

use crate::document::DocumentError;

/// Errors raised while building or compiling expressions
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregationError {
    /// Named sub-fields and a single source expression were both requested
    #[error("{operation} cannot mix named fields with a single expression")]
    MixedModes { operation: String },

    #[error(transparent)]
    Document(#[from] DocumentError),
}

pub type AggregationResult<T> = Result<T, AggregationError>;
