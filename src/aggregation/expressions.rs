//! Expression Builders
//!
//! Free functions building the common operators, grouped as the server
//! documentation groups them.

use bson::Bson;

use crate::aggregation::expr::{
    CalculusExpression, DocumentExpression, Expression, FunctionExpression, OperatorExpression, Push,
    ZipExpression,
};
use crate::aggregation::AggregationResult;

// ============================================================================
// Basics
// ============================================================================

/// Field reference; a leading `$` is added when missing
pub fn field(name: &str) -> Expression {
    if name.starts_with('$') {
        Expression::Field(name.to_string())
    } else {
        Expression::Field(format!("${}", name))
    }
}

/// Plain value
pub fn value(value: impl Into<Bson>) -> Expression {
    Expression::Value(value.into())
}

/// `$literal`, for values that would otherwise be parsed as expressions
pub fn literal(value: impl Into<Bson>) -> Expression {
    OperatorExpression::single("$literal", Expression::Value(value.into())).into()
}

/// Empty document expression to add named fields to
pub fn of() -> DocumentExpression {
    DocumentExpression::new()
}

/// Array of expressions
pub fn array(items: Vec<Expression>) -> Expression {
    Expression::Array(items)
}

// ============================================================================
// Arithmetic
// ============================================================================

pub fn add(operands: Vec<Expression>) -> Expression {
    OperatorExpression::list("$add", operands).into()
}

pub fn subtract(minuend: Expression, subtrahend: Expression) -> Expression {
    OperatorExpression::list("$subtract", vec![minuend, subtrahend]).into()
}

pub fn multiply(operands: Vec<Expression>) -> Expression {
    OperatorExpression::list("$multiply", operands).into()
}

pub fn divide(dividend: Expression, divisor: Expression) -> Expression {
    OperatorExpression::list("$divide", vec![dividend, divisor]).into()
}

pub fn abs(value: Expression) -> Expression {
    OperatorExpression::single("$abs", value).into()
}

// ============================================================================
// Comparison
// ============================================================================

fn comparison(operation: &str, left: Expression, right: Expression) -> Expression {
    OperatorExpression::list(operation, vec![left, right]).into()
}

pub fn eq(left: Expression, right: Expression) -> Expression {
    comparison("$eq", left, right)
}

pub fn ne(left: Expression, right: Expression) -> Expression {
    comparison("$ne", left, right)
}

pub fn gt(left: Expression, right: Expression) -> Expression {
    comparison("$gt", left, right)
}

pub fn gte(left: Expression, right: Expression) -> Expression {
    comparison("$gte", left, right)
}

pub fn lt(left: Expression, right: Expression) -> Expression {
    comparison("$lt", left, right)
}

pub fn lte(left: Expression, right: Expression) -> Expression {
    comparison("$lte", left, right)
}

pub fn cmp(left: Expression, right: Expression) -> Expression {
    comparison("$cmp", left, right)
}

// ============================================================================
// Accumulators
// ============================================================================

pub fn sum(value: Expression) -> Expression {
    OperatorExpression::single("$sum", value).into()
}

pub fn avg(value: Expression) -> Expression {
    OperatorExpression::single("$avg", value).into()
}

pub fn first(value: Expression) -> Expression {
    OperatorExpression::single("$first", value).into()
}

pub fn last(value: Expression) -> Expression {
    OperatorExpression::single("$last", value).into()
}

pub fn min(value: Expression) -> Expression {
    OperatorExpression::single("$min", value).into()
}

pub fn max(value: Expression) -> Expression {
    OperatorExpression::single("$max", value).into()
}

pub fn add_to_set(value: Expression) -> Expression {
    OperatorExpression::single("$addToSet", value).into()
}

/// `$push` to be filled with named fields or one source expression
pub fn push() -> Push {
    Push::new()
}

/// `$push` of a single source expression
pub fn push_value(value: Expression) -> AggregationResult<Expression> {
    Ok(Push::new().single(value)?.into())
}

// ============================================================================
// Dates
// ============================================================================

pub fn year(date: Expression) -> Expression {
    OperatorExpression::single("$year", date).into()
}

pub fn month(date: Expression) -> Expression {
    OperatorExpression::single("$month", date).into()
}

pub fn day_of_year(date: Expression) -> Expression {
    OperatorExpression::single("$dayOfYear", date).into()
}

pub fn day_of_month(date: Expression) -> Expression {
    OperatorExpression::single("$dayOfMonth", date).into()
}

// ============================================================================
// Arrays
// ============================================================================

pub fn size(array: Expression) -> Expression {
    OperatorExpression::single("$size", array).into()
}

pub fn concat_arrays(arrays: Vec<Expression>) -> Expression {
    OperatorExpression::list("$concatArrays", arrays).into()
}

/// `$zip`; set `use_longest_length` and `defaults` on the returned value
pub fn zip(inputs: Vec<Expression>) -> ZipExpression {
    ZipExpression::new(inputs)
}

// ============================================================================
// Strings
// ============================================================================

pub fn concat(parts: Vec<Expression>) -> Expression {
    OperatorExpression::list("$concat", parts).into()
}

pub fn to_lower(value: Expression) -> Expression {
    OperatorExpression::single("$toLower", value).into()
}

pub fn to_upper(value: Expression) -> Expression {
    OperatorExpression::single("$toUpper", value).into()
}

// ============================================================================
// Window
// ============================================================================

pub fn derivative(input: Expression) -> CalculusExpression {
    CalculusExpression::new("$derivative", input)
}

pub fn integral(input: Expression) -> CalculusExpression {
    CalculusExpression::new("$integral", input)
}

pub fn std_dev_pop(value: Expression) -> Expression {
    OperatorExpression::single("$stdDevPop", value).into()
}

pub fn std_dev_samp(value: Expression) -> Expression {
    OperatorExpression::single("$stdDevSamp", value).into()
}

/// Server-side JavaScript function
pub fn function(body: &str, args: Vec<Expression>) -> FunctionExpression {
    FunctionExpression::new(body, args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::compiler::compile;
    use crate::aggregation::expr::TimeUnit;
    use bson::doc;

    #[test]
    fn test_field_prefix() {
        assert_eq!(field("qty"), Expression::Field("$qty".into()));
        assert_eq!(field("$qty"), Expression::Field("$qty".into()));
    }

    #[test]
    fn test_literal_is_general() {
        assert_eq!(
            compile(&literal("$notAField")).unwrap(),
            Bson::Document(doc! { "$literal": "$notAField" })
        );
    }

    #[test]
    fn test_arithmetic_and_comparison() {
        let total = multiply(vec![field("price"), field("qty")]);
        assert_eq!(
            compile(&gt(total, value(100))).unwrap(),
            Bson::Document(doc! { "$gt": [{ "$multiply": ["$price", "$qty"] }, 100] })
        );
        assert_eq!(
            compile(&subtract(field("a"), abs(field("b")))).unwrap(),
            Bson::Document(doc! { "$subtract": ["$a", { "$abs": "$b" }] })
        );
    }

    #[test]
    fn test_accumulators() {
        assert_eq!(
            compile(&sum(value(1))).unwrap(),
            Bson::Document(doc! { "$sum": 1 })
        );
        assert_eq!(
            compile(&push_value(field("item")).unwrap()).unwrap(),
            Bson::Document(doc! { "$push": "$item" })
        );
        assert_eq!(
            compile(&add_to_set(day_of_year(field("date")))).unwrap(),
            Bson::Document(doc! { "$addToSet": { "$dayOfYear": "$date" } })
        );
    }

    #[test]
    fn test_document_expression_argument() {
        let shape = of().field("name", to_upper(field("name"))).field("len", size(field("tags")));
        assert_eq!(
            compile(&shape.into()).unwrap(),
            Bson::Document(doc! { "name": { "$toUpper": "$name" }, "len": { "$size": "$tags" } })
        );
    }

    #[test]
    fn test_window_builders() {
        let expr: Expression = integral(field("kw")).unit(TimeUnit::Hour).into();
        assert_eq!(
            compile(&expr).unwrap(),
            Bson::Document(doc! { "$integral": { "input": "$kw", "unit": "hour" } })
        );
        assert_eq!(
            compile(&std_dev_pop(field("score"))).unwrap(),
            Bson::Document(doc! { "$stdDevPop": "$score" })
        );
    }
}
