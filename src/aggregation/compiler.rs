//! Expression Compiler - Writing Expression Trees as Documents
//!
//! Helpers shared by expressions and stages. Optional parameters that are
//! unset are omitted rather than written as null.

use bson::Bson;

use crate::aggregation::expr::{
    CalculusExpression, DocumentExpression, Expression, FieldAccumulation, FunctionExpression,
    OperatorArgs, ZipExpression,
};
use crate::aggregation::AggregationResult;
use crate::document::{array, document, named_array, DocumentWriter};

/// Compile one expression to a standalone BSON value
pub fn compile(expression: &Expression) -> AggregationResult<Bson> {
    let mut writer = DocumentWriter::new();
    encode_expression(&mut writer, expression)?;
    Ok(writer.into_bson()?)
}

/// Write `expression` at the current position
///
/// Single-valued expressions are written bare; general expressions get
/// their own `{ "<operation>": payload }` document.
pub fn encode_expression(writer: &mut DocumentWriter, expression: &Expression) -> AggregationResult<()> {
    if expression.is_single_valued() {
        encode_single_valued(writer, expression)
    } else {
        document(writer, |w| encode_operation(w, expression))
    }
}

/// Write `name: expression` if the expression is present
pub fn encode_named_if_not_null(
    writer: &mut DocumentWriter,
    name: &str,
    expression: Option<&Expression>,
) -> AggregationResult<()> {
    if let Some(expression) = expression {
        writer.write_name(name)?;
        encode_expression(writer, expression)?;
    }
    Ok(())
}

/// Write `name: value` if the value is present
pub fn value<T: Into<Bson>>(writer: &mut DocumentWriter, name: &str, value: Option<T>) -> AggregationResult<()> {
    if let Some(value) = value {
        writer.write_field(name, value)?;
    }
    Ok(())
}

/// Write `name: [expressions...]`
pub fn expression_array(writer: &mut DocumentWriter, name: &str, expressions: &[Expression]) -> AggregationResult<()> {
    named_array(writer, name, |w| encode_all(w, expressions))
}

/// Write the entries of a document expression into the open document
pub fn encode_entries(writer: &mut DocumentWriter, doc: &DocumentExpression) -> AggregationResult<()> {
    for (name, expression) in doc.entries() {
        writer.write_name(name)?;
        encode_expression(writer, expression)?;
    }
    Ok(())
}

fn encode_all(writer: &mut DocumentWriter, expressions: &[Expression]) -> AggregationResult<()> {
    for expression in expressions {
        encode_expression(writer, expression)?;
    }
    Ok(())
}

fn encode_single_valued(writer: &mut DocumentWriter, expression: &Expression) -> AggregationResult<()> {
    match expression {
        Expression::Field(path) => Ok(writer.write_string(path.as_str())?),
        Expression::Value(value) => Ok(writer.write_bson(value.clone())?),
        Expression::Document(doc) => document(writer, |w| encode_entries(w, doc)),
        Expression::Array(items) => array(writer, |w| encode_all(w, items)),
        general => document(writer, |w| encode_operation(w, general)),
    }
}

/// Write `<operation>: payload` into the open document
fn encode_operation(writer: &mut DocumentWriter, expression: &Expression) -> AggregationResult<()> {
    match expression {
        Expression::Operator(op) => {
            writer.write_name(&op.operation)?;
            match &op.args {
                OperatorArgs::Single(arg) => encode_expression(writer, arg),
                OperatorArgs::List(args) => array(writer, |w| encode_all(w, args)),
                OperatorArgs::Named(args) => document(writer, |w| encode_entries(w, args)),
            }
        }
        Expression::Push(push) => {
            writer.write_name("$push")?;
            encode_accumulation(writer, push.accumulation())
        }
        Expression::Zip(zip) => {
            writer.write_name("$zip")?;
            encode_zip(writer, zip)
        }
        Expression::Calculus(calculus) => {
            writer.write_name(&calculus.operation)?;
            encode_calculus(writer, calculus)
        }
        Expression::Function(function) => {
            writer.write_name("$function")?;
            encode_function(writer, function)
        }
        single => encode_single_valued(writer, single),
    }
}

/// Named sub-fields as a document, or the single source expression unwrapped
pub(crate) fn encode_accumulation(writer: &mut DocumentWriter, accumulation: &FieldAccumulation) -> AggregationResult<()> {
    match accumulation {
        FieldAccumulation::Empty => document(writer, |_| Ok(())),
        FieldAccumulation::Fields(doc) => document(writer, |w| encode_entries(w, doc)),
        FieldAccumulation::Single(expression) => encode_expression(writer, expression),
    }
}

fn encode_zip(writer: &mut DocumentWriter, zip: &ZipExpression) -> AggregationResult<()> {
    document(writer, |w| {
        expression_array(w, "inputs", &zip.inputs)?;
        value(w, "useLongestLength", zip.use_longest_length)?;
        encode_named_if_not_null(w, "defaults", zip.defaults.as_deref())
    })
}

fn encode_calculus(writer: &mut DocumentWriter, calculus: &CalculusExpression) -> AggregationResult<()> {
    document(writer, |w| {
        encode_named_if_not_null(w, "input", Some(&*calculus.input))?;
        value(w, "unit", calculus.unit.map(|unit| unit.as_str()))
    })
}

fn encode_function(writer: &mut DocumentWriter, function: &FunctionExpression) -> AggregationResult<()> {
    document(writer, |w| {
        w.write_field("body", function.body.as_str())?;
        expression_array(w, "args", &function.args)?;
        w.write_field("lang", function.lang.as_str())?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::expr::{OperatorExpression, Push, TimeUnit};
    use bson::doc;

    fn field(name: &str) -> Expression {
        Expression::Field(format!("${}", name))
    }

    #[test]
    fn test_single_valued_written_bare() {
        assert_eq!(compile(&field("qty")).unwrap(), Bson::String("$qty".into()));
        assert_eq!(compile(&Expression::Value(Bson::Int32(4))).unwrap(), Bson::Int32(4));
    }

    #[test]
    fn test_nested_general_expressions_wrapped() {
        let inner = OperatorExpression::list("$multiply", vec![field("price"), field("qty")]);
        let outer = OperatorExpression::list(
            "$add",
            vec![Expression::from(inner), Expression::Value(Bson::Int32(1))],
        );
        assert_eq!(
            compile(&outer.into()).unwrap(),
            Bson::Document(doc! { "$add": [{ "$multiply": ["$price", "$qty"] }, 1] })
        );
    }

    #[test]
    fn test_push_modes() {
        let named = Push::new()
            .field("item", field("item"))
            .and_then(|p| p.field("quantity", field("qty")))
            .unwrap();
        assert_eq!(
            compile(&named.into()).unwrap(),
            Bson::Document(doc! { "$push": { "item": "$item", "quantity": "$qty" } })
        );

        let single = Push::new().single(field("item")).unwrap();
        assert_eq!(
            compile(&single.into()).unwrap(),
            Bson::Document(doc! { "$push": "$item" })
        );
    }

    #[test]
    fn test_zip_omits_unset_options() {
        let zip = ZipExpression::new(vec![field("a"), field("b")]);
        assert_eq!(
            compile(&zip.clone().into()).unwrap(),
            Bson::Document(doc! { "$zip": { "inputs": ["$a", "$b"] } })
        );

        let zip = zip
            .use_longest_length(true)
            .defaults(Expression::Array(vec![
                Expression::Value(Bson::Int32(0)),
                Expression::Value(Bson::Int32(0)),
            ]));
        assert_eq!(
            compile(&zip.into()).unwrap(),
            Bson::Document(doc! {
                "$zip": { "inputs": ["$a", "$b"], "useLongestLength": true, "defaults": [0, 0] }
            })
        );
    }

    #[test]
    fn test_zip_defaults_without_longest_length_left_as_is() {
        let zip = ZipExpression::new(vec![field("a")]).defaults(Expression::Array(vec![]));
        assert_eq!(
            compile(&zip.into()).unwrap(),
            Bson::Document(doc! { "$zip": { "inputs": ["$a"], "defaults": [] } })
        );
    }

    #[test]
    fn test_calculus_unit_optional() {
        let derivative = CalculusExpression::new("$derivative", field("miles"));
        assert_eq!(
            compile(&derivative.clone().into()).unwrap(),
            Bson::Document(doc! { "$derivative": { "input": "$miles" } })
        );
        assert_eq!(
            compile(&derivative.unit(TimeUnit::Hour).into()).unwrap(),
            Bson::Document(doc! { "$derivative": { "input": "$miles", "unit": "hour" } })
        );
    }

    #[test]
    fn test_function() {
        let function = FunctionExpression::new("function(n) { return n + 1; }", vec![field("n")]);
        assert_eq!(
            compile(&function.into()).unwrap(),
            Bson::Document(doc! {
                "$function": { "body": "function(n) { return n + 1; }", "args": ["$n"], "lang": "js" }
            })
        );
    }

    #[test]
    fn test_value_helper_omits_none() {
        let mut writer = DocumentWriter::new();
        document(&mut writer, |w| {
            value::<i32>(w, "absent", None)?;
            value(w, "present", Some(2))
        })
        .unwrap();
        assert_eq!(writer.into_document().unwrap(), doc! { "present": 2 });
    }
}
