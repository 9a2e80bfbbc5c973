use super::{check_arity, Operator, Response};
use crate::cursor::Cursor;
use crate::error::Error;
use crate::evaluator::Evaluator;
use crate::expr::Expr;
use crate::value::{Map, Value};

/// `(( empty hash ))`, `(( empty array ))`, `(( empty string ))`
pub struct Empty;

impl Operator for Empty {
    // the argument names a type, it is never dereferenced
    fn dependencies(&self, _: &Evaluator, _: &[Expr], _: &[Cursor], _: &[Cursor]) -> Vec<Cursor> {
        vec![]
    }

    fn run(&self, _ev: &mut Evaluator, args: &[Expr]) -> Result<Response, Error> {
        check_arity("empty", args, 1, Some(1))?;

        let kind = match &args[0] {
            Expr::Literal(Value::String(kind)) => kind.clone(),
            Expr::Reference(cursor) => cursor.to_string(),
            other => return Err(Error::msg(format!("empty operator expects a type name, got {other}"))),
        };

        let value = match kind.as_str() {
            "hash" | "map" => Value::Object(Map::new()),
            "array" | "list" => Value::Array(vec![]),
            "string" => Value::String(String::new()),
            other => {
                return Err(Error::msg(format!(
                    "unknown type `{other}` for empty operator, expected one of hash, map, array, list, string"
                )))
            }
        };

        Ok(Response::Replace(value))
    }
}
