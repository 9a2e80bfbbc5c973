use super::{check_arity, resolve_arg, Operator, Response};
use crate::error::Error;
use crate::evaluator::Evaluator;
use crate::expr::Expr;
use crate::value::Value;

/// `(( negate meta.enabled ))`
pub struct Negate;

impl Operator for Negate {
    fn run(&self, ev: &mut Evaluator, args: &[Expr]) -> Result<Response, Error> {
        check_arity("negate", args, 1, Some(1))?;
        match resolve_arg(ev, &args[0])? {
            (_, Value::Boolean(b)) => Ok(Response::Replace(Value::Boolean(!b))),
            (Some(cursor), other) => Err(Error::type_mismatch(&cursor, "a bool to negate", other.kind())),
            (None, other) => Err(Error::msg(format!("negate operator expects a bool, got a {}", other.kind()))),
        }
    }
}
