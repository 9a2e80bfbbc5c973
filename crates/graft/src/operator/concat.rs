use super::{check_arity, concat_args, resolve_arg, scalar_arg, Operator, Response};
use crate::error::Error;
use crate::evaluator::Evaluator;
use crate::expr::Expr;
use crate::value::Value;

/// `(( concat a "b" 3 ))`: scalars rendered as text, in order
pub struct Concat;

impl Operator for Concat {
    fn run(&self, ev: &mut Evaluator, args: &[Expr]) -> Result<Response, Error> {
        check_arity("concat", args, 2, None)?;
        let joined = concat_args(ev, "concat", args)?;
        Ok(Response::Replace(Value::String(joined)))
    }
}

/// `(( join ", " list scalar ... ))`
///
/// The first argument is the separator. Lists contribute each of their
/// (scalar) entries, scalars contribute themselves.
pub struct Join;

impl Operator for Join {
    fn run(&self, ev: &mut Evaluator, args: &[Expr]) -> Result<Response, Error> {
        check_arity("join", args, 2, None)?;
        let separator = scalar_arg(ev, "join", &args[0])?;

        let mut parts = vec![];
        for arg in &args[1..] {
            match resolve_arg(ev, arg)? {
                (cursor, Value::Array(list)) => {
                    for (index, entry) in list.iter().enumerate() {
                        let part = entry.to_scalar_string().ok_or_else(|| {
                            let at = cursor.as_ref().map(|c| c.child(index.to_string())).unwrap_or_default();
                            Error::type_mismatch(&at, "a scalar to join", entry.kind())
                        })?;
                        parts.push(part);
                    }
                }
                (cursor, value) => match value.to_scalar_string() {
                    Some(part) => parts.push(part),
                    None => {
                        return Err(Error::type_mismatch(
                            &cursor.unwrap_or_default(),
                            "a list or a scalar to join",
                            value.kind(),
                        ))
                    }
                },
            }
        }

        Ok(Response::Replace(Value::String(parts.join(&separator))))
    }
}
