use super::{Operator, Response};
use crate::cursor::Cursor;
use crate::error::Error;
use crate::evaluator::Evaluator;
use crate::expr::Expr;
use crate::value::Value;

/// `(( defer grab x ))` renders `(( grab x ))` without evaluating it
pub struct Defer;

impl Operator for Defer {
    fn dependencies(&self, _: &Evaluator, _: &[Expr], _: &[Cursor], _: &[Cursor]) -> Vec<Cursor> {
        vec![]
    }

    fn run(&self, _ev: &mut Evaluator, args: &[Expr]) -> Result<Response, Error> {
        if args.is_empty() {
            return Err(Error::msg("defer has no arguments - what are you deferring?"));
        }

        let inner: Vec<String> = args.iter().map(ToString::to_string).collect();
        Ok(Response::Replace(Value::String(format!("(( {} ))", inner.join(" ")))))
    }
}
