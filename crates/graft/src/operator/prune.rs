use super::{Operator, Response};
use crate::error::Error;
use crate::evaluator::Evaluator;
use crate::expr::Expr;
use crate::value::Value;

/// `(( prune ))` removes its own location once evaluation has finished
pub struct Prune;

impl Operator for Prune {
    fn run(&self, ev: &mut Evaluator, _args: &[Expr]) -> Result<Response, Error> {
        if !ev.state.prune.contains(&ev.here) {
            ev.state.prune.push(ev.here.clone());
        }
        Ok(Response::Replace(Value::Null))
    }
}
