use super::{Operator, Phase, Response};
use crate::error::Error;
use crate::evaluator::Evaluator;
use crate::expr::Expr;

/// `(( sort ))` outside of the head of a list
///
/// Lists starting with `(( sort ))` / `(( sort by <key> ))` are recorded
/// while merging and sorted after evaluation, see
/// [crate::evaluator::sort_list]. A call that is still in the tree has no
/// list to sort.
pub struct Sort;

impl Operator for Sort {
    fn phase(&self) -> Phase {
        Phase::Merge
    }

    fn run(&self, ev: &mut Evaluator, _args: &[Expr]) -> Result<Response, Error> {
        Err(Error::msg(format!(
            "orphaned sort operator at {}: it must be the first entry of a list",
            ev.here.rooted()
        )))
    }
}
