use super::{Operator, Phase, Response};
use crate::error::Error;
use crate::evaluator::Evaluator;
use crate::expr::Expr;
use crate::value::Value;

/// `(( param "please provide a value" ))`
///
/// Marks a value a later document has to override. Reaching evaluation means
/// nobody did.
pub struct Param;

impl Operator for Param {
    fn phase(&self) -> Phase {
        Phase::Param
    }

    fn run(&self, _ev: &mut Evaluator, args: &[Expr]) -> Result<Response, Error> {
        let message = match args {
            [Expr::Literal(Value::String(message))] => message.clone(),
            [] => "missing param".to_string(),
            args => args.iter().map(ToString::to_string).collect::<Vec<_>>().join(" "),
        };
        Err(Error::msg(message))
    }
}

#[cfg(test)]
mod test {
    use crate::operator::test::{evaluator, run};

    #[test]
    fn always_fails_with_its_message() {
        let mut ev = evaluator("{}", "x");
        assert_eq!(
            run(&mut ev, "param", "\"specify a domain\"").unwrap_err().to_string(),
            "specify a domain"
        );
    }
}
