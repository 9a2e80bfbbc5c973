use super::{check_arity, resolve_arg, Operator, Response};
use crate::error::Error;
use crate::evaluator::Evaluator;
use crate::expr::Expr;
use crate::value::Value;

/// `(( keys meta.map ))`: the sorted keys of a map
pub struct Keys;

impl Operator for Keys {
    fn run(&self, ev: &mut Evaluator, args: &[Expr]) -> Result<Response, Error> {
        check_arity("keys", args, 1, Some(1))?;
        let (cursor, value) = resolve_arg(ev, &args[0])?;
        let Value::Object(map) = value else {
            return Err(Error::type_mismatch(&cursor.unwrap_or_default(), "a map", value.kind()));
        };

        let mut keys: Vec<String> = map.into_keys().collect();
        keys.sort();
        Ok(Response::Replace(keys.into()))
    }
}

#[cfg(test)]
mod test {
    use crate::operator::test::{evaluator, replace};
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    #[test]
    fn sorted_keys() {
        let mut ev = evaluator("m: {b: 1, c: 2, a: 3}\nl: [1]\n", "out");
        assert_eq!(replace(&mut ev, "keys", "m"), Ok(Value::from(vec!["a", "b", "c"])));
        assert!(replace(&mut ev, "keys", "l").is_err());
    }
}
