use super::{check_arity, resolve_arg, Operator, Response};
use crate::error::Error;
use crate::evaluator::Evaluator;
use crate::expr::Expr;
use crate::value::Value;

/// `(( grab a.b [c.d ...] ))`
///
/// One argument yields the referenced value as is. With several arguments
/// lists are flattened into one list and everything else is appended.
/// A reference with `*` components yields the list of every value it matches.
pub struct Grab;

impl Operator for Grab {
    fn run(&self, ev: &mut Evaluator, args: &[Expr]) -> Result<Response, Error> {
        check_arity("grab", args, 1, None)?;

        if let [arg] = args {
            let value = grab(ev, arg)?;
            tracing::debug!(here = %ev.here, arg = %arg, "grabbed single value");
            return Ok(Response::Replace(value));
        }

        let mut combined = vec![];
        for arg in args {
            match grab(ev, arg)? {
                Value::Array(list) => combined.extend(list),
                value => combined.push(value),
            }
        }

        tracing::debug!(here = %ev.here, count = combined.len(), "grabbed combined list");
        Ok(Response::Replace(Value::Array(combined)))
    }
}

fn grab(ev: &Evaluator, arg: &Expr) -> Result<Value, Error> {
    match arg {
        Expr::Reference(cursor) if cursor.is_glob() => {
            let mut matches = vec![];
            for found in cursor.glob_with(&ev.tree, ev.merge_key())? {
                matches.push(found.resolve(&ev.tree)?.clone());
            }
            Ok(Value::Array(matches))
        }
        arg => resolve_arg(ev, arg).map(|(_, value)| value),
    }
}

#[cfg(test)]
mod test {
    use crate::operator::test::{evaluator, replace};
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    const TREE: &str = r#"
key:
  subkey:
    value: found it
    other: { a: 1 }
list1: [a, b]
list2: [c, d]
scalar: e
"#;

    #[test]
    fn single_value_is_returned_verbatim() {
        let mut ev = evaluator(TREE, "out");
        assert_eq!(replace(&mut ev, "grab", "key.subkey.value"), Ok(Value::from("found it")));
        assert_eq!(
            replace(&mut ev, "grab", "key.subkey.other"),
            Ok(Value::from_yaml_str("a: 1").unwrap())
        );
        assert_eq!(replace(&mut ev, "grab", "list1"), Ok(Value::from(vec!["a", "b"])));
    }

    #[test]
    fn multiple_values_are_flattened() {
        let mut ev = evaluator(TREE, "out");
        assert_eq!(
            replace(&mut ev, "grab", "list1 list2 scalar"),
            Ok(Value::from(vec!["a", "b", "c", "d", "e"]))
        );
    }

    #[test]
    fn dangling_reference_names_the_path() {
        let mut ev = evaluator(TREE, "out");
        let err = replace(&mut ev, "grab", "key.missing.value").unwrap_err();
        assert_eq!(err.to_string(), "`$.key.missing` could not be found in the datastructure");
    }

    #[test]
    fn needs_an_argument() {
        let mut ev = evaluator(TREE, "out");
        assert!(replace(&mut ev, "grab", "").is_err());
    }

    #[test]
    fn wildcards_collect_every_match() {
        let mut ev = evaluator("jobs: [{name: a, port: 1}, {name: b}, {name: c, port: 3}]\n", "out");
        assert_eq!(replace(&mut ev, "grab", "jobs.*.port"), Ok(Value::from(vec![1i64, 3])));
        assert_eq!(replace(&mut ev, "grab", "jobs.*.nope"), Ok(Value::Array(vec![])));
    }

    #[test]
    fn alternatives_and_literals() {
        let mut ev = evaluator(TREE, "out");
        assert_eq!(replace(&mut ev, "grab", "key.nope || scalar"), Ok(Value::from("e")));
        assert_eq!(replace(&mut ev, "grab", "key.nope || \"default\""), Ok(Value::from("default")));
    }
}
