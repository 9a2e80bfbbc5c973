use super::{resolve_arg, Operator, Response};
use crate::error::Error;
use crate::evaluator::Evaluator;
use crate::expr::Expr;
use crate::value::Value;

/// `(( cartesian-product meta.hosts ":" meta.ports ))`
///
/// Every combination of one entry per argument, concatenated in argument
/// order. Scalars act as single entry lists.
pub struct CartesianProduct;

impl Operator for CartesianProduct {
    fn run(&self, ev: &mut Evaluator, args: &[Expr]) -> Result<Response, Error> {
        if args.is_empty() {
            return Err(Error::msg("cartesian-product operator requires at least one argument"));
        }

        let mut product = vec![String::new()];
        for arg in args {
            let (cursor, value) = resolve_arg(ev, arg)?;
            let entries = match value {
                Value::Array(list) => list,
                scalar if scalar.is_scalar() => vec![scalar],
                other => {
                    return Err(Error::type_mismatch(
                        &cursor.unwrap_or_default(),
                        "a list or a scalar",
                        other.kind(),
                    ))
                }
            };

            let parts = entries
                .iter()
                .map(|entry| {
                    entry.to_scalar_string().ok_or_else(|| {
                        Error::msg(format!("cartesian-product: {arg} contains a {}", entry.kind()))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            product = product
                .iter()
                .flat_map(|prefix| parts.iter().map(move |part| format!("{prefix}{part}")))
                .collect();
        }

        Ok(Response::Replace(product.into()))
    }
}

#[cfg(test)]
mod test {
    use crate::operator::test::{evaluator, replace};
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    #[test]
    fn combinations_in_order() {
        let mut ev = evaluator("hosts: [a, b]\nports: [80, 443]\nnone: []\n", "out");
        assert_eq!(
            replace(&mut ev, "cartesian-product", r#"hosts ":" ports"#),
            Ok(Value::from(vec!["a:80", "a:443", "b:80", "b:443"]))
        );
        assert_eq!(
            replace(&mut ev, "cartesian-product", "hosts none"),
            Ok(Value::Array(vec![]))
        );
    }
}
