use super::{Operator, Phase, Response};
use crate::cursor::Cursor;
use crate::error::Error;
use crate::evaluator::Evaluator;
use crate::expr::Expr;
use crate::merge::Merger;
use crate::value::{Map, Value};

/// `(( inject meta.defaults [more.defaults ...] ))`
///
/// Copies the referenced maps into the map containing the call. Later
/// arguments override earlier ones; keys already present next to the call
/// win over injected ones.
pub struct Inject;

impl Operator for Inject {
    fn phase(&self) -> Phase {
        Phase::Merge
    }

    /// Calls inside an injected subtree have to settle before it is copied
    fn dependencies(
        &self,
        ev: &Evaluator,
        args: &[Expr],
        locations: &[Cursor],
        auto: &[Cursor],
    ) -> Vec<Cursor> {
        let mut deps = auto.to_vec();

        let targets: Vec<Cursor> = args
            .iter()
            .flat_map(Expr::references)
            .map(|cursor| {
                cursor
                    .canonical_with(&ev.tree, ev.merge_key())
                    .unwrap_or_else(|_| cursor.clone())
            })
            .collect();

        for location in locations {
            if targets.iter().any(|target| location.under(target)) && !deps.contains(location) {
                tracing::trace!(here = %ev.here, %location, "inject waits for nested call");
                deps.push(location.clone());
            }
        }

        deps
    }

    fn run(&self, ev: &mut Evaluator, args: &[Expr]) -> Result<Response, Error> {
        if args.is_empty() {
            return Err(Error::msg("inject operator requires at least one reference to a map"));
        }

        let config = ev.config().clone();
        let mut merger = Merger::new(&config);
        let mut injected = Map::new();

        for arg in args {
            let Expr::Reference(cursor) = arg else {
                return Err(Error::msg(format!(
                    "inject operator only accepts references, got {arg}"
                )));
            };

            match cursor.resolve_with(&ev.tree, ev.merge_key())? {
                Value::Object(map) => {
                    injected = merger.merge_map(injected, map.clone(), &ev.here.up());
                }
                other => {
                    return Err(Error::type_mismatch(cursor, "a map to inject", other.kind()));
                }
            }
        }

        ev.warnings.extend(merger.warnings.drain(..));
        merger.errors.into_result()?;

        tracing::debug!(here = %ev.here, keys = injected.len(), "injecting");
        Ok(Response::Inject(Value::Object(injected)))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::operator::test::{evaluator, run};
    use pretty_assertions::assert_eq;

    const TREE: &str = r#"
meta:
  defaults:
    size: small
    tags: { team: a }
  extra:
    size: large
    zone: z1
  list: [1]
jobs:
  web:
    size: tiny
    base: (( inject meta.defaults ))
"#;

    #[test]
    fn later_maps_override_earlier_ones() {
        let mut ev = evaluator(TREE, "jobs.web.base");
        let response = run(&mut ev, "inject", "meta.defaults meta.extra").unwrap();
        assert_eq!(
            response,
            Response::Inject(Value::from_yaml_str("size: large\ntags: { team: a }\nzone: z1\n").unwrap())
        );
    }

    #[test]
    fn only_map_references_are_accepted() {
        let mut ev = evaluator(TREE, "jobs.web.base");
        assert_eq!(
            run(&mut ev, "inject", "meta.list").unwrap_err().to_string(),
            "`$.meta.list` is a slice, expected a map to inject"
        );
        assert!(run(&mut ev, "inject", "\"literal\"").is_err());
        assert!(run(&mut ev, "inject", "").is_err());
        assert!(run(&mut ev, "inject", "meta.missing").unwrap_err().is_not_found());
    }

    #[test]
    fn waits_for_calls_below_injected_maps() {
        let mut ev = evaluator(TREE, "jobs.web.base");
        let args = crate::opcall::parse_args("meta.defaults").unwrap();
        let locations = [
            Cursor::parse("meta.defaults.size").unwrap(),
            Cursor::parse("meta.extra.size").unwrap(),
            Cursor::parse("jobs.web.base").unwrap(),
        ];
        ev.here = locations[2].clone();
        let deps = Inject.dependencies(&ev, &args, &locations, &[]);
        assert_eq!(deps, [locations[0].clone()]);
    }
}
