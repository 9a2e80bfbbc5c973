//! operators that can be called from `(( ... ))` expressions
//!
//! Each operator is a unit struct implementing [Operator]. The builtin set is
//! registered once per process in a read-only [Registry], see [registry].
//!
//! Operators do not own state. Anything that has to survive between calls
//! (static IP allocations, secret caches) lives in [crate::evaluator::RunState]
//! which the evaluator hands to every call.
use crate::cursor::Cursor;
use crate::error::Error;
use crate::evaluator::Evaluator;
use crate::expr::Expr;
use crate::value::Value;
use indexmap::IndexMap;
use std::sync::OnceLock;

mod aws;
mod calc;
mod cartesian_product;
mod concat;
mod defer;
mod empty;
mod encoding;
mod file;
mod grab;
mod inject;
mod ips;
mod keys;
mod negate;
mod param;
mod prune;
mod sort;
mod static_ips;
mod vault;

pub use aws::AwsBackend;
pub use vault::{VaultBackend, VaultHttp};

/// When an operator runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// Structural operators applied right after documents are merged
    Merge,
    /// Values that a later document layer was required to provide
    Param,
    /// Value producing operators, evaluated in dependency order
    Eval,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Merge => f.write_str("merge"),
            Phase::Param => f.write_str("param"),
            Phase::Eval => f.write_str("eval"),
        }
    }
}

/// What to do with the location of a finished call
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Replace the call with a value
    Replace(Value),
    /// Remove the call and merge the map into the surrounding map
    Inject(Value),
}

pub trait Operator: Send + Sync {
    /// Called once before every run, before any call is evaluated
    fn setup(&self, _ev: &mut Evaluator) -> Result<(), Error> {
        Ok(())
    }

    fn phase(&self) -> Phase {
        Phase::Eval
    }

    /// Locations that must be fully evaluated before this call may run
    ///
    /// `auto` holds the (canonical) targets of all reference arguments,
    /// `locations` every call of the current phase.
    fn dependencies(
        &self,
        _ev: &Evaluator,
        _args: &[Expr],
        _locations: &[Cursor],
        auto: &[Cursor],
    ) -> Vec<Cursor> {
        auto.to_vec()
    }

    fn run(&self, ev: &mut Evaluator, args: &[Expr]) -> Result<Response, Error>;
}

/// Name to operator lookup
pub struct Registry {
    operators: IndexMap<&'static str, Box<dyn Operator>>,
}

impl Registry {
    fn builtin() -> Self {
        let mut registry = Registry {
            operators: IndexMap::new(),
        };

        registry.register("awsparam", aws::Aws::Parameter);
        registry.register("awssecret", aws::Aws::Secret);
        registry.register("base64", encoding::Base64);
        registry.register("base64-decode", encoding::Base64Decode);
        registry.register("calc", calc::Calc);
        registry.register("cartesian-product", cartesian_product::CartesianProduct);
        registry.register("concat", concat::Concat);
        registry.register("defer", defer::Defer);
        registry.register("empty", empty::Empty);
        registry.register("file", file::File);
        registry.register("grab", grab::Grab);
        registry.register("inject", inject::Inject);
        registry.register("ips", ips::Ips);
        registry.register("join", concat::Join);
        registry.register("keys", keys::Keys);
        registry.register("load", file::Load);
        registry.register("negate", negate::Negate);
        registry.register("param", param::Param);
        registry.register("prune", prune::Prune);
        registry.register("sort", sort::Sort);
        registry.register("static_ips", static_ips::StaticIps);
        registry.register("stringify", encoding::Stringify);
        registry.register("vault", vault::Vault);

        registry
    }

    fn register(&mut self, name: &'static str, operator: impl Operator + 'static) {
        tracing::trace!(name, "registering operator");
        self.operators.insert(name, Box::new(operator));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Operator> {
        self.operators.get(name).map(|op| op.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.operators.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &dyn Operator)> + '_ {
        self.operators.iter().map(|(name, op)| (*name, op.as_ref()))
    }
}

/// The process wide operator registry
pub fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(Registry::builtin)
}

/// Fails unless `min <= args.len() <= max`
pub(crate) fn check_arity(
    name: &str,
    args: &[Expr],
    min: usize,
    max: Option<usize>,
) -> Result<(), Error> {
    let count = args.len();
    let wanted = match max {
        Some(max) if max == min && count != min => Some(format!("exactly {min}")),
        Some(max) if count < min || count > max => Some(format!("between {min} and {max}")),
        None if count < min => Some(format!("at least {min}")),
        _ => None,
    };

    match wanted {
        Some(wanted) => Err(Error::msg(format!(
            "{name} operator requires {wanted} argument(s), got {count}"
        ))),
        None => Ok(()),
    }
}

/// Evaluates an argument, remembering where a referenced value came from
pub(crate) fn resolve_arg(ev: &Evaluator, arg: &Expr) -> Result<(Option<Cursor>, Value), Error> {
    match arg.resolve_with(&ev.tree, ev.merge_key())? {
        Expr::Reference(cursor) => {
            let value = cursor.resolve_with(&ev.tree, ev.merge_key())?.clone();
            Ok((Some(cursor), value))
        }
        resolved => resolved
            .evaluate_with(&ev.tree, ev.merge_key())
            .map(|value| (None, value)),
    }
}

/// Evaluates an argument that must be a scalar and renders it as text
pub(crate) fn scalar_arg(ev: &Evaluator, name: &str, arg: &Expr) -> Result<String, Error> {
    let (cursor, value) = resolve_arg(ev, arg)?;
    value.to_scalar_string().ok_or_else(|| match cursor {
        Some(cursor) => Error::type_mismatch(&cursor, format!("a scalar for {name}"), value.kind()),
        None => Error::msg(format!("{name}: argument {arg} is a {}, expected a scalar", value.kind())),
    })
}

/// Concatenates scalar arguments into one string
pub(crate) fn concat_args(ev: &Evaluator, name: &str, args: &[Expr]) -> Result<String, Error> {
    args.iter().map(|arg| scalar_arg(ev, name, arg)).collect()
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::config::Config;
    use crate::merge::Merged;
    use crate::opcall::parse_args;
    use pretty_assertions::assert_eq;

    /// Evaluator over a YAML tree, positioned at `here`
    pub(crate) fn evaluator(yaml: &str, here: &str) -> Evaluator {
        evaluator_with(yaml, here, Config::default())
    }

    pub(crate) fn evaluator_with(yaml: &str, here: &str, config: Config) -> Evaluator {
        let merged = Merged {
            tree: Value::from_yaml_str(yaml).expect("test yaml must parse"),
            ..Default::default()
        };
        let mut ev = Evaluator::new(merged, config);
        ev.here = Cursor::parse(here).expect("test cursor must parse");
        ev
    }

    /// Runs operator `name` with `args` (call syntax) against `ev`
    pub(crate) fn run(ev: &mut Evaluator, name: &str, args: &str) -> Result<Response, Error> {
        let args = parse_args(args)?;
        let op = registry().get(name).expect("operator must be registered");
        op.setup(ev)?;
        op.run(ev, &args)
    }

    /// Like [run], for operators that replace their call with a value
    pub(crate) fn replace(ev: &mut Evaluator, name: &str, args: &str) -> Result<Value, Error> {
        match run(ev, name, args)? {
            Response::Replace(value) => Ok(value),
            Response::Inject(value) => panic!("expected a replacement, got an injection of {value:?}"),
        }
    }

    #[test]
    fn registry_contains_builtins() {
        let names: Vec<&str> = registry().names().collect();
        for name in ["grab", "concat", "calc", "static_ips", "inject", "sort", "param", "vault"] {
            assert!(names.contains(&name), "{name} is not registered");
        }
        assert_eq!(registry().get("inject").map(|op| op.phase()), Some(Phase::Merge));
        assert_eq!(registry().get("param").map(|op| op.phase()), Some(Phase::Param));
        assert_eq!(registry().get("grab").map(|op| op.phase()), Some(Phase::Eval));
        assert!(registry().get("nope").is_none());
    }

    #[test]
    fn arity_messages() {
        let args = parse_args("a b").unwrap();
        assert_eq!(check_arity("x", &args, 1, Some(1)).unwrap_err().to_string(), "x operator requires exactly 1 argument(s), got 2");
        assert_eq!(check_arity("x", &args, 3, None).unwrap_err().to_string(), "x operator requires at least 3 argument(s), got 2");
        assert_eq!(check_arity("x", &args, 0, Some(1)).unwrap_err().to_string(), "x operator requires between 0 and 1 argument(s), got 2");
        assert!(check_arity("x", &args, 2, None).is_ok());
    }
}
