//! operator argument expressions
use crate::cursor::Cursor;
use crate::error::{Error, Warning};
use crate::value::Value;

/// One argument of an operator call
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Reference(Cursor),
    EnvVar(String),
    /// `left || right`: the first alternative that evaluates wins
    LogicalOr(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn or(left: Expr, right: Expr) -> Self {
        Expr::LogicalOr(Box::new(left), Box::new(right))
    }

    /// Alternatives of a `||` chain, left to right
    pub fn alternatives(&self) -> Vec<&Expr> {
        match self {
            Expr::LogicalOr(left, right) => {
                let mut alternatives = left.alternatives();
                alternatives.extend(right.alternatives());
                alternatives
            }
            other => vec![other],
        }
    }

    /// All cursors this expression may read
    pub fn references(&self) -> Vec<&Cursor> {
        self.alternatives()
            .into_iter()
            .filter_map(|alternative| match alternative {
                Expr::Reference(cursor) => Some(cursor),
                _ => None,
            })
            .collect()
    }

    /// Drops every alternative after the first literal in a `||` chain
    ///
    /// The reduced expression is always usable. A warning is returned when
    /// alternatives were dropped, as they can never be reached.
    pub fn reduce(&self) -> (Expr, Option<Warning>) {
        let alternatives = self.alternatives();
        let Some(literal) = alternatives
            .iter()
            .position(|alternative| matches!(alternative, Expr::Literal(_)))
        else {
            return (self.clone(), None);
        };

        if literal + 1 == alternatives.len() {
            return (self.clone(), None);
        }

        let reduced = alternatives[..=literal]
            .iter()
            .map(|alternative| (*alternative).clone())
            .reduce(Expr::or)
            .unwrap_or_else(|| self.clone());

        let warning = Warning::new(format!(
            "literal {} short-circuits expression ({self})",
            alternatives[literal]
        ));
        (reduced, Some(warning))
    }

    /// Evaluates to a value
    ///
    /// For `||` the left side wins whenever it evaluates, including to `nil`.
    pub fn evaluate(&self, tree: &Value) -> Result<Value, Error> {
        self.evaluate_with(tree, None)
    }

    /// [Expr::evaluate], with references also matching list entries by `merge_key`
    pub fn evaluate_with(&self, tree: &Value, merge_key: Option<&str>) -> Result<Value, Error> {
        match self {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Reference(cursor) => cursor.resolve_with(tree, merge_key).cloned(),
            Expr::EnvVar(name) => env_var(name).map(Value::String),
            Expr::LogicalOr(left, right) => match left.evaluate_with(tree, merge_key) {
                Ok(value) => Ok(value),
                Err(err) => {
                    tracing::trace!(%err, "left side of || failed, trying right side");
                    right.evaluate_with(tree, merge_key)
                }
            },
        }
    }

    /// Resolves to a [Expr::Literal] or a [Expr::Reference] whose target exists
    ///
    /// Environment variables become literals; `||` chains resolve to their
    /// first alternative that resolves.
    pub fn resolve(&self, tree: &Value) -> Result<Expr, Error> {
        self.resolve_with(tree, None)
    }

    pub fn resolve_with(&self, tree: &Value, merge_key: Option<&str>) -> Result<Expr, Error> {
        match self {
            Expr::Literal(_) => Ok(self.clone()),
            Expr::Reference(cursor) => cursor.resolve_with(tree, merge_key).map(|_| self.clone()),
            Expr::EnvVar(name) => env_var(name).map(|v| Expr::Literal(Value::String(v))),
            Expr::LogicalOr(left, right) => left
                .resolve_with(tree, merge_key)
                .or_else(|_| right.resolve_with(tree, merge_key)),
        }
    }
}

fn env_var(name: &str) -> Result<String, Error> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| Error::msg(format!("environment variable ${name} is not set")))
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Literal(Value::String(s)) => {
                write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
            }
            Expr::Literal(Value::Null) => f.write_str("nil"),
            Expr::Literal(value) => f.write_str(&value.to_scalar_string().unwrap_or_default()),
            Expr::Reference(cursor) => write!(f, "{cursor}"),
            Expr::EnvVar(name) => write!(f, "${name}"),
            Expr::LogicalOr(left, right) => write!(f, "{left} || {right}"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn reference(s: &str) -> Expr {
        Expr::Reference(Cursor::parse(s).unwrap())
    }

    fn literal(v: impl Into<Value>) -> Expr {
        Expr::Literal(v.into())
    }

    fn tree() -> Value {
        Value::from_yaml_str("meta:\n  name: web\n  nothing: ~\n").unwrap()
    }

    #[test]
    fn reduce_drops_unreachable_alternatives() {
        let expr = Expr::or(Expr::or(reference("a"), literal("x")), reference("b"));
        let (reduced, warning) = expr.reduce();
        assert_eq!(reduced, Expr::or(reference("a"), literal("x")));
        assert_eq!(
            warning.unwrap().to_string(),
            "literal \"x\" short-circuits expression (a || \"x\" || b)"
        );
    }

    #[test]
    fn reduce_keeps_reachable_chains() {
        let expr = Expr::or(reference("a"), literal("x"));
        assert_eq!(expr.reduce(), (expr.clone(), None));

        let expr = Expr::or(reference("a"), reference("b"));
        assert_eq!(expr.reduce(), (expr.clone(), None));
    }

    #[test]
    fn evaluate_falls_through_missing_references() {
        let tree = tree();
        let expr = Expr::or(reference("meta.missing"), reference("meta.name"));
        assert_eq!(expr.evaluate(&tree), Ok(Value::from("web")));

        let expr = Expr::or(reference("meta.missing"), literal(42));
        assert_eq!(expr.evaluate(&tree), Ok(Value::Integer(42)));
    }

    #[test]
    fn evaluate_treats_nil_as_found() {
        let tree = tree();
        let expr = Expr::or(reference("meta.nothing"), literal("default"));
        assert_eq!(expr.evaluate(&tree), Ok(Value::Null));
    }

    #[test]
    fn evaluate_environment() {
        std::env::set_var("GRAFT_EXPR_TEST_VAR", "from-env");
        let tree = tree();
        assert_eq!(
            Expr::EnvVar("GRAFT_EXPR_TEST_VAR".into()).evaluate(&tree),
            Ok(Value::from("from-env"))
        );

        let unset = Expr::or(Expr::EnvVar("GRAFT_EXPR_TEST_UNSET".into()), literal("fallback"));
        assert_eq!(unset.evaluate(&tree), Ok(Value::from("fallback")));
    }

    #[test]
    fn resolve_keeps_reference_or_literal() {
        let tree = tree();
        let expr = Expr::or(reference("meta.missing"), reference("meta.name"));
        assert_eq!(expr.resolve(&tree), Ok(reference("meta.name")));

        let expr = Expr::or(reference("meta.missing"), literal("x"));
        assert_eq!(expr.resolve(&tree), Ok(literal("x")));

        assert!(reference("meta.missing").resolve(&tree).is_err());
    }

    #[test]
    fn references_cover_all_alternatives() {
        let expr = Expr::or(Expr::or(reference("a"), Expr::EnvVar("X".into())), reference("b.c"));
        let refs: Vec<String> = expr.references().iter().map(|c| c.to_string()).collect();
        assert_eq!(refs, ["a", "b.c"]);
    }
}
