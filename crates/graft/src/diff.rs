//! structural comparison of two trees
//!
//! Maps are compared key by key in sorted order. Lists where every entry is a
//! map with a `name` are compared by that name, so reordering entries is not
//! a difference; all other lists are compared index by index.
use crate::cursor::Cursor;
use crate::value::Value;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Added(Value),
    Removed(Value),
    Changed { from: Value, to: Value },
}

#[derive(Debug, Clone, PartialEq, derive_new::new)]
pub struct Difference {
    pub path: Cursor,
    pub change: Change,
}

#[tracing::instrument(level = "debug", skip_all)]
pub fn diff(a: &Value, b: &Value) -> Vec<Difference> {
    let mut differences = vec![];
    compare(a, b, &mut Cursor::new(), &mut differences);
    tracing::debug!(count = differences.len(), "compared trees");
    differences
}

fn compare(a: &Value, b: &Value, path: &mut Cursor, out: &mut Vec<Difference>) {
    match (a, b) {
        (Value::Object(a), Value::Object(b)) => {
            let keys: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
            for key in keys {
                path.push(key.as_str());
                compare_entry(a.get(key), b.get(key), path, out);
                path.pop();
            }
        }
        (Value::Array(a), Value::Array(b)) if is_named(a) && is_named(b) => {
            let mut seen = BTreeSet::new();
            for entry in a {
                let name = name_of(entry);
                seen.insert(name.clone());
                path.push(name.as_str());
                compare_entry(Some(entry), b.iter().find(|other| name_of(other) == name), path, out);
                path.pop();
            }
            for entry in b.iter().filter(|entry| !seen.contains(&name_of(entry))) {
                path.push(name_of(entry));
                compare_entry(None, Some(entry), path, out);
                path.pop();
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            for index in 0..a.len().max(b.len()) {
                path.push(index.to_string());
                compare_entry(a.get(index), b.get(index), path, out);
                path.pop();
            }
        }
        (a, b) if a == b => {}
        (a, b) => out.push(Difference::new(
            path.clone(),
            Change::Changed {
                from: a.clone(),
                to: b.clone(),
            },
        )),
    }
}

fn compare_entry(a: Option<&Value>, b: Option<&Value>, path: &mut Cursor, out: &mut Vec<Difference>) {
    match (a, b) {
        (Some(a), Some(b)) => compare(a, b, path, out),
        (Some(a), None) => out.push(Difference::new(path.clone(), Change::Removed(a.clone()))),
        (None, Some(b)) => out.push(Difference::new(path.clone(), Change::Added(b.clone()))),
        (None, None) => {}
    }
}

fn is_named(list: &[Value]) -> bool {
    !list.is_empty()
        && list.iter().all(|entry| {
            entry
                .as_object()
                .and_then(|map| map.get("name"))
                .is_some_and(Value::is_scalar)
        })
}

fn name_of(entry: &Value) -> String {
    entry
        .as_object()
        .and_then(|map| map.get("name"))
        .and_then(Value::to_scalar_string)
        .unwrap_or_default()
}

/// Compact single line rendering
fn inline(value: &Value) -> String {
    match value {
        Value::String(s) => format!("{s:?}"),
        Value::Null => "nil".into(),
        value if value.is_scalar() => value.to_scalar_string().unwrap_or_default(),
        value => serde_json::to_string(value).unwrap_or_else(|_| value.kind().into()),
    }
}

impl std::fmt::Display for Difference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path = self.path.rooted();
        match &self.change {
            Change::Added(value) => write!(f, "+ {path}: {}", inline(value)),
            Change::Removed(value) => write!(f, "- {path}: {}", inline(value)),
            Change::Changed { from, to } => write!(f, "~ {path}: {} -> {}", inline(from), inline(to)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn yaml(s: &str) -> Value {
        Value::from_yaml_str(s).unwrap()
    }

    fn rendered(a: &str, b: &str) -> Vec<String> {
        diff(&yaml(a), &yaml(b)).iter().map(ToString::to_string).collect()
    }

    #[test]
    fn identical_trees() {
        assert!(diff(&yaml("a: {b: [1, 2]}"), &yaml("a: {b: [1, 2]}")).is_empty());
    }

    #[test]
    fn maps() {
        assert_eq!(
            rendered("a: 1\nb: {c: x}\nd: gone\n", "a: 2\nb: {c: x, e: [1]}\n"),
            [
                "~ $.a: 1 -> 2",
                "+ $.b.e: [1]",
                "- $.d: \"gone\"",
            ]
        );
    }

    #[test]
    fn named_lists_ignore_order() {
        assert_eq!(
            rendered(
                "jobs: [{name: a, n: 1}, {name: b, n: 2}]\n",
                "jobs: [{name: b, n: 3}, {name: c}, {name: a, n: 1}]\n"
            ),
            ["~ $.jobs.b.n: 2 -> 3", "+ $.jobs.c: {\"name\":\"c\"}"]
        );
    }

    #[test]
    fn other_lists_are_positional() {
        assert_eq!(
            rendered("l: [a, b, c]\n", "l: [a, x]\n"),
            ["~ $.l.1: \"b\" -> \"x\"", "- $.l.2: \"c\""]
        );
    }

    #[test]
    fn type_changes() {
        assert_eq!(rendered("a: {b: 1}\n", "a: ~\n"), ["~ $.a: {\"b\":1} -> nil"]);
    }
}
