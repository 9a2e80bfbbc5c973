//! evaluation of operator calls in a merged tree
//!
//! A run goes through these steps:
//! 1. merge phase: `inject` and orphaned `sort` calls
//! 2. param phase: any `param` still present fails the run
//! 3. eval phase: every other operator
//! 4. paths marked for pruning are removed
//! 5. lists flagged with `(( sort ))` are sorted, unless they were pruned
//! 6. the tree is reduced to the cherry-picked paths
//!
//! Each phase scans the tree for calls of that phase and builds a dependency
//! graph between them: a call depends on another when one of its
//! dependencies addresses the other's location, something below it, or
//! something above it. Calls then run in rounds; a round runs every call
//! whose dependencies are settled. Calls that depend on a failed call fail
//! without running. A round in which nothing can run while calls are pending
//! means the remaining calls form a cycle. More than [MAX_ROUNDS] rounds (or
//! the ceiling set with [Evaluator::with_max_rounds]) fail with
//! [Error::MaxRecursion].
use crate::config::Config;
use crate::cursor::Cursor;
use crate::error::{Error, MultiError, Warning};
use crate::expr::Expr;
use crate::merge::{merge, Merged, Merger};
use crate::opcall::Opcall;
use crate::operator::{registry, AwsBackend, Operator, Phase, Response, VaultBackend};
use crate::value::{Map, Value};
use crate::visit::VisitValues;
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

/// Backstop against runaway evaluation
pub const MAX_ROUNDS: usize = 10_000;

/// What to do besides evaluating
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Paths to remove from the output, in addition to `(( prune ))` markers
    pub prune: Vec<Cursor>,
    /// Paths the output is reduced to; empty keeps everything
    pub cherry_pick: Vec<Cursor>,
    /// Leave operator calls untouched
    pub skip_eval: bool,
}

/// State shared by operator calls of one run
#[derive(Debug, Default)]
pub struct RunState {
    /// Static IP allocations, address to owner
    pub ips: HashMap<u32, String>,
    pub aws_cache: HashMap<String, String>,
    pub vault_cache: HashMap<String, Map>,
    /// Locations of evaluated `(( prune ))` calls
    pub prune: Vec<Cursor>,
}

pub struct Evaluator {
    pub tree: Value,
    /// Location of the call being evaluated
    pub here: Cursor,
    pub state: RunState,
    pub warnings: Vec<Warning>,
    config: Config,
    merge_prune: Vec<Cursor>,
    sort: IndexMap<Cursor, Option<String>>,
    max_rounds: usize,
    aws: Option<Box<dyn AwsBackend>>,
    vault: Option<Box<dyn VaultBackend>>,
}

/// Merges `documents` and evaluates the result
pub fn evaluate(
    documents: impl IntoIterator<Item = Value>,
    config: &Config,
    options: &RunOptions,
) -> Result<Value, Error> {
    let merged = merge(documents, config)?;
    let mut evaluator = Evaluator::new(merged, config.clone());
    evaluator.run(options)?;
    Ok(evaluator.tree)
}

impl Evaluator {
    pub fn new(merged: Merged, config: Config) -> Self {
        Self {
            tree: merged.tree,
            here: Cursor::new(),
            state: RunState::default(),
            warnings: merged.warnings,
            config,
            merge_prune: merged.prune,
            sort: merged.sort,
            max_rounds: MAX_ROUNDS,
            aws: None,
            vault: None,
        }
    }

    pub fn with_aws(mut self, backend: impl AwsBackend + 'static) -> Self {
        self.aws = Some(Box::new(backend));
        self
    }

    pub fn with_vault(mut self, backend: impl VaultBackend + 'static) -> Self {
        self.vault = Some(Box::new(backend));
        self
    }

    /// Lowers or raises the number of rounds a phase may take
    pub fn with_max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = rounds;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Configured identity field for list entries, tried after `name`, `key` and `id`
    pub fn merge_key(&self) -> Option<&str> {
        self.config.array_merge_key.as_deref()
    }

    pub fn aws(&self) -> Option<&dyn AwsBackend> {
        self.aws.as_deref()
    }

    pub fn vault(&self) -> Option<&dyn VaultBackend> {
        self.vault.as_deref()
    }

    /// Forgets allocations and cached lookups of previous runs
    pub fn reset(&mut self) {
        self.state = RunState::default();
    }

    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(%warning, "warning");
        self.warnings.push(warning);
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub fn run(&mut self, options: &RunOptions) -> Result<(), Error> {
        if !options.skip_eval {
            for (name, op) in registry().iter() {
                op.setup(self)
                    .map_err(|err| Error::msg(format!("unable to set up {name} operator: {err}")))?;
            }

            self.run_phase(Phase::Merge, &[])?;
            self.check_params()?;

            let picks: Vec<Cursor> = options
                .cherry_pick
                .iter()
                .map(|pick| pick.canonical_with(&self.tree, self.merge_key()).unwrap_or_else(|_| pick.clone()))
                .collect();
            self.run_phase(Phase::Eval, &picks)?;
        }

        self.prune(&options.prune);
        if !options.skip_eval {
            self.sort_lists()?;
        }
        self.cherry_pick(&options.cherry_pick)
    }

    /// Finds all calls of `phase`, located and with `||` chains reduced
    fn scan(&mut self, phase: Phase) -> Result<Vec<Opcall>, Error> {
        let mut calls = vec![];
        let mut errors = MultiError::new();
        let mut warnings = vec![];

        self.tree.visit_values(&mut |cursor: &Cursor, value: &Value| {
            let Value::String(text) = value else {
                return;
            };

            match Opcall::parse(phase, text) {
                Ok(Some(call)) => {
                    let mut call = call.at(cursor.clone());
                    for arg in call.args.iter_mut() {
                        let (reduced, warning) = arg.reduce();
                        if let Some(warning) = warning {
                            warnings.push(Warning::new(format!("{}: {warning}", cursor.rooted())));
                        }
                        *arg = reduced;
                    }
                    tracing::trace!(%phase, here = %cursor, op = %call.name, "found call");
                    calls.push(call);
                }
                Ok(None) => {}
                Err(err) => errors.append(err.at(cursor)),
            }
        });

        for warning in warnings {
            self.warn(warning);
        }
        errors.into_result()?;
        Ok(calls)
    }

    /// Targets of the reference arguments of `call`
    fn auto_dependencies(&self, call: &Opcall) -> Vec<Cursor> {
        let mut deps: Vec<Cursor> = vec![];
        for cursor in call.args.iter().flat_map(Expr::references) {
            let expanded = if cursor.is_glob() {
                cursor.glob_with(&self.tree, self.merge_key()).unwrap_or_default()
            } else {
                vec![canonical_prefix(cursor, &self.tree, self.merge_key())]
            };

            for dep in expanded {
                if !deps.contains(&dep) {
                    deps.push(dep);
                }
            }
        }
        deps
    }

    #[tracing::instrument(level = "debug", skip(self, picks))]
    fn run_phase(&mut self, phase: Phase, picks: &[Cursor]) -> Result<(), Error> {
        let calls = self.scan(phase)?;
        if calls.is_empty() {
            return Ok(());
        }

        let locations: Vec<Cursor> = calls.iter().map(|call| call.location.clone()).collect();
        let mut ops: Vec<&'static dyn Operator> = Vec::with_capacity(calls.len());
        let mut edges: Vec<BTreeSet<usize>> = Vec::with_capacity(calls.len());

        for call in &calls {
            let op = registry()
                .get(&call.name)
                .ok_or_else(|| Error::msg(format!("unknown operator `{}`", call.name)).at(&call.location))?;

            let auto = self.auto_dependencies(call);
            self.here = call.location.clone();
            let deps = op.dependencies(self, &call.args, &locations, &auto);

            let mut targets = BTreeSet::new();
            for dep in &deps {
                for (index, location) in locations.iter().enumerate() {
                    if related(location, dep) {
                        tracing::trace!(from = %call.location, to = %location, "dependency");
                        targets.insert(index);
                    }
                }
            }

            ops.push(op);
            edges.push(targets);
        }

        let mut pending: BTreeSet<usize> = if picks.is_empty() {
            (0..calls.len()).collect()
        } else {
            picked(&locations, &edges, picks)
        };
        tracing::debug!(%phase, calls = calls.len(), selected = pending.len(), "evaluating phase");

        let mut failed: BTreeSet<usize> = BTreeSet::new();
        let mut errors = MultiError::new();
        let mut round = 0;

        while !pending.is_empty() {
            round += 1;
            if round > self.max_rounds {
                errors.append(Error::MaxRecursion {
                    depth: self.max_rounds,
                });
                break;
            }

            let mut ready = vec![];
            let mut doomed = vec![];
            for &index in &pending {
                if let Some(&dependency) = edges[index].iter().find(|dep| failed.contains(dep)) {
                    doomed.push((index, dependency));
                } else if edges[index].iter().all(|dep| !pending.contains(dep)) {
                    ready.push(index);
                }
            }

            if ready.is_empty() && doomed.is_empty() {
                let paths = pending.iter().map(|index| locations[*index].rooted()).collect();
                errors.append(Error::Cycle { paths });
                break;
            }

            tracing::trace!(round, ready = ready.len(), doomed = doomed.len(), "evaluation round");

            for (index, dependency) in doomed {
                pending.remove(&index);
                failed.insert(index);
                errors.append(
                    Error::DependencyFailed {
                        dependency: locations[dependency].rooted(),
                    }
                    .at(&locations[index]),
                );
            }

            for index in ready {
                pending.remove(&index);
                let call = &calls[index];
                self.here = call.location.clone();
                tracing::debug!(here = %call.location, op = %call.name, "running operator");

                let result = ops[index]
                    .run(self, &call.args)
                    .and_then(|response| self.apply(&call.location, response));

                if let Err(err) = result {
                    tracing::debug!(here = %call.location, %err, "operator failed");
                    failed.insert(index);
                    errors.append(err.at(&call.location));
                }
            }
        }

        errors.into_result()
    }

    /// Fails with the message of every `param` left in the tree
    fn check_params(&mut self) -> Result<(), Error> {
        let calls = self.scan(Phase::Param)?;
        let mut errors = MultiError::new();

        for call in calls {
            let Some(op) = registry().get(&call.name) else {
                continue;
            };
            self.here = call.location.clone();
            let result = op
                .run(self, &call.args)
                .and_then(|response| self.apply(&call.location, response));
            if let Err(err) = result {
                errors.append(err.at(&call.location));
            }
        }

        errors.into_result()
    }

    fn apply(&mut self, location: &Cursor, response: Response) -> Result<(), Error> {
        match response {
            Response::Replace(value) => {
                *location.resolve_mut_with(&mut self.tree, self.config.array_merge_key.as_deref())? = value;
            }
            Response::Inject(value) => {
                let Value::Object(injected) = value else {
                    return Err(Error::type_mismatch(location, "a map to inject", value.kind()));
                };

                let parent = location.up();
                let slot = parent.resolve_mut_with(&mut self.tree, self.config.array_merge_key.as_deref())?;
                let kind = slot.kind();
                let Value::Object(map) = slot else {
                    return Err(Error::type_mismatch(&parent, "a map to inject into", kind));
                };

                let mut existing = std::mem::take(map);
                existing.shift_remove(location.last());

                let mut merger = Merger::new(&self.config);
                *map = merger.merge_map(injected, existing, &parent);

                self.warnings.extend(merger.warnings);
                self.sort.extend(merger.sort);
                self.state.prune.extend(merger.prune);
                merger.errors.into_result()?;
            }
        }
        Ok(())
    }

    fn sort_lists(&mut self) -> Result<(), Error> {
        let mut errors = MultiError::new();

        for (path, key) in &self.sort {
            let key = key
                .clone()
                .unwrap_or_else(|| self.config.merge_keys()[0].to_string());

            match path.resolve_mut_with(&mut self.tree, self.config.array_merge_key.as_deref()) {
                Ok(Value::Array(list)) => {
                    if let Err(err) = sort_list(list, &key, path) {
                        errors.append(err);
                    }
                }
                Ok(other) => errors.append(Error::type_mismatch(path, "a list to sort", other.kind())),
                Err(err) if err.is_not_found() => tracing::debug!(%path, "sorted list was pruned"),
                Err(err) => errors.append(err),
            }
        }

        errors.into_result()
    }

    /// Removes marked paths; paths that do not exist are ignored
    fn prune(&mut self, extra: &[Cursor]) {
        let mut paths: Vec<Cursor> = vec![];
        let requested = self
            .merge_prune
            .iter()
            .chain(&self.state.prune)
            .chain(extra);

        for path in requested {
            let found = if path.is_glob() {
                path.glob_with(&self.tree, self.merge_key()).unwrap_or_default()
            } else {
                path.canonical_with(&self.tree, self.merge_key()).into_iter().collect()
            };
            for path in found {
                if !path.is_empty() && !paths.contains(&path) {
                    paths.push(path);
                }
            }
        }

        // later list entries first so earlier indices stay valid
        paths.sort_by(|a, b| compare_paths(b, a));

        for path in paths {
            tracing::debug!(%path, "pruning");
            remove(&mut self.tree, &path);
        }
    }

    /// Reduces the tree to `picks`, keeping their position
    fn cherry_pick(&mut self, picks: &[Cursor]) -> Result<(), Error> {
        if picks.is_empty() {
            return Ok(());
        }

        let mut expanded = vec![];
        for pick in picks {
            if pick.is_glob() {
                expanded.extend(pick.glob_with(&self.tree, self.merge_key())?);
            } else {
                expanded.push(pick.canonical_with(&self.tree, self.merge_key())?);
            }
        }

        let mut picked = Value::Object(Map::new());
        let mut slots = HashMap::new();
        for pick in &expanded {
            tracing::debug!(%pick, "cherry picking");
            let value = pick.resolve(&self.tree)?.clone();
            insert_picked(&mut picked, &self.tree, pick, value, &mut slots)?;
        }

        self.tree = picked;
        Ok(())
    }
}

/// Two calls are related when a dependency addresses a location, a node
/// below it or a node above it
fn related(location: &Cursor, dependency: &Cursor) -> bool {
    location == dependency || location.under(dependency) || dependency.under(location)
}

/// Canonical form of the longest resolvable prefix, followed by the rest
fn canonical_prefix(cursor: &Cursor, tree: &Value, merge_key: Option<&str>) -> Cursor {
    for split in (0..=cursor.len()).rev() {
        let prefix = Cursor {
            nodes: cursor.nodes[..split].to_vec(),
        };
        if let Ok(mut canonical) = prefix.canonical_with(tree, merge_key) {
            canonical.nodes.extend(cursor.nodes[split..].iter().cloned());
            return canonical;
        }
    }
    cursor.clone()
}

/// Calls at or around the picked paths, plus everything they depend on
fn picked(locations: &[Cursor], edges: &[BTreeSet<usize>], picks: &[Cursor]) -> BTreeSet<usize> {
    let mut selected = BTreeSet::new();
    let mut queue: Vec<usize> = locations
        .iter()
        .enumerate()
        .filter(|(_, location)| picks.iter().any(|pick| pick.contains(location) || location.contains(pick)))
        .map(|(index, _)| index)
        .collect();

    while let Some(index) = queue.pop() {
        if selected.insert(index) {
            queue.extend(edges[index].iter().copied());
        }
    }
    selected
}

/// Sorts numbers, strings, or maps by `key`
pub fn sort_list(list: &mut [Value], key: &str, path: &Cursor) -> Result<(), Error> {
    let numeric = |v: &Value| matches!(v, Value::Integer(_) | Value::Decimal(_));

    if list.iter().all(numeric) {
        list.sort_by(|a, b| a.as_f64().partial_cmp(&b.as_f64()).unwrap_or(Ordering::Equal));
        return Ok(());
    }

    if list.iter().all(|v| matches!(v, Value::String(_))) {
        list.sort_by(|a, b| a.as_str().cmp(&b.as_str()));
        return Ok(());
    }

    if list.iter().all(|v| matches!(v, Value::Object(_))) {
        for (index, entry) in list.iter().enumerate() {
            let entry_at = path.child(index.to_string());
            match entry.as_object().and_then(|map| map.get(key)) {
                Some(identity) if identity.is_scalar() => {}
                Some(identity) => {
                    return Err(Error::type_mismatch(&entry_at.child(key), "a scalar to sort by", identity.kind()))
                }
                None => {
                    return Err(Error::type_mismatch(
                        &entry_at,
                        format!("a map with a `{key}` key to sort by"),
                        format!("map without `{key}`"),
                    ))
                }
            }
        }

        list.sort_by(|a, b| {
            let a = a.as_object().and_then(|map| map.get(key));
            let b = b.as_object().and_then(|map| map.get(key));
            match (a, b) {
                (Some(a), Some(b)) => compare_scalars(a, b),
                _ => Ordering::Equal,
            }
        });
        return Ok(());
    }

    let mut kinds: Vec<&str> = list.iter().map(Value::kind).collect();
    kinds.sort();
    kinds.dedup();
    Err(Error::type_mismatch(
        path,
        "a list of only numbers, only strings or only maps",
        format!("list mixing {}", kinds.join(" and ")),
    ))
}

fn compare_scalars(a: &Value, b: &Value) -> Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        _ => a.to_scalar_string().cmp(&b.to_scalar_string()),
    }
}

/// Orders paths component wise, list indices numerically
fn compare_paths(a: &Cursor, b: &Cursor) -> Ordering {
    for (x, y) in a.nodes.iter().zip(&b.nodes) {
        let ordering = match (x.parse::<usize>(), y.parse::<usize>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => x.cmp(y),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.len().cmp(&b.len())
}

fn remove(tree: &mut Value, path: &Cursor) {
    let Some((last, parent)) = path.nodes.split_last() else {
        return;
    };
    let parent = Cursor {
        nodes: parent.to_vec(),
    };

    match parent.resolve_mut(tree) {
        Ok(Value::Object(map)) => {
            map.shift_remove(last);
        }
        Ok(Value::Array(list)) => {
            if let Some(index) = last.parse::<usize>().ok().filter(|i| *i < list.len()) {
                list.remove(index);
            }
        }
        _ => tracing::trace!(%path, "nothing to prune"),
    }
}

fn empty_like(value: &Value) -> Value {
    match value {
        Value::Object(_) => Value::Object(Map::new()),
        Value::Array(_) => Value::Array(vec![]),
        _ => Value::Null,
    }
}

/// Copies `value` found at `path` in `source` to the same position in
/// `target`, creating the maps and lists on the way
///
/// List entries are appended in the order they are picked; `slots` remembers
/// where each picked entry ended up.
fn insert_picked(
    target: &mut Value,
    source: &Value,
    path: &Cursor,
    value: Value,
    slots: &mut HashMap<Cursor, usize>,
) -> Result<(), Error> {
    let mut target = target;
    let mut source = source;
    let mut walked = Cursor::new();

    for (depth, node) in path.nodes.iter().enumerate() {
        let last = depth + 1 == path.len();
        walked.push(node.clone());

        let child = match source {
            Value::Object(map) => map.get(node),
            Value::Array(list) => node.parse::<usize>().ok().and_then(|i| list.get(i)),
            _ => None,
        }
        .ok_or_else(|| Error::not_found(&walked))?;

        if matches!(source, Value::Array(_)) {
            if !matches!(target, Value::Array(_)) {
                *target = Value::Array(vec![]);
            }
            let Value::Array(list) = target else {
                return Err(Error::not_found(&walked));
            };

            let index = match slots.get(&walked) {
                Some(index) => *index,
                None => {
                    list.push(empty_like(child));
                    slots.insert(walked.clone(), list.len() - 1);
                    list.len() - 1
                }
            };

            if last {
                list[index] = value;
                return Ok(());
            }
            target = &mut list[index];
        } else {
            if !matches!(target, Value::Object(_)) {
                *target = Value::Object(Map::new());
            }
            let Value::Object(map) = target else {
                return Err(Error::not_found(&walked));
            };

            if last {
                map.insert(node.clone(), value);
                return Ok(());
            }
            target = map.entry(node.clone()).or_insert_with(|| empty_like(child));
        }

        source = child;
    }

    // the empty path picks the whole tree
    *target = value;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn yaml(s: &str) -> Value {
        Value::from_yaml_str(s).unwrap()
    }

    fn cursors(paths: &[&str]) -> Vec<Cursor> {
        paths.iter().map(|p| Cursor::parse(p).unwrap()).collect()
    }

    fn eval(docs: &[&str]) -> Result<Value, Error> {
        eval_with(docs, &RunOptions::default())
    }

    fn eval_with(docs: &[&str], options: &RunOptions) -> Result<Value, Error> {
        evaluate(docs.iter().map(|d| yaml(d)), &Config::default(), options)
    }

    #[test]
    fn calls_run_in_dependency_order() {
        let tree = eval(&[r#"
a: (( grab b ))
b: (( concat c "!" ))
c: (( grab meta.value ))
meta:
  value: hi
"#])
        .unwrap();
        assert_eq!(tree, yaml("a: hi!\nb: hi!\nc: hi\nmeta: {value: hi}\n"));
    }

    #[test]
    fn grabbing_a_subtree_waits_for_calls_inside_it() {
        let tree = eval(&["meta: {a: (( grab x )), b: 2}\nx: 1\ncopy: (( grab meta ))\n"]).unwrap();
        assert_eq!(tree, yaml("meta: {a: 1, b: 2}\nx: 1\ncopy: {a: 1, b: 2}\n"));
    }

    #[test]
    fn cycles_are_detected() {
        let err = eval(&["a: (( grab b ))\nb: (( grab a ))\n"]).unwrap_err();
        assert!(matches!(&err, Error::Multi(multi) if multi.errors.iter().any(|e| matches!(e, Error::Cycle { .. }))));
        assert!(err.to_string().contains("self-referencing"), "{err}");
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let err = eval(&["a: {b: (( grab a ))}\n"]).unwrap_err();
        assert!(err.to_string().contains("cycle detected"), "{err}");
    }

    #[test]
    fn failures_are_isolated_and_aggregated() {
        let err = eval(&[r#"
ok: (( grab value ))
bad: (( grab missing ))
dependent: (( grab bad ))
worse: (( concat value missing.too ))
value: 1
"#])
        .unwrap_err();

        let Error::Multi(multi) = &err else {
            panic!("expected multiple errors, got {err}");
        };
        assert_eq!(multi.count(), 3);
        assert_eq!(
            err.to_string(),
            "3 error(s) detected:\n\
             \x20- $.bad: `$.missing` could not be found in the datastructure\n\
             \x20- $.dependent: depends on `$.bad`, which failed to evaluate\n\
             \x20- $.worse: `$.missing` could not be found in the datastructure\n"
        );
    }

    #[test]
    fn inject_merges_into_parent() {
        let tree = eval(&[r#"
meta:
  defaults:
    size: small
    port: (( grab meta.port ))
  port: 80
job:
  size: large
  base: (( inject meta.defaults ))
"#])
        .unwrap();
        assert_eq!(
            tree.as_object().unwrap()["job"],
            yaml("size: large\nport: 80\n")
        );
    }

    #[test]
    fn inject_runs_after_nested_inject() {
        let tree = eval(&[r#"
base: {a: 1}
mid:
  b: 2
  inner: (( inject base ))
top:
  outer: (( inject mid ))
"#])
        .unwrap();
        assert_eq!(tree.as_object().unwrap()["top"], yaml("a: 1\nb: 2\n"));
    }

    #[test]
    fn params_fail_the_run() {
        let err = eval(&["a: (( param \"please set a\" ))\nb: (( grab missing ))\n"]).unwrap_err();
        assert_eq!(err.to_string(), "1 error(s) detected:\n - $.a: please set a\n");

        let tree = eval(&["a: (( param \"please set a\" ))\n", "a: set\n"]).unwrap();
        assert_eq!(tree, yaml("a: set\n"));
    }

    #[test]
    fn sort_flagged_lists() {
        let tree = eval(&[
            "list: [(( sort by id )), {id: b}, {id: a}]\nnums: [(( sort )), 3, 1, 2.5]\n",
        ])
        .unwrap();
        assert_eq!(tree, yaml("list: [{id: a}, {id: b}]\nnums: [1, 2.5, 3]\n"));
    }

    #[test]
    fn sorting_mixed_lists_is_a_type_error() {
        let err = eval(&["list: [(( sort )), a, {name: b}]\n"]).unwrap_err();
        assert!(err.to_string().contains("list mixing map and string"), "{err}");

        let err = eval(&["list: [(( sort by id )), {id: a}, {name: b}]\n"]).unwrap_err();
        assert!(matches!(&err, Error::Multi(m) if matches!(m.errors[0], Error::TypeMismatch { .. })), "{err}");
    }

    #[test]
    fn prune_after_dereference() {
        let tree = eval(&[
            "properties:\n  client:\n    servers: [a, b]\n  copy: (( grab properties.client.servers ))\n",
            "properties:\n  client:\n    servers: (( prune ))\n",
        ])
        .unwrap();
        assert_eq!(tree, yaml("properties:\n  client: {}\n  copy: [a, b]\n"));
    }

    #[test]
    fn prune_operator_and_option() {
        let options = RunOptions {
            prune: cursors(&["meta", "missing.path", "list.1"]),
            ..Default::default()
        };
        let tree = eval_with(&["meta: {x: 1}\nkeep: (( grab meta.x ))\ngone: (( prune ))\nlist: [a, b, c]\n"], &options)
            .unwrap();
        assert_eq!(tree, yaml("keep: 1\nlist: [a, c]\n"));
    }

    #[test]
    fn cherry_pick_keeps_positions() {
        let options = RunOptions {
            cherry_pick: cursors(&["jobs.web.name", "meta.a"]),
            ..Default::default()
        };
        let tree = eval_with(
            &["jobs: [{name: db, size: 1}, {name: web, size: 2}]\nmeta: {a: 1, b: 2}\nother: x\n"],
            &options,
        )
        .unwrap();
        assert_eq!(tree, yaml("jobs: [{name: web}]\nmeta: {a: 1}\n"));
    }

    #[test]
    fn cherry_pick_of_pruned_path_fails() {
        let options = RunOptions {
            prune: cursors(&["meta"]),
            cherry_pick: cursors(&["meta.a"]),
            ..Default::default()
        };
        let err = eval_with(&["meta: {a: 1}\n"], &options).unwrap_err();
        assert!(err.is_not_found(), "{err}");
    }

    #[test]
    fn cherry_pick_skips_unrelated_failures() {
        let options = RunOptions {
            cherry_pick: cursors(&["out"]),
            ..Default::default()
        };
        let tree = eval_with(&["out: (( grab src ))\nsrc: 1\nbroken: (( grab nowhere ))\n"], &options).unwrap();
        assert_eq!(tree, yaml("out: 1\n"));
    }

    #[test]
    fn pruning_happens_before_sorting() {
        let options = RunOptions {
            prune: cursors(&["list.0"]),
            ..Default::default()
        };
        let tree = eval_with(&["list: [(( sort )), c, a, b]\n"], &options).unwrap();
        assert_eq!(tree, yaml("list: [a, b]\n"));

        let options = RunOptions {
            prune: cursors(&["list"]),
            ..Default::default()
        };
        let tree = eval_with(&["list: [(( sort )), b, a]\nkeep: 1\n"], &options).unwrap();
        assert_eq!(tree, yaml("keep: 1\n"));
    }

    #[test]
    fn configured_merge_key_addresses_list_entries() {
        let config = Config {
            array_merge_key: Some("label".into()),
            ..Config::default()
        };
        let tree = evaluate(
            [
                yaml("jobs: [{label: web, port: 80}]\nout: (( grab jobs.web.port ))\n"),
                yaml("jobs: [{label: web, port: 8080}]\n"),
            ],
            &config,
            &RunOptions::default(),
        )
        .unwrap();
        assert_eq!(tree, yaml("jobs: [{label: web, port: 8080}]\nout: 8080\n"));
    }

    #[test]
    fn empty_replaces_missing_and_existing_values() {
        let tree = eval(&[
            "a: {x: 1}\nlist: [1, 2]\n",
            "a: (( empty hash ))\nlist: (( empty array ))\nfresh: {map: (( empty map )), text: (( empty string ))}\n",
        ])
        .unwrap();
        assert_eq!(tree, yaml("a: {}\nlist: []\nfresh: {map: {}, text: \"\"}\n"));
    }

    #[test]
    fn round_ceiling_is_max_recursion() {
        let merged = merge([yaml("a: (( grab b ))\nb: (( grab c ))\nc: 1\n")], &Config::default()).unwrap();
        let mut ev = Evaluator::new(merged, Config::default()).with_max_rounds(1);
        let err = ev.run(&RunOptions::default()).unwrap_err();
        let Error::Multi(multi) = &err else {
            panic!("expected aggregated errors, got {err}");
        };
        assert_eq!(multi.errors, [Error::MaxRecursion { depth: 1 }]);

        let merged = merge([yaml("a: (( grab b ))\nb: (( grab c ))\nc: 1\n")], &Config::default()).unwrap();
        let mut ev = Evaluator::new(merged, Config::default()).with_max_rounds(2);
        ev.run(&RunOptions::default()).unwrap();
        assert_eq!(ev.tree, yaml("a: 1\nb: 1\nc: 1\n"));
    }

    #[test]
    fn wildcard_references_wait_for_every_match() {
        let tree = eval(&[r#"
all: (( grab jobs.*.port ))
jobs:
  - name: a
    port: (( grab meta.port ))
  - name: b
    port: 2
meta: {port: 1}
"#])
        .unwrap();
        assert_eq!(tree.as_object().unwrap()["all"], Value::from(vec![1i64, 2]));
    }

    #[test]
    fn skip_eval_leaves_calls_alone() {
        let options = RunOptions {
            skip_eval: true,
            prune: cursors(&["b"]),
            ..Default::default()
        };
        let tree = eval_with(&["a: (( grab b ))\nb: 1\n"], &options).unwrap();
        assert_eq!(tree, yaml("a: (( grab b ))\n"));
    }

    #[test]
    fn unreachable_alternatives_warn() {
        let merged = merge([yaml("a: (( grab x || \"lit\" || y ))\n")], &Config::default()).unwrap();
        let mut ev = Evaluator::new(merged, Config::default());
        ev.run(&RunOptions::default()).unwrap();
        assert_eq!(ev.tree, yaml("a: lit\n"));
        assert_eq!(
            ev.warnings,
            [Warning::new("$.a: literal \"lit\" short-circuits expression (x || \"lit\" || y)")]
        );
    }

    #[test]
    fn reset_forgets_run_state() {
        let merged = merge([yaml("a: 1\n")], &Config::default()).unwrap();
        let mut ev = Evaluator::new(merged, Config::default());
        ev.state.ips.insert(1, "x".into());
        ev.state.aws_cache.insert("k".into(), "v".into());
        ev.reset();
        assert!(ev.state.ips.is_empty());
        assert!(ev.state.aws_cache.is_empty());
    }

    #[test]
    fn paths_sort_numerically() {
        let mut paths = cursors(&["l.10", "l.2", "a", "l.2.x"]);
        paths.sort_by(compare_paths);
        let rendered: Vec<String> = paths.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, ["a", "l.2", "l.2.x", "l.10"]);
    }
}
