//! addressable paths into a value tree
//!
//! A [Cursor] is a list of path components. The textual form accepts
//! - dotted notation: `meta.jobs.web`
//! - bracket notation: `jobs[0].name`, `jobs.[0].name`, `a[b.c]` (brackets protect dots)
//! - a leading `$` denoting the root, which is dropped
//!
//! List elements are addressed by index (`jobs.0`) or by identity: the value of
//! the first of the fields `name`, `key` or `id` that matches (`jobs.web`).
//! The `*_with` variants also try a configured identity field after those.
//! [Cursor::canonical] rewrites identity components into indices.
use crate::error::Error;
use crate::value::Value;

/// Fields that identify entries of a list of maps, in order of preference
pub const NAME_FIELDS: [&str; 3] = ["name", "key", "id"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cursor {
    pub nodes: Vec<String>,
}

impl Cursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(input: &str) -> Result<Self, Error> {
        let mut nodes: Vec<String> = vec![];
        let mut node = String::new();
        let mut bracketed = false;

        let syntax = |problem: &str, position: usize| Error::Syntax {
            input: input.to_string(),
            problem: problem.to_string(),
            position,
        };

        let push = |node: &mut String, nodes: &mut Vec<String>| {
            if node.is_empty() {
                return;
            }
            if nodes.is_empty() && node == "$" {
                node.clear();
                return;
            }
            nodes.push(std::mem::take(node));
        };

        for (position, c) in input.chars().enumerate() {
            match c {
                '.' if !bracketed => push(&mut node, &mut nodes),
                '[' => {
                    if bracketed {
                        return Err(syntax("unexpected '['", position));
                    }
                    push(&mut node, &mut nodes);
                    bracketed = true;
                }
                ']' => {
                    if !bracketed {
                        return Err(syntax("unexpected ']'", position));
                    }
                    push(&mut node, &mut nodes);
                    bracketed = false;
                }
                c => node.push(c),
            }
        }

        if bracketed {
            return Err(syntax("unterminated '['", input.chars().count()));
        }
        push(&mut node, &mut nodes);

        Ok(Self { nodes })
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn push(&mut self, node: impl Into<String>) {
        self.nodes.push(node.into());
    }

    /// Removes the last component; a no-op on the empty cursor
    pub fn pop(&mut self) -> Option<String> {
        self.nodes.pop()
    }

    /// Copy with one more component
    pub fn child(&self, node: impl Into<String>) -> Self {
        let mut child = self.clone();
        child.push(node);
        child
    }

    /// Copy without the last component
    pub fn up(&self) -> Self {
        let mut parent = self.clone();
        parent.pop();
        parent
    }

    /// Component at `n`, negative values count from the end (`-1` is the last)
    ///
    /// Out of range positions yield an empty string.
    pub fn component(&self, n: isize) -> &str {
        let index = if n < 0 {
            self.nodes.len() as isize + n
        } else {
            n
        };

        if index < 0 || index as usize >= self.nodes.len() {
            return "";
        }
        &self.nodes[index as usize]
    }

    /// Name of the node containing the addressed node
    pub fn parent(&self) -> &str {
        self.component(-2)
    }

    pub fn last(&self) -> &str {
        self.component(-1)
    }

    /// Strictly below `other` (equal cursors are not under each other)
    pub fn under(&self, other: &Cursor) -> bool {
        if other.nodes.is_empty() || self.nodes.len() <= other.nodes.len() {
            return false;
        }
        self.nodes.iter().zip(&other.nodes).all(|(a, b)| a == b)
    }

    /// `other` addresses this node or something below it
    pub fn contains(&self, other: &Cursor) -> bool {
        if self.nodes.is_empty() || other.nodes.len() < self.nodes.len() {
            return false;
        }
        self.nodes.iter().zip(&other.nodes).all(|(a, b)| a == b)
    }

    /// Rendering used in messages: `$.a.b`, or `$` for the root
    pub fn rooted(&self) -> String {
        if self.nodes.is_empty() {
            "$".into()
        } else {
            format!("$.{self}")
        }
    }

    pub fn is_glob(&self) -> bool {
        self.nodes.iter().any(|n| n == "*")
    }

    /// Rewrites identity references into list indices
    pub fn canonical(&self, tree: &Value) -> Result<Cursor, Error> {
        self.canonical_with(tree, None)
    }

    /// [Cursor::canonical], also matching list entries by `merge_key`
    pub fn canonical_with(&self, tree: &Value, merge_key: Option<&str>) -> Result<Cursor, Error> {
        let mut canonical = Cursor::new();
        let mut current = tree;

        for node in &self.nodes {
            let (next, index) = step(current, node, &canonical, merge_key)?;
            match index {
                Some(index) => canonical.push(index.to_string()),
                None => canonical.push(node.clone()),
            }
            current = next;
        }

        Ok(canonical)
    }

    pub fn resolve<'t>(&self, tree: &'t Value) -> Result<&'t Value, Error> {
        self.resolve_with(tree, None)
    }

    pub fn resolve_with<'t>(&self, tree: &'t Value, merge_key: Option<&str>) -> Result<&'t Value, Error> {
        let mut walked = Cursor::new();
        let mut current = tree;

        for node in &self.nodes {
            current = step(current, node, &walked, merge_key)?.0;
            walked.push(node.clone());
        }

        Ok(current)
    }

    pub fn resolve_mut<'t>(&self, tree: &'t mut Value) -> Result<&'t mut Value, Error> {
        self.resolve_mut_with(tree, None)
    }

    pub fn resolve_mut_with<'t>(
        &self,
        tree: &'t mut Value,
        merge_key: Option<&str>,
    ) -> Result<&'t mut Value, Error> {
        let canonical = self.canonical_with(tree, merge_key)?;
        let mut current = tree;

        for node in &canonical.nodes {
            current = match current {
                Value::Object(map) => map.get_mut(node),
                Value::Array(list) => node.parse::<usize>().ok().and_then(|i| list.get_mut(i)),
                _ => None,
            }
            .ok_or_else(|| Error::not_found(&canonical))?;
        }

        Ok(current)
    }

    /// Expands `*` components into every matching concrete cursor
    ///
    /// Paths that stop matching after the first `*` are dropped silently.
    /// A path without `*` that does not resolve, or a glob whose prefix does not
    /// resolve, is an error.
    pub fn glob(&self, tree: &Value) -> Result<Vec<Cursor>, Error> {
        self.glob_with(tree, None)
    }

    pub fn glob_with(&self, tree: &Value, merge_key: Option<&str>) -> Result<Vec<Cursor>, Error> {
        let mut found = vec![];
        glob_into(tree, &self.nodes, &mut Cursor::new(), false, merge_key, &mut found)?;
        Ok(found)
    }
}

/// Steps from `current` (found at `parent`) into `node`
///
/// Returns the child and, for lists, the index it was found at.
fn step<'t>(
    current: &'t Value,
    node: &str,
    parent: &Cursor,
    merge_key: Option<&str>,
) -> Result<(&'t Value, Option<usize>), Error> {
    match current {
        Value::Object(map) => map
            .get(node)
            .map(|value| (value, None))
            .ok_or_else(|| Error::not_found(&parent.child(node))),
        Value::Array(list) => node
            .parse::<usize>()
            .ok()
            .and_then(|index| list.get(index).map(|value| (index, value)))
            .or_else(|| find_by_identity(list, node, merge_key))
            .map(|(index, value)| (value, Some(index)))
            .ok_or_else(|| Error::not_found(&parent.child(node))),
        other => Err(Error::type_mismatch(parent, "a map or a list", other.kind())),
    }
}

/// Finds a list entry by the first identity field that matches `key`
///
/// `merge_key` is tried after [NAME_FIELDS].
pub fn find_by_identity<'t>(
    list: &'t [Value],
    key: &str,
    merge_key: Option<&str>,
) -> Option<(usize, &'t Value)> {
    NAME_FIELDS.iter().copied().chain(merge_key).find_map(|field| {
        list.iter().enumerate().find(|(_, entry)| {
            entry
                .as_object()
                .and_then(|map| map.get(field))
                .and_then(Value::to_scalar_string)
                .is_some_and(|identity| identity == key)
        })
    })
}

fn glob_into(
    current: &Value,
    rest: &[String],
    here: &mut Cursor,
    past_wildcard: bool,
    merge_key: Option<&str>,
    found: &mut Vec<Cursor>,
) -> Result<(), Error> {
    let Some((node, rest)) = rest.split_first() else {
        found.push(here.clone());
        return Ok(());
    };

    if node == "*" {
        let children: Vec<(String, &Value)> = match current {
            Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
            Value::Array(list) => list
                .iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v))
                .collect(),
            _ if past_wildcard => return Ok(()),
            other => return Err(Error::type_mismatch(here, "a map or a list", other.kind())),
        };

        for (key, child) in children {
            here.push(key);
            glob_into(child, rest, here, true, merge_key, found)?;
            here.pop();
        }
        return Ok(());
    }

    match step(current, node, here, merge_key) {
        Ok((child, index)) => {
            here.push(index.map(|i| i.to_string()).unwrap_or_else(|| node.clone()));
            let result = glob_into(child, rest, here, past_wildcard, merge_key, found);
            here.pop();
            result
        }
        Err(_) if past_wildcard => Ok(()),
        Err(err) => Err(err),
    }
}

impl std::str::FromStr for Cursor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Cursor::parse(s)
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, node) in self.nodes.iter().enumerate() {
            if node.contains('.') {
                write!(f, "[{node}]")?;
            } else {
                if i > 0 {
                    f.write_str(".")?;
                }
                f.write_str(node)?;
            }
        }
        Ok(())
    }
}
