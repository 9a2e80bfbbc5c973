//! deep merge of documents
//!
//! Documents are merged left to right into an accumulating root map:
//! - map over map merges key by key
//! - list over list follows the list policy below
//! - anything else: the incoming value replaces the existing one
//!
//! ## List policy
//!
//! A list may start with a directive that decides how it is merged:
//!
//! | directive                 | effect                                            |
//! |---------------------------|---------------------------------------------------|
//! | `(( append ))`            | entries are added after the existing ones         |
//! | `(( prepend ))`           | entries are added before the existing ones        |
//! | `(( replace ))`           | entries replace the existing list                 |
//! | `(( inline ))`            | entries are merged index by index                 |
//! | `(( merge ))`             | merge by identity key (errors are fatal)          |
//! | `(( merge on <key> ))`    | merge by `<key>` (errors are fatal)               |
//! | `(( sort ))`              | sort the list after evaluation, then default merge|
//! | `(( sort by <key> ))`     | as above, sorting maps by `<key>`                 |
//!
//! Without a directive, lists whose entries are all maps carrying an identity
//! key are merged by that key; everything else merges inline (or appends when
//! [Config::fallback_append] is set).
//!
//! An overlay value of `(( prune ))` keeps the existing value and records the
//! path for removal once evaluation has finished.
use crate::config::Config;
use crate::cursor::Cursor;
use crate::error::{Error, MultiError, Warning};
use crate::value::{Map, Value};
use indexmap::IndexMap;
use std::collections::HashMap;

/// The outcome of merging a set of documents
#[derive(Debug, Clone, Default)]
pub struct Merged {
    pub tree: Value,
    /// Paths to remove after evaluation
    pub prune: Vec<Cursor>,
    /// Lists to sort after evaluation, with the key to sort maps by
    pub sort: IndexMap<Cursor, Option<String>>,
    pub warnings: Vec<Warning>,
}

/// Merges `documents` in order. Empty documents are skipped, every other
/// document must have a map at its root.
#[tracing::instrument(level = "debug", skip_all)]
pub fn merge(documents: impl IntoIterator<Item = Value>, config: &Config) -> Result<Merged, Error> {
    let mut merger = Merger::new(config);
    let mut root = Map::new();

    for (index, document) in documents.into_iter().enumerate() {
        match document {
            Value::Null => tracing::debug!(index, "skipping empty document"),
            Value::Object(map) => {
                tracing::debug!(index, keys = map.len(), "merging document");
                root = merger.merge_map(root, map, &Cursor::new());
            }
            other => merger.errors.append(Error::msg(format!(
                "document {index} has a {} at its root, expected a map",
                other.kind()
            ))),
        }
    }

    merger.finish(Value::Object(root))
}

#[derive(Debug)]
pub struct Merger<'c> {
    config: &'c Config,
    pub errors: MultiError,
    pub warnings: Vec<Warning>,
    pub prune: Vec<Cursor>,
    pub sort: IndexMap<Cursor, Option<String>>,
}

impl<'c> Merger<'c> {
    pub fn new(config: &'c Config) -> Self {
        Self {
            config,
            errors: MultiError::new(),
            warnings: vec![],
            prune: vec![],
            sort: IndexMap::new(),
        }
    }

    pub fn finish(self, tree: Value) -> Result<Merged, Error> {
        self.errors.into_result()?;
        Ok(Merged {
            tree,
            prune: self.prune,
            sort: self.sort,
            warnings: self.warnings,
        })
    }

    /// Merges `overlay` onto `base` (if any) located at `path`
    pub fn merge_value(&mut self, base: Option<Value>, overlay: Value, path: &Cursor) -> Value {
        match (base, overlay) {
            (base, Value::String(s)) if is_prune_marker(&s) => {
                tracing::debug!(path = %path, "marked for pruning");
                self.mark_prune(path);
                base.unwrap_or(Value::String(s))
            }
            (Some(Value::Object(base)), Value::Object(overlay)) => {
                Value::Object(self.merge_map(base, overlay, path))
            }
            (Some(Value::Array(base)), Value::Array(overlay)) => {
                Value::Array(self.merge_array(base, overlay, path))
            }
            // fresh containers still go through the merge so directives and
            // markers nested inside them are processed
            (_, Value::Object(overlay)) => Value::Object(self.merge_map(Map::new(), overlay, path)),
            (_, Value::Array(overlay)) => Value::Array(self.merge_array(vec![], overlay, path)),
            (base, overlay) => {
                if let Some(base) = base.filter(|b| !b.is_scalar()) {
                    tracing::debug!(path = %path, from = base.kind(), to = overlay.kind(), "replacing container with scalar");
                }
                overlay
            }
        }
    }

    pub fn merge_map(&mut self, mut base: Map, overlay: Map, path: &Cursor) -> Map {
        for (key, value) in overlay {
            let here = path.child(key.as_str());
            match base.get_mut(&key) {
                Some(existing) => {
                    let existing_value = std::mem::take(existing);
                    *existing = self.merge_value(Some(existing_value), value, &here);
                }
                None => {
                    let merged = self.merge_value(None, value, &here);
                    base.insert(key, merged);
                }
            }
        }
        base
    }

    pub fn merge_array(&mut self, base: Vec<Value>, overlay: Vec<Value>, path: &Cursor) -> Vec<Value> {
        let (directive, overlay) = split_directive(overlay);

        match directive {
            Some(ListDirective::Append) => {
                tracing::debug!(path = %path, "appending list");
                let offset = base.len();
                let mut merged = base;
                merged.extend(self.fresh_entries(overlay, path, offset));
                merged
            }
            Some(ListDirective::Prepend) => {
                tracing::debug!(path = %path, "prepending list");
                let mut merged = self.fresh_entries(overlay, path, 0);
                merged.extend(base);
                merged
            }
            Some(ListDirective::Replace) => {
                tracing::debug!(path = %path, "replacing list");
                self.fresh_entries(overlay, path, 0)
            }
            Some(ListDirective::Inline) => self.merge_inline(base, overlay, path),
            Some(ListDirective::Merge(key)) => {
                let key = key.unwrap_or_else(|| self.config.merge_keys()[0].to_string());
                match self.merge_by_key(base.clone(), overlay, &key, path, true) {
                    Ok(merged) => merged,
                    Err(err) => {
                        self.errors.append(err);
                        base
                    }
                }
            }
            Some(ListDirective::Sort(key)) => {
                tracing::debug!(path = %path, ?key, "list flagged for sorting");
                self.sort.insert(path.clone(), key);
                self.merge_default(base, overlay, path)
            }
            None => self.merge_default(base, overlay, path),
        }
    }

    fn merge_default(&mut self, base: Vec<Value>, overlay: Vec<Value>, path: &Cursor) -> Vec<Value> {
        if let Some(key) = self.identity_key(&base, &overlay) {
            if let Some(warning) = disallowed_identity(&base, &overlay, &key, path) {
                tracing::warn!(%warning, "falling back to inline merge");
                self.warnings.push(warning);
                return self.merge_inline(base, overlay, path);
            }

            tracing::debug!(path = %path, key, "merging list by key");
            return match self.merge_by_key(base.clone(), overlay, &key, path, false) {
                Ok(merged) => merged,
                Err(err) => {
                    self.errors.append(err);
                    base
                }
            };
        }

        if self.config.fallback_append {
            let offset = base.len();
            let mut merged = base;
            merged.extend(self.fresh_entries(overlay, path, offset));
            return merged;
        }

        self.merge_inline(base, overlay, path)
    }

    fn merge_inline(&mut self, mut base: Vec<Value>, overlay: Vec<Value>, path: &Cursor) -> Vec<Value> {
        tracing::trace!(path = %path, "merging list inline");
        for (index, value) in overlay.into_iter().enumerate() {
            let here = path.child(index.to_string());
            if index < base.len() {
                let existing = std::mem::take(&mut base[index]);
                base[index] = self.merge_value(Some(existing), value, &here);
            } else {
                base.push(self.merge_value(None, value, &here));
            }
        }
        base
    }

    fn merge_by_key(
        &mut self,
        mut base: Vec<Value>,
        overlay: Vec<Value>,
        key: &str,
        path: &Cursor,
        explicit: bool,
    ) -> Result<Vec<Value>, Error> {
        let mut positions: HashMap<String, usize> = HashMap::new();
        for (index, entry) in base.iter().enumerate() {
            if matches!(entry, Value::Null) {
                continue;
            }
            let identity = identity_of(entry, key, &path.child(index.to_string()))?;
            positions.entry(identity).or_insert(index);
        }

        for (index, entry) in overlay.into_iter().enumerate() {
            if matches!(entry, Value::Null) {
                continue;
            }

            let identity = identity_of(&entry, key, &path.child(format!("{index}")))
                .map_err(|err| if explicit { err } else { Error::msg(format!("{err} (while merging by key)")) })?;

            match positions.get(&identity) {
                Some(&position) => {
                    let here = path.child(position.to_string());
                    let existing = std::mem::take(&mut base[position]);
                    base[position] = self.merge_value(Some(existing), entry, &here);
                }
                None => {
                    let position = base.len();
                    let here = path.child(position.to_string());
                    let merged = self.merge_value(None, entry, &here);
                    base.push(merged);
                    positions.insert(identity, position);
                }
            }
        }

        Ok(base)
    }

    /// First identity key carried by every (non-null) entry of both lists
    fn identity_key(&self, base: &[Value], overlay: &[Value]) -> Option<String> {
        let entries: Vec<&Value> = base
            .iter()
            .chain(overlay)
            .filter(|entry| !matches!(entry, Value::Null))
            .collect();

        if entries.is_empty() || overlay.is_empty() {
            return None;
        }

        self.config
            .merge_keys()
            .into_iter()
            .find(|key| {
                entries
                    .iter()
                    .all(|entry| entry.as_object().is_some_and(|map| map.contains_key(*key)))
            })
            .map(str::to_string)
    }

    fn fresh_entries(&mut self, entries: Vec<Value>, path: &Cursor, offset: usize) -> Vec<Value> {
        entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| self.merge_value(None, entry, &path.child((offset + index).to_string())))
            .collect()
    }

    fn mark_prune(&mut self, path: &Cursor) {
        if !self.prune.contains(path) {
            self.prune.push(path.clone());
        }
    }
}

/// Identity value of a list entry when merging by `key`
fn identity_of(entry: &Value, key: &str, path: &Cursor) -> Result<String, Error> {
    let Some(map) = entry.as_object() else {
        return Err(Error::type_mismatch(
            path,
            format!("a map with a `{key}` field"),
            entry.kind(),
        ));
    };

    let Some(identity) = map.get(key) else {
        return Err(Error::msg(format!(
            "`{}` does not contain the key `{key}` needed to merge by key",
            path.rooted()
        )));
    };

    identity.to_scalar_string().ok_or_else(|| {
        Error::type_mismatch(
            &path.child(key),
            "a scalar identity to merge by key",
            identity.kind(),
        )
    })
}

/// Warns when an identity key holds a map or a list in any entry
fn disallowed_identity(base: &[Value], overlay: &[Value], key: &str, path: &Cursor) -> Option<Warning> {
    base.iter()
        .chain(overlay)
        .filter_map(Value::as_object)
        .filter_map(|map| map.get(key))
        .find(|identity| !identity.is_scalar())
        .map(|identity| {
            Warning::new(format!(
                "`{}`: an entry has a {} as its `{key}`, merging the list inline instead of by key",
                path.rooted(),
                identity.kind()
            ))
        })
}

#[derive(Debug, Clone, PartialEq)]
enum ListDirective {
    Append,
    Prepend,
    Replace,
    Inline,
    Merge(Option<String>),
    Sort(Option<String>),
}

impl ListDirective {
    fn parse(text: &str) -> Option<Self> {
        let inner = text.trim().strip_prefix("((")?.strip_suffix("))")?;
        let words: Vec<&str> = inner.split_whitespace().collect();

        match words.as_slice() {
            ["append"] => Some(Self::Append),
            ["prepend"] => Some(Self::Prepend),
            ["replace"] => Some(Self::Replace),
            ["inline"] => Some(Self::Inline),
            ["merge"] => Some(Self::Merge(None)),
            ["merge", "on", key] => Some(Self::Merge(Some(key.to_string()))),
            ["sort"] => Some(Self::Sort(None)),
            ["sort", "by", key] => Some(Self::Sort(Some(key.to_string()))),
            _ => None,
        }
    }
}

/// Strips a leading list directive
fn split_directive(mut list: Vec<Value>) -> (Option<ListDirective>, Vec<Value>) {
    let directive = list.first().and_then(Value::as_str).and_then(ListDirective::parse);
    if directive.is_some() {
        list.remove(0);
    }
    (directive, list)
}

pub fn is_prune_marker(text: &str) -> bool {
    text.trim()
        .strip_prefix("((")
        .and_then(|s| s.strip_suffix("))"))
        .is_some_and(|inner| inner.trim() == "prune")
}
