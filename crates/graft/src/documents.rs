//! collection of input documents (root map and path to source file)
//!
//! [Documents] keeps the documents in the order they were added, which is the
//! order they are merged in. Each document remembers where it came from so
//! errors can point at the file.
use crate::value::{Map, Value};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Default, Debug)]
pub struct Documents {
    sources: Vec<Source>,
    documents: Vec<(usize, Map)>,
}

/// Input formats, picked by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
    Hcl,
}

impl Format {
    /// `.json` and `.hcl` are recognised, everything else is YAML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Format::Json,
            Some("hcl") => Format::Hcl,
            _ => Format::Yaml,
        }
    }
}

impl Documents {
    /// Appends a document
    pub fn insert(&mut self, document: Map, source: impl Into<Source>) {
        let source_index = self.sources.len();
        self.sources.push(source.into());
        self.documents.push((source_index, document));
    }

    pub fn iter(&self) -> impl Iterator<Item = SourceDocument> {
        self.documents
            .iter()
            .map(|(source_index, document)| (&self.sources[*source_index], document))
    }

    /// Documents as trees, ready to be merged
    pub fn trees(&self) -> impl Iterator<Item = Value> + '_ {
        self.documents
            .iter()
            .map(|(_, document)| Value::Object(document.clone()))
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl Documents {
    pub fn load_file(&mut self, file_path: &Path) -> Result<usize, LoadError> {
        let file_path = file_path.canonicalize()?;
        tracing::info!(path=%file_path.display(), "loading file");

        let file_contents = std::fs::read_to_string(&file_path)?;
        let format = Format::from_path(&file_path);
        self.load_source(format, &file_contents, Some(file_path))
    }

    pub fn load_str(&mut self, format: Format, text: &str) -> Result<usize, LoadError> {
        self.load_source(format, text, None)
    }

    /// Parses `text` and adds every non-empty document in it
    ///
    /// Returns the number of documents added.
    pub fn load_source(&mut self, format: Format, text: &str, source: Source) -> Result<usize, LoadError> {
        let parsed: Vec<Value> = match format {
            Format::Yaml => {
                let mut parsed = vec![];
                for document in serde_yaml::Deserializer::from_str(text) {
                    parsed.push(serde_yaml::Value::deserialize(document)?.into());
                }
                parsed
            }
            Format::Json => vec![serde_json::from_str::<serde_json::Value>(text)?.into()],
            Format::Hcl => vec![hcl::from_str::<hcl::Value>(text)?.into()],
        };

        let mut added = 0;
        for (index, document) in parsed.into_iter().enumerate() {
            match document {
                Value::Null => tracing::debug!(index, "skipping empty document"),
                Value::Object(map) => {
                    self.insert(map, source.clone());
                    added += 1;
                }
                other => {
                    return Err(LoadError::RootNotAMap {
                        index,
                        kind: other.kind(),
                    })
                }
            }
        }

        Ok(added)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    #[error("Unable to parse yaml")]
    YamlParseFailed(#[from] serde_yaml::Error),
    #[error("Unable to parse json")]
    JsonParseFailed(#[from] serde_json::Error),
    #[error("Unable to parse hcl")]
    HclParseFailed(#[from] hcl::Error),
    #[error("Document {index} has a {kind} at its root, expected a map")]
    RootNotAMap { index: usize, kind: &'static str },
}

impl From<Map> for Documents {
    fn from(value: Map) -> Self {
        let mut documents = Documents::default();
        documents.insert(value, None);
        documents
    }
}

/// Utility macro to create [Documents] from YAML
///
/// Create from a single (possibly multi-document) string
/// ```
/// # use graft::documents;
/// documents!("attribute: 42");
/// ```
///
/// Create from multiple sources (path required)
/// ```
/// # use graft::documents;
/// documents! {
///   "one.yml" => "attribute_one: 1",
///   "two.yml" => "attribute_two: 2"
/// };
/// ```
///
/// # Panic
/// Panics on invalid input
///
/// ```should_panic
/// # use graft::documents;
/// documents!("not: [valid");
/// ```
#[macro_export]
macro_rules! documents {
    // documents without source
    { $expr:expr } => {{
        let mut docs = $crate::documents::Documents::default();
        docs.load_str($crate::documents::Format::Yaml, $expr).expect("documents must parse");
        docs
    }};
    // documents with sources
    { $($source:expr => $expr:expr),+ } => {{
        let mut docs = $crate::documents::Documents::default();
        $(
            docs.load_source($crate::documents::Format::Yaml, $expr, Some($source.into())).expect("documents must parse");
        )+
        docs
    }};
}

pub type Source = Option<PathBuf>;
pub type SourceDocument<'a> = (&'a Source, &'a Map);

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn multi_document_streams() {
        let documents = documents! {r#"
a: 1
---
---
b: 2
"#};

        assert_eq!(documents.len(), 2);
        let keys: Vec<&str> = documents
            .iter()
            .flat_map(|(_, doc)| doc.keys().map(String::as_str))
            .collect();
        assert_eq!(keys, ["a", "b"]);
    }

    #[test]
    fn sources_are_tracked() {
        let documents = documents! {
            "one.yml" => "a: 1",
            "two.yml" => "b: 2\n---\nc: 3"
        };

        let sources: Vec<String> = documents
            .iter()
            .map(|(source, _)| source.as_ref().unwrap().display().to_string())
            .collect();
        assert_eq!(sources, ["one.yml", "two.yml", "two.yml"]);
    }

    #[test]
    fn other_formats() {
        let mut documents = Documents::default();
        documents.load_str(Format::Json, r#"{"a": {"b": [1, 2.5]}}"#).unwrap();
        documents.load_str(Format::Hcl, "c = \"x\"\nblock { d = true }\n").unwrap();

        let trees: Vec<Value> = documents.trees().collect();
        assert_eq!(trees[0], Value::from_yaml_str("a: {b: [1, 2.5]}").unwrap());
        assert_eq!(trees[1], Value::from_yaml_str("c: x\nblock: {d: true}").unwrap());
    }

    #[test]
    fn roots_must_be_maps() {
        let mut documents = Documents::default();
        assert!(matches!(
            documents.load_str(Format::Yaml, "- a\n- b\n"),
            Err(LoadError::RootNotAMap { index: 0, kind: "slice" })
        ));
        assert!(matches!(
            documents.load_str(Format::Yaml, "a: [b"),
            Err(LoadError::YamlParseFailed(_))
        ));
        assert!(documents.is_empty());
    }

    #[test]
    fn format_by_extension() {
        assert_eq!(Format::from_path(Path::new("a.json")), Format::Json);
        assert_eq!(Format::from_path(Path::new("a.hcl")), Format::Hcl);
        assert_eq!(Format::from_path(Path::new("a.yml")), Format::Yaml);
        assert_eq!(Format::from_path(Path::new("a")), Format::Yaml);
    }
}
