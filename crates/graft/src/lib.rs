//! # graft - merge YAML documents and evaluate embedded operators
//!
//! ## Introduction for developers
//!
//! Read this to understand how `graft` works internally.
//!
//! ### Terms
//!
//! - a **tree** is a [value::Value], usually with a map at its root
//! - a **cursor** ([cursor::Cursor]) addresses a node in a tree: `jobs.web.instances`,
//!   `jobs.0`, `meta.list[1]` or `$.a.b`. List entries can be addressed by index or by
//!   the value of their `name` (`key`, `id`) field.
//! - an **opcall** ([opcall::Opcall]) is a string of the form `(( name args... ))`
//!   found somewhere in a tree
//!
//! A small example:
//! ```yaml
//! meta:
//!   domain: example.com
//! jobs:
//! - name: web
//!   url: (( concat "https://web." meta.domain ))
//! ```
//!
//! ### Loading files
//!
//! Every input document is parsed into a [value::Value] and collected in
//! [documents::Documents], which remembers the source path of each document.
//! YAML streams may hold several documents; JSON and HCL are accepted as well.
//!
//! ### Merging
//!
//! see [merge::merge]
//!
//! Documents are deep merged from left to right. Maps merge key by key, lists
//! follow directives such as `(( append ))` or merge by identity key. The merger
//! also records lists that want sorting and paths marked with `(( prune ))`.
//!
//! ### Evaluation
//!
//! see [evaluator::Evaluator]
//!
//! After merging, opcalls are evaluated in phases. For each phase the tree is
//! scanned for opcalls of that phase and a dependency graph between them is
//! built from the references in their arguments. The graph is then evaluated
//! in rounds until nothing is left, detecting cycles along the way.
//!
//! Operators live in [operator] and are looked up by name in a registry.
//!
//! ### Output
//!
//! The resulting tree is serialized via [serde], with map keys sorted so output
//! is deterministic.
//!
pub mod config;
pub mod cursor;
pub mod diff;
pub mod documents;
pub mod error;
pub mod evaluator;
pub mod expr;
pub mod merge;
pub mod opcall;
pub mod operator;
pub mod value;
mod visit;

pub use config::Config;
pub use error::{Error, MultiError, Warning};
pub use evaluator::{evaluate, Evaluator, RunOptions};
pub use value::Value;
