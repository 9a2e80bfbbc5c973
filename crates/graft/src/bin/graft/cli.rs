//! graft cli interface

use clap::{Parser, Subcommand, ValueEnum};
use graft::cursor::Cursor;
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; graft ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Merge documents and evaluate their operators
    ///
    /// Reads YAML from stdin when no file is given or a file is `-`.
    ///
    /// No AWS backend is available here: `awsparam` and `awssecret` fail
    /// unless GRAFT_SKIP_AWS or REDACT is set, which redacts their values.
    Merge(MergeCommand),

    /// Show the differences between two documents
    Diff(DiffCommand),

    /// Convert documents to JSON without merging or evaluating
    Json(JsonCommand),
}

#[derive(Parser, Debug)]
pub struct MergeCommand {
    /// Remove a path from the output (can be repeated)
    #[clap(long = "prune")]
    pub prune: Vec<Cursor>,

    /// Only output the given path (can be repeated)
    #[clap(long = "cherry-pick")]
    pub cherry_pick: Vec<Cursor>,

    /// Merge only, leave operators unevaluated
    #[clap(long = "skip-eval")]
    pub skip_eval: bool,

    /// Append lists that cannot be merged by key instead of merging inline
    #[clap(long = "fallback-append")]
    pub fallback_append: bool,

    /// Directory relative paths of the file and load operators start from
    #[clap(long = "file-base-path")]
    pub file_base_path: Option<PathBuf>,

    #[clap(flatten)]
    pub output: OutputArgs,

    /// Files to merge, in order
    pub files: Vec<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct DiffCommand {
    pub left: PathBuf,
    pub right: PathBuf,
}

#[derive(Parser, Debug)]
pub struct JsonCommand {
    /// Files to convert; each document becomes one line of output
    pub files: Vec<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}
