mod cli;

use graft::documents::{Documents, Format};
use graft::evaluator::{Evaluator, RunOptions};
use graft::operator::VaultHttp;
use graft::value::Value;
use graft::Config;
use std::path::Path;

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("GRAFT_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Merge(merge_cli) => merge(merge_cli),
        cli::Command::Diff(diff_cli) => diff(diff_cli),
        cli::Command::Json(json_cli) => json(json_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(2);
    }
}

pub fn merge(cli: cli::MergeCommand) -> anyhow::Result<()> {
    let documents = load(&cli.files)?;

    let mut config = Config::from_env();
    config.fallback_append |= cli.fallback_append;
    if let Some(path) = cli.file_base_path {
        config.file_base_path = path;
    }

    let unavailable = unavailable_operators(&config);
    if !unavailable.is_empty() {
        tracing::warn!(
            operators = ?unavailable,
            "no AWS backend is configured; set GRAFT_SKIP_AWS or REDACT to redact these lookups"
        );
    }

    let merged = graft::merge::merge(documents.trees(), &config)?;
    let mut evaluator = Evaluator::new(merged, config.clone());

    if !config.skip_vault && std::env::var_os("VAULT_ADDR").is_some() {
        match VaultHttp::from_env() {
            Ok(vault) => evaluator = evaluator.with_vault(vault),
            Err(err) => tracing::warn!(%err, "vault is not available"),
        }
    }

    let options = RunOptions {
        prune: cli.prune,
        cherry_pick: cli.cherry_pick,
        skip_eval: cli.skip_eval,
    };
    evaluator.run(&options)?;

    for warning in &evaluator.warnings {
        eprintln!("warning: {warning}");
    }

    output(&cli.output, &evaluator.tree)?;
    Ok(())
}

/// Operators that fail because the command line provides no backend for them
fn unavailable_operators(config: &Config) -> &'static [&'static str] {
    if config.skip_aws {
        &[]
    } else {
        &["awsparam", "awssecret"]
    }
}

pub fn diff(cli: cli::DiffCommand) -> anyhow::Result<()> {
    let left = single(&cli.left)?;
    let right = single(&cli.right)?;

    for difference in graft::diff::diff(&left, &right) {
        println!("{difference}");
    }
    Ok(())
}

pub fn json(cli: cli::JsonCommand) -> anyhow::Result<()> {
    let documents = load(&cli.files)?;
    for tree in documents.trees() {
        println!("{}", serde_json::to_string(&tree)?);
    }
    Ok(())
}

fn load(files: &[std::path::PathBuf]) -> anyhow::Result<Documents> {
    let mut documents = Documents::default();

    if files.is_empty() {
        let stdin = std::io::read_to_string(std::io::stdin())?;
        documents.load_str(Format::Yaml, &stdin)?;
        return Ok(documents);
    }

    for file_path in files {
        if file_path == Path::new("-") {
            let stdin = std::io::read_to_string(std::io::stdin())?;
            documents.load_str(Format::Yaml, &stdin)?;
            continue;
        }

        documents.load_file(file_path).map_err(|err| {
            anyhow::Error::new(err).context(format!("Failed to load {}", file_path.display()))
        })?;
    }

    Ok(documents)
}

/// Merges the documents of one file without evaluating them
fn single(file_path: &Path) -> anyhow::Result<Value> {
    let documents = load(&[file_path.to_owned()])?;
    let merged = graft::merge::merge(documents.trees(), &Config::from_env())?;
    Ok(merged.tree)
}

fn output(output: &cli::OutputArgs, value: &Value) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), value)?,
        cli::OutputFormat::Json => {
            serde_json::to_writer_pretty(std::io::stdout(), value)?;
            println!();
        }
    };

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn aws_operators_need_the_skip_switch() {
        assert_eq!(unavailable_operators(&Config::default()), ["awsparam", "awssecret"]);

        let config = Config {
            skip_aws: true,
            ..Config::default()
        };
        assert!(unavailable_operators(&config).is_empty());
    }

    #[test]
    fn merge_help_explains_missing_aws_backend() {
        let command = cli::Cli::command();
        let merge = command.find_subcommand("merge").unwrap();
        let help = merge.get_long_about().map(ToString::to_string).unwrap_or_default();
        assert!(help.contains("GRAFT_SKIP_AWS"), "{help}");
    }
}
