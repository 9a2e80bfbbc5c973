use super::{check_arity, concat_args, Operator, Response};
use crate::error::Error;
use crate::evaluator::Evaluator;
use crate::expr::Expr;
use crate::value::Value;
use std::path::PathBuf;

/// `(( file "certs/" meta.name ".pem" ))`: contents of a file as a string
///
/// Relative paths are resolved against [crate::config::Config::file_base_path].
pub struct File;

impl Operator for File {
    fn run(&self, ev: &mut Evaluator, args: &[Expr]) -> Result<Response, Error> {
        check_arity("file", args, 1, None)?;
        let path = path_arg(ev, "file", args)?;
        let contents = read(&path, "file")?;
        Ok(Response::Replace(Value::String(contents)))
    }
}

/// `(( load "defaults.yml" ))`: a YAML or JSON file as a subtree
pub struct Load;

impl Operator for Load {
    fn run(&self, ev: &mut Evaluator, args: &[Expr]) -> Result<Response, Error> {
        check_arity("load", args, 1, None)?;
        let path = path_arg(ev, "load", args)?;
        let contents = read(&path, "load")?;

        let is_json = path.extension().is_some_and(|ext| ext == "json");
        let parsed = if is_json {
            Value::from_json_str(&contents).map_err(|err| err.to_string())
        } else {
            Value::from_yaml_str(&contents).map_err(|err| err.to_string())
        };

        let value = parsed.map_err(|err| {
            Error::msg(format!("load: unable to parse `{}`: {err}", path.display()))
        })?;
        Ok(Response::Replace(value))
    }
}

fn path_arg(ev: &Evaluator, name: &str, args: &[Expr]) -> Result<PathBuf, Error> {
    let path = PathBuf::from(concat_args(ev, name, args)?);
    if path.is_absolute() {
        return Ok(path);
    }
    Ok(ev.config().file_base_path.join(path))
}

fn read(path: &std::path::Path, name: &str) -> Result<String, Error> {
    tracing::debug!(path = %path.display(), "{name}: reading file");
    std::fs::read_to_string(path)
        .map_err(|err| Error::msg(format!("{name}: unable to read `{}`: {err}", path.display())))
}

#[cfg(test)]
mod test {
    use crate::config::Config;
    use crate::operator::test::{evaluator_with, replace};
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    fn workspace(files: &[(&str, &str)]) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("graft-file-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        for (name, contents) in files {
            std::fs::write(dir.join(name), contents).unwrap();
        }
        dir
    }

    #[test]
    fn file_and_load_use_base_path() {
        let dir = workspace(&[
            ("motd.txt", "hello\n"),
            ("defaults.yml", "size: small\nports: [80]\n"),
            ("defaults.json", r#"{"size": "large"}"#),
        ]);
        let config = Config {
            file_base_path: dir.clone(),
            ..Config::default()
        };
        let mut ev = evaluator_with("name: motd\n", "out", config);

        assert_eq!(replace(&mut ev, "file", r#"name ".txt""#), Ok(Value::from("hello\n")));
        assert_eq!(
            replace(&mut ev, "load", r#""defaults.yml""#),
            Ok(Value::from_yaml_str("size: small\nports: [80]\n").unwrap())
        );
        assert_eq!(
            replace(&mut ev, "load", r#""defaults.json""#),
            Ok(Value::from_yaml_str("size: large\n").unwrap())
        );

        let err = replace(&mut ev, "file", r#""missing.txt""#).unwrap_err().to_string();
        assert!(err.starts_with("file: unable to read"), "{err}");
    }
}
