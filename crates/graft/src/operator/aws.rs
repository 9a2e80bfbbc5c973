//! `(( awsparam "path" ))` and `(( awssecret "name" ))`
//!
//! Arguments are concatenated into the lookup key, which may end in a query:
//!
//! ```text
//! (( awsparam "/app/" meta.env "/db?key=password" ))
//! (( awssecret "app/tls?stage=AWSPREVIOUS&key=cert" ))
//! ```
//!
//! - `key` parses the fetched payload as YAML/JSON and extracts a sub-key
//! - `stage` / `version` select a secret version (awssecret only)
use super::{check_arity, concat_args, Operator, Response};
use crate::config::REDACTED;
use crate::cursor::Cursor;
use crate::error::Error;
use crate::evaluator::Evaluator;
use crate::expr::Expr;
use crate::value::Value;

/// Access to AWS SSM Parameter Store and Secrets Manager
pub trait AwsBackend {
    fn get_parameter(&self, name: &str) -> anyhow::Result<String>;

    fn get_secret(&self, id: &str, stage: Option<&str>, version: Option<&str>) -> anyhow::Result<String>;
}

pub enum Aws {
    Parameter,
    Secret,
}

impl Aws {
    fn name(&self) -> &'static str {
        match self {
            Aws::Parameter => "awsparam",
            Aws::Secret => "awssecret",
        }
    }
}

#[derive(Debug, Default, PartialEq)]
struct Lookup {
    path: String,
    key: Option<String>,
    stage: Option<String>,
    version: Option<String>,
}

impl Lookup {
    fn parse(operator: &Aws, text: &str) -> Result<Self, Error> {
        let (path, query) = match text.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (text, None),
        };

        let mut lookup = Lookup {
            path: path.to_string(),
            ..Default::default()
        };

        for pair in query.into_iter().flat_map(|q| q.split('&')).filter(|p| !p.is_empty()) {
            let (name, value) = pair.split_once('=').ok_or_else(|| {
                Error::msg(format!("{}: malformed query parameter `{pair}`", operator.name()))
            })?;

            let slot = match (name, operator) {
                ("key", _) => &mut lookup.key,
                ("stage", Aws::Secret) => &mut lookup.stage,
                ("version", Aws::Secret) => &mut lookup.version,
                _ => {
                    return Err(Error::msg(format!(
                        "{}: unsupported query parameter `{name}`",
                        operator.name()
                    )))
                }
            };
            *slot = Some(value.to_string());
        }

        Ok(lookup)
    }

    fn cache_key(&self, operator: &Aws) -> String {
        format!(
            "{}:{}:{}:{}",
            operator.name(),
            self.path,
            self.stage.as_deref().unwrap_or_default(),
            self.version.as_deref().unwrap_or_default()
        )
    }
}

impl Operator for Aws {
    fn run(&self, ev: &mut Evaluator, args: &[Expr]) -> Result<Response, Error> {
        let name = self.name();
        check_arity(name, args, 1, None)?;

        let lookup = Lookup::parse(self, &concat_args(ev, name, args)?)?;

        if ev.config().skip_aws {
            tracing::debug!(here = %ev.here, path = %lookup.path, "{name}: skipped, redacting");
            return Ok(Response::Replace(Value::from(REDACTED)));
        }

        let cache_key = lookup.cache_key(self);
        let payload = match ev.state.aws_cache.get(&cache_key) {
            Some(payload) => payload.clone(),
            None => {
                let backend = ev.aws().ok_or_else(|| {
                    Error::msg(format!(
                        "{name}: no AWS backend is configured; set GRAFT_SKIP_AWS to redact lookups"
                    ))
                })?;

                tracing::debug!(path = %lookup.path, "{name}: fetching");
                let fetched = match self {
                    Aws::Parameter => backend.get_parameter(&lookup.path),
                    Aws::Secret => backend.get_secret(
                        &lookup.path,
                        lookup.stage.as_deref(),
                        lookup.version.as_deref(),
                    ),
                }
                .map_err(|err| Error::msg(format!("{name}: {}: {err:#}", lookup.path)))?;

                ev.state.aws_cache.insert(cache_key, fetched.clone());
                fetched
            }
        };

        let Some(key) = &lookup.key else {
            return Ok(Response::Replace(Value::String(payload)));
        };

        let parsed = Value::from_yaml_str(&payload).map_err(|err| {
            Error::msg(format!("{name}: {} is not a YAML/JSON document: {err}", lookup.path))
        })?;
        let value = Cursor::parse(key)?
            .resolve(&parsed)
            .map_err(|_| Error::msg(format!("{name}: `{key}` not found in {}", lookup.path)))?;

        Ok(Response::Replace(value.clone()))
    }
}
