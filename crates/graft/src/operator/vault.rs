//! `(( vault "secret/path:key" ))`
use super::{check_arity, concat_args, Operator, Response};
use crate::config::REDACTED;
use crate::error::Error;
use crate::evaluator::Evaluator;
use crate::expr::Expr;
use crate::value::{Map, Value};
use anyhow::Context;
use std::time::Duration;

/// Read access to a Vault key/value store
pub trait VaultBackend {
    /// All keys of the secret stored at `path`
    fn read(&self, path: &str) -> anyhow::Result<Map>;
}

pub struct Vault;

impl Operator for Vault {
    fn run(&self, ev: &mut Evaluator, args: &[Expr]) -> Result<Response, Error> {
        check_arity("vault", args, 1, None)?;

        let request = concat_args(ev, "vault", args)?;
        let (path, key) = request.split_once(':').ok_or_else(|| {
            Error::msg(format!("vault: invalid secret `{request}`, expected `path:key`"))
        })?;

        if ev.config().skip_vault {
            tracing::debug!(here = %ev.here, path, "vault: skipped, redacting");
            return Ok(Response::Replace(Value::from(REDACTED)));
        }

        if !ev.state.vault_cache.contains_key(path) {
            let backend = ev.vault().ok_or_else(|| {
                Error::msg("vault: no vault backend is configured; set GRAFT_SKIP_VAULT to redact lookups")
            })?;

            tracing::debug!(path, "vault: reading secret");
            let secret = backend
                .read(path)
                .map_err(|err| Error::msg(format!("vault: {path}: {err:#}")))?;
            ev.state.vault_cache.insert(path.to_string(), secret);
        }

        ev.state
            .vault_cache
            .get(path)
            .and_then(|secret| secret.get(key))
            .cloned()
            .map(Response::Replace)
            .ok_or_else(|| Error::msg(format!("vault: secret {path}:{key} not found")))
    }
}

/// [VaultBackend] over the Vault HTTP API
///
/// Paths are used verbatim, so KV version 2 mounts need the `data/` segment
/// (`secret/data/app:password`). For those the nested `data` map is unwrapped.
pub struct VaultHttp {
    http: reqwest::blocking::Client,
    address: String,
    token: String,
}

impl VaultHttp {
    /// Uses `VAULT_ADDR` and `VAULT_TOKEN`
    pub fn from_env() -> anyhow::Result<Self> {
        let address = std::env::var("VAULT_ADDR").context("VAULT_ADDR environment variable not set")?;
        let token = std::env::var("VAULT_TOKEN").context("VAULT_TOKEN environment variable not set")?;
        Self::new(address, token)
    }

    pub fn new(address: String, token: String) -> anyhow::Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { http, address, token })
    }
}

impl VaultBackend for VaultHttp {
    fn read(&self, path: &str) -> anyhow::Result<Map> {
        let url = format!(
            "{}/v1/{}",
            self.address.trim_end_matches('/'),
            path.trim_start_matches('/')
        );

        let response = self
            .http
            .get(&url)
            .header("X-Vault-Token", &self.token)
            .send()
            .with_context(|| format!("Failed to fetch {url}"))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            anyhow::bail!("secret not found");
        }
        if !status.is_success() {
            anyhow::bail!("vault responded with {status}");
        }

        let body: serde_json::Value = response.json().context("Failed to parse vault response")?;
        let data = match body.get("data") {
            Some(serde_json::Value::Object(data)) => match (data.get("data"), data.get("metadata")) {
                (Some(inner @ serde_json::Value::Object(_)), Some(_)) => inner.clone(),
                _ => serde_json::Value::Object(data.clone()),
            },
            _ => anyhow::bail!("vault response carries no data"),
        };

        match Value::from(data) {
            Value::Object(map) => Ok(map),
            other => anyhow::bail!("vault secret is a {}, expected a map", other.kind()),
        }
    }
}
