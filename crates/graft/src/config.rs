//! engine configuration
//!
//! All settings have defaults. [Config::from_env] reads the environment
//! variables the engine honours; the CLI overrides individual fields from
//! its flags afterwards.
use std::path::PathBuf;

/// Placeholder emitted by external lookups when they are skipped
pub const REDACTED: &str = "REDACTED";

#[derive(Debug, Clone)]
pub struct Config {
    /// Identity key used for merging lists of maps (`DEFAULT_ARRAY_MERGE_KEY`)
    ///
    /// When unset, `name`, `key` and `id` are tried in that order.
    pub array_merge_key: Option<String>,

    /// Append lists that cannot be merged by key instead of merging inline
    pub fallback_append: bool,

    /// Short-circuit `awsparam`/`awssecret` to [REDACTED]
    pub skip_aws: bool,

    /// Short-circuit `vault` to [REDACTED]
    pub skip_vault: bool,

    /// Directory relative paths of `file` and `load` are resolved against
    pub file_base_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            array_merge_key: None,
            fallback_append: false,
            skip_aws: false,
            skip_vault: false,
            file_base_path: PathBuf::from("."),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |name: &str| {
            lookup(name).is_some_and(|v| !v.is_empty() && v != "0" && v.to_lowercase() != "false")
        };
        let redact = flag("REDACT");

        let config = Self {
            array_merge_key: lookup("DEFAULT_ARRAY_MERGE_KEY").filter(|key| !key.is_empty()),
            fallback_append: flag("GRAFT_FALLBACK_APPEND"),
            skip_aws: redact || flag("GRAFT_SKIP_AWS"),
            skip_vault: redact || flag("GRAFT_SKIP_VAULT"),
            file_base_path: lookup("GRAFT_FILE_BASE_PATH")
                .filter(|path| !path.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
        };

        tracing::debug!(?config, "configuration loaded");
        config
    }

    /// Identity keys to try when merging lists of maps by default
    pub fn merge_keys(&self) -> Vec<&str> {
        match &self.array_merge_key {
            Some(key) => vec![key.as_str()],
            None => crate::cursor::NAME_FIELDS.to_vec(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let config = config_from(&[]);
        assert_eq!(config.merge_keys(), ["name", "key", "id"]);
        assert!(!config.skip_aws);
        assert!(!config.skip_vault);
        assert_eq!(config.file_base_path, PathBuf::from("."));
    }

    #[test]
    fn environment_overrides() {
        let config = config_from(&[
            ("DEFAULT_ARRAY_MERGE_KEY", "label"),
            ("GRAFT_SKIP_AWS", "1"),
            ("GRAFT_FILE_BASE_PATH", "/srv/templates"),
            ("GRAFT_FALLBACK_APPEND", "false"),
        ]);
        assert_eq!(config.merge_keys(), ["label"]);
        assert!(config.skip_aws);
        assert!(!config.skip_vault);
        assert!(!config.fallback_append);
        assert_eq!(config.file_base_path, PathBuf::from("/srv/templates"));
    }

    #[test]
    fn redact_skips_all_lookups() {
        let config = config_from(&[("REDACT", "yes")]);
        assert!(config.skip_aws);
        assert!(config.skip_vault);
    }
}
