//! Configuration surface consumed by the gateway and the migrator.
//!
//! Two ways in: a JSON document (`from_json_str`) or the flat string options a
//! host application hands to a storage plugin (`from_config_map`).
//!
//! | Key                   | Description                                  | Default     |
//! |-----------------------|----------------------------------------------|-------------|
//! | `durability`          | `sync` (wait for visibility) or `async`      | `async`     |
//! | `batch.size`          | Rows per migration batch                     | `1000`      |
//! | `partition.base_name` | Prefix of daily partitions                   | `nodestore` |
//! | `alias.name`          | Alias spanning all partitions                | base name   |
//! | `compress`            | zlib-compress payloads                       | `true`      |
//! | `delete.fallback`     | `resolve`, `query` or `reject`               | `resolve`   |
//! | `validate.engine`     | Ping the engine when building the store      | `false`     |

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::NodestoreError;
use crate::ports::Refresh;

/// Upper bound on `batch_size`; bulk requests beyond this get rejected by engines.
pub const MAX_BATCH_SIZE: usize = 100_000;

/// Caller-tunable trade-off between write latency and read-your-writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Durability {
    /// Wait until the write is visible to subsequent reads.
    Sync,
    /// Return as soon as the engine accepted the write.
    #[default]
    Async,
}

impl Durability {
    pub fn refresh(self) -> Refresh {
        match self {
            Durability::Sync => Refresh::WaitFor,
            Durability::Async => Refresh::None,
        }
    }
}

impl FromStr for Durability {
    type Err = NodestoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sync" => Ok(Durability::Sync),
            "async" => Ok(Durability::Async),
            other => Err(NodestoreError::InvalidConfig(format!(
                "invalid durability '{other}' (expected sync|async)"
            ))),
        }
    }
}

/// What `delete` does when no timestamp hint is supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteFallback {
    /// Look the key up through the alias, then delete it in the partition found.
    #[default]
    Resolve,
    /// Delete-by-query over the alias (scans every partition).
    Query,
    /// Refuse; callers must always pass a timestamp hint.
    Reject,
}

impl FromStr for DeleteFallback {
    type Err = NodestoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resolve" => Ok(DeleteFallback::Resolve),
            "query" => Ok(DeleteFallback::Query),
            "reject" => Ok(DeleteFallback::Reject),
            other => Err(NodestoreError::InvalidConfig(format!(
                "invalid delete.fallback '{other}' (expected resolve|query|reject)"
            ))),
        }
    }
}

/// NodestoreConfig はゲートウェイと移行処理の設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodestoreConfig {
    pub durability: Durability,
    pub batch_size: usize,
    pub partition_base_name: String,
    pub alias_name: Option<String>,
    pub compress: bool,
    pub delete_fallback: DeleteFallback,
    pub validate_engine: bool,
}

impl Default for NodestoreConfig {
    fn default() -> Self {
        Self {
            durability: Durability::default(),
            batch_size: 1000,
            partition_base_name: "nodestore".to_string(),
            alias_name: None,
            compress: true,
            delete_fallback: DeleteFallback::default(),
            validate_engine: false,
        }
    }
}

impl NodestoreConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self, NodestoreError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| NodestoreError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate host-style string options; unknown keys are ignored.
    pub fn from_config_map(options: &HashMap<String, String>) -> Result<Self, NodestoreError> {
        let mut config = Self::default();

        if let Some(v) = options.get("durability") {
            config.durability = v.parse()?;
        }
        if let Some(v) = options.get("batch.size") {
            config.batch_size = v.parse().map_err(|e| {
                NodestoreError::InvalidConfig(format!("invalid batch.size '{v}': {e}"))
            })?;
        }
        if let Some(v) = options.get("partition.base_name") {
            config.partition_base_name = v.clone();
        }
        if let Some(v) = options.get("alias.name") {
            config.alias_name = Some(v.clone());
        }
        if let Some(v) = options.get("compress") {
            config.compress = parse_bool("compress", v)?;
        }
        if let Some(v) = options.get("delete.fallback") {
            config.delete_fallback = v.parse()?;
        }
        if let Some(v) = options.get("validate.engine") {
            config.validate_engine = parse_bool("validate.engine", v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Alias used for reads that do not know their partition.
    pub fn alias(&self) -> &str {
        self.alias_name
            .as_deref()
            .unwrap_or(&self.partition_base_name)
    }

    pub fn validate(&self) -> Result<(), NodestoreError> {
        validate_index_name("partition.base_name", &self.partition_base_name)?;
        if let Some(alias) = &self.alias_name {
            validate_index_name("alias.name", alias)?;
        }
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(NodestoreError::InvalidConfig(format!(
                "batch.size must be between 1 and {MAX_BATCH_SIZE}, got {}",
                self.batch_size
            )));
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, NodestoreError> {
    match value {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(NodestoreError::InvalidConfig(format!(
            "invalid {key} '{other}' (expected true|false)"
        ))),
    }
}

/// Engine index naming rules.
fn validate_index_name(key: &str, name: &str) -> Result<(), NodestoreError> {
    const FORBIDDEN: &[char] = &['*', ',', '/', '\\', '?', '"', '<', '>', '|', ' ', '#', ':'];

    if name.is_empty() {
        return Err(NodestoreError::InvalidConfig(format!("{key} cannot be empty")));
    }
    if name.starts_with(['-', '_', '+']) || name == "." || name == ".." {
        return Err(NodestoreError::InvalidConfig(format!(
            "{key} '{name}' has an invalid leading character"
        )));
    }
    if name.chars().any(|c| c.is_uppercase() || FORBIDDEN.contains(&c)) {
        return Err(NodestoreError::InvalidConfig(format!(
            "{key} '{name}' must be lowercase and must not contain {FORBIDDEN:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_are_valid() {
        let config = NodestoreConfig::default();
        config.validate().unwrap();
        assert_eq!(config.durability, Durability::Async);
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.alias(), "nodestore");
        assert!(config.compress);
        assert_eq!(config.delete_fallback, DeleteFallback::Resolve);
    }

    #[test]
    fn parse_json_with_partial_fields() {
        let config = NodestoreConfig::from_json_str(
            r#"{"durability":"sync","batch_size":500,"partition_base_name":"sentry"}"#,
        )
        .unwrap();
        assert_eq!(config.durability, Durability::Sync);
        assert_eq!(config.batch_size, 500);
        assert_eq!(config.alias(), "sentry");
    }

    #[test]
    fn json_rejects_unknown_fields() {
        let result = NodestoreConfig::from_json_str(r#"{"batchSize":10}"#);
        assert!(matches!(result, Err(NodestoreError::InvalidConfig(_))));
    }

    #[test]
    fn parse_config_map_all_options() {
        let mut m = HashMap::new();
        m.insert("durability".to_string(), "sync".to_string());
        m.insert("batch.size".to_string(), "2000".to_string());
        m.insert("partition.base_name".to_string(), "events".to_string());
        m.insert("alias.name".to_string(), "events-all".to_string());
        m.insert("compress".to_string(), "false".to_string());
        m.insert("delete.fallback".to_string(), "query".to_string());
        m.insert("validate.engine".to_string(), "true".to_string());

        let config = NodestoreConfig::from_config_map(&m).unwrap();
        assert_eq!(config.durability, Durability::Sync);
        assert_eq!(config.batch_size, 2000);
        assert_eq!(config.partition_base_name, "events");
        assert_eq!(config.alias(), "events-all");
        assert!(!config.compress);
        assert_eq!(config.delete_fallback, DeleteFallback::Query);
        assert!(config.validate_engine);
    }

    #[test]
    fn config_map_invalid_batch_size() {
        let mut m = HashMap::new();
        m.insert("batch.size".to_string(), "lots".to_string());
        assert!(NodestoreConfig::from_config_map(&m).is_err());
    }

    #[rstest]
    #[case("")]
    #[case("Nodestore")]
    #[case("node*store")]
    #[case("node store")]
    #[case("-nodestore")]
    #[case("a,b")]
    fn invalid_base_names(#[case] name: &str) {
        let config = NodestoreConfig {
            partition_base_name: name.to_string(),
            ..NodestoreConfig::default()
        };
        assert!(matches!(config.validate(), Err(NodestoreError::InvalidConfig(_))));
    }

    #[rstest]
    #[case(0)]
    #[case(MAX_BATCH_SIZE + 1)]
    fn invalid_batch_sizes(#[case] batch_size: usize) {
        let config = NodestoreConfig {
            batch_size,
            ..NodestoreConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn durability_maps_to_refresh() {
        assert_eq!(Durability::Sync.refresh(), Refresh::WaitFor);
        assert_eq!(Durability::Async.refresh(), Refresh::None);
        assert!("eventually".parse::<Durability>().is_err());
    }
}
