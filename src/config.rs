use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub context: ContextConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// The global database, targeted when no reference is given.
    pub default_db_path: PathBuf,
    /// Directory-like references map to derived files under this directory.
    pub data_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: default_dims(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    /// How many nearest neighbors to fetch per requested result, to leave
    /// room for post-filtering. Raising it trades latency for recall when
    /// filters are selective.
    #[serde(default = "default_overfetch")]
    pub overfetch_multiplier: i64,
    #[serde(default = "default_limit")]
    pub default_limit: i64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            overfetch_multiplier: default_overfetch(),
            default_limit: default_limit(),
        }
    }
}

fn default_overfetch() -> i64 {
    3
}
fn default_limit() -> i64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContextConfig {
    #[serde(default = "default_token_budget")]
    pub default_token_budget: i64,
    #[serde(default = "default_limit_per_query")]
    pub default_limit_per_query: i64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            default_token_budget: default_token_budget(),
            default_limit_per_query: default_limit_per_query(),
        }
    }
}

fn default_token_budget() -> i64 {
    4000
}
fn default_limit_per_query() -> i64 {
    5
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Validation(format!("failed to read config {}: {e}", path.display())))?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| Error::Validation(format!("failed to parse config: {e}")))?;

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.embedding.dims == 0 {
        return Err(Error::Validation("embedding.dims must be > 0".to_string()));
    }
    if config.search.overfetch_multiplier < 1 {
        return Err(Error::Validation(
            "search.overfetch_multiplier must be >= 1".to_string(),
        ));
    }
    if config.search.default_limit < 1 {
        return Err(Error::Validation(
            "search.default_limit must be >= 1".to_string(),
        ));
    }
    if config.context.default_token_budget < 0 {
        return Err(Error::Validation(
            "context.default_token_budget must be >= 0".to_string(),
        ));
    }
    if config.context.default_limit_per_query < 1 {
        return Err(Error::Validation(
            "context.default_limit_per_query must be >= 1".to_string(),
        ));
    }
    match config.embedding.provider.as_str() {
        "openai" => {}
        other => {
            return Err(Error::Validation(format!(
                "unknown embedding provider: '{other}'"
            )))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config =
            toml::from_str(toml_str).map_err(|e| Error::Validation(e.to_string()))?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let config = parse(
            r#"
            [storage]
            default_db_path = "/tmp/memo/global.db"
            data_dir = "/tmp/memo"
            "#,
        )
        .unwrap();
        assert_eq!(config.search.overfetch_multiplier, 3);
        assert_eq!(config.embedding.dims, 1536);
        assert_eq!(config.embedding.provider, "openai");
        assert_eq!(config.context.default_token_budget, 4000);
    }

    #[test]
    fn zero_dims_rejected() {
        let result = parse(
            r#"
            [storage]
            default_db_path = "/tmp/memo/global.db"
            data_dir = "/tmp/memo"
            [embedding]
            dims = 0
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn unknown_provider_rejected() {
        let result = parse(
            r#"
            [storage]
            default_db_path = "/tmp/memo/global.db"
            data_dir = "/tmp/memo"
            [embedding]
            provider = "quantum"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn overfetch_below_one_rejected() {
        let result = parse(
            r#"
            [storage]
            default_db_path = "/tmp/memo/global.db"
            data_dir = "/tmp/memo"
            [search]
            overfetch_multiplier = 0
            "#,
        );
        assert!(result.is_err());
    }
}
