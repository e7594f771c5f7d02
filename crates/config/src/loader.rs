//! Configuration loading from multiple sources

use crate::{AppConfig, ConfigError, Result};
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use std::path::Path;

/// Default prefix for environment overrides
pub const ENV_PREFIX: &str = "MEROPOOLS";

/// Configuration loader with support for multiple formats and sources
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file
    ///
    /// Supports TOML, YAML, and JSON formats based on file extension
    pub fn from_file(path: &Path) -> Result<AppConfig> {
        let content = std::fs::read_to_string(path)?;

        match format_of(path)? {
            FileFormat::Yaml => Self::from_yaml(&content),
            FileFormat::Json => Self::from_json(&content),
            _ => Self::from_toml(&content),
        }
    }

    pub fn from_toml(content: &str) -> Result<AppConfig> {
        toml::from_str(content).map_err(ConfigError::from)
    }

    pub fn from_yaml(content: &str) -> Result<AppConfig> {
        serde_yaml::from_str(content).map_err(ConfigError::from)
    }

    pub fn from_json(content: &str) -> Result<AppConfig> {
        serde_json::from_str(content).map_err(ConfigError::from)
    }

    /// Load configuration from a file with environment overrides.
    ///
    /// Variables take the form `PREFIX_SECTION__KEY`, for example
    /// `MEROPOOLS_NETWORK__LOG_LEVEL=debug`. Each variable replaces a single
    /// key; the rest of the file is kept.
    pub fn from_file_with_env(path: &Path, env_prefix: &str) -> Result<AppConfig> {
        Self::builder()
            .add_file(path, true)?
            .add_env(env_prefix)
            .build()
    }

    /// Build configuration using the config crate's builder pattern
    pub fn builder() -> ConfigLoaderBuilder {
        ConfigLoaderBuilder {
            builder: Config::builder(),
        }
    }
}

fn format_of(path: &Path) -> Result<FileFormat> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::LoadError("no file extension found".to_string()))?;

    match extension {
        "toml" => Ok(FileFormat::Toml),
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "json" => Ok(FileFormat::Json),
        other => Err(ConfigError::LoadError(format!(
            "unsupported file extension: {other}"
        ))),
    }
}

/// Builder for layered configuration; later sources win
pub struct ConfigLoaderBuilder {
    builder: ConfigBuilder<config::builder::DefaultState>,
}

impl ConfigLoaderBuilder {
    pub fn add_file(mut self, path: &Path, required: bool) -> Result<Self> {
        let format = format_of(path)?;
        self.builder = self
            .builder
            .add_source(File::from(path).format(format).required(required));
        Ok(self)
    }

    pub fn add_env(mut self, prefix: &str) -> Self {
        self.builder = self.builder.add_source(
            Environment::with_prefix(prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );
        self
    }

    pub fn set_default(mut self, key: &str, value: &str) -> Result<Self> {
        self.builder = self.builder.set_default(key, value)?;
        Ok(self)
    }

    pub fn set_override(mut self, key: &str, value: &str) -> Result<Self> {
        self.builder = self.builder.set_override(key, value)?;
        Ok(self)
    }

    pub fn build(self) -> Result<AppConfig> {
        let config = self.builder.build()?;
        config.try_deserialize().map_err(ConfigError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Environment;
    use std::io::Write;

    const TOML: &str = r#"
[network]
environment = "testnet"
log_level = "debug"

[context_node]
node_url = "http://localhost:2428"
context_id = "ctx-pool"
operator_identity = "operator-key"
application_id = "meropools"

[settlement_chain]
rpc_url = "https://testnet.vechain.org"
escrow_contract = "0xc45adc41c6be7d172b7841b072b90c0abb6f663f"
signer_url = "http://localhost:8700/sign"

[settlement_chain.tokens]
TEST = "0x0000000000000000000000000000000000001234"
"#;

    #[test]
    fn test_load_from_toml() {
        let config = ConfigLoader::from_toml(TOML).unwrap();

        assert_eq!(config.network.environment, Environment::Testnet);
        assert_eq!(config.network.log_level, "debug");
        assert_eq!(config.network.log_format, "pretty");
        assert_eq!(config.context_node.timeout_ms, 30000);
        assert_eq!(config.pool.min_orders_for_matching, 2);
        assert_eq!(config.pool.batch_frequency_seconds, None);
        assert_eq!(config.settlement_chain.tokens.len(), 1);
    }

    #[test]
    fn test_load_from_yaml() {
        let yaml = r#"
network:
  environment: local
  log_format: json
context_node:
  node_url: "http://localhost:2428"
  context_id: ctx-pool
  operator_identity: operator-key
  application_id: meropools
settlement_chain:
  rpc_url: "http://localhost:8669"
  escrow_contract: "0xc45adc41c6be7d172b7841b072b90c0abb6f663f"
  signer_url: "http://localhost:8700/sign"
pool:
  batch_frequency_seconds: 5
"#;

        let config = ConfigLoader::from_yaml(yaml).unwrap();
        assert_eq!(config.network.log_format, "json");
        assert_eq!(config.pool.batch_frequency_seconds, Some(5));
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"
{
  "context_node": {
    "node_url": "http://localhost:2428",
    "context_id": "ctx-pool",
    "operator_identity": "operator-key",
    "application_id": "meropools",
    "max_retries": 5
  },
  "settlement_chain": {
    "rpc_url": "http://localhost:8669",
    "escrow_contract": "0xc45adc41c6be7d172b7841b072b90c0abb6f663f",
    "signer_url": "http://localhost:8700/sign"
  }
}
"#;

        let config = ConfigLoader::from_json(json).unwrap();
        assert_eq!(config.context_node.max_retries, 5);
        assert_eq!(config.network.environment, Environment::Local);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(TOML.as_bytes()).unwrap();

        let config = ConfigLoader::from_file(file.path()).unwrap();
        assert_eq!(config.context_node.context_id, "ctx-pool");
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        let err = ConfigLoader::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::LoadError(_)));
    }

    #[test]
    fn test_override_replaces_single_key() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(TOML.as_bytes()).unwrap();

        let config = ConfigLoader::builder()
            .add_file(file.path(), true)
            .unwrap()
            .set_override("network.log_level", "warn")
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(config.network.log_level, "warn");
        assert_eq!(config.network.environment, Environment::Testnet);
        assert_eq!(config.context_node.node_url, "http://localhost:2428");
    }
}
