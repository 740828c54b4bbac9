use std::{env, net::SocketAddr, path::Path};

use anyhow::{anyhow, Context, Result};
use blob_store::BlobStorageConfig;
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "FILESTORE_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    // Export spans over OTLP.
    #[serde(default)]
    pub enable_tracing: bool,
    // Export metrics over OTLP.
    #[serde(default)]
    pub enable_metrics: bool,
    // OTLP collector endpoint, the exporter default when unset.
    #[serde(default)]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub state_store_path: String,
    pub blob_storage: BlobStorageConfig,
    /// Largest page a list request may return.
    pub list_take_limit: usize,
    pub structured_logging: bool,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let state_store_path = env::current_dir()
            .unwrap_or_else(|_| ".".into())
            .join("filestore_storage/state");
        ServerConfig {
            listen_addr: "0.0.0.0:8900".to_string(),
            state_store_path: state_store_path.display().to_string(),
            blob_storage: Default::default(),
            list_take_limit: 100,
            structured_logging: false,
            telemetry: Default::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults, overridden by the YAML file at `path` if given, overridden by
    /// `FILESTORE_` environment variables. Nested keys use `__`, e.g.
    /// `FILESTORE_BLOB_STORAGE__PATH`.
    pub fn load(path: Option<&Path>) -> Result<ServerConfig> {
        let mut figment = Figment::from(Serialized::defaults(ServerConfig::default()));
        if let Some(path) = path {
            let config_str = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            figment = figment.merge(Yaml::string(&config_str));
        }
        let config: ServerConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(anyhow!("invalid listen address: {}", self.listen_addr));
        }
        if self.list_take_limit == 0 {
            return Err(anyhow!("list_take_limit must be greater than 0"));
        }
        if self.blob_storage.container.is_empty() {
            return Err(anyhow!("blob storage container must not be empty"));
        }
        if self.state_store_path.is_empty() {
            return Err(anyhow!("state_store_path must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.list_take_limit, 100);
        assert_eq!(config.blob_storage.container, "files");
        assert!(config.blob_storage.path.starts_with("file://"));
    }

    #[test]
    fn test_yaml_overrides_defaults() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(
            file,
            r#"
listen_addr: "127.0.0.1:9000"
list_take_limit: 25
blob_storage:
  path: "memory:///"
telemetry:
  enable_tracing: true
"#
        )?;
        let config = ServerConfig::load(Some(file.path()))?;
        assert_eq!(config.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.list_take_limit, 25);
        assert_eq!(config.blob_storage.path, "memory:///");
        assert_eq!(config.blob_storage.container, "files");
        assert!(config.telemetry.enable_tracing);
        assert!(!config.structured_logging);
        Ok(())
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = ServerConfig {
            listen_addr: "not an address".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            list_take_limit: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.blob_storage.container = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let res = ServerConfig::load(Some(Path::new("/nonexistent/filestore.yaml")));
        assert!(res.is_err());
    }
}
