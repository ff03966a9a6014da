#[cfg(test)]
mod tests;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

pub const DEFAULT_NAMESPACE: &str = "handbook";
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8787";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid protocol '{0}': must be http or https")]
    InvalidProtocol(String),

    #[error("Invalid host: {0}")]
    InvalidHost(String),

    #[error("Invalid port: {0}")]
    InvalidPort(u16),

    #[error("Invalid model name: {0}")]
    InvalidModel(String),

    #[error("Invalid namespace '{0}': must be non-empty")]
    InvalidNamespace(String),

    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Connection settings for the remote vector index. Both the URL and token
/// must be present for the index to be considered configured; everything
/// built on top degrades gracefully when it is not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub rest_url: Option<Url>,
    pub rest_token: Option<String>,
    pub namespace: String,
}

impl Default for VectorConfig {
    #[inline]
    fn default() -> Self {
        Self {
            rest_url: None,
            rest_token: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl VectorConfig {
    #[inline]
    pub fn is_configured(&self) -> bool {
        self.rest_url.is_some() && self.rest_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Settings for the local generation backend (Ollama-compatible HTTP API).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
}

impl Default for GenerationConfig {
    #[inline]
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "llama3.1:8b".to_string(),
        }
    }
}

impl GenerationConfig {
    #[inline]
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidHost(self.host.clone()))
    }
}

/// HTTP server settings, including the two API credentials: `admin_token`
/// guards the sync/reindex endpoints, `cron_secret` additionally allows
/// scheduled reindex calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub admin_token: Option<String>,
    pub cron_secret: Option<String>,
}

impl Default for ServerConfig {
    #[inline]
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND_ADDRESS.to_string(),
            admin_token: None,
            cron_secret: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Config {
    /// Loads configuration from `config.toml` under the given directory.
    /// A missing file yields the defaults so first runs work out of the box.
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref();
        let config_path = config_dir.join("config.toml");

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?
        } else {
            debug!("no config file at {}, using defaults", config_path.display());
            Config::default()
        };

        config.base_dir = config_dir.to_path_buf();
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Loads configuration and then applies environment overrides for
    /// endpoint and secrets, so tokens never have to live in the file.
    #[inline]
    pub fn load_with_env<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let mut config = Self::load(config_dir)?;
        config.apply_env_overrides();
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("HANDBOOK_VECTOR_REST_URL")
            && let Ok(url) = Url::parse(&value)
        {
            self.vector.rest_url = Some(url);
        }
        if let Ok(value) = std::env::var("HANDBOOK_VECTOR_REST_TOKEN") {
            self.vector.rest_token = Some(value);
        }
        if let Ok(value) = std::env::var("HANDBOOK_VECTOR_NAMESPACE")
            && !value.is_empty()
        {
            self.vector.namespace = value;
        }
        if let Ok(value) = std::env::var("HANDBOOK_ADMIN_TOKEN") {
            self.server.admin_token = Some(value);
        }
        if let Ok(value) = std::env::var("HANDBOOK_CRON_SECRET") {
            self.server.cron_secret = Some(value);
        }
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!("Failed to create config directory: {}", self.base_dir.display())
        })?;
        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;
        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.generation.protocol.as_str() {
            "http" | "https" => {}
            other => return Err(ConfigError::InvalidProtocol(other.to_string())),
        }
        if self.generation.host.trim().is_empty() {
            return Err(ConfigError::InvalidHost(self.generation.host.clone()));
        }
        if self.generation.port == 0 {
            return Err(ConfigError::InvalidPort(self.generation.port));
        }
        if self.generation.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.generation.model.clone()));
        }
        if self.vector.namespace.trim().is_empty() {
            return Err(ConfigError::InvalidNamespace(self.vector.namespace.clone()));
        }
        if self.server.bind.trim().is_empty() {
            return Err(ConfigError::InvalidBindAddress(self.server.bind.clone()));
        }
        Ok(())
    }

    #[inline]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.base_dir.join("config.toml")
    }

    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.base_dir.join("handbook.db")
    }
}

/// Platform config directory for the application.
#[inline]
pub fn get_config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("handbook-rag"))
        .context("Unable to determine config directory for this platform")
}
