// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use turnscore_core::EvalConfig;
use turnscore_evals::{CachedEmbedder, EmbeddingClient, HashingEmbedder, OpenAIEmbeddingClient};

/// Turnscore Server Configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: HttpServerConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Evaluation defaults; requests may override any subset
    #[serde(default)]
    pub evaluation: EvalConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpServerConfig {
    /// HTTP API listen address (e.g., "127.0.0.1:47200")
    #[serde(default = "default_http_addr")]
    pub listen_addr: String,

    /// Enable CORS
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Largest accepted request body
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_http_addr(),
            enable_cors: default_enable_cors(),
            request_timeout_secs: default_request_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PersistenceConfig {
    /// Allow `save: true` requests to write reports
    #[serde(default = "default_persistence_enabled")]
    pub enabled: bool,

    /// Directory receiving saved reports
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: default_persistence_enabled(),
            output_dir: default_output_dir(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Built-in deterministic feature hashing; no network
    #[default]
    Hashing,
    /// OpenAI-compatible `/embeddings` endpoint
    Openai,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub backend: EmbeddingBackend,

    /// Vector size; hashing buckets, or requested size for hosted models
    #[serde(default)]
    pub dimensions: Option<usize>,

    /// Cached embeddings; 0 disables the cache
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    pub base_url: Option<String>,

    /// API key for the hosted backend (falls back to OPENAI_API_KEY)
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::default(),
            dimensions: None,
            cache_capacity: default_cache_capacity(),
            model: default_embedding_model(),
            base_url: None,
            api_key: None,
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl EmbeddingConfig {
    /// Instantiate the configured embedding capability
    pub fn build(&self) -> Result<Arc<dyn EmbeddingClient>> {
        let client: Arc<dyn EmbeddingClient> = match self.backend {
            EmbeddingBackend::Hashing => Arc::new(match self.dimensions {
                Some(dims) => HashingEmbedder::new(dims),
                None => HashingEmbedder::default(),
            }),
            EmbeddingBackend::Openai => {
                let api_key = self
                    .api_key
                    .clone()
                    .context("embedding.backend = \"openai\" requires an api_key")?;
                let mut client = OpenAIEmbeddingClient::new(api_key, self.model.clone())
                    .with_timeout(Duration::from_secs(self.timeout_secs));
                if let Some(base_url) = &self.base_url {
                    client = client.with_base_url(base_url.clone());
                }
                if let Some(dims) = self.dimensions {
                    client = client.with_dimensions(dims);
                }
                Arc::new(client)
            }
        };

        if self.cache_capacity == 0 {
            return Ok(client);
        }
        Ok(Arc::new(CachedEmbedder::new(client, self.cache_capacity)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

// Default values
fn default_http_addr() -> String {
    "127.0.0.1:47200".to_string()
}

fn default_enable_cors() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    120
}

fn default_max_body_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_persistence_enabled() -> bool {
    true
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./turnscore-reports")
}

fn default_cache_capacity() -> u64 {
    10_000
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_timeout() -> u64 {
    30
}

impl ServerConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Apply environment overrides
    ///
    /// Supported environment variables:
    /// - TURNSCORE_HTTP_ADDR: HTTP listen address (default: 127.0.0.1:47200)
    /// - TURNSCORE_ENABLE_CORS: Enable CORS (default: true)
    /// - TURNSCORE_REQUEST_TIMEOUT: Request timeout in seconds (default: 120)
    /// - TURNSCORE_OUTPUT_DIR: Directory for saved reports
    /// - TURNSCORE_EMBEDDING_BACKEND: `hashing` or `openai`
    /// - TURNSCORE_EMBEDDING_MODEL / TURNSCORE_EMBEDDING_BASE_URL
    /// - TURNSCORE_LOG_FORMAT: `text` or `json`
    /// - OPENAI_API_KEY: key for the hosted embedding backend
    pub fn apply_env(&mut self) {
        if let Ok(addr) = std::env::var("TURNSCORE_HTTP_ADDR") {
            self.server.listen_addr = addr;
        }

        if let Ok(cors) = std::env::var("TURNSCORE_ENABLE_CORS") {
            self.server.enable_cors = cors.parse().unwrap_or(true);
        }

        if let Ok(timeout) = std::env::var("TURNSCORE_REQUEST_TIMEOUT") {
            if let Ok(val) = timeout.parse() {
                self.server.request_timeout_secs = val;
            }
        }

        if let Ok(dir) = std::env::var("TURNSCORE_OUTPUT_DIR") {
            self.persistence.output_dir = PathBuf::from(dir);
        }

        if let Ok(backend) = std::env::var("TURNSCORE_EMBEDDING_BACKEND") {
            match backend.to_lowercase().as_str() {
                "hashing" => self.embedding.backend = EmbeddingBackend::Hashing,
                "openai" => self.embedding.backend = EmbeddingBackend::Openai,
                other => tracing::warn!("Ignoring unknown TURNSCORE_EMBEDDING_BACKEND '{}'", other),
            }
        }

        if let Ok(model) = std::env::var("TURNSCORE_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }

        if let Ok(base_url) = std::env::var("TURNSCORE_EMBEDDING_BASE_URL") {
            self.embedding.base_url = Some(base_url);
        }

        if self.embedding.api_key.is_none() {
            if let Ok(key) = std::env::var("OPENAI_API_KEY") {
                self.embedding.api_key = Some(key);
            }
        }

        if let Ok(format) = std::env::var("TURNSCORE_LOG_FORMAT") {
            self.logging.format = if format.eq_ignore_ascii_case("json") {
                LogFormat::Json
            } else {
                LogFormat::Text
            };
        }
    }

    /// Load configuration: TOML file, then environment overrides, then defaults
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let mut config = match config_file {
            Some(path) if path.exists() => {
                tracing::info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            }
            Some(path) => {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env();
        Ok(config)
    }

    /// Parse listen address as SocketAddr
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.server
            .listen_addr
            .parse()
            .with_context(|| format!("invalid listen address '{}'", self.server.listen_addr))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        self.evaluation
            .validate()
            .context("invalid [evaluation] section")?;

        if self.embedding.backend == EmbeddingBackend::Openai && self.embedding.api_key.is_none() {
            anyhow::bail!("Embedding backend 'openai' selected but no api_key or OPENAI_API_KEY configured");
        }
        if self.embedding.dimensions == Some(0) {
            anyhow::bail!("embedding.dimensions must be at least 1");
        }
        if self.server.max_body_bytes == 0 {
            anyhow::bail!("server.max_body_bytes must be at least 1");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.server.listen_addr, "127.0.0.1:47200");
        assert_eq!(config.embedding.backend, EmbeddingBackend::Hashing);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config: ServerConfig = toml::from_str(
            r#"
            [server]
            listen_addr = "0.0.0.0:9000"

            [evaluation]
            top_k = 2

            [evaluation.manual_review_thresholds]
            min_completeness = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.server.listen_addr, "0.0.0.0:9000");
        assert!(config.server.enable_cors);
        assert_eq!(config.evaluation.top_k, 2);
        assert_eq!(config.evaluation.manual_review_thresholds.min_completeness, 0.5);
        assert_eq!(config.evaluation.relevance_threshold, 0.5);
        assert_eq!(config.embedding.cache_capacity, 10_000);
    }

    #[test]
    fn test_invalid_evaluation_section_rejected() {
        let mut config = ServerConfig::default();
        config.evaluation.hallucination_thresholds.weak = 0.9;
        let err = config.validate().unwrap_err();
        assert!(format!("{:#}", err).contains("weak"));
    }

    #[test]
    fn test_openai_backend_requires_key() {
        let mut config = ServerConfig::default();
        config.embedding.backend = EmbeddingBackend::Openai;
        config.embedding.api_key = None;
        assert!(config.validate().is_err());
        assert!(config.embedding.build().is_err());

        config.embedding.api_key = Some("sk-test".to_string());
        let client = config.embedding.build().unwrap();
        assert_eq!(client.backend_name(), "openai");
    }

    #[test]
    fn test_hashing_backend_honours_dimensions() {
        let config = EmbeddingConfig {
            dimensions: Some(64),
            cache_capacity: 0,
            ..Default::default()
        };
        let client = config.build().unwrap();
        assert_eq!(client.dimensions(), Some(64));
        assert_eq!(client.embed("capital of France").unwrap().len(), 64);
    }

    #[test]
    fn test_from_env() {
        std::env::set_var("TURNSCORE_HTTP_ADDR", "0.0.0.0:8080");
        std::env::set_var("TURNSCORE_LOG_FORMAT", "json");

        let mut config = ServerConfig::default();
        config.apply_env();
        assert_eq!(config.server.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.logging.format, LogFormat::Json);

        std::env::remove_var("TURNSCORE_HTTP_ADDR");
        std::env::remove_var("TURNSCORE_LOG_FORMAT");
    }
}
