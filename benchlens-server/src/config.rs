// Copyright 2025 AgentReplay (https://github.com/agentreplay)
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

use anyhow::Result;
use benchlens_core::MetricCatalog;
use benchlens_query::{
    AggregatorConfig, Ga4Config, DEFAULT_CONCURRENT_FETCHES, MAX_CONCURRENT_FETCHES,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Benchlens Server Configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: HttpServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub catalog: MetricCatalog,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpServerConfig {
    /// HTTP API listen address (e.g., "127.0.0.1:47200")
    #[serde(default = "default_http_addr")]
    pub listen_addr: String,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Enable CORS
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory holding reports.json
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// OAuth access token with the analytics.readonly scope
    pub access_token: Option<String>,

    #[serde(default = "default_data_api_base")]
    pub data_api_base: String,

    #[serde(default = "default_admin_api_base")]
    pub admin_api_base: String,

    /// Per HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AggregationConfig {
    /// Parallel provider calls per aggregation (1..=16)
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Timeout for one source fetch in seconds
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

// Default values
fn default_http_addr() -> String {
    "127.0.0.1:47200".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_enable_cors() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./benchlens-data")
}

fn default_data_api_base() -> String {
    benchlens_query::ga4::DEFAULT_DATA_API_BASE.to_string()
}

fn default_admin_api_base() -> String {
    benchlens_query::ga4::DEFAULT_ADMIN_API_BASE.to_string()
}

fn default_max_concurrent_fetches() -> usize {
    DEFAULT_CONCURRENT_FETCHES
}

fn default_fetch_timeout() -> u64 {
    30
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_http_addr(),
            request_timeout_secs: default_request_timeout(),
            enable_cors: default_enable_cors(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            data_api_base: default_data_api_base(),
            admin_api_base: default_admin_api_base(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: default_max_concurrent_fetches(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from environment variables
    ///
    /// Supported environment variables:
    /// - BENCHLENS_HTTP_ADDR: HTTP listen address (default: 127.0.0.1:47200)
    /// - BENCHLENS_DATA_DIR: Data directory path (default: ./benchlens-data)
    /// - BENCHLENS_ACCESS_TOKEN: Provider access token
    /// - BENCHLENS_MAX_CONCURRENT_FETCHES: Parallel source fetches (default: 8)
    /// - BENCHLENS_FETCH_TIMEOUT: Per-source fetch timeout in seconds (default: 30)
    /// - BENCHLENS_REQUEST_TIMEOUT: HTTP request timeout in seconds (default: 30)
    /// - BENCHLENS_ENABLE_CORS: Enable CORS (default: true)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BENCHLENS_HTTP_ADDR") {
            config.server.listen_addr = addr;
        }

        if let Ok(timeout) = std::env::var("BENCHLENS_REQUEST_TIMEOUT") {
            if let Ok(val) = timeout.parse() {
                config.server.request_timeout_secs = val;
            }
        }

        if let Ok(cors) = std::env::var("BENCHLENS_ENABLE_CORS") {
            config.server.enable_cors = cors.parse().unwrap_or(true);
        }

        if let Ok(data_dir) = std::env::var("BENCHLENS_DATA_DIR") {
            config.storage.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(token) = std::env::var("BENCHLENS_ACCESS_TOKEN") {
            config.provider.access_token = Some(token);
        }

        if let Ok(fetches) = std::env::var("BENCHLENS_MAX_CONCURRENT_FETCHES") {
            if let Ok(val) = fetches.parse() {
                config.aggregation.max_concurrent_fetches = val;
            }
        }

        if let Ok(timeout) = std::env::var("BENCHLENS_FETCH_TIMEOUT") {
            if let Ok(val) = timeout.parse() {
                config.aggregation.fetch_timeout_secs = val;
            }
        }

        config
    }

    /// Load configuration with priority: file > env > defaults
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let mut config = if let Some(path) = config_file {
            if path.exists() {
                tracing::info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            } else {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Self::default()
            }
        } else {
            Self::default()
        };

        config = Self::merge_with_env(config);

        Ok(config)
    }

    /// Merge config with environment variables (env takes priority)
    fn merge_with_env(mut config: Self) -> Self {
        let env_config = Self::from_env();

        // Only override if env var was explicitly set
        if std::env::var("BENCHLENS_HTTP_ADDR").is_ok() {
            config.server.listen_addr = env_config.server.listen_addr;
        }
        if std::env::var("BENCHLENS_REQUEST_TIMEOUT").is_ok() {
            config.server.request_timeout_secs = env_config.server.request_timeout_secs;
        }
        if std::env::var("BENCHLENS_ENABLE_CORS").is_ok() {
            config.server.enable_cors = env_config.server.enable_cors;
        }
        if std::env::var("BENCHLENS_DATA_DIR").is_ok() {
            config.storage.data_dir = env_config.storage.data_dir;
        }
        if std::env::var("BENCHLENS_ACCESS_TOKEN").is_ok() {
            config.provider.access_token = env_config.provider.access_token;
        }
        if std::env::var("BENCHLENS_MAX_CONCURRENT_FETCHES").is_ok() {
            config.aggregation.max_concurrent_fetches =
                env_config.aggregation.max_concurrent_fetches;
        }
        if std::env::var("BENCHLENS_FETCH_TIMEOUT").is_ok() {
            config.aggregation.fetch_timeout_secs = env_config.aggregation.fetch_timeout_secs;
        }

        config
    }

    /// Parse listen address as SocketAddr
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(self.server.listen_addr.parse()?)
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            max_concurrent_fetches: self
                .aggregation
                .max_concurrent_fetches
                .clamp(1, MAX_CONCURRENT_FETCHES),
            fetch_timeout: Duration::from_secs(self.aggregation.fetch_timeout_secs),
        }
    }

    pub fn ga4_config(&self) -> Ga4Config {
        Ga4Config {
            access_token: self.provider.access_token.clone(),
            data_api_base: self.provider.data_api_base.clone(),
            admin_api_base: self.provider.admin_api_base.clone(),
            request_timeout: Duration::from_secs(self.provider.request_timeout_secs),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        let fetches = self.aggregation.max_concurrent_fetches;
        if fetches == 0 || fetches > MAX_CONCURRENT_FETCHES {
            anyhow::bail!(
                "max_concurrent_fetches must be between 1 and {}, got {}",
                MAX_CONCURRENT_FETCHES,
                fetches
            );
        }
        if self.aggregation.fetch_timeout_secs == 0 {
            anyhow::bail!("fetch_timeout_secs must be greater than zero");
        }
        if self.catalog.default_start_days_ago < self.catalog.default_end_days_ago {
            anyhow::bail!("catalog default range starts after it ends");
        }

        if !self.storage.data_dir.exists() {
            std::fs::create_dir_all(&self.storage.data_dir)?;
        }

        Ok(())
    }
}
