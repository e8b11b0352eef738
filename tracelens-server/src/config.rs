// Copyright 2025 TraceLens Contributors
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

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tracelens_evals::JudgeConfig;

/// TraceLens server configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: HttpServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub judge: JudgeConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpServerConfig {
    /// HTTP API listen address (e.g., "127.0.0.1:48600")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Enable CORS
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Maximum traces retained by the anonymous in-memory buffer
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Pass threshold for evaluation status derivation (0-10 scale)
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Enable API-key authentication (default: false for development)
    #[serde(default)]
    pub enabled: bool,

    /// Static API keys (format: "key:user_id")
    #[serde(default)]
    pub api_keys: Vec<String>,
}

// Default values
fn default_listen_addr() -> String {
    "127.0.0.1:48600".to_string()
}

fn default_enable_cors() -> bool {
    true
}

fn default_capacity() -> usize {
    tracelens_store::DEFAULT_CAPACITY
}

fn default_pass_threshold() -> f64 {
    tracelens_core::DEFAULT_PASS_THRESHOLD
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            enable_cors: default_enable_cors(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            pass_threshold: default_pass_threshold(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.merge_env();
        config
    }

    /// Overlay environment variables on whatever is already set.
    ///
    /// Supported environment variables:
    /// - TRACELENS_LISTEN_ADDR: HTTP listen address (default: 127.0.0.1:48600)
    /// - TRACELENS_ENABLE_CORS: Enable CORS (default: true)
    /// - TRACELENS_STORE_CAPACITY: Anonymous buffer capacity (default: 1000)
    /// - TRACELENS_PASS_THRESHOLD: Evaluation pass threshold (default: 7.0)
    /// - TRACELENS_AUTH_ENABLED: Enable authentication (default: false)
    /// - TRACELENS_API_KEYS: Comma-separated keys (format: key:user_id)
    /// - TRACELENS_JUDGE_MODEL: Judge model name
    /// - TRACELENS_JUDGE_BASE_URL: Judge API base URL
    /// - OPENAI_API_KEY: Judge API key
    pub fn merge_env(&mut self) {
        if let Ok(addr) = std::env::var("TRACELENS_LISTEN_ADDR") {
            self.server.listen_addr = addr;
        }
        if let Ok(cors) = std::env::var("TRACELENS_ENABLE_CORS") {
            self.server.enable_cors = cors.parse().unwrap_or(true);
        }

        if let Ok(capacity) = std::env::var("TRACELENS_STORE_CAPACITY") {
            if let Ok(val) = capacity.parse() {
                self.store.capacity = val;
            }
        }
        if let Ok(threshold) = std::env::var("TRACELENS_PASS_THRESHOLD") {
            if let Ok(val) = threshold.parse() {
                self.store.pass_threshold = val;
            }
        }

        if let Ok(enabled) = std::env::var("TRACELENS_AUTH_ENABLED") {
            self.auth.enabled = enabled.parse().unwrap_or(false);
        }
        if let Ok(keys) = std::env::var("TRACELENS_API_KEYS") {
            self.auth.api_keys = keys.split(',').map(String::from).collect();
        }

        if let Ok(model) = std::env::var("TRACELENS_JUDGE_MODEL") {
            self.judge.model = model;
        }
        if let Ok(url) = std::env::var("TRACELENS_JUDGE_BASE_URL") {
            self.judge.base_url = Some(url);
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.judge.api_key = Some(key);
        }
    }

    /// Layered load: defaults, then the file when given, then environment
    /// variables over both.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.merge_env();
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.listen_addr.parse::<SocketAddr>().is_err() {
            bail!("invalid listen address: {}", self.server.listen_addr);
        }
        if self.store.capacity == 0 {
            bail!("store capacity must be at least 1");
        }
        if !(0.0..=10.0).contains(&self.store.pass_threshold) || self.store.pass_threshold == 0.0 {
            bail!(
                "pass threshold must be in (0, 10], got {}",
                self.store.pass_threshold
            );
        }
        if self.auth.enabled {
            for entry in &self.auth.api_keys {
                if !entry.contains(':') {
                    bail!("api key entry '{entry}' is not in key:user_id form");
                }
            }
            if self.auth.api_keys.is_empty() {
                bail!("auth enabled but no api keys configured");
            }
        }
        Ok(())
    }
}
