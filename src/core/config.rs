//! Configuration management for the gateway.
//!
//! Configuration is layered with the `config` crate: built-in defaults, then an
//! optional file (YAML, TOML or JSON), then `TOOLIFY_*` environment variables
//! (`TOOLIFY_UPSTREAM__API_KEY` sets `upstream.api_key`). A handful of plain
//! variables such as `HOST` and `PORT` override everything else.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub toolify: ToolifyConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// Server-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,

    /// Shared key clients must present; unset disables client authentication
    #[serde(default)]
    pub client_api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            client_api_key: None,
        }
    }
}

/// The OpenAI-compatible chat-completions backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL; `/chat/completions` is appended
    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default)]
    pub api_key: String,

    /// Request timeout in seconds for upstream calls
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Whether to verify SSL certificates for upstream requests
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,

    /// Client model name -> upstream model name
    #[serde(default)]
    pub model_mapping: HashMap<String, String>,

    /// Used for client models missing from `model_mapping`
    #[serde(default)]
    pub default_model: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key: String::new(),
            request_timeout_secs: default_request_timeout(),
            verify_ssl: default_verify_ssl(),
            model_mapping: HashMap::new(),
            default_model: None,
        }
    }
}

impl UpstreamConfig {
    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }

    /// Upstream model for a client model name.
    pub fn map_model(&self, model: &str) -> String {
        self.model_mapping
            .get(model)
            .cloned()
            .or_else(|| self.default_model.clone())
            .unwrap_or_else(|| model.to_string())
    }
}

/// Settings of the tool/thinking text overlay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolifyConfig {
    /// Fixed trigger signal; a random one is generated per request when unset
    #[serde(default)]
    pub trigger_signal: Option<String>,

    /// Whether clients may request thinking blocks
    #[serde(default = "default_enable_thinking")]
    pub enable_thinking: bool,
}

impl Default for ToolifyConfig {
    fn default() -> Self {
        Self {
            trigger_signal: None,
            enable_thinking: default_enable_thinking(),
        }
    }
}

/// Process-wide admission rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum requests per second; 0 disables the limiter
    #[serde(default)]
    pub requests_per_second: u32,

    /// Maximum burst size (allows temporary spikes)
    #[serde(default = "default_burst")]
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 0,
            burst_size: default_burst(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    18000
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_verify_ssl() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    300
}

fn default_enable_thinking() -> bool {
    true
}

fn default_burst() -> u32 {
    10
}

impl AppConfig {
    /// Load configuration, reading `CONFIG_FILE` if it is set.
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (skip in tests to avoid interference)
        #[cfg(not(test))]
        dotenvy::dotenv().ok();

        let path = std::env::var("CONFIG_FILE").ok();
        Self::load(path.as_deref())
    }

    /// Load configuration from an optional file plus the environment.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use toolify_gateway::core::config::AppConfig;
    ///
    /// let config = AppConfig::load(Some("config.yaml")).expect("Failed to load config");
    /// ```
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !Path::new(path).exists() {
                bail!("Config file not found: {}", path);
            }
            builder = builder.add_source(config::File::with_name(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("TOOLIFY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: AppConfig = builder
            .build()
            .and_then(|settings| settings.try_deserialize())
            .with_context(|| match path {
                Some(path) => format!("Failed to parse config file: {}", path),
                None => "Failed to read configuration from environment".to_string(),
            })?;

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Plain environment variables take precedence over every other source.
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("HOST") {
            self.server.host = host;
        }

        if let Ok(port_str) = std::env::var("PORT") {
            if let Ok(port) = port_str.parse::<u16>() {
                self.server.port = port;
            }
        }

        if let Ok(verify_ssl_str) = std::env::var("VERIFY_SSL") {
            self.upstream.verify_ssl = str_to_bool(&verify_ssl_str);
        }

        if let Ok(timeout_str) = std::env::var("REQUEST_TIMEOUT_SECS") {
            if let Ok(timeout) = timeout_str.parse::<u64>() {
                self.upstream.request_timeout_secs = timeout;
            }
        }

        if let Ok(api_base) = std::env::var("UPSTREAM_API_BASE") {
            self.upstream.api_base = api_base;
        }

        if let Ok(api_key) = std::env::var("UPSTREAM_API_KEY") {
            self.upstream.api_key = api_key;
        }
    }

    fn validate(&self) -> Result<()> {
        let base = &self.upstream.api_base;
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            bail!("upstream.api_base must be an http(s) URL, got {:?}", base);
        }
        if self.upstream.request_timeout_secs == 0 {
            bail!("upstream.request_timeout_secs must be greater than 0");
        }
        if self.rate_limit.requests_per_second > 0 && self.rate_limit.burst_size == 0 {
            bail!("rate_limit.burst_size must be at least 1 when rate limiting is enabled");
        }
        Ok(())
    }
}

/// Convert string to boolean.
///
/// Accepts: "true", "1", "yes", "on" (case-insensitive)
fn str_to_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}
