//! Configuration module for console-backend
//!
//! Supports configuration via file and environment variables.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind the server to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path of the YAML document served to the frontend (empty: no file)
    #[serde(default)]
    pub frontend_config: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9001
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            frontend_config: String::new(),
        }
    }
}

/// Loki connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LokiConfig {
    /// Base URL of the Loki API; flows endpoints are disabled when unset
    #[serde(default)]
    pub url: Option<String>,
    /// Dial, idle and overall request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Accept any server certificate
    #[serde(default)]
    pub skip_tls: bool,
    /// Tenant sent as `X-Scope-OrgID`
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// File holding a bearer token sent as `Authorization`
    #[serde(default)]
    pub token_path: Option<String>,
    /// Extra header overrides applied to every request
    #[serde(default)]
    pub headers: HashMap<String, Vec<String>>,
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for LokiConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_timeout_secs(),
            skip_tls: false,
            tenant_id: None,
            token_path: None,
            headers: HashMap::new(),
        }
    }
}

impl LokiConfig {
    /// Request timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Build the header override map for the outbound client.
    ///
    /// Explicit `headers` entries are applied first, then tenant and token,
    /// so the dedicated settings win over a same-named free-form header.
    pub fn header_overrides(&self) -> anyhow::Result<HashMap<String, Vec<String>>> {
        let mut headers = self.headers.clone();

        if let Some(tenant) = &self.tenant_id {
            replace_header(&mut headers, "X-Scope-OrgID", tenant.clone());
        }

        if let Some(path) = &self.token_path {
            let token = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("Failed to read token file {}: {}", path, e))?;
            replace_header(&mut headers, "Authorization", format!("Bearer {}", token.trim()));
        }

        Ok(headers)
    }
}

/// Set `name` to `value`, dropping entries that differ only in case
fn replace_header(headers: &mut HashMap<String, Vec<String>>, name: &str, value: String) {
    headers.retain(|key, _| !key.eq_ignore_ascii_case(name));
    headers.insert(name.to_string(), vec![value]);
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Loki configuration
    #[serde(default)]
    pub loki: LokiConfig,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> anyhow::Result<Self> {
        // Try to load .env file (ignore if not found)
        let _ = dotenvy::dotenv();

        let mut config = config::Config::builder();

        // Add default config
        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        // Try to load from config file if it exists
        if std::path::Path::new("config.toml").exists() {
            config = config.add_source(config::File::with_name("config").required(false));
        }

        // Override with environment variables (CONSOLE_BACKEND_SERVER__PORT=...)
        config = config.add_source(
            config::Environment::with_prefix("CONSOLE_BACKEND")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = config.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        Ok(app_config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).or_else(|_| serde_json::from_str(&contents))?;
        Ok(config)
    }
}
