//! Configuration management for acton-adlink
//!
//! Configuration is loaded from multiple sources with clear precedence:
//!
//! 1. Environment variables (highest priority, `ADLINK_` prefix, `__` for nesting)
//! 2. `./config.toml` (development)
//! 3. `~/.config/acton-adlink/{service}/config.toml` (user config, XDG)
//! 4. `/etc/acton-adlink/{service}/config.toml` (system config)
//! 5. Hardcoded defaults (fallback)
//!
//! Environment variable format: `ADLINK_SECTION__FIELD_NAME`
//! - Example: `ADLINK_OAUTH__META__CLIENT_ID=1234`
//! - Example: `ADLINK_STATE_STORE__REDIS_URL=redis://cache:6379/0`
//!
//! # Example Configuration
//!
//! ```toml
//! frontend_url = "https://app.example.com"
//!
//! [server]
//! bind_addr = "0.0.0.0:8000"
//!
//! [database]
//! url = "postgres://adlink@db/adlink"
//!
//! [state_store]
//! redis_url = "redis://cache:6379/0"
//! ttl_secs = 600
//!
//! [http]
//! timeout_secs = 15
//!
//! [oauth.meta]
//! client_id = "1234"
//! client_secret = "..."
//! redirect_uri = "https://api.example.com/api/v1/ad-accounts/oauth/meta/callback"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::oauth::state_store::clamp_ttl;
use crate::oauth::OAuthConfig;

/// Shortest permitted outbound HTTP timeout
pub const MIN_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
/// Longest permitted outbound HTTP timeout
pub const MAX_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Socket address to bind
    pub bind_addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
        }
    }
}

/// Database configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// `PostgreSQL` connection URL
    pub url: String,
    /// Pool size
    pub max_connections: u32,
    /// Apply migrations at startup
    pub run_migrations: bool,
}

impl std::fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("url", &redact_url(&self.url))
            .field("max_connections", &self.max_connections)
            .field("run_migrations", &self.run_migrations)
            .finish()
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/adlink".to_string(),
            max_connections: 10,
            run_migrations: true,
        }
    }
}

/// Pending-request store configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateStoreSettings {
    /// Redis connection URL
    pub redis_url: String,
    /// Pending request lifetime in seconds (at most 600)
    pub ttl_secs: u64,
}

impl std::fmt::Debug for StateStoreSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStoreSettings")
            .field("redis_url", &redact_url(&self.redis_url))
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

impl Default for StateStoreSettings {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379/0".to_string(),
            ttl_secs: 600,
        }
    }
}

impl StateStoreSettings {
    /// Pending request lifetime, clamped to the permitted range
    #[must_use]
    pub fn ttl(&self) -> Duration {
        clamp_ttl(Duration::from_secs(self.ttl_secs))
    }
}

/// Outbound HTTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Per-request timeout for provider calls in seconds
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self { timeout_secs: 15 }
    }
}

impl HttpSettings {
    /// Provider call timeout, clamped into 10..=30 seconds
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs).clamp(MIN_HTTP_TIMEOUT, MAX_HTTP_TIMEOUT)
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdlinkConfig {
    /// Frontend base URL; callbacks return to `{frontend_url}/ad-accounts/{workspace}`
    pub frontend_url: String,
    /// HTTP listener
    pub server: ServerSettings,
    /// Account database
    pub database: DatabaseSettings,
    /// Pending-request store
    pub state_store: StateStoreSettings,
    /// Outbound HTTP
    pub http: HttpSettings,
    /// Provider credentials
    pub oauth: OAuthConfig,
}

impl Default for AdlinkConfig {
    fn default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            server: ServerSettings::default(),
            database: DatabaseSettings::default(),
            state_store: StateStoreSettings::default(),
            http: HttpSettings::default(),
            oauth: OAuthConfig::default(),
        }
    }
}

/// Hide the password component of a connection URL
fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) if parsed.password().is_some() => {
            // Only fails for cannot-be-a-base URLs, which carry no password
            let _ = parsed.set_password(Some("****"));
            parsed.to_string()
        }
        _ => raw.to_string(),
    }
}

impl AdlinkConfig {
    /// Load configuration for a service using XDG directories
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Default configuration cannot be serialized to TOML
    /// - A configuration file contains invalid TOML syntax
    /// - Configuration values fail type conversion
    pub fn load_for_service(service_name: &str) -> anyhow::Result<Self> {
        let mut figment = Figment::new()
            // 5. Start with defaults (lowest priority)
            .merge(Toml::string(&toml::to_string(&Self::default())?));

        // 4. System config
        let system_config = PathBuf::from("/etc/acton-adlink")
            .join(service_name)
            .join("config.toml");
        if system_config.exists() {
            figment = figment.merge(Toml::file(&system_config));
        }

        // 3. User config
        let user_config = Self::recommended_path(service_name);
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }

        // 2. Local config
        let local_config = PathBuf::from("./config.toml");
        if local_config.exists() {
            figment = figment.merge(Toml::file(&local_config));
        }

        // 1. Environment variables
        figment = figment.merge(Env::prefixed("ADLINK_").split("__").lowercase(true));

        let config: Self = figment.extract()?;
        config.log_summary();
        Ok(config)
    }

    /// Load configuration from a specific file
    ///
    /// A missing file yields the defaults (plus environment overrides).
    ///
    /// # Errors
    ///
    /// Returns an error if the file contains invalid TOML or values fail type conversion
    pub fn load_from(path: &str) -> anyhow::Result<Self> {
        let config = Figment::new()
            .merge(Toml::string(&toml::to_string(&Self::default())?))
            .merge(Toml::file(path))
            .merge(Env::prefixed("ADLINK_").split("__").lowercase(true))
            .extract()?;

        Ok(config)
    }

    /// Get the recommended XDG config path for a service
    #[must_use]
    pub fn recommended_path(service_name: &str) -> PathBuf {
        dirs::config_dir().map_or_else(
            || PathBuf::from("./config.toml"),
            |config_dir| {
                config_dir
                    .join("acton-adlink")
                    .join(service_name)
                    .join("config.toml")
            },
        )
    }

    /// Log which providers are usable; never logs secrets
    fn log_summary(&self) {
        for provider in crate::oauth::Provider::LINKABLE {
            if self.oauth.is_provider_configured(provider) {
                tracing::info!(provider = %provider, "Provider configured");
            } else {
                tracing::warn!(provider = %provider, "Provider not configured, linking disabled");
            }
        }
        if self.http.timeout_secs != self.http.timeout().as_secs() {
            tracing::warn!(
                requested = self.http.timeout_secs,
                effective = self.http.timeout().as_secs(),
                "HTTP timeout clamped"
            );
        }
    }
}
