//! Configuration loading for cipher-relay.
//!
//! Configuration is loaded from a TOML file (default: `relay.toml`), with
//! every field defaulted so an absent file yields a runnable configuration.
//! The listening address and database path can additionally be overridden
//! from the environment (`RELAY_BIND_ADDR`, `RELAY_DATABASE`).

use serde::Deserialize;
use std::path::PathBuf;

/// Environment variable overriding the listen address.
pub const ENV_BIND_ADDR: &str = "RELAY_BIND_ADDR";
/// Environment variable overriding the offline store database path.
pub const ENV_DATABASE: &str = "RELAY_DATABASE";

/// Root configuration for cipher-relay.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Offline store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Message dispatch configuration.
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Per-connection limits.
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP/WebSocket listener (default: 0.0.0.0:8080).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// Offline store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
}

/// Message dispatch configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Capacity of the shared dispatch channel (default: 256).
    ///
    /// Connection read loops await on this channel, so a dispatcher that
    /// falls behind stalls all senders. That is the system's only
    /// backpressure mechanism.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

/// Per-connection limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Timeout in seconds for the initial handshake frame (default: 10).
    /// Connections that don't identify themselves within this time are
    /// dropped before they consume a registry entry.
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("relay.db")
}

fn default_queue_capacity() -> usize {
    256
}

fn default_handshake_timeout_secs() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: default_database_path(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_secs: default_handshake_timeout_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            dispatch: DispatchConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Apply environment overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    /// Apply environment overrides from an arbitrary lookup.
    ///
    /// Separated from [`Config::apply_env`] so tests don't have to mutate
    /// process-global state.
    pub fn apply_env_from(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = var(ENV_BIND_ADDR) {
            self.server.bind_address = addr;
        }
        if let Some(db) = var(ENV_DATABASE) {
            self.store.database = PathBuf::from(db);
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.server.bind_address, "0.0.0.0:8080");
        assert_eq!(config.store.database, PathBuf::from("relay.db"));
        assert_eq!(config.dispatch.queue_capacity, 256);
        assert_eq!(config.limits.handshake_timeout_secs, 10);
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[server]
bind_address = "127.0.0.1:9000"

[store]
database = "/data/relay.db"

[dispatch]
queue_capacity = 64

[limits]
handshake_timeout_secs = 30
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:9000");
        assert_eq!(config.store.database, PathBuf::from("/data/relay.db"));
        assert_eq!(config.dispatch.queue_capacity, 64);
        assert_eq!(config.limits.handshake_timeout_secs, 30);
    }

    #[test]
    fn config_missing_sections_use_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.bind_address, "0.0.0.0:8080");
        assert_eq!(config.limits.handshake_timeout_secs, 10);
    }

    #[test]
    fn env_overrides_take_precedence() {
        let mut config = Config::default();
        config.apply_env_from(|name| match name {
            ENV_BIND_ADDR => Some("0.0.0.0:9999".to_string()),
            ENV_DATABASE => Some("/var/lib/relay/offline.db".to_string()),
            _ => None,
        });

        assert_eq!(config.server.bind_address, "0.0.0.0:9999");
        assert_eq!(
            config.store.database,
            PathBuf::from("/var/lib/relay/offline.db")
        );
    }

    #[test]
    fn absent_env_leaves_config_untouched() {
        let mut config = Config::default();
        config.apply_env_from(|_| None);
        assert_eq!(config.server.bind_address, "0.0.0.0:8080");
    }
}
