//! Configuration management for the SyncApp server

use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// sqlx SQLite URL, or `memory` for the in-process backend
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Upper bound on how long one peer may hold up a broadcast sweep
    pub send_timeout_ms: u64,
    /// Outbound queue depth per connected device
    pub channel_capacity: usize,
}

impl SyncConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl DatabaseConfig {
    /// Whether the in-process backend was requested instead of SQLite
    pub fn is_memory(&self) -> bool {
        self.url.eq_ignore_ascii_case("memory")
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                service_name: "SyncApp".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite:./sync.db".to_string(),
            },
            sync: SyncConfig::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            send_timeout_ms: 2000,
            channel_capacity: 64,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Config::default();

        Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_var("SERVER_PORT", defaults.server.port),
                service_name: env::var("SERVICE_NAME").unwrap_or(defaults.server.service_name),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or(defaults.database.url),
            },
            sync: SyncConfig {
                send_timeout_ms: parse_var("SYNC_SEND_TIMEOUT_MS", defaults.sync.send_timeout_ms),
                channel_capacity: parse_var("SYNC_CHANNEL_CAPACITY", defaults.sync.channel_capacity)
                    .max(1),
            },
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={:?}, using default", name, raw);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.sync.send_timeout(), Duration::from_secs(2));
        assert!(!config.database.is_memory());
    }

    #[test]
    fn test_memory_backend_selector() {
        let db = DatabaseConfig {
            url: "MEMORY".to_string(),
        };
        assert!(db.is_memory());
    }
}
