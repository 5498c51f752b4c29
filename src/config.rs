//! Configuration for lrucached

use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,

    /// TCP port to listen on
    pub port: u16,

    /// Maximum number of concurrent connections (extra clients are rejected)
    pub max_connections: usize,

    /// Read buffer size per connection (bytes)
    pub read_buffer_size: usize,

    /// Write buffer size per connection (bytes)
    pub write_buffer_size: usize,

    /// Number of Tokio worker threads (0 = number of CPUs)
    pub worker_threads: usize,

    /// Idle read/write timeout in seconds (0 = no timeout)
    pub idle_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 11211,
            max_connections: 1024,
            read_buffer_size: 8192,
            write_buffer_size: 8192,
            worker_threads: 0,
            idle_timeout_secs: 300,
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for binding
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

/// Entry store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Upper bound on the summed size of all stored entries
    pub memory_budget_bytes: usize,

    /// Entry count up to which eviction scans the whole store for expired
    /// entries; above it only this many least-recently-used entries are checked
    pub eviction_scan_threshold: usize,

    /// Background expiry sweep period in seconds (0 = lazy expiration only)
    pub sweep_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            memory_budget_bytes: 64 * 1024 * 1024, // 64MB
            eviction_scan_threshold: 1024,
            sweep_interval_secs: 60,
        }
    }
}

impl StorageConfig {
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| crate::CacheError::Config(format!("Failed to read config file: {e}")))?;

        toml::from_str(&contents)
            .map_err(|e| crate::CacheError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from environment variables or use defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from `LRUCACHED_*` environment variables
    pub fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("LRUCACHED_HOST") {
            self.server.host = host;
        }

        if let Some(port) = env_parse("LRUCACHED_PORT") {
            self.server.port = port;
        }

        if let Some(n) = env_parse("LRUCACHED_MAX_CONNECTIONS") {
            self.server.max_connections = n;
        }

        if let Some(secs) = env_parse("LRUCACHED_IDLE_TIMEOUT_SECS") {
            self.server.idle_timeout_secs = secs;
        }

        if let Some(bytes) = env_parse("LRUCACHED_MEMORY_BUDGET") {
            self.storage.memory_budget_bytes = bytes;
        }

        if let Some(n) = env_parse("LRUCACHED_EVICTION_SCAN_THRESHOLD") {
            self.storage.eviction_scan_threshold = n;
        }

        if let Some(secs) = env_parse("LRUCACHED_SWEEP_INTERVAL_SECS") {
            self.storage.sweep_interval_secs = secs;
        }
    }

    /// Reject settings the server cannot start with
    pub fn validate(&self) -> crate::Result<()> {
        if self.storage.memory_budget_bytes == 0 {
            return Err(crate::CacheError::Config(
                "memory_budget_bytes must be greater than zero".to_string(),
            ));
        }
        if self.storage.eviction_scan_threshold == 0 {
            return Err(crate::CacheError::Config(
                "eviction_scan_threshold must be greater than zero".to_string(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(crate::CacheError::Config(
                "max_connections must be greater than zero".to_string(),
            ));
        }
        if self.server.read_buffer_size == 0 {
            return Err(crate::CacheError::Config(
                "read_buffer_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 11211);
        assert_eq!(config.server.listen_addr(), "127.0.0.1:11211");
        assert_eq!(config.server.idle_timeout(), Some(Duration::from_secs(300)));
        assert_eq!(config.storage.memory_budget_bytes, 64 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nport = 22122\nidle_timeout_secs = 0\n\n[storage]\nmemory_budget_bytes = 1024"
        )
        .unwrap();

        let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.server.port, 22122);
        assert_eq!(config.server.idle_timeout(), None);
        assert_eq!(config.server.max_connections, 1024);
        assert_eq!(config.storage.memory_budget_bytes, 1024);
        assert_eq!(config.storage.eviction_scan_threshold, 1024);
    }

    #[test]
    fn test_from_file_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = \"not a port\"").unwrap();

        let err = Config::from_file(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, crate::CacheError::Config(_)));
    }

    #[test]
    fn test_from_file_missing() {
        assert!(Config::from_file("/nonexistent/lrucached.toml").is_err());
    }

    #[test]
    fn test_validate_rejects_zero_budget() {
        let mut config = Config::default();
        config.storage.memory_budget_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sweep_interval() {
        let mut config = StorageConfig::default();
        assert_eq!(config.sweep_interval(), Some(Duration::from_secs(60)));
        config.sweep_interval_secs = 0;
        assert_eq!(config.sweep_interval(), None);
    }
}
