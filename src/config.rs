//! Configuration management for Gatelimit.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::ratelimit::PolicyConfig;

/// Main configuration for the Gatelimit service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatelimitConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limit policy configuration
    #[serde(default)]
    pub policies: PolicyConfig,
}

impl Default for GatelimitConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            policies: PolicyConfig::default(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// How often the sweeper evicts idle rate limit keys, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    "127.0.0.1:8080".parse().unwrap()
}

fn default_sweep_interval() -> u64 {
    300
}

impl GatelimitConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: &str) -> crate::error::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: GatelimitConfig = serde_yaml::from_str(&contents)
            .map_err(|e| crate::error::GatelimitError::Config(e.to_string()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatelimitConfig::default();
        assert_eq!(config.server.http_addr, default_http_addr());
        assert_eq!(config.server.sweep_interval_secs, 300);
        assert!(config.policies.categories.contains_key("auth"));
    }

    #[test]
    fn test_parse_partial_config() {
        let yaml = r#"
server:
  http_addr: "0.0.0.0:9000"
"#;
        let config: GatelimitConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.http_addr, "0.0.0.0:9000".parse().unwrap());
        // Unspecified sections fall back to defaults.
        assert_eq!(config.server.sweep_interval_secs, 300);
        assert!(config.policies.categories.contains_key("api"));
    }
}
