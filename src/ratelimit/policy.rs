//! Rate limit policy configuration and lookup.
//!
//! This module maps named request categories (e.g. "auth", "api") to fixed
//! `(max_requests, window_ms, message)` policies, and carries the fail-mode
//! flag that decides what the enforcement layer does when the limiting path
//! itself breaks.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::limiter::Limit;
use crate::error::{GatelimitError, Result};

/// What the enforcement layer does when rate limiting fails internally,
/// e.g. when a request is tagged with a category no policy covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailMode {
    /// Log the error and forward the request unthrottled.
    Allow,
    /// Log the error and reject the request.
    Deny,
}

impl Default for FailMode {
    fn default() -> Self {
        // Availability over strict enforcement.
        FailMode::Allow
    }
}

/// Raw policy configuration for a single category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// Maximum requests allowed within the window
    pub max_requests: u32,
    /// Window length in milliseconds
    pub window_ms: i64,
    /// Message returned to rejected clients
    #[serde(default)]
    pub message: Option<String>,
}

/// Raw policy configuration: fail mode plus a category map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Behavior on internal failure of the limiting path
    #[serde(default)]
    pub fail_mode: FailMode,
    /// Per-category limits
    #[serde(default = "default_categories")]
    pub categories: HashMap<String, CategoryConfig>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            fail_mode: FailMode::default(),
            categories: default_categories(),
        }
    }
}

impl PolicyConfig {
    /// Parse a policy configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| GatelimitError::Config(format!("Failed to parse policy config: {}", e)))
    }
}

fn default_categories() -> HashMap<String, CategoryConfig> {
    let mut categories = HashMap::new();
    categories.insert(
        "auth".to_string(),
        CategoryConfig {
            max_requests: 5,
            window_ms: 900_000,
            message: Some("Too many authentication attempts, please try again later.".to_string()),
        },
    );
    categories.insert(
        "api".to_string(),
        CategoryConfig {
            max_requests: 100,
            window_ms: 60_000,
            message: Some("Too many requests, please slow down.".to_string()),
        },
    );
    categories.insert(
        "import".to_string(),
        CategoryConfig {
            max_requests: 10,
            window_ms: 60_000,
            message: Some("Too many import requests, please wait before retrying.".to_string()),
        },
    );
    categories.insert(
        "admin".to_string(),
        CategoryConfig {
            max_requests: 50,
            window_ms: 60_000,
            message: Some("Too many admin requests, please slow down.".to_string()),
        },
    );
    categories
}

const DEFAULT_MESSAGE: &str = "Rate limit exceeded, please try again later.";

/// A validated policy for a single category.
#[derive(Debug, Clone)]
pub struct CategoryPolicy {
    /// The limit enforced for this category
    pub limit: Limit,
    /// Message returned to rejected clients
    pub message: String,
}

/// A validated, immutable table of category policies.
///
/// Built from a [`PolicyConfig`]; construction fails on any non-positive
/// limit value so misconfiguration surfaces at startup instead of
/// distorting counting at request time.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    categories: HashMap<String, CategoryPolicy>,
    fail_mode: FailMode,
}

impl PolicyTable {
    /// Validate a raw policy configuration into a lookup table.
    pub fn from_config(config: &PolicyConfig) -> Result<Self> {
        let mut categories = HashMap::with_capacity(config.categories.len());

        for (name, category) in &config.categories {
            let limit = Limit::new(category.max_requests, category.window_ms).map_err(|e| {
                GatelimitError::Config(format!("Invalid policy for category '{}': {}", name, e))
            })?;
            categories.insert(
                name.clone(),
                CategoryPolicy {
                    limit,
                    message: category
                        .message
                        .clone()
                        .unwrap_or_else(|| DEFAULT_MESSAGE.to_string()),
                },
            );
        }

        Ok(Self {
            categories,
            fail_mode: config.fail_mode,
        })
    }

    /// Look up the policy for a category.
    pub fn get(&self, category: &str) -> Option<&CategoryPolicy> {
        self.categories.get(category)
    }

    /// Behavior on internal failure of the limiting path.
    pub fn fail_mode(&self) -> FailMode {
        self.fail_mode
    }

    /// Number of configured categories.
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    /// True if no categories are configured.
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::from_config(&PolicyConfig::default()).expect("built-in policies are valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_categories() {
        let table = PolicyTable::default();

        let auth = table.get("auth").unwrap();
        assert_eq!(auth.limit.max_requests(), 5);
        assert_eq!(auth.limit.window_ms(), 900_000);

        let api = table.get("api").unwrap();
        assert_eq!(api.limit.max_requests(), 100);
        assert_eq!(api.limit.window_ms(), 60_000);

        let import = table.get("import").unwrap();
        assert_eq!(import.limit.max_requests(), 10);

        let admin = table.get("admin").unwrap();
        assert_eq!(admin.limit.max_requests(), 50);

        assert_eq!(table.len(), 4);
        assert_eq!(table.fail_mode(), FailMode::Allow);
    }

    #[test]
    fn test_unknown_category_is_none() {
        let table = PolicyTable::default();
        assert!(table.get("nonexistent").is_none());
    }

    #[test]
    fn test_parse_yaml_config() {
        let yaml = r#"
fail_mode: deny
categories:
  search:
    max_requests: 20
    window_ms: 30000
    message: "Search is rate limited."
"#;
        let config = PolicyConfig::from_yaml(yaml).unwrap();
        let table = PolicyTable::from_config(&config).unwrap();

        assert_eq!(table.fail_mode(), FailMode::Deny);
        let search = table.get("search").unwrap();
        assert_eq!(search.limit.max_requests(), 20);
        assert_eq!(search.limit.window_ms(), 30_000);
        assert_eq!(search.message, "Search is rate limited.");
    }

    #[test]
    fn test_parse_yaml_fills_defaults() {
        let config = PolicyConfig::from_yaml("fail_mode: deny").unwrap();

        // Omitting the category map keeps the built-in policies.
        assert_eq!(config.fail_mode, FailMode::Deny);
        assert!(config.categories.contains_key("auth"));
        assert!(config.categories.contains_key("api"));
    }

    #[test]
    fn test_missing_message_uses_default() {
        let yaml = r#"
categories:
  search:
    max_requests: 20
    window_ms: 30000
"#;
        let config = PolicyConfig::from_yaml(yaml).unwrap();
        let table = PolicyTable::from_config(&config).unwrap();
        assert_eq!(table.get("search").unwrap().message, DEFAULT_MESSAGE);
    }

    #[test]
    fn test_invalid_limit_rejected_at_validation() {
        let yaml = r#"
categories:
  broken:
    max_requests: 0
    window_ms: 30000
"#;
        let config = PolicyConfig::from_yaml(yaml).unwrap();
        let result = PolicyTable::from_config(&config);

        assert!(result.is_err());
        let message = result.unwrap_err().to_string();
        assert!(message.contains("broken"));
    }

    #[test]
    fn test_negative_window_rejected_at_validation() {
        let yaml = r#"
categories:
  broken:
    max_requests: 5
    window_ms: -1000
"#;
        let config = PolicyConfig::from_yaml(yaml).unwrap();
        assert!(PolicyTable::from_config(&config).is_err());
    }
}
