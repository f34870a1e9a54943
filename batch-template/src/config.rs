//! Expander configuration
//!
//! Loaded from a TOML file; every field is optional:
//!
//! ```toml
//! int_fallback = "error"               # or "zero" (default)
//! timestamp = "2024-06-01T09:15:00Z"   # fixes date(...) and ${now}
//!
//! [reserved]
//! region = "eu-west"                   # survives row resets
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// What `:int` does with a value that is not a number
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IntFallback {
    /// Use 0 and log a warning
    #[default]
    Zero,
    /// Fail the row
    Error,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ExpanderConfig {
    #[serde(default)]
    pub int_fallback: IntFallback,

    /// Fixed evaluation time; the local time at context creation when unset
    #[serde(default)]
    pub timestamp: Option<DateTime<FixedOffset>>,

    /// Extra bindings visible to every row
    #[serde(default)]
    pub reserved: BTreeMap<String, String>,
}

impl ExpanderConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_default() {
        let config = ExpanderConfig::from_toml("").unwrap();
        assert_eq!(config, ExpanderConfig::default());
        assert_eq!(config.int_fallback, IntFallback::Zero);
    }

    #[test]
    fn test_full_config() {
        let config = ExpanderConfig::from_toml(
            r#"
int_fallback = "error"
timestamp = "2024-06-01T09:15:00+02:00"

[reserved]
region = "eu-west"
"#,
        )
        .unwrap();
        assert_eq!(config.int_fallback, IntFallback::Error);
        assert_eq!(
            config.timestamp.map(|t| t.to_rfc3339()),
            Some("2024-06-01T09:15:00+02:00".to_string())
        );
        assert_eq!(config.reserved.get("region").map(String::as_str), Some("eu-west"));
    }

    #[test]
    fn test_invalid_config() {
        assert!(ExpanderConfig::from_toml("int_fallback = \"maybe\"").is_err());
        assert!(ExpanderConfig::from_toml("unknown = 1").is_err());
        assert!(ExpanderConfig::load("/nonexistent/batch-template.toml").is_err());
    }

    #[test]
    fn test_reserved_bindings_reach_context() {
        let config = ExpanderConfig::from_toml("[reserved]\nregion = \"eu\"").unwrap();
        let mut ctx = crate::template::ExpressionContext::with_config(&config);
        ctx.reset(true);
        assert_eq!(
            ctx.expand("${region}").unwrap(),
            Some(serde_json::json!("eu"))
        );
    }
}
