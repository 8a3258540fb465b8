//! Configuration for the throttle middleware.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, ThrottleError};

/// Main configuration for the throttle middleware.
///
/// Every field has a default, so an empty document yields the stock
/// policy of 60 requests per 60 seconds with the standard headers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Maximum requests allowed per window
    #[serde(default = "default_limit")]
    pub limit: u64,

    /// Window length in seconds, or a duration string such as `"2m"`.
    /// `interval` is accepted as a legacy spelling.
    #[serde(
        default = "default_period",
        alias = "interval",
        deserialize_with = "deserialize_period"
    )]
    pub period: u64,

    /// Rate limit header names, or `false` to disable them
    #[serde(default)]
    pub headers: HeadersConfig,

    /// Shape of the rejection response
    #[serde(default)]
    pub response: ResponseConfig,

    /// Override for the rejection body, taking precedence over
    /// `response.body`
    #[serde(default)]
    pub message: Option<String>,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            period: default_period(),
            headers: HeadersConfig::default(),
            response: ResponseConfig::default(),
            message: None,
        }
    }
}

impl ThrottleConfig {
    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ThrottleConfig = serde_yaml::from_str(yaml)
            .map_err(|e| ThrottleError::Config(format!("Failed to parse throttle config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading throttle configuration");

        let contents = std::fs::read_to_string(path).map_err(|e| {
            ThrottleError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&contents)
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.period == 0 {
            return Err(ThrottleError::Config(
                "period must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Rate limit header configuration.
///
/// Either a mapping of header names (missing entries keep their
/// defaults) or `false` to disable the headers entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeadersConfig {
    /// `headers: false` disables the headers, `headers: true` keeps the
    /// defaults
    Toggle(bool),
    /// Custom header names
    Names(HeaderNames),
}

impl HeadersConfig {
    /// The header names to emit, or `None` when headers are disabled.
    pub fn resolved(&self) -> Option<HeaderNames> {
        match self {
            HeadersConfig::Toggle(false) => None,
            HeadersConfig::Toggle(true) => Some(HeaderNames::default()),
            HeadersConfig::Names(names) => Some(names.clone()),
        }
    }
}

impl Default for HeadersConfig {
    fn default() -> Self {
        HeadersConfig::Names(HeaderNames::default())
    }
}

/// Names of the rate limit headers added to responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderNames {
    /// Header carrying the window limit
    #[serde(default = "default_limit_header")]
    pub limit: String,

    /// Header carrying the calls still allowed
    #[serde(default = "default_remaining_header")]
    pub remaining: String,

    /// Header carrying the epoch second the window resets at
    #[serde(default = "default_reset_header")]
    pub reset: String,
}

impl Default for HeaderNames {
    fn default() -> Self {
        Self {
            limit: default_limit_header(),
            remaining: default_remaining_header(),
            reset: default_reset_header(),
        }
    }
}

/// Shape of the rejection response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseConfig {
    /// Body sent with rejections
    #[serde(default = "default_body")]
    pub body: String,

    /// Content type of the rejection body
    #[serde(default = "default_content_type", rename = "type")]
    pub content_type: String,

    /// Additional static headers set on rejections
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            body: default_body(),
            content_type: default_content_type(),
            headers: HashMap::new(),
        }
    }
}

fn default_limit() -> u64 {
    60
}

fn default_period() -> u64 {
    60
}

fn default_limit_header() -> String {
    "X-RateLimit-Limit".to_string()
}

fn default_remaining_header() -> String {
    "X-RateLimit-Remaining".to_string()
}

fn default_reset_header() -> String {
    "X-RateLimit-Reset".to_string()
}

fn default_body() -> String {
    "Rate limit exceeded".to_string()
}

fn default_content_type() -> String {
    "text/plain".to_string()
}

fn deserialize_period<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Period {
        Seconds(u64),
        Text(String),
    }

    match Period::deserialize(deserializer)? {
        Period::Seconds(secs) => Ok(secs),
        Period::Text(text) => parse_period(&text).map_err(serde::de::Error::custom),
    }
}

/// Parse a period given as raw seconds (`"90"`) or with a unit suffix
/// (`"90s"`, `"2m"`, `"1h"`, `"1d"`).
pub fn parse_period(text: &str) -> std::result::Result<u64, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err("period must not be empty".to_string());
    }

    let (digits, unit) = match trimmed.find(|c: char| !c.is_ascii_digit()) {
        Some(split) => trimmed.split_at(split),
        None => (trimmed, ""),
    };

    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid period: {}", trimmed))?;

    let multiplier = match unit.trim() {
        "" | "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        other => return Err(format!("unknown period unit: {}", other)),
    };

    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("period too large: {}", trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ThrottleConfig::from_yaml("{}").unwrap();

        assert_eq!(config.limit, 60);
        assert_eq!(config.period, 60);
        assert_eq!(config.headers.resolved(), Some(HeaderNames::default()));
        assert_eq!(config.response.body, "Rate limit exceeded");
        assert_eq!(config.response.content_type, "text/plain");
        assert!(config.response.headers.is_empty());
        assert_eq!(config.message, None);
    }

    #[test]
    fn test_parse_simple_config() {
        let yaml = r#"
limit: 100
period: 300
message: Slow down
"#;
        let config = ThrottleConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.limit, 100);
        assert_eq!(config.period, 300);
        assert_eq!(config.message, Some("Slow down".to_string()));
    }

    #[test]
    fn test_interval_is_accepted_as_period() {
        let config = ThrottleConfig::from_yaml("interval: 30").unwrap();
        assert_eq!(config.period, 30);
    }

    #[test]
    fn test_period_duration_strings() {
        assert_eq!(ThrottleConfig::from_yaml("period: 90s").unwrap().period, 90);
        assert_eq!(ThrottleConfig::from_yaml("period: 2m").unwrap().period, 120);
        assert_eq!(ThrottleConfig::from_yaml("period: 1h").unwrap().period, 3600);
        assert_eq!(ThrottleConfig::from_yaml("period: 1d").unwrap().period, 86400);
    }

    #[test]
    fn test_parse_period_rejects_garbage() {
        assert!(parse_period("").is_err());
        assert!(parse_period("m").is_err());
        assert!(parse_period("10w").is_err());
        assert!(parse_period("ten").is_err());
    }

    #[test]
    fn test_headers_can_be_disabled() {
        let config = ThrottleConfig::from_yaml("headers: false").unwrap();
        assert_eq!(config.headers.resolved(), None);

        let config = ThrottleConfig::from_yaml("headers: true").unwrap();
        assert_eq!(config.headers.resolved(), Some(HeaderNames::default()));
    }

    #[test]
    fn test_partial_header_names_keep_defaults() {
        let yaml = r#"
headers:
  limit: X-Quota-Limit
"#;
        let config = ThrottleConfig::from_yaml(yaml).unwrap();
        let names = config.headers.resolved().unwrap();

        assert_eq!(names.limit, "X-Quota-Limit");
        assert_eq!(names.remaining, "X-RateLimit-Remaining");
        assert_eq!(names.reset, "X-RateLimit-Reset");
    }

    #[test]
    fn test_response_overrides() {
        let yaml = r#"
response:
  body: Too many requests
  type: application/json
  headers:
    Cache-Control: no-store
"#;
        let config = ThrottleConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.response.body, "Too many requests");
        assert_eq!(config.response.content_type, "application/json");
        assert_eq!(
            config.response.headers.get("Cache-Control"),
            Some(&"no-store".to_string())
        );
    }

    #[test]
    fn test_zero_period_is_rejected() {
        let err = ThrottleConfig::from_yaml("period: 0").unwrap_err();
        assert!(err.to_string().contains("period"));
    }
}
