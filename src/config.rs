//! Configuration management for Gatekeeper.
//!
//! Settings come from an optional YAML file, overridden by environment
//! variables prefixed with `GATEKEEPER__` (double underscores separate
//! nesting levels, e.g. `GATEKEEPER__SERVER__HTTP_ADDR=0.0.0.0:9000`).

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{GatekeeperError, Result};
use crate::http::ResetFormat;
use crate::ratelimit::{parse_policies, Policy, PolicyTable, DEFAULT_POLICY};

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "GATEKEEPER";

/// Main configuration for the Gatekeeper service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatekeeperConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Janitor configuration
    #[serde(default)]
    pub janitor: JanitorConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Rendering of the `x-ratelimit-reset` header
    #[serde(default)]
    pub reset_format: ResetFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            reset_format: ResetFormat::default(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Janitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JanitorConfig {
    /// Seconds between sweeps
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Idle age in seconds after which an unblocked entry may be evicted
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            retention_secs: default_retention_secs(),
        }
    }
}

fn default_interval_secs() -> u64 {
    60
}

fn default_retention_secs() -> u64 {
    3600
}

impl JanitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Path to a YAML policy table
    #[serde(default)]
    pub policies_path: Option<String>,

    /// Policies declared inline; these win over same-named file entries
    #[serde(default)]
    pub policies: Vec<Policy>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,

    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json: false,
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl GatekeeperConfig {
    /// Load configuration from a YAML file, then apply environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(GatekeeperError::Config(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }

        let config = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Yaml))
            .add_source(env_source())
            .build()?
            .try_deserialize::<GatekeeperConfig>()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a file.
    pub fn from_env() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(env_source())
            .build()?
            .try_deserialize::<GatekeeperConfig>()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string, without environment overrides.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()?
            .try_deserialize::<GatekeeperConfig>()?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that deserialize fine but cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.janitor.interval_secs == 0 {
            return Err(GatekeeperError::Config(
                "janitor.interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.janitor.retention_secs == 0 {
            return Err(GatekeeperError::Config(
                "janitor.retention_secs must be greater than 0".to_string(),
            ));
        }
        for policy in &self.rate_limiting.policies {
            policy.validate()?;
        }
        Ok(())
    }

    /// Assemble the policy table: file entries, then inline entries, then the
    /// built-in default if neither supplied one.
    pub fn policy_table(&self) -> Result<PolicyTable> {
        let mut policies = Vec::new();

        if let Some(path) = &self.rate_limiting.policies_path {
            info!(path = %path, "Loading policy table");
            let contents = std::fs::read_to_string(path)?;
            policies.extend(parse_policies(&contents)?);
        }
        policies.extend(self.rate_limiting.policies.iter().cloned());

        if !policies.iter().any(|p| p.name == DEFAULT_POLICY) {
            info!("No default policy configured, using built-in default");
            policies.push(Policy::builtin_default());
        }

        let retention_ms = self.janitor.retention_secs.saturating_mul(1000);
        for policy in &policies {
            if policy.window_ms > retention_ms {
                warn!(
                    policy = %policy.name,
                    window_ms = policy.window_ms,
                    retention_secs = self.janitor.retention_secs,
                    "Policy window exceeds janitor retention; idle entries may be evicted mid-window"
                );
            }
        }

        PolicyTable::new(policies)
    }
}

fn env_source() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_defaults() {
        let config = GatekeeperConfig::default();
        assert_eq!(config.server.http_addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.server.reset_format, ResetFormat::EpochSeconds);
        assert_eq!(config.janitor.interval(), Duration::from_secs(60));
        assert_eq!(config.janitor.retention(), Duration::from_secs(3600));
        assert!(!config.logging.json);
        assert_ok!(config.validate());
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
server:
  http_addr: "0.0.0.0:9000"
  reset_format: rfc3339
janitor:
  interval_secs: 30
  retention_secs: 600
rate_limiting:
  policies:
    - name: default
      window_ms: 60000
      max_actions: 100
    - name: "auth:login"
      window_ms: 900000
      max_actions: 5
      block_duration_ms: 1800000
logging:
  json: true
"#;
        let config = GatekeeperConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.http_addr.port(), 9000);
        assert_eq!(config.server.reset_format, ResetFormat::Rfc3339);
        assert_eq!(config.janitor.interval_secs, 30);
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "info");

        let table = config.policy_table().unwrap();
        assert_eq!(table.resolve("auth:login").max_actions, 5);
    }

    #[test]
    fn test_builtin_default_added() {
        let config = GatekeeperConfig::default();
        let table = config.policy_table().unwrap();
        assert_eq!(table.resolve("anything").name, DEFAULT_POLICY);
        assert_eq!(table.resolve("anything").max_actions, 100);
    }

    #[test]
    fn test_zero_janitor_values_rejected() {
        let result = GatekeeperConfig::from_yaml("janitor:\n  interval_secs: 0\n");
        assert!(matches!(result, Err(GatekeeperError::Config(_))));

        let result = GatekeeperConfig::from_yaml("janitor:\n  retention_secs: 0\n");
        assert_err!(result);
    }

    #[test]
    fn test_invalid_inline_policy_rejected() {
        let yaml = r#"
rate_limiting:
  policies:
    - name: default
      window_ms: 0
      max_actions: 10
"#;
        let result = GatekeeperConfig::from_yaml(yaml);
        assert!(matches!(result, Err(GatekeeperError::InvalidPolicy { .. })));
    }

    #[test]
    fn test_policies_file_merged_with_inline() {
        let dir = std::env::temp_dir().join(format!("gatekeeper-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("policies.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "policies:\n  - name: api\n    window_ms: 1000\n    max_actions: 10\n  - name: default\n    window_ms: 1000\n    max_actions: 1"
        )
        .unwrap();

        let config = GatekeeperConfig {
            rate_limiting: RateLimitingConfig {
                policies_path: Some(path.display().to_string()),
                policies: vec![Policy::new("api", Duration::from_secs(1), 20)],
            },
            ..Default::default()
        };

        let table = config.policy_table().unwrap();
        assert_eq!(table.resolve("api").max_actions, 20);
        assert_eq!(table.resolve(DEFAULT_POLICY).max_actions, 1);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_example_config_parses() {
        let config = GatekeeperConfig::from_yaml(include_str!("../config/gatekeeper.example.yaml")).unwrap();
        let table = config.policy_table().unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.resolve("auth:login").block_duration(), Some(Duration::from_secs(1800)));
    }

    #[test]
    fn test_missing_file() {
        let result = GatekeeperConfig::from_file("/definitely/not/here.yaml");
        assert!(matches!(result, Err(GatekeeperError::Config(_))));
    }
}
