//! Rate limit policies and the policy table.
//!
//! A policy names a fixed counting window, the number of actions allowed in
//! it, and optionally how long an identifier is blocked once it goes over.
//! Policies are loaded from YAML in either of two shapes:
//!
//! ```yaml
//! policies:
//!   - name: default
//!     window_ms: 60000
//!     max_actions: 100
//!   - name: "auth:login"
//!     window_ms: 900000
//!     max_actions: 5
//!     block_duration_ms: 1800000
//! ```
//!
//! or the bare list without the `policies:` key.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

use crate::error::{GatekeeperError, Result};

/// Name of the policy that unknown policy names resolve to.
pub const DEFAULT_POLICY: &str = "default";

/// A named rate limit policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Unique policy name, e.g. `auth:login`
    pub name: String,
    /// Length of the counting window in milliseconds
    pub window_ms: u64,
    /// Actions allowed per window
    pub max_actions: u64,
    /// If set, going over the limit blocks the identifier for this long
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_duration_ms: Option<u64>,
}

impl Policy {
    /// Create a policy without a block duration.
    pub fn new(name: impl Into<String>, window: Duration, max_actions: u64) -> Self {
        Self {
            name: name.into(),
            window_ms: duration_to_millis(window),
            max_actions,
            block_duration_ms: None,
        }
    }

    /// Escalate limit violations to a block of the given duration.
    pub fn with_block_duration(mut self, block: Duration) -> Self {
        self.block_duration_ms = Some(duration_to_millis(block));
        self
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn block_duration(&self) -> Option<Duration> {
        self.block_duration_ms.map(Duration::from_millis)
    }

    /// Reject definitions the limiter cannot enforce meaningfully.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(GatekeeperError::invalid_policy(&self.name, "name must not be empty"));
        }
        if self.window_ms == 0 {
            return Err(GatekeeperError::invalid_policy(&self.name, "window_ms must be greater than 0"));
        }
        if self.max_actions == 0 {
            return Err(GatekeeperError::invalid_policy(&self.name, "max_actions must be greater than 0"));
        }
        if self.block_duration_ms == Some(0) {
            return Err(GatekeeperError::invalid_policy(
                &self.name,
                "block_duration_ms must be greater than 0 when set",
            ));
        }
        Ok(())
    }

    /// The policy used when nothing else is configured: 100 actions a minute, no block.
    pub fn builtin_default() -> Self {
        Policy::new(DEFAULT_POLICY, Duration::from_secs(60), 100)
    }
}

fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// On-disk shape of a policy file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicySet {
    #[serde(default)]
    pub policies: Vec<Policy>,
}

/// Thread-safe table of named policies with a mandatory `default` entry.
///
/// Reads vastly outnumber writes, so lookups take a shared lock and hand
/// back an `Arc` that stays valid even if the policy is overwritten.
#[derive(Debug)]
pub struct PolicyTable {
    policies: RwLock<HashMap<String, Arc<Policy>>>,
}

impl PolicyTable {
    /// Build a table from a set of policies.
    ///
    /// Fails if any policy is invalid or none of them is named `default`.
    pub fn new<I>(policies: I) -> Result<Self>
    where
        I: IntoIterator<Item = Policy>,
    {
        let mut map = HashMap::new();
        for policy in policies {
            policy.validate()?;
            map.insert(policy.name.clone(), Arc::new(policy));
        }

        if !map.contains_key(DEFAULT_POLICY) {
            return Err(GatekeeperError::MissingDefaultPolicy(DEFAULT_POLICY.to_string()));
        }

        Ok(Self {
            policies: RwLock::new(map),
        })
    }

    /// A table holding only the given default policy, renamed to `default`.
    pub fn with_default(mut default: Policy) -> Result<Self> {
        default.name = DEFAULT_POLICY.to_string();
        Self::new([default])
    }

    /// Load a policy table from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading policy table");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load a policy table from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Self::new(parse_policies(yaml)?)
    }

    /// Resolve a policy by name, falling back to `default` for unknown names.
    pub fn resolve(&self, name: &str) -> Arc<Policy> {
        let policies = self.policies.read();
        if let Some(policy) = policies.get(name) {
            return Arc::clone(policy);
        }

        trace!(policy = %name, "Unknown policy, falling back to default");
        // The constructor guarantees `default` and nothing ever removes it.
        match policies.get(DEFAULT_POLICY) {
            Some(policy) => Arc::clone(policy),
            None => Arc::new(Policy::builtin_default()),
        }
    }

    /// Look up a policy without falling back.
    pub fn get(&self, name: &str) -> Option<Arc<Policy>> {
        self.policies.read().get(name).cloned()
    }

    /// Add or overwrite a policy. Returns the policy it replaced, if any.
    pub fn register(&self, policy: Policy) -> Result<Option<Arc<Policy>>> {
        policy.validate()?;

        debug!(
            policy = %policy.name,
            window_ms = policy.window_ms,
            max_actions = policy.max_actions,
            block_duration_ms = ?policy.block_duration_ms,
            "Registering policy"
        );

        let mut policies = self.policies.write();
        Ok(policies.insert(policy.name.clone(), Arc::new(policy)))
    }

    /// Registered policy names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.policies.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot of every registered policy, sorted by name.
    pub fn policies(&self) -> Vec<Policy> {
        let mut all: Vec<Policy> = self
            .policies
            .read()
            .values()
            .map(|p| Policy::clone(p))
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn len(&self) -> usize {
        self.policies.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.read().is_empty()
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        let mut map = HashMap::new();
        map.insert(DEFAULT_POLICY.to_string(), Arc::new(Policy::builtin_default()));
        Self {
            policies: RwLock::new(map),
        }
    }
}

/// Parse either a `{ policies: [...] }` document or a bare list.
pub fn parse_policies(yaml: &str) -> Result<Vec<Policy>> {
    if let Ok(list) = serde_yaml::from_str::<Vec<Policy>>(yaml) {
        return Ok(list);
    }

    serde_yaml::from_str::<PolicySet>(yaml)
        .map(|set| set.policies)
        .map_err(|e| GatekeeperError::Config(format!("Failed to parse policy table: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_policy_set() {
        let yaml = r#"
policies:
  - name: default
    window_ms: 60000
    max_actions: 100
  - name: "auth:login"
    window_ms: 900000
    max_actions: 5
    block_duration_ms: 1800000
"#;
        let table = PolicyTable::from_yaml(yaml).unwrap();
        assert_eq!(table.len(), 2);

        let login = table.resolve("auth:login");
        assert_eq!(login.max_actions, 5);
        assert_eq!(login.window(), Duration::from_secs(900));
        assert_eq!(login.block_duration(), Some(Duration::from_secs(1800)));
    }

    #[test]
    fn test_parse_bare_list() {
        let yaml = r#"
- name: default
  window_ms: 1000
  max_actions: 10
"#;
        let table = PolicyTable::from_yaml(yaml).unwrap();
        assert_eq!(table.names(), vec!["default".to_string()]);
        assert_eq!(table.resolve("default").block_duration(), None);
    }

    #[test]
    fn test_missing_default_fails_fast() {
        let result = PolicyTable::new([Policy::new("api", Duration::from_secs(1), 10)]);
        assert!(matches!(result, Err(GatekeeperError::MissingDefaultPolicy(_))));
    }

    #[test]
    fn test_unknown_policy_falls_back_to_default() {
        let table = PolicyTable::new([
            Policy::new(DEFAULT_POLICY, Duration::from_secs(60), 50),
            Policy::new("api:search", Duration::from_secs(1), 2),
        ])
        .unwrap();

        assert_eq!(table.resolve("api:search").max_actions, 2);
        assert_eq!(table.resolve("does-not-exist").name, DEFAULT_POLICY);
        assert!(table.get("does-not-exist").is_none());
    }

    #[test]
    fn test_invalid_policies_rejected() {
        let zero_window = Policy::new("a", Duration::ZERO, 1);
        assert!(matches!(zero_window.validate(), Err(GatekeeperError::InvalidPolicy { .. })));

        let zero_max = Policy::new("b", Duration::from_secs(1), 0);
        assert!(zero_max.validate().is_err());

        let zero_block = Policy::new("c", Duration::from_secs(1), 1).with_block_duration(Duration::ZERO);
        assert!(zero_block.validate().is_err());

        let unnamed = Policy::new("  ", Duration::from_secs(1), 1);
        assert!(unnamed.validate().is_err());

        let table = PolicyTable::default();
        assert!(table.register(zero_max).is_err());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_register_overwrites() {
        let table = PolicyTable::default();
        let previous = table
            .register(Policy::new("api", Duration::from_secs(1), 5))
            .unwrap();
        assert!(previous.is_none());

        let previous = table
            .register(Policy::new("api", Duration::from_secs(1), 7))
            .unwrap();
        assert_eq!(previous.map(|p| p.max_actions), Some(5));
        assert_eq!(table.resolve("api").max_actions, 7);
    }

    #[test]
    fn test_with_default_renames() {
        let table = PolicyTable::with_default(Policy::new("anything", Duration::from_secs(10), 3)).unwrap();
        assert_eq!(table.resolve("x").name, DEFAULT_POLICY);
        assert_eq!(table.resolve("x").max_actions, 3);
    }

    #[test]
    fn test_parse_garbage_is_config_error() {
        let result = PolicyTable::from_yaml("policies: 12");
        assert!(matches!(result, Err(GatekeeperError::Config(_))));
    }
}
