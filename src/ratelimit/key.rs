//! Store keys for limit entries.

use serde::{Deserialize, Serialize};

/// Identifies one limit entry: an identifier counted under one policy name.
///
/// The policy name is the one the caller asked for, not the one it resolved
/// to, so two unknown policy names keep separate counters even though both
/// are governed by the default policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryKey {
    /// Opaque caller-supplied identifier (IP address, user id, API key)
    pub identifier: String,
    /// Policy name as requested
    pub policy: String,
}

impl EntryKey {
    pub fn new(identifier: &str, policy: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            policy: policy.to_string(),
        }
    }
}

impl std::fmt::Display for EntryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.policy, self.identifier)
    }
}
