//! The outcome of a single rate limit check.

use serde::Serialize;

use super::clock::Timestamp;

/// Allow/deny decision plus the metadata a caller needs for backoff hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The action may proceed.
    Allowed {
        /// Actions left in the current window
        remaining: u64,
        /// When the current window ends
        reset_at: Timestamp,
    },
    /// The action must be refused.
    Denied {
        /// When the window ends, or when the block lifts if one is active
        reset_at: Timestamp,
        /// Set when the identifier is under a block
        blocked_until: Option<Timestamp>,
    },
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allowed { .. })
    }

    /// Remaining actions; always zero for a denial.
    pub fn remaining(&self) -> u64 {
        match self {
            Verdict::Allowed { remaining, .. } => *remaining,
            Verdict::Denied { .. } => 0,
        }
    }

    pub fn reset_at(&self) -> Timestamp {
        match self {
            Verdict::Allowed { reset_at, .. } | Verdict::Denied { reset_at, .. } => *reset_at,
        }
    }

    pub fn blocked_until(&self) -> Option<Timestamp> {
        match self {
            Verdict::Allowed { .. } => None,
            Verdict::Denied { blocked_until, .. } => *blocked_until,
        }
    }

    /// Earliest time a retry can succeed: the block expiry if blocked,
    /// otherwise the window reset.
    pub fn retry_at(&self) -> Timestamp {
        self.blocked_until().unwrap_or_else(|| self.reset_at())
    }
}

/// Wire form of a [`Verdict`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerdictBody {
    pub allowed: bool,
    pub policy: String,
    pub remaining: u64,
    /// Milliseconds since the Unix epoch
    pub reset_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_until: Option<Timestamp>,
}

impl VerdictBody {
    pub fn new(verdict: &Verdict, policy: &str) -> Self {
        Self {
            allowed: verdict.is_allowed(),
            policy: policy.to_string(),
            remaining: verdict.remaining(),
            reset_at: verdict.reset_at(),
            blocked_until: verdict.blocked_until(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_at_prefers_block() {
        let denied = Verdict::Denied {
            reset_at: Timestamp::from_millis(60_000),
            blocked_until: Some(Timestamp::from_millis(120_000)),
        };
        assert_eq!(denied.retry_at(), Timestamp::from_millis(120_000));
        assert_eq!(denied.remaining(), 0);
        assert!(!denied.is_allowed());

        let denied = Verdict::Denied {
            reset_at: Timestamp::from_millis(60_000),
            blocked_until: None,
        };
        assert_eq!(denied.retry_at(), Timestamp::from_millis(60_000));
    }

    #[test]
    fn test_body_serialization() {
        let allowed = Verdict::Allowed {
            remaining: 3,
            reset_at: Timestamp::from_millis(1_000),
        };
        let json = serde_json::to_value(VerdictBody::new(&allowed, "api")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "allowed": true,
                "policy": "api",
                "remaining": 3,
                "reset_at": 1000
            })
        );
    }
}
