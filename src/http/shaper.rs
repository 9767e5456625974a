//! Translation of verdicts into HTTP status codes and rate limit headers.

use axum::http::header::{HeaderName, RETRY_AFTER};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};

use crate::ratelimit::{Policy, Timestamp, Verdict};

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// How the reset time is rendered in `x-ratelimit-reset`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetFormat {
    /// Seconds since the Unix epoch, rounded up
    #[default]
    EpochSeconds,
    /// RFC 3339 timestamp in UTC
    Rfc3339,
}

/// Status and headers derived from a verdict.
#[derive(Debug, Clone)]
pub struct ShapedResponse {
    /// `429` for denials; `None` leaves the status to the caller
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
}

/// Renders verdicts for HTTP clients. Holds no state beyond its format
/// settings; shaping never touches the limiter.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseShaper {
    reset_format: ResetFormat,
}

impl ResponseShaper {
    pub fn new(reset_format: ResetFormat) -> Self {
        Self { reset_format }
    }

    pub fn reset_format(&self) -> ResetFormat {
        self.reset_format
    }

    pub fn shape(&self, verdict: &Verdict, policy: &Policy, now: Timestamp) -> ShapedResponse {
        let mut headers = HeaderMap::new();
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(policy.max_actions));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(verdict.remaining()));
        if let Some(reset) = self.render_reset(verdict.reset_at()) {
            headers.insert(X_RATELIMIT_RESET, reset);
        }

        let status = match verdict {
            Verdict::Allowed { .. } => None,
            Verdict::Denied { .. } => {
                headers.insert(RETRY_AFTER, HeaderValue::from(retry_after_secs(verdict, now)));
                Some(StatusCode::TOO_MANY_REQUESTS)
            }
        };

        ShapedResponse { status, headers }
    }

    fn render_reset(&self, reset_at: Timestamp) -> Option<HeaderValue> {
        match self.reset_format {
            ResetFormat::EpochSeconds => Some(HeaderValue::from(reset_at.as_epoch_secs_ceil())),
            ResetFormat::Rfc3339 => HeaderValue::from_str(&reset_at.to_rfc3339()).ok(),
        }
    }
}

/// Whole seconds until a retry can succeed, rounded up; zero if that moment
/// has already passed.
pub fn retry_after_secs(verdict: &Verdict, now: Timestamp) -> u64 {
    verdict.retry_at().millis_since(now).div_ceil(1000)
}
