//! Request guards that run before the engines: rate limiting, then
//! idempotency.

use std::str::FromStr;

pub mod idempotency;
pub mod rate_limit;

pub use idempotency::{CapturedResponse, GateOutcome, GateResult, IdempotencyGate};
pub use rate_limit::{RateLimitConfig, RateLimitDecision, RateLimiter};

/// What a guard does when its backing store is unreachable.
///
/// `FailOpen` lets the operation run unguarded, which during a store outage
/// can let a duplicate financial mutation through. `FailClosed` rejects the
/// request instead. The choice needs explicit sign-off per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    #[default]
    FailOpen,
    FailClosed,
}

impl FromStr for FailurePolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "open" | "fail-open" => Ok(FailurePolicy::FailOpen),
            "closed" | "fail-closed" => Ok(FailurePolicy::FailClosed),
            other => anyhow::bail!("failure policy must be 'open' or 'closed', got '{}'", other),
        }
    }
}
